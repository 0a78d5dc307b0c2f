//! Domain errors raised by station components.
//!
//! None of these abort a simulation run: callers log them and carry on
//! with the next tick.

use thiserror::Error;

use crate::devices::Battery;

/// Failure of a single station operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StationError {
    /// A rack, pile, module or rack-group index is out of range.
    #[error("invalid {kind} index {index} (have {len})")]
    InvalidReference {
        kind: &'static str,
        index: usize,
        len: usize,
    },

    /// A battery was required but the slot is empty.
    #[error("{holder} {index} holds no battery")]
    InvalidBattery { holder: &'static str, index: usize },

    /// The component is in a state that does not allow the operation.
    #[error("{component} cannot {operation} while {state}")]
    IllegalStateTransition {
        component: &'static str,
        operation: &'static str,
        state: String,
    },

    /// Structural disagreement between configuration and hardware.
    #[error("configuration mismatch: {0}")]
    ConfigurationMismatch(String),

    /// No rack holds a battery charged to the requested level.
    #[error("no rack battery at or above soc {target_soc:.2}")]
    NoBatteryAvailable { target_soc: f64 },
}

/// An ownership-taking operation refused its battery and hands it back.
#[derive(Debug, Error)]
#[error("{reason}")]
pub struct Rejected {
    /// Why the battery was refused.
    pub reason: StationError,
    /// The battery, returned to the caller untouched.
    pub battery: Battery,
}

impl Rejected {
    pub(crate) fn new(reason: StationError, battery: Battery) -> Self {
        Self { reason, battery }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_component() {
        let err = StationError::InvalidReference {
            kind: "rack",
            index: 12,
            len: 10,
        };
        assert_eq!(err.to_string(), "invalid rack index 12 (have 10)");

        let err = StationError::IllegalStateTransition {
            component: "swap bay",
            operation: "start a swap",
            state: "in_use".into(),
        };
        assert_eq!(err.to_string(), "swap bay cannot start a swap while in_use");
    }
}
