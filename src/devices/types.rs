//! Common types and traits for station hardware components.

use std::fmt;

use serde::Serialize;

/// A consumer a power module can be linked to.
///
/// Indices are positions inside the owning rack group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Consumer {
    /// An internal battery rack.
    Rack(usize),
    /// An external charge pile.
    Pile(usize),
}

impl fmt::Display for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Consumer::Rack(i) => write!(f, "rack {i}"),
            Consumer::Pile(j) => write!(f, "pile {j}"),
        }
    }
}

/// Trait for components that draw or return electrical power.
///
/// Positive values are power drawn from the grid (charging),
/// negative values are power fed back (discharging).
pub trait Device {
    /// Power at the most recently computed operating point (kW).
    fn power_kw(&self) -> f64;

    /// Returns a human-readable type name for the device.
    fn device_type(&self) -> &'static str;
}
