use std::fmt;

use serde::Serialize;

use super::battery::Battery;
use crate::error::{Rejected, StationError};

/// Current ceiling of an external charge pile (A).
pub const PILE_MAX_CURRENT: f64 = 650.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PileStatus {
    Free,
    Connected,
    Charging,
}

impl fmt::Display for PileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PileStatus::Free => "free",
            PileStatus::Connected => "connected",
            PileStatus::Charging => "charging",
        };
        f.write_str(s)
    }
}

/// An external DC terminal charging a vehicle in place.
///
/// While connected the pile holds the vehicle's battery; it goes back to
/// the vehicle through [`ChargePile::vehicle_leave`].
#[derive(Debug)]
pub struct ChargePile {
    pub id: usize,
    pub max_current: f64,
    status: PileStatus,
    vehicle_battery: Option<Battery>,
}

impl ChargePile {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            max_current: PILE_MAX_CURRENT,
            status: PileStatus::Free,
            vehicle_battery: None,
        }
    }

    pub fn status(&self) -> PileStatus {
        self.status
    }

    pub fn battery(&self) -> Option<&Battery> {
        self.vehicle_battery.as_ref()
    }

    pub fn battery_mut(&mut self) -> Option<&mut Battery> {
        self.vehicle_battery.as_mut()
    }

    pub fn is_free(&self) -> bool {
        self.vehicle_battery.is_none()
    }

    /// Attaches a vehicle.
    ///
    /// # Errors
    ///
    /// Hands the battery back if another vehicle is already attached.
    pub fn connect(&mut self, battery: Battery) -> Result<usize, Rejected> {
        if self.vehicle_battery.is_some() {
            tracing::warn!("pile {} is already occupied", self.id);
            return Err(Rejected::new(
                StationError::IllegalStateTransition {
                    component: "pile",
                    operation: "connect a vehicle",
                    state: self.status.to_string(),
                },
                battery,
            ));
        }
        self.vehicle_battery = Some(battery);
        self.status = PileStatus::Connected;
        Ok(self.id)
    }

    /// Detaches the vehicle whatever the charging state, returning its battery.
    pub fn vehicle_leave(&mut self) -> Option<Battery> {
        self.stop_charge();
        self.status = PileStatus::Free;
        self.vehicle_battery.take()
    }

    /// Starts charging the attached vehicle.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBattery` if no vehicle is attached.
    pub fn start_charge(&mut self) -> Result<(), StationError> {
        if self.vehicle_battery.is_none() {
            self.status = PileStatus::Free;
            return Err(StationError::InvalidBattery {
                holder: "pile",
                index: self.id,
            });
        }
        self.status = PileStatus::Charging;
        Ok(())
    }

    /// Stops charging; an attached vehicle stays connected.
    pub fn stop_charge(&mut self) {
        self.status = if self.vehicle_battery.is_some() {
            PileStatus::Connected
        } else {
            PileStatus::Free
        };
    }
}
