use std::fmt;

use serde::Serialize;

use super::battery::Battery;
use crate::error::{Rejected, StationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RackStatus {
    Free,
    Loaded,
    Charging,
    Discharging,
}

impl fmt::Display for RackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RackStatus::Free => "free",
            RackStatus::Loaded => "loaded",
            RackStatus::Charging => "charging",
            RackStatus::Discharging => "discharging",
        };
        f.write_str(s)
    }
}

/// One internal storage and charging slot.
///
/// The rack owns its battery while loaded. Moving a battery out of a
/// rack always goes through [`BatteryRack::remove`] or
/// [`BatteryRack::exchange`], so the pack never has two holders.
#[derive(Debug)]
pub struct BatteryRack {
    pub id: usize,
    status: RackStatus,
    plugged: bool,
    battery: Option<Battery>,
}

impl BatteryRack {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            status: RackStatus::Free,
            plugged: false,
            battery: None,
        }
    }

    pub fn status(&self) -> RackStatus {
        self.status
    }

    /// Whether the charging connector is engaged.
    pub fn is_plugged(&self) -> bool {
        self.plugged
    }

    pub fn battery(&self) -> Option<&Battery> {
        self.battery.as_ref()
    }

    pub fn battery_mut(&mut self) -> Option<&mut Battery> {
        self.battery.as_mut()
    }

    pub fn is_free(&self) -> bool {
        self.battery.is_none()
    }

    /// SOC of the held battery.
    pub fn soc(&self) -> Option<f64> {
        self.battery.as_ref().map(|b| b.soc)
    }

    /// Inserts a battery into an empty rack and returns the rack index.
    ///
    /// # Errors
    ///
    /// Hands the battery back if the rack is occupied.
    pub fn load(&mut self, battery: Battery) -> Result<usize, Rejected> {
        if self.battery.is_some() {
            return Err(Rejected::new(
                StationError::IllegalStateTransition {
                    component: "rack",
                    operation: "load a battery",
                    state: self.status.to_string(),
                },
                battery,
            ));
        }
        self.battery = Some(battery);
        self.status = RackStatus::Loaded;
        Ok(self.id)
    }

    /// Takes the battery out, unplugging first. `None` if the rack was empty.
    pub fn remove(&mut self) -> Option<Battery> {
        self.plug_out();
        self.status = RackStatus::Free;
        let battery = self.battery.take();
        if battery.is_none() {
            tracing::warn!("rack {} is empty, nothing to remove", self.id);
        }
        battery
    }

    /// Replaces the held battery with `battery`, returning the previous one.
    ///
    /// The plug and status are left alone.
    ///
    /// # Errors
    ///
    /// Hands the battery back if the rack is empty.
    pub fn exchange(&mut self, battery: Battery) -> Result<Battery, Rejected> {
        match self.battery.take() {
            Some(previous) => {
                self.battery = Some(battery);
                Ok(previous)
            }
            None => Err(Rejected::new(
                StationError::InvalidBattery {
                    holder: "rack",
                    index: self.id,
                },
                battery,
            )),
        }
    }

    /// Trades batteries with `other`, either of which may be empty.
    ///
    /// Both racks are unplugged first and end up loaded or free.
    pub fn swap_battery_with(&mut self, other: &mut BatteryRack) {
        self.plug_out();
        other.plug_out();
        std::mem::swap(&mut self.battery, &mut other.battery);
        self.plug_out();
        other.plug_out();
    }

    /// Plugs in and starts charging.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBattery` if the rack is empty.
    pub fn start_charge(&mut self) -> Result<(), StationError> {
        self.plug_in(RackStatus::Charging)
    }

    /// Plugs in and starts returning energy to the grid.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBattery` if the rack is empty.
    pub fn start_discharge(&mut self) -> Result<(), StationError> {
        self.plug_in(RackStatus::Discharging)
    }

    /// Unplugs, keeping the battery.
    pub fn stop_charge(&mut self) {
        self.plug_out();
    }

    fn plug_in(&mut self, status: RackStatus) -> Result<(), StationError> {
        if self.battery.is_none() {
            return Err(StationError::InvalidBattery {
                holder: "rack",
                index: self.id,
            });
        }
        self.plugged = true;
        self.status = status;
        Ok(())
    }

    /// Disengages the connector; the rack drops back to loaded or free.
    pub fn plug_out(&mut self) {
        self.plugged = false;
        self.status = if self.battery.is_some() {
            RackStatus::Loaded
        } else {
            RackStatus::Free
        };
    }
}
