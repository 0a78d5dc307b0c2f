use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::{Consumer, Device};
use crate::error::StationError;

/// Series resistance between a module and its consumer (Ω).
pub const LINE_RESISTANCE_OHM: f64 = 0.008;

/// Catalog of power-module ratings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleRating {
    #[serde(rename = "UU20kW")]
    Uu20,
    #[serde(rename = "UU30kW")]
    Uu30,
    #[serde(rename = "UU40kW")]
    Uu40,
    #[serde(rename = "UU60kW")]
    Uu60,
    #[serde(rename = "UU80kW")]
    Uu80,
}

impl ModuleRating {
    /// Power ceiling (kW).
    pub fn max_power_kw(self) -> f64 {
        match self {
            ModuleRating::Uu20 => 20.0,
            ModuleRating::Uu30 => 30.0,
            ModuleRating::Uu40 => 40.0,
            ModuleRating::Uu60 => 60.0,
            ModuleRating::Uu80 => 80.0,
        }
    }

    /// Current ceiling (A), rated at a 400 V output.
    pub fn max_current(self) -> f64 {
        self.max_power_kw() / 0.4
    }
}

impl fmt::Display for ModuleRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UU{}kW", self.max_power_kw())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    Free,
    InUse,
}

/// One power-converter unit inside a cabinet.
///
/// A module delivers current to a single consumer. Given a current
/// command and the battery voltage it settles on the operating point
/// that respects both its current and power ceilings, accounting for
/// the voltage drop across the connecting line.
#[derive(Debug, Clone)]
pub struct PowerModule {
    pub id: usize,
    pub rating: ModuleRating,
    pub line_resistance: f64,
    pub status: ModuleStatus,
    /// Consumer this module is wired to, if any.
    pub link: Option<Consumer>,
    /// Output current (A).
    pub output_current: f64,
    /// Output voltage (V).
    pub output_voltage: f64,
    /// Output power (kW); negative while returning energy to the grid.
    pub power: f64,
}

impl PowerModule {
    pub fn new(id: usize, rating: ModuleRating) -> Self {
        Self {
            id,
            rating,
            line_resistance: LINE_RESISTANCE_OHM,
            status: ModuleStatus::Free,
            link: None,
            output_current: 0.0,
            output_voltage: 0.0,
            power: 0.0,
        }
    }

    /// Solves the operating point for a current command against a battery voltage.
    ///
    /// Returns `(current, voltage, power_kw)`.
    fn operating_point(&self, current_command: f64, battery_voltage: f64) -> (f64, f64, f64) {
        let r = self.line_resistance;
        let max_power = self.rating.max_power_kw();
        let current = current_command.clamp(0.0, self.rating.max_current());
        let voltage = battery_voltage + current * r;
        let power = voltage * current / 1000.0;
        if power <= max_power {
            return (current, voltage, power);
        }

        let v = battery_voltage;
        let current = (-v + (v * v + 4.0 * r * max_power * 1000.0).sqrt()) / (2.0 * r);
        (current, max_power * 1000.0 / current, max_power)
    }

    /// Drives the module at `current_command` into a battery at `battery_voltage`.
    ///
    /// A module with no link stays idle and logs a warning.
    pub fn output_power(&mut self, current_command: f64, battery_voltage: f64) {
        if self.link.is_none() {
            tracing::warn!("module {} has no consumer, ignoring output request", self.id);
            return;
        }
        let (current, voltage, power) = self.operating_point(current_command, battery_voltage);
        self.output_current = current;
        self.output_voltage = voltage;
        self.power = power;
        self.status = ModuleStatus::InUse;
    }

    /// Same solve as [`PowerModule::output_power`] with energy flowing to the grid.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationMismatch` unless the module is linked to a rack.
    pub fn grid_interactive_output_power(
        &mut self,
        current_command: f64,
        battery_voltage: f64,
    ) -> Result<(), StationError> {
        let Some(Consumer::Rack(_)) = self.link else {
            return Err(StationError::ConfigurationMismatch(format!(
                "module {} must be linked to a rack to discharge",
                self.id
            )));
        };
        let (current, voltage, power) = self.operating_point(current_command, battery_voltage);
        self.output_current = current;
        self.output_voltage = voltage;
        self.power = -power;
        self.status = ModuleStatus::InUse;
        Ok(())
    }

    /// Resets the outputs and unlinks the module.
    pub fn stop_charge(&mut self) {
        self.output_current = 0.0;
        self.output_voltage = 0.0;
        self.power = 0.0;
        self.link = None;
        self.status = ModuleStatus::Free;
    }
}

impl Device for PowerModule {
    fn power_kw(&self) -> f64 {
        self.power
    }

    fn device_type(&self) -> &'static str {
        "PowerModule"
    }
}
