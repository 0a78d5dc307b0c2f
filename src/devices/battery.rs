use serde::Serialize;

use super::tables::{BatteryProfile, BatteryType, OCV_POINTS, SOC_AXIS, TemperatureBucket};
use super::types::Device;

/// One recorded charge or discharge step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChargeSample {
    /// SOC after the step.
    pub soc: f64,
    /// Terminal voltage after the step (V).
    pub voltage: f64,
    /// Current applied during the step (A, always non-negative).
    pub current: f64,
    /// Temperature bucket in °C.
    pub temperature: i32,
    /// Tick at which the step was applied.
    pub tick: usize,
}

/// A traction battery pack moving between racks, piles and vehicles.
///
/// `Battery` is a lookup-table model: current acceptance comes from
/// per-type SOC/temperature tables and voltage from an open-circuit curve.
/// A pack is never cloned by the station; it is moved between holders.
///
/// # Power Flow Convention
/// - Positive power: charging (drawn from the modules)
/// - Negative power: discharging (returned to the grid)
#[derive(Debug)]
pub struct Battery {
    /// Serial number, unique within a run.
    pub id: usize,
    pub battery_type: BatteryType,
    /// Rated capacity in ampere-hours.
    pub capacity_ah: f64,
    /// State of charge (0.0 to 1.0).
    pub soc: f64,
    /// Lower SOC bound enforced by [`Battery::discharge`].
    pub target_min_soc: f64,
    /// Upper SOC bound enforced by [`Battery::charge`].
    pub target_max_soc: f64,
    /// Current the battery asked for at the last [`Battery::request_power`] (A).
    pub current_command: f64,
    /// Power matching `current_command` at the present voltage (kW).
    pub power_command: f64,
    /// Terminal voltage (V).
    pub voltage: f64,
    /// Current applied in the last charge/discharge step (A).
    pub current: f64,
    /// Power of the last charge/discharge step (kW, signed).
    pub power: f64,
    /// Every charge/discharge step applied to this pack, oldest first.
    pub charge_history: Vec<ChargeSample>,
    /// Tick of the first charge or discharge step.
    pub charge_start_tick: Option<usize>,
    temperature: TemperatureBucket,
    profile: &'static BatteryProfile,
}

impl Battery {
    /// Creates a battery of the given type at the given SOC, at 25 °C.
    ///
    /// # Arguments
    ///
    /// * `id` - Serial number
    /// * `battery_type` - Pack variant, selects the lookup tables
    /// * `soc` - Initial state of charge (0.0 to 1.0)
    ///
    /// # Panics
    ///
    /// Panics if `soc` is outside `[0.0, 1.0]`.
    ///
    /// # Examples
    ///
    /// ```
    /// use swap_sim::devices::{Battery, BatteryType};
    ///
    /// let battery = Battery::new(7, BatteryType::Kwh100, 0.5);
    /// assert_eq!(battery.capacity_ah, 280.0);
    /// assert!(battery.voltage > 300.0);
    /// ```
    pub fn new(id: usize, battery_type: BatteryType, soc: f64) -> Self {
        assert!((0.0..=1.0).contains(&soc), "soc must be in [0, 1]");
        let profile = battery_type.profile();
        let mut battery = Self {
            id,
            battery_type,
            capacity_ah: profile.capacity_ah,
            soc,
            target_min_soc: 0.0,
            target_max_soc: 1.0,
            current_command: 0.0,
            power_command: 0.0,
            voltage: 0.0,
            current: 0.0,
            power: 0.0,
            charge_history: Vec::new(),
            charge_start_tick: None,
            temperature: TemperatureBucket::default(),
            profile,
        };
        battery.set_voltage();
        battery
    }

    /// Temperature bucket in °C.
    pub fn temperature(&self) -> i32 {
        self.temperature.celsius()
    }

    /// Snaps `celsius` to the nearest characterised temperature.
    pub fn set_temperature(&mut self, celsius: f64) {
        self.temperature = TemperatureBucket::nearest(celsius);
    }

    /// Maximum charge current (A) at the present SOC and temperature.
    ///
    /// SOC is clamped to `[0.05, 0.95]` and the table is linearly
    /// interpolated between the bracketing breakpoints.
    pub fn current_limit(&self) -> f64 {
        let soc = self.soc.clamp(0.05, 0.95);
        let row = self.profile.current_limit_row(self.temperature);
        let Some(hi) = SOC_AXIS.iter().position(|&b| b > soc) else {
            return row[SOC_AXIS.len() - 1];
        };
        let lo = hi - 1;
        let span = SOC_AXIS[hi] - SOC_AXIS[lo];
        row[lo] + (row[hi] - row[lo]) * (soc - SOC_AXIS[lo]) / span
    }

    /// Refreshes `voltage` from the open-circuit curve.
    pub fn set_voltage(&mut self) {
        let percent = (self.soc.clamp(0.05, 1.0) * 100.0).round() as usize;
        self.voltage = self.profile.ocv_at((percent - 5).min(OCV_POINTS - 1));
    }

    /// Records how much current the pack would accept, bounded by `limit` (A).
    pub fn request_power(&mut self, limit: f64) {
        self.current_command = self.current_limit().min(limit.max(0.0));
        self.set_voltage();
        self.power_command = self.voltage * self.current_command / 1000.0;
    }

    /// Charges for one tick.
    ///
    /// # Arguments
    ///
    /// * `current` - Offered current (A); capped at [`Battery::current_limit`]
    /// * `tick` - Current tick, recorded in the history
    /// * `interval_s` - Tick length in seconds
    pub fn charge(&mut self, current: f64, tick: usize, interval_s: f64) {
        self.charge_start_tick.get_or_insert(tick);
        let current = current.clamp(0.0, self.current_limit());
        self.soc += interval_s * current / 3600.0 / self.capacity_ah;
        self.soc = self.soc.clamp(self.target_min_soc, self.target_max_soc);
        self.set_voltage();
        self.power = self.voltage * current / 1000.0;
        self.record(current, tick);
    }

    /// Discharges for one tick; reported power is negative.
    pub fn discharge(&mut self, current: f64, tick: usize, interval_s: f64) {
        self.charge_start_tick.get_or_insert(tick);
        let current = current.clamp(0.0, self.current_limit());
        self.soc -= interval_s * current / 3600.0 / self.capacity_ah;
        self.soc = self.soc.clamp(self.target_min_soc, self.target_max_soc);
        self.set_voltage();
        self.power = -self.voltage * current / 1000.0;
        self.record(current, tick);
    }

    fn record(&mut self, current: f64, tick: usize) {
        self.current = current;
        self.charge_history.push(ChargeSample {
            soc: self.soc,
            voltage: self.voltage,
            current,
            temperature: self.temperature(),
            tick,
        });
    }
}

impl Device for Battery {
    fn power_kw(&self) -> f64 {
        self.power
    }

    fn device_type(&self) -> &'static str {
        "Battery"
    }
}
