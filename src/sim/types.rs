//! Core simulation types: run configuration and per-tick records.

use std::fmt;

use super::clock::Calendar;
use super::station::BayStatus;

/// Seconds in one simulated day.
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Centralized simulation timing.
///
/// The engine, the station and the arrival source all take their tick
/// length from here.
///
/// # Examples
///
/// ```
/// use swap_sim::sim::types::SimConfig;
///
/// let cfg = SimConfig::new(10.0, 1, 42);
/// assert_eq!(cfg.ticks_per_day(), 8640);
/// assert_eq!(cfg.total_ticks(), 8640);
/// ```
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Duration of one tick in seconds.
    pub interval_s: f64,
    /// Number of days to simulate.
    pub days: usize,
    /// Master random seed for reproducibility.
    pub seed: u64,
}

impl SimConfig {
    /// Creates a new simulation configuration.
    ///
    /// # Arguments
    ///
    /// * `interval_s` - Tick length in seconds (must be > 0)
    /// * `days` - Number of days to simulate (must be > 0)
    /// * `seed` - Master random seed
    ///
    /// # Panics
    ///
    /// Panics if `interval_s` is not positive or `days` is zero.
    pub fn new(interval_s: f64, days: usize, seed: u64) -> Self {
        assert!(interval_s > 0.0, "interval_s must be > 0");
        assert!(days > 0, "days must be > 0");
        Self {
            interval_s,
            days,
            seed,
        }
    }

    /// Day and hour arithmetic for this tick length.
    pub fn calendar(&self) -> Calendar {
        Calendar::new(self.interval_s)
    }

    pub fn ticks_per_day(&self) -> usize {
        self.calendar().ticks_per_day()
    }

    /// Total number of ticks across all days.
    pub fn total_ticks(&self) -> usize {
        self.ticks_per_day() * self.days
    }

    /// Tick length in hours.
    pub fn dt_hours(&self) -> f64 {
        self.interval_s / 3600.0
    }

    /// Minutes spanned by `ticks` ticks.
    pub fn minutes(&self, ticks: usize) -> f64 {
        ticks as f64 * self.interval_s / 60.0
    }
}

/// Complete record of one simulation tick.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Tick index.
    pub tick: usize,
    /// Simulation time in hours.
    pub time_hr: f64,
    /// Station power (kW; positive = drawing, negative = feeding the grid).
    pub power_kw: f64,
    /// Headroom against the station's nameplate power (kW).
    pub residual_kw: f64,
    /// Users waiting for a swap, after this tick's arrivals.
    pub swap_queue: usize,
    /// Users waiting for a pile, after this tick's arrivals.
    pub charge_queue: usize,
    /// Bay state after the tick.
    pub bay: BayStatus,
    /// Whether this tick discharged to the grid.
    pub grid_discharge: bool,
    /// Piles delivering current.
    pub charging_piles: usize,
    /// Rack batteries at or above the selection SOC.
    pub ready_batteries: usize,
    /// Whether a swap finished this tick.
    pub swap_completed: bool,
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:>5} ({:>6.2}h) | power={:>8.2} kW  residual={:>8.2} kW | \
             queues swap={} charge={} | bay={}{} | piles={} ready={}",
            self.tick,
            self.time_hr,
            self.power_kw,
            self.residual_kw,
            self.swap_queue,
            self.charge_queue,
            self.bay,
            if self.grid_discharge { " (grid)" } else { "" },
            self.charging_piles,
            self.ready_batteries,
        )?;
        if self.swap_completed {
            write!(f, " | swap done")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_config_basic() {
        let cfg = SimConfig::new(60.0, 1, 42);
        assert_eq!(cfg.ticks_per_day(), 1440);
        assert_eq!(cfg.seed, 42);
        assert!((cfg.dt_hours() - 1.0 / 60.0).abs() < 1e-12);
        assert!((cfg.minutes(27) - 27.0).abs() < 1e-12);
    }

    #[test]
    fn sim_config_multi_day() {
        let cfg = SimConfig::new(10.0, 3, 0);
        assert_eq!(cfg.total_ticks(), 3 * 8640);
    }

    #[test]
    #[should_panic]
    fn sim_config_zero_interval_panics() {
        SimConfig::new(0.0, 1, 0);
    }

    #[test]
    #[should_panic]
    fn sim_config_zero_days_panics() {
        SimConfig::new(10.0, 0, 0);
    }

    #[test]
    fn step_result_display_marks_grid_and_swaps() {
        let r = StepResult {
            tick: 3,
            time_hr: 0.0083,
            power_kw: -42.0,
            residual_kw: 1242.0,
            swap_queue: 2,
            charge_queue: 0,
            bay: BayStatus::InUse,
            grid_discharge: true,
            charging_piles: 1,
            ready_batteries: 7,
            swap_completed: true,
        };
        let s = format!("{r}");
        assert!(s.contains("bay=in_use (grid)"));
        assert!(s.ends_with("swap done"));
    }
}
