//! Post-hoc KPI computation from simulation results.

use std::fmt;

use serde::Serialize;

use super::arrivals::Decision;
use super::engine::ServiceRecord;
use super::types::{SimConfig, StepResult};

/// Longest arrival-to-completion time counted as a timely swap (minutes).
pub const TIMELY_SWAP_MIN: f64 = 15.0;

/// Aggregate key performance indicators derived from a complete simulation run.
///
/// Computed post-hoc from the step records and the per-user service records
/// so that reported metrics always agree with the telemetry.
#[derive(Debug, Clone, Serialize)]
pub struct KpiReport {
    /// Users who arrived during the run.
    pub arrivals: usize,
    /// Swaps that finished.
    pub swaps_served: usize,
    /// Vehicles that charged to target and left.
    pub charges_served: usize,
    /// Users who left without service.
    pub balked: usize,
    /// Mean queueing time before a swap started (min).
    pub avg_swap_wait_min: f64,
    /// Mean arrival-to-departure time of served swaps (min).
    pub avg_swap_service_min: f64,
    /// Share of swap users served within 15 minutes of arrival (%).
    ///
    /// Users still queued at the end count as not served in time.
    pub swaps_within_15_min_pct: f64,
    /// Mean arrival-to-departure time of served charges (min).
    pub avg_charge_service_min: f64,
    /// Highest station draw (kW).
    pub peak_power_kw: f64,
    /// Mean signed station power (kW).
    pub avg_power_kw: f64,
    /// Energy drawn from the grid (kWh).
    pub energy_drawn_kwh: f64,
    /// Energy returned to the grid (kWh, positive).
    pub energy_returned_kwh: f64,
    /// Ticks spent discharging to the grid.
    pub grid_discharge_ticks: usize,
    pub max_swap_queue: usize,
    pub max_charge_queue: usize,
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { 0.0 } else { sum / n as f64 }
}

impl KpiReport {
    /// Computes all KPIs from a finished run.
    ///
    /// # Arguments
    ///
    /// * `results` - Complete simulation step results
    /// * `records` - Service record of every arriving user
    /// * `config` - Timing of the run, used to convert ticks to minutes and hours
    pub fn from_run(results: &[StepResult], records: &[ServiceRecord], config: &SimConfig) -> Self {
        let dt = config.dt_hours();
        let minutes = |ticks: usize| config.minutes(ticks);

        let swaps: Vec<&ServiceRecord> = records
            .iter()
            .filter(|r| r.decision == Decision::Swap)
            .collect();
        let charges: Vec<&ServiceRecord> = records
            .iter()
            .filter(|r| r.decision == Decision::Charge)
            .collect();

        let served_swaps: Vec<&ServiceRecord> =
            swaps.iter().copied().filter(|r| r.is_served()).collect();
        let timely = served_swaps
            .iter()
            .filter_map(|r| r.service_ticks())
            .filter(|&t| minutes(t) <= TIMELY_SWAP_MIN)
            .count();
        let swaps_within_15_min_pct = if swaps.is_empty() {
            0.0
        } else {
            100.0 * timely as f64 / swaps.len() as f64
        };

        let mut peak = 0.0_f64;
        let mut drawn = 0.0;
        let mut returned = 0.0;
        let mut grid_ticks = 0;
        let mut max_swap_queue = 0;
        let mut max_charge_queue = 0;
        for r in results {
            peak = peak.max(r.power_kw);
            if r.power_kw >= 0.0 {
                drawn += r.power_kw * dt;
            } else {
                returned -= r.power_kw * dt;
            }
            if r.grid_discharge {
                grid_ticks += 1;
            }
            max_swap_queue = max_swap_queue.max(r.swap_queue);
            max_charge_queue = max_charge_queue.max(r.charge_queue);
        }

        Self {
            arrivals: records.len(),
            swaps_served: served_swaps.len(),
            charges_served: charges.iter().filter(|r| r.is_served()).count(),
            balked: records.iter().filter(|r| r.decision == Decision::Leave).count(),
            avg_swap_wait_min: mean(swaps.iter().filter_map(|r| r.wait_ticks()).map(minutes)),
            avg_swap_service_min: mean(
                served_swaps.iter().filter_map(|r| r.service_ticks()).map(minutes),
            ),
            swaps_within_15_min_pct,
            avg_charge_service_min: mean(
                charges.iter().filter_map(|r| r.service_ticks()).map(minutes),
            ),
            peak_power_kw: peak,
            avg_power_kw: mean(results.iter().map(|r| r.power_kw)),
            energy_drawn_kwh: drawn,
            energy_returned_kwh: returned,
            grid_discharge_ticks: grid_ticks,
            max_swap_queue,
            max_charge_queue,
        }
    }
}

impl fmt::Display for KpiReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- KPI Report ---")?;
        writeln!(f, "Arrivals:              {}", self.arrivals)?;
        writeln!(f, "Swaps served:          {}", self.swaps_served)?;
        writeln!(f, "Charges served:        {}", self.charges_served)?;
        writeln!(f, "Balked users:          {}", self.balked)?;
        writeln!(f, "Avg swap wait:         {:.2} min", self.avg_swap_wait_min)?;
        writeln!(f, "Avg swap service:      {:.2} min", self.avg_swap_service_min)?;
        writeln!(f, "Swaps within 15 min:   {:.1}%", self.swaps_within_15_min_pct)?;
        writeln!(f, "Avg charge service:    {:.2} min", self.avg_charge_service_min)?;
        writeln!(f, "Peak power:            {:.2} kW", self.peak_power_kw)?;
        writeln!(f, "Avg power:             {:.2} kW", self.avg_power_kw)?;
        writeln!(f, "Energy drawn:          {:.2} kWh", self.energy_drawn_kwh)?;
        writeln!(
            f,
            "Energy returned:       {:.2} kWh ({} grid ticks)",
            self.energy_returned_kwh, self.grid_discharge_ticks
        )?;
        write!(
            f,
            "Max queues:            swap {} / charge {}",
            self.max_swap_queue, self.max_charge_queue
        )
    }
}
