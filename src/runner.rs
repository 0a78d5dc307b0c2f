//! Builds a stocked station and an engine from a scenario, and runs it.

use tracing::{info, warn};

use crate::config::ScenarioConfig;
use crate::devices::Battery;
use crate::sim::arrivals::SeededArrivals;
use crate::sim::engine::{Engine, ServiceRecord};
use crate::sim::kpi::KpiReport;
use crate::sim::station::SwapStation;
use crate::sim::types::{SimConfig, StepResult};

/// Everything a finished run produces.
pub struct SimulationResult {
    pub config: SimConfig,
    pub results: Vec<StepResult>,
    pub records: Vec<ServiceRecord>,
    pub kpi: KpiReport,
}

/// Builds the station of a scenario, stocks its racks and starts charging.
///
/// Batteries beyond the rack count are discarded with a warning.
pub fn build_station(cfg: &ScenarioConfig) -> SwapStation {
    let profile = cfg.station_profile();
    let settings = cfg.station_settings(profile);
    let mut station = SwapStation::new(0, profile, cfg.station.pile_count, &settings);

    let mut id = 0;
    let mut discarded = 0;
    for (battery_type, count) in cfg.battery_mix() {
        for _ in 0..count {
            let battery = Battery::new(id, battery_type, cfg.station.initial_soc);
            id += 1;
            if station.load_battery_auto(battery).is_err() {
                discarded += 1;
            }
        }
    }
    if discarded > 0 {
        warn!("{discarded} batteries did not fit into the racks of {profile}");
    }
    station.set_temperature(cfg.station.rack_temperature_c);
    station.init_charge();
    station
}

/// Builds the engine for a scenario with seeded arrivals.
///
/// Arriving batteries are numbered after the stocked ones.
///
/// # Panics
///
/// Panics on an invalid interval or zero days; validate the scenario first.
pub fn build_engine(cfg: &ScenarioConfig) -> Engine<SeededArrivals> {
    let station = build_station(cfg);
    let first_battery_id = cfg.station.battery_mix.values().sum();
    let sim_config = cfg.sim_config();
    let arrivals = SeededArrivals::new(
        cfg.arrival_settings(first_battery_id),
        sim_config.interval_s,
        sim_config.seed,
    );
    Engine::new(sim_config, station, arrivals)
}

/// Runs a validated scenario to completion and computes its KPIs.
pub fn run_scenario(cfg: &ScenarioConfig) -> SimulationResult {
    let mut engine = build_engine(cfg);
    info!(
        "running {} for {} day(s) at {} s per tick",
        cfg.station.profile, cfg.simulation.days, cfg.simulation.interval_s
    );
    let results = engine.run();
    let config = engine.config().clone();
    let records = engine.records().to_vec();
    let kpi = KpiReport::from_run(&results, &records, &config);
    SimulationResult {
        config,
        results,
        records,
        kpi,
    }
}
