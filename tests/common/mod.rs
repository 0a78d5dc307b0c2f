//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use swap_sim::config::ScenarioConfig;
use swap_sim::devices::{Battery, BatteryType};
use swap_sim::sim::profile::StationProfile;
use swap_sim::sim::station::{StationSettings, SwapStation};

/// 100 kWh pack at 25 °C.
pub fn pack(id: usize, soc: f64) -> Battery {
    Battery::new(id, BatteryType::Kwh100, soc)
}

/// Station settings with 10 s ticks and a 4.5 min swap.
pub fn default_settings() -> StationSettings {
    StationSettings::default()
}

/// Station with its first `count` racks stocked at `soc` and charging started.
pub fn stocked_station(
    profile: StationProfile,
    piles: usize,
    count: usize,
    soc: f64,
    settings: &StationSettings,
) -> SwapStation {
    let mut station = SwapStation::new(0, profile, piles, settings);
    for id in 0..count {
        station.load_battery_auto(pack(id, soc)).ok();
    }
    station.init_charge();
    station
}

/// A preset shortened to one-minute ticks and a light arrival load.
pub fn quick_scenario(preset: &str) -> ScenarioConfig {
    let mut cfg = ScenarioConfig::from_preset(preset).unwrap_or_default();
    cfg.simulation.interval_s = 60.0;
    cfg.simulation.days = 1;
    cfg.arrivals.member_users = 60;
    cfg
}
