//! TOML-based scenario configuration and preset definitions.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::devices::BatteryType;
use crate::sim::arrivals::{ArrivalSettings, PreferenceModel};
use crate::sim::event::GridInteractionWindow;
use crate::sim::profile::StationProfile;
use crate::sim::station::{RebalanceMode, StationSettings};
use crate::sim::swap_rack::DistributionPolicy;
use crate::sim::types::{SECONDS_PER_DAY, SimConfig};

/// Top-level scenario configuration parsed from TOML.
///
/// All fields have defaults matching the baseline scenario. Load from
/// TOML with [`ScenarioConfig::from_toml_file`] or use
/// [`ScenarioConfig::baseline`] for the built-in default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Simulation timing and global parameters.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Station hardware and operating policy.
    #[serde(default)]
    pub station: StationConfig,
    /// Grid-interaction window.
    #[serde(default)]
    pub grid: GridConfig,
    /// Arriving users.
    #[serde(default)]
    pub arrivals: ArrivalsConfig,
}

/// Simulation timing and global parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Tick length in seconds (must divide one day).
    pub interval_s: f64,
    /// Number of days to simulate (must be > 0).
    pub days: usize,
    /// Master random seed.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            interval_s: 10.0,
            days: 1,
            seed: 42,
        }
    }
}

/// Station hardware and operating policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StationConfig {
    /// Variant: `GEN2_530`, `GEN3_600`, `GEN3_1200`, `FY_TypeA`..`FY_TypeD` or a
    /// `User_Defined` table.
    pub profile: StationProfile,
    /// Requested charge piles, clipped by the variant.
    pub pile_count: usize,
    /// Swap duration (min); `None` uses the variant default.
    pub swap_time_min: Option<f64>,
    /// SOC at which vehicles on piles stop charging.
    pub target_soc: f64,
    /// SOC a rack battery needs to be handed out.
    pub select_soc: f64,
    pub policy: DistributionPolicy,
    pub rebalance: RebalanceMode,
    /// Rack temperature applied to stocked batteries (°C).
    pub rack_temperature_c: f64,
    /// SOC of every stocked battery.
    pub initial_soc: f64,
    /// Hand modules back from piles to racks under the station-preferred policy.
    pub reclaim_pile_modules: bool,
    /// Batteries stocked at start-up, by type key.
    pub battery_mix: BTreeMap<String, usize>,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            profile: StationProfile::Gen3Kw1200,
            pile_count: 4,
            swap_time_min: None,
            target_soc: 0.9,
            select_soc: 0.9,
            policy: DistributionPolicy::StationPreferred,
            rebalance: RebalanceMode::Off,
            rack_temperature_c: 25.0,
            initial_soc: 0.95,
            reclaim_pile_modules: false,
            battery_mix: BTreeMap::from([("100kWh".to_string(), 10), ("75kWh".to_string(), 10)]),
        }
    }
}

/// Grid-interaction window.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    /// Hour (0-23) at which the daily window opens; `None` disables grid interaction.
    pub interaction_hour: Option<u32>,
    /// Swaps per day that may discharge to the grid.
    pub max_interactions: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            interaction_hour: None,
            max_interactions: 1,
        }
    }
}

/// Arriving users.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArrivalsConfig {
    /// Members arriving per day.
    pub member_users: usize,
    /// Guests arriving per day.
    pub guest_users: usize,
    pub preference: PreferenceModel,
    /// Member swap probability for `fixed_ratio` (percent).
    pub swap_ratio_pct: u32,
    /// Outside temperature (°C).
    pub ambient_temperature_c: f64,
    /// Relative share of arriving battery types, by type key.
    pub battery_ratio: BTreeMap<String, u32>,
}

impl Default for ArrivalsConfig {
    fn default() -> Self {
        Self {
            member_users: 200,
            guest_users: 20,
            preference: PreferenceModel::FullSwap,
            swap_ratio_pct: 80,
            ambient_temperature_c: 25.0,
            battery_ratio: BTreeMap::from([("100kWh".to_string(), 1), ("75kWh".to_string(), 1)]),
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"simulation.days"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

fn stocked(key: &str, count: usize) -> BTreeMap<String, usize> {
    BTreeMap::from([(key.to_string(), count)])
}

impl ScenarioConfig {
    /// Returns the baseline scenario: GEN3 1200 kW, four piles, station-preferred.
    pub fn baseline() -> Self {
        Self::default()
    }

    /// Returns the GEN2 preset: 13 racks on 40 kW modules, no piles, slow swaps.
    pub fn gen2() -> Self {
        Self {
            station: StationConfig {
                profile: StationProfile::Gen2Kw530,
                pile_count: 0,
                swap_time_min: Some(6.5),
                battery_mix: stocked("75kWh", 13),
                ..StationConfig::default()
            },
            arrivals: ArrivalsConfig {
                member_users: 120,
                guest_users: 0,
                ..ArrivalsConfig::default()
            },
            ..Self::default()
        }
    }

    /// Returns the pile-priority preset: eight piles that take modules first.
    pub fn pile_priority() -> Self {
        Self {
            station: StationConfig {
                pile_count: 8,
                policy: DistributionPolicy::PilePreferred,
                ..StationConfig::default()
            },
            arrivals: ArrivalsConfig {
                guest_users: 60,
                preference: PreferenceModel::FixedRatio,
                swap_ratio_pct: 70,
                ..ArrivalsConfig::default()
            },
            ..Self::default()
        }
    }

    /// Returns the grid-interaction preset: GEN3 600 kW discharging at 18:00.
    pub fn grid_interaction() -> Self {
        Self {
            station: StationConfig {
                profile: StationProfile::Gen3Kw600,
                pile_count: 2,
                rebalance: RebalanceMode::AcrossRacks,
                battery_mix: stocked("100kWh", 20),
                ..StationConfig::default()
            },
            grid: GridConfig {
                interaction_hour: Some(18),
                max_interactions: 3,
            },
            arrivals: ArrivalsConfig {
                preference: PreferenceModel::Markov,
                ..ArrivalsConfig::default()
            },
            ..Self::default()
        }
    }

    /// Returns the FY type C preset: 33 racks on 40 kW modules.
    pub fn fy_type_c() -> Self {
        Self {
            station: StationConfig {
                profile: StationProfile::FyTypeC,
                pile_count: 0,
                battery_mix: BTreeMap::from([
                    ("FY41kWh".to_string(), 15),
                    ("FY62kWh".to_string(), 18),
                ]),
                ..StationConfig::default()
            },
            arrivals: ArrivalsConfig {
                member_users: 300,
                guest_users: 0,
                battery_ratio: BTreeMap::from([
                    ("FY41kWh".to_string(), 1),
                    ("FY62kWh".to_string(), 1),
                ]),
                ..ArrivalsConfig::default()
            },
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &[
        "baseline",
        "gen2",
        "pile_priority",
        "grid_interaction",
        "fy_type_c",
    ];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "gen2" => Ok(Self::gen2()),
            "pile_priority" => Ok(Self::pile_priority()),
            "grid_interaction" => Ok(Self::grid_interaction()),
            "fy_type_c" => Ok(Self::fy_type_c()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// The station variant of `station.profile`.
    pub fn station_profile(&self) -> StationProfile {
        self.station.profile
    }

    /// Simulation timing for the engine.
    ///
    /// # Panics
    ///
    /// Panics on an invalid interval or zero days; call [`ScenarioConfig::validate`] first.
    pub fn sim_config(&self) -> SimConfig {
        let s = &self.simulation;
        SimConfig::new(s.interval_s, s.days, s.seed)
    }

    /// Station operating parameters.
    ///
    /// The swap time falls back to the variant default when unset.
    pub fn station_settings(&self, profile: StationProfile) -> StationSettings {
        let st = &self.station;
        let interval_s = self.simulation.interval_s;
        StationSettings {
            interval_s,
            swap_minutes: st
                .swap_time_min
                .unwrap_or_else(|| profile.default_swap_minutes()),
            target_soc: st.target_soc,
            select_soc: st.select_soc,
            policy: st.policy,
            rebalance: st.rebalance,
            reclaim_pile_modules: st.reclaim_pile_modules,
            grid: self
                .grid
                .interaction_hour
                .map(|hour| GridInteractionWindow::new(hour, interval_s, self.grid.max_interactions)),
        }
    }

    /// Batteries to stock, in type-key order; unknown keys fall back to `100kWh`.
    pub fn battery_mix(&self) -> Vec<(BatteryType, usize)> {
        self.station
            .battery_mix
            .iter()
            .map(|(key, &count)| (BatteryType::from_key_or_default(key), count))
            .collect()
    }

    /// Arrival model parameters; arriving batteries are numbered from `first_battery_id`.
    pub fn arrival_settings(&self, first_battery_id: usize) -> ArrivalSettings {
        let a = &self.arrivals;
        ArrivalSettings {
            member_users: a.member_users,
            guest_users: a.guest_users,
            preference: a.preference,
            swap_ratio_pct: a.swap_ratio_pct,
            ambient_temperature_c: a.ambient_temperature_c,
            battery_temperature_c: self.station.rack_temperature_c,
            battery_ratio: a
                .battery_ratio
                .iter()
                .map(|(key, &weight)| (BatteryType::from_key_or_default(key), weight))
                .collect(),
            first_battery_id,
        }
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let s = &self.simulation;

        if s.interval_s <= 0.0 {
            errors.push(ConfigError::new("simulation.interval_s", "must be > 0"));
        } else if SECONDS_PER_DAY % s.interval_s != 0.0 || s.interval_s > 3600.0 {
            errors.push(ConfigError::new(
                "simulation.interval_s",
                "must divide one day and be at most 3600",
            ));
        }
        if s.days == 0 {
            errors.push(ConfigError::new("simulation.days", "must be > 0"));
        }

        let st = &self.station;
        if let Some(max) = st.profile.max_piles() {
            if st.pile_count > max {
                errors.push(ConfigError::new(
                    "station.pile_count",
                    format!("{} supports at most {max} piles", st.profile),
                ));
            }
        }
        if let StationProfile::UserDefined { module_count: 0, .. } = st.profile {
            errors.push(ConfigError::new(
                "station.profile",
                "User_Defined needs module_count > 0",
            ));
        }
        for (field, soc) in [
            ("station.target_soc", st.target_soc),
            ("station.select_soc", st.select_soc),
            ("station.initial_soc", st.initial_soc),
        ] {
            if !(0.0..=1.0).contains(&soc) {
                errors.push(ConfigError::new(field, "must be in [0.0, 1.0]"));
            }
        }
        if st.swap_time_min.is_some_and(|m| m <= 0.0) {
            errors.push(ConfigError::new("station.swap_time_min", "must be > 0"));
        }
        if st.battery_mix.values().all(|&n| n == 0) {
            errors.push(ConfigError::new(
                "station.battery_mix",
                "must stock at least one battery",
            ));
        }

        if self.grid.interaction_hour.is_some_and(|h| h > 23) {
            errors.push(ConfigError::new("grid.interaction_hour", "must be in 0..=23"));
        }

        let a = &self.arrivals;
        if a.swap_ratio_pct > 100 {
            errors.push(ConfigError::new("arrivals.swap_ratio_pct", "must be <= 100"));
        }
        if a.battery_ratio.values().all(|&w| w == 0) {
            errors.push(ConfigError::new(
                "arrivals.battery_ratio",
                "needs at least one positive weight",
            ));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::ModuleRating;

    #[test]
    fn baseline_preset_valid() {
        let cfg = ScenarioConfig::baseline();
        let errors = cfg.validate();
        assert!(errors.is_empty(), "baseline should be valid: {errors:?}");
    }

    #[test]
    fn from_preset_unknown() {
        let err = ScenarioConfig::from_preset("nonexistent").err();
        assert!(err.is_some_and(|e| e.message.contains("unknown preset")));
    }

    #[test]
    fn valid_toml_parses() {
        let toml = r#"
[simulation]
interval_s = 60.0
days = 2
seed = 99

[station]
profile = "GEN3_600"
pile_count = 2
swap_time_min = 5.0
policy = "pile-preferred"
rebalance = "across_racks"
battery_mix = { "100kWh" = 12, "70kWh" = 8 }

[grid]
interaction_hour = 18
max_interactions = 2

[arrivals]
member_users = 150
preference = "markov"
battery_ratio = { "100kWh" = 3, "70kWh" = 1 }
"#;
        let cfg = ScenarioConfig::from_toml_str(toml);
        assert!(cfg.is_ok(), "valid TOML should parse: {:?}", cfg.err());
        let cfg = cfg.ok();
        assert_eq!(cfg.as_ref().map(|c| c.simulation.days), Some(2));
        assert_eq!(
            cfg.as_ref().map(ScenarioConfig::station_profile),
            Some(StationProfile::Gen3Kw600)
        );
        assert_eq!(
            cfg.as_ref().map(|c| c.station.policy),
            Some(DistributionPolicy::PilePreferred)
        );
        assert_eq!(
            cfg.as_ref().map(|c| c.arrivals.preference),
            Some(PreferenceModel::Markov)
        );
        assert!(cfg.is_some_and(|c| c.validate().is_empty()));
    }

    #[test]
    fn invalid_toml_unknown_field() {
        let toml = r#"
[station]
profile = "GEN2_530"
bogus_field = true
"#;
        assert!(ScenarioConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let toml = r#"
[simulation]
seed = 99
"#;
        let cfg = ScenarioConfig::from_toml_str(toml).ok();
        assert_eq!(cfg.as_ref().map(|c| c.simulation.seed), Some(99));
        assert_eq!(cfg.as_ref().map(|c| c.simulation.interval_s), Some(10.0));
        assert_eq!(cfg.as_ref().map(|c| c.station.pile_count), Some(4));
    }

    #[test]
    fn validation_catches_bad_interval() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.simulation.interval_s = 7.0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "simulation.interval_s"));
    }

    #[test]
    fn validation_catches_invalid_soc() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.station.select_soc = 1.5;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "station.select_soc"));
    }

    #[test]
    fn validation_reports_every_problem() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.simulation.days = 0;
        cfg.station.pile_count = 9;
        cfg.grid.interaction_hour = Some(24);
        cfg.arrivals.swap_ratio_pct = 120;
        let fields: Vec<String> = cfg.validate().into_iter().map(|e| e.field).collect();
        for f in [
            "simulation.days",
            "station.pile_count",
            "grid.interaction_hour",
            "arrivals.swap_ratio_pct",
        ] {
            assert!(fields.iter().any(|x| x == f), "missing {f} in {fields:?}");
        }
    }

    #[test]
    fn validation_caps_piles_per_profile() {
        let mut cfg = ScenarioConfig::gen2();
        cfg.station.pile_count = 2;
        assert!(cfg.validate().iter().any(|e| e.field == "station.pile_count"));
    }

    #[test]
    fn user_defined_needs_modules() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.station.profile = StationProfile::UserDefined {
            module: ModuleRating::Uu40,
            module_count: 0,
        };
        assert!(cfg.validate().iter().any(|e| e.field == "station.profile"));
    }

    #[test]
    fn unknown_profile_fails_to_parse() {
        let toml = r#"
[station]
profile = "GEN9"
"#;
        let err = ScenarioConfig::from_toml_str(toml).err();
        assert!(err.is_some_and(|e| e.message.contains("GEN9")));
    }

    #[test]
    fn user_defined_profile_parses_from_table() {
        let toml = r#"
[station]
profile = { User_Defined = { module = "UU30kW", module_count = 12 } }
pile_count = 2
"#;
        let cfg = ScenarioConfig::from_toml_str(toml).ok();
        assert_eq!(
            cfg.as_ref().map(ScenarioConfig::station_profile),
            Some(StationProfile::UserDefined {
                module: ModuleRating::Uu30,
                module_count: 12,
            })
        );
        assert!(cfg.is_some_and(|c| c.validate().is_empty()));
    }

    #[test]
    fn empty_battery_mix_is_rejected() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.station.battery_mix.clear();
        assert!(cfg.validate().iter().any(|e| e.field == "station.battery_mix"));
    }

    #[test]
    fn unknown_battery_key_falls_back() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.station.battery_mix = BTreeMap::from([("90kWh".to_string(), 3)]);
        assert!(cfg.validate().is_empty());
        assert_eq!(cfg.battery_mix(), vec![(BatteryType::Kwh100, 3)]);
    }

    #[test]
    fn all_presets_are_valid() {
        for name in ScenarioConfig::PRESETS {
            let cfg = ScenarioConfig::from_preset(name);
            assert!(cfg.is_ok(), "preset \"{name}\" should load");
            let errors = cfg.as_ref().map(|c| c.validate()).unwrap_or_default();
            assert!(
                errors.is_empty(),
                "preset \"{name}\" should be valid: {errors:?}"
            );
        }
    }

    #[test]
    fn swap_time_defaults_to_profile() {
        let cfg = ScenarioConfig::gen2();
        let base = ScenarioConfig::baseline();
        let settings = base.station_settings(StationProfile::Gen3Kw1200);
        assert!((settings.swap_minutes - 4.5).abs() < 1e-9);
        assert!((cfg.station_settings(StationProfile::Gen2Kw530).swap_minutes - 6.5).abs() < 1e-9);
        assert!(settings.grid.is_none());
        let grid = ScenarioConfig::grid_interaction().station_settings(StationProfile::Gen3Kw600);
        assert_eq!(grid.grid.map(|w| w.max_interactions), Some(3));
    }
}
