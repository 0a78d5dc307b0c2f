/// Arriving users and their service preferences.
pub mod arrivals;
/// Simulation clock for tick management.
pub mod clock;
pub mod engine;
/// Grid-interaction window definitions.
pub mod event;
pub mod kpi;
/// Station variant catalog.
pub mod profile;
pub mod station;
/// Rack groups and power-module distribution.
pub mod swap_rack;
pub mod types;
