//! Discrete-time simulator of an electric-vehicle battery-swap station.

/// TOML scenarios and built-in presets.
pub mod config;
pub mod devices;
pub mod error;
pub mod io;
/// Builds and runs scenarios.
pub mod runner;
/// Station, engine, arrivals and reporting modules.
pub mod sim;
