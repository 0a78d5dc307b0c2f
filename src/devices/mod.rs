//! Station hardware: batteries, power modules, cabinets, racks and piles.

/// Traction battery lookup-table model.
pub mod battery;
/// Power-module bank belonging to one rack group.
pub mod cabinet;
pub mod pile;
/// Single power-converter unit.
pub mod power_module;
pub mod rack;
/// Immutable battery characterisation tables.
pub mod tables;
pub mod types;

// Re-export the main types for convenience
pub use battery::{Battery, ChargeSample};
pub use cabinet::PowerCabinet;
pub use pile::{ChargePile, PileStatus};
pub use power_module::{ModuleRating, ModuleStatus, PowerModule};
pub use rack::{BatteryRack, RackStatus};
pub use tables::{BatteryType, TemperatureBucket};
pub use types::{Consumer, Device};
