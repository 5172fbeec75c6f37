pub mod table;
pub mod tables;

pub use table::{CalibrationTable, SensorGeometry};
