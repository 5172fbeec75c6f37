//! Drop-size distribution core for the OTT Parsivel laser disdrometer.
//!
//! Raw 10-second telegrams are filtered with a phase-specific acceptance mask
//! and averaged onto a fixed cadence, then each interval is turned into a
//! calibrated DSD with the Tokay et al. (2014) sampling-area correction.

pub mod calibration;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod telegram;
pub mod telemetry;

pub use calibration::CalibrationTable;
pub use prelude::{PipelineConfig, PipelineError, ProcessingStage};
pub use processing::{AggregatedInterval, DsdRecord};
pub use telegram::RawSample;
