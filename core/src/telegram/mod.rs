pub mod field;
pub mod sample;

pub use field::{parse_field, FieldOutcome, FIELD_SENTINEL};
pub use sample::{Phase, RawSample, FROZEN_WXCODE};
