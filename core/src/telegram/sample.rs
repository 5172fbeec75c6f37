use chrono::NaiveDateTime;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::prelude::{PipelineError, PipelineResult, BIN_COUNT, MATRIX_CELLS};
use crate::telegram::field::{parse_field, FieldOutcome, FIELD_SENTINEL};

/// wxcode values at or above this threshold denote frozen or mixed precipitation.
pub const FROZEN_WXCODE: i32 = 66;

/// Precipitation phase used to pick the acceptance mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Liquid,
    Frozen,
}

impl Phase {
    pub fn classify(wxcode: i32) -> Self {
        if wxcode < FROZEN_WXCODE {
            Phase::Liquid
        } else {
            Phase::Frozen
        }
    }
}

/// One 10-second instrument telegram.
///
/// `counts` is the drop-count matrix flattened velocity-major: the count for
/// velocity bin `v` and diameter bin `d` sits at `v * 32 + d`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SampleWire", into = "SampleWire")]
pub struct RawSample {
    pub timestamp: NaiveDateTime,
    pub wxcode: FieldOutcome<i32>,
    pub temperature: FieldOutcome<f64>,
    pub error_code: FieldOutcome<i32>,
    counts: Array2<u32>,
}

impl RawSample {
    pub fn new(
        timestamp: NaiveDateTime,
        wxcode: FieldOutcome<i32>,
        temperature: FieldOutcome<f64>,
        error_code: FieldOutcome<i32>,
        counts: Vec<u32>,
    ) -> PipelineResult<Self> {
        let len = counts.len();
        let counts = Array2::from_shape_vec((BIN_COUNT, BIN_COUNT), counts)
            .map_err(|_| PipelineError::MalformedMatrix(len))?;
        Ok(Self {
            timestamp,
            wxcode,
            temperature,
            error_code,
            counts,
        })
    }

    /// Builds a sample from the textual ancillary fields of a telegram,
    /// substituting the sentinel for any field that does not parse.
    pub fn from_text_fields(
        timestamp: NaiveDateTime,
        wxcode: &str,
        temperature: &str,
        error_code: &str,
        counts: Vec<u32>,
    ) -> PipelineResult<Self> {
        Self::new(
            timestamp,
            parse_field(wxcode, FIELD_SENTINEL),
            parse_field(temperature, f64::from(FIELD_SENTINEL)),
            parse_field(error_code, FIELD_SENTINEL),
            counts,
        )
    }

    /// Drop counts indexed `[velocity, diameter]`.
    pub fn counts(&self) -> ArrayView2<'_, u32> {
        self.counts.view()
    }

    pub fn phase(&self) -> Phase {
        Phase::classify(self.wxcode.value())
    }

    pub fn total_drops(&self) -> u64 {
        self.counts.iter().map(|&c| u64::from(c)).sum()
    }

    pub fn has_fallback(&self) -> bool {
        self.wxcode.is_fallback() || self.temperature.is_fallback() || self.error_code.is_fallback()
    }
}

/// Serialized form of [`RawSample`], with the matrix as a flat list.
#[derive(Serialize, Deserialize)]
struct SampleWire {
    timestamp: NaiveDateTime,
    wxcode: FieldOutcome<i32>,
    temperature: FieldOutcome<f64>,
    error_code: FieldOutcome<i32>,
    counts: Vec<u32>,
}

impl TryFrom<SampleWire> for RawSample {
    type Error = PipelineError;

    fn try_from(wire: SampleWire) -> Result<Self, Self::Error> {
        RawSample::new(
            wire.timestamp,
            wire.wxcode,
            wire.temperature,
            wire.error_code,
            wire.counts,
        )
    }
}

impl From<RawSample> for SampleWire {
    fn from(sample: RawSample) -> Self {
        let counts: Vec<u32> = sample.counts.iter().copied().collect();
        debug_assert_eq!(counts.len(), MATRIX_CELLS);
        SampleWire {
            timestamp: sample.timestamp,
            wxcode: sample.wxcode,
            temperature: sample.temperature,
            error_code: sample.error_code,
            counts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn timestamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2015, 11, 12)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    #[test]
    fn counts_are_velocity_major() {
        let mut counts = vec![0; MATRIX_CELLS];
        counts[16 * 32 + 5] = 3;
        let sample = RawSample::new(
            timestamp(),
            FieldOutcome::Parsed(61),
            FieldOutcome::Parsed(4.5),
            FieldOutcome::Parsed(0),
            counts,
        )
        .unwrap();
        assert_eq!(sample.counts()[[16, 5]], 3);
        assert_eq!(sample.total_drops(), 3);
        assert_eq!(sample.phase(), Phase::Liquid);
    }

    #[test]
    fn short_matrix_is_rejected() {
        let err = RawSample::new(
            timestamp(),
            FieldOutcome::Parsed(61),
            FieldOutcome::Parsed(4.5),
            FieldOutcome::Parsed(0),
            vec![0; 1000],
        )
        .unwrap_err();
        assert_eq!(err, PipelineError::MalformedMatrix(1000));
    }

    #[test]
    fn sentinel_wxcode_is_still_classified() {
        let sample =
            RawSample::from_text_fields(timestamp(), "??", "3.0", "0", vec![0; MATRIX_CELLS])
                .unwrap();
        assert!(sample.has_fallback());
        assert_eq!(sample.wxcode.value(), FIELD_SENTINEL);
        assert_eq!(sample.phase(), Phase::Liquid);
        assert_eq!(Phase::classify(66), Phase::Frozen);
        assert_eq!(Phase::classify(65), Phase::Liquid);
    }

    #[test]
    fn json_round_trip_keeps_fallback_marker() {
        let sample =
            RawSample::from_text_fields(timestamp(), "71", "bad", "0", vec![1; MATRIX_CELLS])
                .unwrap();
        let json = serde_json::to_string(&sample).unwrap();
        let back: RawSample = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample);
        assert!(back.temperature.is_fallback());

        let truncated = json.replacen("[1,", "[", 1);
        assert!(serde_json::from_str::<RawSample>(&truncated).is_err());
    }
}
