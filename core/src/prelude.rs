use serde::{Deserialize, Serialize};

/// Missing-data sentinel shared by aggregated and derived records.
pub const MISSING: f64 = f64::NAN;

/// Number of diameter bins (and velocity bins) reported by the instrument.
pub const BIN_COUNT: usize = 32;

/// Number of cells in a flattened drop-count matrix.
pub const MATRIX_CELLS: usize = BIN_COUNT * BIN_COUNT;

/// What the aggregator does with buckets that did not receive the expected
/// number of telegrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Emit the bucket with every field set to [`MISSING`].
    #[default]
    Fill,
    /// Drop the bucket from the output sequence.
    Omit,
    /// Aggregate whatever telegrams arrived; drop buckets that received none.
    Partial,
}

/// How the derivation engine chooses the sampling duration of an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DurationPolicy {
    /// Always use the configured interval length.
    #[default]
    Nominal,
    /// Shorten the duration by 10 s for every telegram the bucket is missing.
    ShortfallCorrected,
}

/// Shared configuration for both pipeline stages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub interval_minutes: f64,
    pub exclude_bins: Option<[usize; 2]>,
    pub missing_policy: MissingPolicy,
    pub duration_policy: DurationPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 1.0,
            exclude_bins: None,
            missing_policy: MissingPolicy::Fill,
            duration_policy: DurationPolicy::Nominal,
        }
    }
}

impl PipelineConfig {
    /// Checks the interval and bin-exclusion settings before any data is touched.
    pub fn validate(&self) -> PipelineResult<()> {
        crate::processing::bucket::AveragingInterval::from_minutes(self.interval_minutes)?;
        crate::processing::filter::BinExclusion::from_range(self.exclude_bins)?;
        Ok(())
    }
}

/// Common error type for the pipeline.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum PipelineError {
    #[error("invalid averaging interval {0} min: expected 0.5 or a whole number of minutes up to one year")]
    InvalidInterval(f64),
    #[error("invalid bin exclusion range [{0}, {1}]: expected ascending indices in 0..=31")]
    InvalidBinRange(usize, usize),
    #[error("malformed drop matrix: expected 1024 counts, found {0}")]
    MalformedMatrix(usize),
    #[error("stage not initialized")]
    NotInitialized,
}

impl PipelineError {
    /// True for the errors that come from a bad configuration rather than bad data.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PipelineError::InvalidInterval(_) | PipelineError::InvalidBinRange(..)
        )
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Trait describing the two batch stages of the pipeline.
pub trait ProcessingStage {
    type Input;
    type Output;

    fn initialize(&mut self, config: &PipelineConfig) -> PipelineResult<()>;
    fn execute(&mut self, input: Self::Input) -> PipelineResult<Self::Output>;
    fn cleanup(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_interval_and_bins() {
        let config = PipelineConfig {
            interval_minutes: 0.25,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(PipelineError::InvalidInterval(0.25)));

        for huge in [2e14, 1e18] {
            let config = PipelineConfig {
                interval_minutes: huge,
                ..Default::default()
            };
            assert_eq!(config.validate(), Err(PipelineError::InvalidInterval(huge)));
        }

        let config = PipelineConfig {
            exclude_bins: Some([5, 2]),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn policies_deserialize_from_snake_case() {
        let policy: MissingPolicy = serde_json::from_str("\"partial\"").unwrap();
        assert_eq!(policy, MissingPolicy::Partial);
        let policy: DurationPolicy = serde_json::from_str("\"shortfall_corrected\"").unwrap();
        assert_eq!(policy, DurationPolicy::ShortfallCorrected);
    }
}
