use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDateTime;
use ndarray::Array2;

use crate::calibration::CalibrationTable;
use crate::math::matrix::MatrixHelper;
use crate::math::stats::StatsHelper;
use crate::prelude::{
    MissingPolicy, PipelineConfig, PipelineError, PipelineResult, ProcessingStage, MISSING,
};
use crate::processing::bucket::AveragingInterval;
use crate::processing::filter::{BinExclusion, ConditionalFilter};
use crate::telegram::RawSample;
use crate::telemetry::log::LogManager;

/// One fixed-cadence bucket of filtered, summed telegrams.
///
/// When the bucket is a data gap the matrix and the three ancillary fields
/// are all [`MISSING`]; `sample_count` still reports what arrived.
#[derive(Debug, Clone)]
pub struct AggregatedInterval {
    pub start: NaiveDateTime,
    pub interval: AveragingInterval,
    /// Summed drop counts indexed `[velocity, diameter]`.
    pub matrix: Array2<f64>,
    pub precip_code: f64,
    pub temperature: f64,
    pub error_code: f64,
    pub sample_count: usize,
    pub expected_count: usize,
}

impl AggregatedInterval {
    fn gap(start: NaiveDateTime, interval: AveragingInterval, sample_count: usize) -> Self {
        Self {
            start,
            interval,
            matrix: MatrixHelper::missing(),
            precip_code: MISSING,
            temperature: MISSING,
            error_code: MISSING,
            sample_count,
            expected_count: interval.expected_count(),
        }
    }

    pub fn is_missing(&self) -> bool {
        self.matrix.iter().any(|v| v.is_nan())
    }

    /// Telegrams the bucket lacks relative to a complete interval.
    pub fn shortfall(&self) -> usize {
        self.expected_count.saturating_sub(self.sample_count)
    }

    pub fn precip_code(&self) -> Option<i32> {
        (!self.precip_code.is_nan()).then_some(self.precip_code as i32)
    }
}

/// Filters and time-averages an ordered telegram sequence.
///
/// Configuration errors are returned before any sample is looked at.
pub fn aggregate(
    samples: &[RawSample],
    config: &PipelineConfig,
    calib: &CalibrationTable,
) -> PipelineResult<Vec<AggregatedInterval>> {
    let interval = AveragingInterval::from_minutes(config.interval_minutes)?;
    let exclusion = BinExclusion::from_range(config.exclude_bins)?;
    let filter = ConditionalFilter::new(calib, exclusion);

    let mut buckets: BTreeMap<NaiveDateTime, Vec<&RawSample>> = BTreeMap::new();
    for sample in samples {
        buckets
            .entry(interval.bucket_key(sample.timestamp))
            .or_default()
            .push(sample);
    }

    let (first, last) = match (buckets.keys().next(), buckets.keys().next_back()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return Ok(Vec::new()),
    };

    let expected = interval.expected_count();
    let mut intervals = Vec::new();
    for start in interval.boundaries(first, last) {
        let members = buckets.get(&start).map(Vec::as_slice).unwrap_or(&[]);
        let complete = members.len() == expected;
        match config.missing_policy {
            MissingPolicy::Fill if !complete => {
                intervals.push(AggregatedInterval::gap(start, interval, members.len()))
            }
            MissingPolicy::Omit if !complete => {}
            MissingPolicy::Partial if members.is_empty() => {}
            _ => intervals.push(summarize(start, interval, members, &filter)),
        }
    }
    Ok(intervals)
}

fn summarize(
    start: NaiveDateTime,
    interval: AveragingInterval,
    members: &[&RawSample],
    filter: &ConditionalFilter<'_>,
) -> AggregatedInterval {
    let mut matrix = MatrixHelper::zeros();
    for sample in members {
        matrix += &filter.apply(sample);
    }

    let codes: Vec<i32> = members.iter().map(|s| s.wxcode.value()).collect();
    let errors: Vec<i32> = members.iter().map(|s| s.error_code.value()).collect();
    let temperatures: Vec<f64> = members.iter().map(|s| s.temperature.value()).collect();

    AggregatedInterval {
        start,
        interval,
        matrix,
        precip_code: StatsHelper::mode(&codes).map_or(MISSING, f64::from),
        temperature: StatsHelper::mean(&temperatures),
        error_code: StatsHelper::max(&errors).map_or(MISSING, f64::from),
        sample_count: members.len(),
        expected_count: interval.expected_count(),
    }
}

/// Stage wrapper around [`aggregate`] that owns its configuration.
pub struct AggregationStage {
    calib: Arc<CalibrationTable>,
    config: Option<PipelineConfig>,
    logger: LogManager,
}

impl AggregationStage {
    pub fn new(calib: Arc<CalibrationTable>) -> Self {
        Self {
            calib,
            config: None,
            logger: LogManager::new("aggregate"),
        }
    }
}

impl ProcessingStage for AggregationStage {
    type Input = Vec<RawSample>;
    type Output = Vec<AggregatedInterval>;

    fn initialize(&mut self, config: &PipelineConfig) -> PipelineResult<()> {
        config.validate()?;
        self.config = Some(config.clone());
        Ok(())
    }

    fn execute(&mut self, input: Vec<RawSample>) -> PipelineResult<Vec<AggregatedInterval>> {
        let config = self.config.as_ref().ok_or(PipelineError::NotInitialized)?;

        let fallbacks = input.iter().filter(|s| s.has_fallback()).count();
        if fallbacks > 0 {
            self.logger.warn(&format!(
                "{} of {} telegrams carry sentinel fields",
                fallbacks,
                input.len()
            ));
        }

        let intervals = aggregate(&input, config, &self.calib)?;
        let gaps = intervals.iter().filter(|i| i.is_missing()).count();
        let short = intervals
            .iter()
            .filter(|i| !i.is_missing() && i.shortfall() > 0)
            .count();
        if short > 0 {
            self.logger
                .detail(&format!("{} intervals aggregated with missing telegrams", short));
        }
        self.logger.record(&format!(
            "{} telegrams -> {} intervals ({} gaps)",
            input.len(),
            intervals.len(),
            gaps
        ));
        Ok(intervals)
    }

    fn cleanup(&mut self) {
        self.config = None;
    }
}
