use crate::workflow::config::{BatchJob, WorkflowConfig};
use crate::workflow::source::TelegramSource;
use anyhow::Context;
use dsdcore::prelude::ProcessingStage;
use dsdcore::processing::{AggregationStage, DerivationStage, DsdRecord};
use dsdcore::telegram::RawSample;
use dsdcore::telemetry::{MetricsRecorder, MetricsSnapshot};
use dsdcore::CalibrationTable;
use log::{info, warn};
use std::sync::Arc;

pub struct WorkflowResult {
    pub records: Vec<DsdRecord>,
    pub metrics: MetricsSnapshot,
}

pub struct JobOutcome {
    pub job: BatchJob,
    pub result: WorkflowResult,
}

/// Outcome of a multi-site, multi-day run.
#[derive(Default)]
pub struct BatchReport {
    pub completed: Vec<JobOutcome>,
    pub skipped: Vec<(BatchJob, String)>,
}

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
    calib: Arc<CalibrationTable>,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self {
            config,
            calib: Arc::new(CalibrationTable::parsivel()),
        }
    }

    pub fn calibration(&self) -> &CalibrationTable {
        &self.calib
    }

    /// Runs both stages over one site/day of telegrams.
    pub fn execute(&self, samples: Vec<RawSample>) -> anyhow::Result<WorkflowResult> {
        let pipeline_config = self.config.to_pipeline_config();
        let metrics = MetricsRecorder::new();
        for sample in samples.iter().filter(|s| s.has_fallback()) {
            log::debug!("sentinel fields in telegram at {}", sample.timestamp);
            metrics.record_fallback();
        }

        let mut aggregation = AggregationStage::new(self.calib.clone());
        aggregation
            .initialize(&pipeline_config)
            .context("initializing aggregation stage")?;
        let intervals = aggregation
            .execute(samples)
            .context("executing aggregation stage")?;
        aggregation.cleanup();

        for interval in &intervals {
            if interval.is_missing() {
                metrics.record_gap();
            } else {
                metrics.record_complete();
            }
        }

        let mut derivation = DerivationStage::new(self.calib.clone()).with_parallel(self.config.parallel);
        derivation
            .initialize(&pipeline_config)
            .context("initializing derivation stage")?;
        let records = derivation
            .execute(intervals)
            .context("executing derivation stage")?;
        derivation.cleanup();
        metrics.record_derived(records.len());

        Ok(WorkflowResult {
            records,
            metrics: metrics.snapshot(),
        })
    }

    /// Processes every configured site/day. Days whose telegrams are missing
    /// or unreadable are reported and skipped; a bad configuration aborts.
    pub fn run_batch(&self, source: &TelegramSource) -> anyhow::Result<BatchReport> {
        self.config
            .pipeline
            .validate()
            .context("validating pipeline configuration")?;

        let mut report = BatchReport::default();
        for job in self.config.jobs() {
            let samples = match source.load(&job.site, job.date) {
                Ok(Some(samples)) => samples,
                Ok(None) => {
                    warn!("no telegrams staged for {} {}, skipping", job.site, job.date);
                    report.skipped.push((job, "no telegrams staged".to_string()));
                    continue;
                }
                Err(err) => {
                    warn!("unreadable telegrams for {} {}: {:#}", job.site, job.date, err);
                    report.skipped.push((job, format!("{:#}", err)));
                    continue;
                }
            };

            let result = self
                .execute(samples)
                .with_context(|| format!("processing {} {}", job.site, job.date))?;
            info!(
                "{} {}: {} records, {} gaps",
                job.site, job.date, result.metrics.derived_records, result.metrics.gap_intervals
            );
            report.completed.push(JobOutcome { job, result });
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::profile::{build_telegrams, GeneratorConfig};
    use chrono::NaiveDate;
    use dsdcore::prelude::PipelineConfig;
    use std::fs;

    fn config_for(dir: &std::path::Path, sites: &[&str], dates: &[NaiveDate]) -> WorkflowConfig {
        WorkflowConfig {
            input_dir: dir.to_path_buf(),
            output_dir: dir.join("out"),
            sites: sites.iter().map(|s| s.to_string()).collect(),
            dates: dates.to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn runner_executes_workflow() {
        let cfg = WorkflowConfig::default();
        let runner = Runner::new(cfg);
        let generator = GeneratorConfig {
            minutes: 5,
            ..Default::default()
        };
        let telegrams = build_telegrams(&generator, runner.calibration()).unwrap();
        let result = runner.execute(telegrams).unwrap();
        assert_eq!(result.records.len(), 5);
        assert_eq!(result.metrics.complete_intervals, 5);
        assert_eq!(result.metrics.gap_intervals, 0);
        assert!(result.records.iter().all(|r| !r.is_missing()));
    }

    #[test]
    fn batch_skips_unavailable_and_corrupt_days() {
        let dir = tempfile::tempdir().unwrap();
        let day1 = NaiveDate::from_ymd_opt(2015, 11, 12).unwrap();
        let day2 = NaiveDate::from_ymd_opt(2015, 11, 13).unwrap();
        let runner = Runner::new(config_for(dir.path(), &["apu04", "apu11"], &[day1, day2]));
        let source = TelegramSource::new(dir.path());

        let telegrams =
            build_telegrams(&GeneratorConfig::for_day(day1, 3, 1), runner.calibration()).unwrap();
        source.store("apu04", day1, &telegrams).unwrap();
        fs::write(source.path_for("apu11", day2), "not json\n").unwrap();

        let report = runner.run_batch(&source).unwrap();
        assert_eq!(report.completed.len(), 1);
        assert_eq!(report.completed[0].job.site, "apu04");
        assert_eq!(report.completed[0].result.records.len(), 3);
        assert_eq!(report.skipped.len(), 3);
    }

    #[test]
    fn batch_aborts_on_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let day = NaiveDate::from_ymd_opt(2015, 11, 12).unwrap();
        let mut cfg = config_for(dir.path(), &["apu04"], &[day]);
        cfg.pipeline = PipelineConfig {
            interval_minutes: 0.75,
            ..Default::default()
        };
        let runner = Runner::new(cfg);
        assert!(runner.run_batch(&TelegramSource::new(dir.path())).is_err());
    }
}
