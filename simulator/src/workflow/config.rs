use anyhow::Context;
use chrono::NaiveDate;
use dsdcore::prelude::{DurationPolicy, MissingPolicy, PipelineConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// One site/date combination processed by a batch run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchJob {
    pub site: String,
    pub date: NaiveDate,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub pipeline: PipelineConfig,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub sites: Vec<String>,
    pub dates: Vec<NaiveDate>,
    pub parallel: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            input_dir: PathBuf::from("tools/data/telegrams"),
            output_dir: PathBuf::from("tools/data/dsd"),
            sites: Vec::new(),
            dates: Vec::new(),
            parallel: false,
        }
    }
}

/// Pipeline-related command-line settings.
#[derive(Clone, Debug)]
pub struct PipelineArgs {
    pub interval_minutes: f64,
    pub exclude_bins: Option<[usize; 2]>,
    pub missing_policy: MissingPolicy,
    pub shortfall_correction: bool,
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(
        pipeline: PipelineArgs,
        input_dir: PathBuf,
        output_dir: PathBuf,
        sites: Vec<String>,
        dates: Vec<NaiveDate>,
        parallel: bool,
    ) -> Self {
        let duration_policy = if pipeline.shortfall_correction {
            DurationPolicy::ShortfallCorrected
        } else {
            DurationPolicy::Nominal
        };
        Self {
            pipeline: PipelineConfig {
                interval_minutes: pipeline.interval_minutes,
                exclude_bins: pipeline.exclude_bins,
                missing_policy: pipeline.missing_policy,
                duration_policy,
            },
            input_dir,
            output_dir,
            sites,
            dates,
            parallel,
        }
    }

    pub fn to_pipeline_config(&self) -> PipelineConfig {
        self.pipeline.clone()
    }

    /// Every site/date pair, dates in ascending order within each site.
    pub fn jobs(&self) -> Vec<BatchJob> {
        let mut dates = self.dates.clone();
        dates.sort();
        dates.dedup();
        self.sites
            .iter()
            .flat_map(|site| {
                dates.iter().map(move |&date| BatchJob {
                    site: site.clone(),
                    date,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn config_from_args_produces_pipeline_config() {
        let args = PipelineArgs {
            interval_minutes: 5.0,
            exclude_bins: Some([0, 1]),
            missing_policy: MissingPolicy::Omit,
            shortfall_correction: true,
        };
        let cfg = WorkflowConfig::from_args(
            args,
            PathBuf::from("in"),
            PathBuf::from("out"),
            vec!["apu04".into()],
            vec![NaiveDate::from_ymd_opt(2015, 11, 12).unwrap()],
            true,
        );
        let pipeline = cfg.to_pipeline_config();
        assert_eq!(pipeline.interval_minutes, 5.0);
        assert_eq!(pipeline.duration_policy, DurationPolicy::ShortfallCorrected);
        assert_eq!(cfg.jobs().len(), 1);
    }

    #[test]
    fn config_load_reads_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"pipeline:\n  interval_minutes: 2\n  exclude_bins: [0, 1]\n  missing_policy: omit\n\
input_dir: staged\nsites: [apu04, apu11]\ndates: [2015-11-13, 2015-11-12]\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let cfg = WorkflowConfig::load(&path).unwrap();
        assert_eq!(cfg.pipeline.interval_minutes, 2.0);
        assert_eq!(cfg.pipeline.exclude_bins, Some([0, 1]));
        assert_eq!(cfg.pipeline.missing_policy, MissingPolicy::Omit);
        assert_eq!(cfg.pipeline.duration_policy, DurationPolicy::Nominal);
        assert_eq!(cfg.input_dir, PathBuf::from("staged"));

        let jobs = cfg.jobs();
        assert_eq!(jobs.len(), 4);
        assert_eq!(jobs[0].site, "apu04");
        assert_eq!(jobs[0].date, NaiveDate::from_ymd_opt(2015, 11, 12).unwrap());
    }
}
