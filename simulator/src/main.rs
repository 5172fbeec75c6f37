use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use clap::Parser;
use dsdcore::prelude::MissingPolicy;
use generator::profile::{build_telegrams, GeneratorConfig};
use gui_bridge::bridge::{gui_bind_address, GuiBridge};
use gui_bridge::model::VisualizationModel;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::{PipelineArgs, WorkflowConfig};
use workflow::runner::Runner;
use workflow::source::TelegramSource;

mod generator;
mod gui_bridge;
mod report;
mod workflow;

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y%m%d").map_err(|err| format!("{value}: {err}"))
}

fn parse_missing_policy(value: &str) -> Result<MissingPolicy, String> {
    match value {
        "fill" => Ok(MissingPolicy::Fill),
        "omit" => Ok(MissingPolicy::Omit),
        "partial" => Ok(MissingPolicy::Partial),
        other => Err(format!("unknown missing policy {other}: expected fill, omit or partial")),
    }
}

#[derive(Parser)]
#[command(author, version, about = "Batch driver for Parsivel drop-size distributions")]
struct Args {
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Averaging interval in minutes (0.5 or a whole number)
    #[arg(long, default_value_t = 1.0)]
    interval: f64,
    /// Inclusive diameter-bin range to force to zero, e.g. 0,1
    #[arg(long, value_delimiter = ',')]
    exclude_bins: Option<Vec<usize>>,
    /// fill, omit or partial
    #[arg(long, default_value = "fill", value_parser = parse_missing_policy)]
    missing_policy: MissingPolicy,
    /// Shorten the sampling time of partial intervals by the missing telegrams
    #[arg(long, default_value_t = false)]
    shortfall_correction: bool,
    #[arg(long, default_value = "tools/data/telegrams")]
    input_dir: PathBuf,
    #[arg(long, default_value = "tools/data/dsd")]
    output_dir: PathBuf,
    /// Site identifier, repeatable
    #[arg(long = "site")]
    sites: Vec<String>,
    /// Date as YYYYMMDD, repeatable
    #[arg(long = "date", value_parser = parse_date)]
    dates: Vec<NaiveDate>,
    /// Derive intervals across all cores
    #[arg(long, default_value_t = false)]
    parallel: bool,
    /// Stage this many minutes of synthetic telegrams per site/date before running
    #[arg(long)]
    synthetic: Option<u32>,
    /// Also write JSON reports
    #[arg(long, default_value_t = false)]
    json: bool,
    /// Keep the GUI bridge alive for plotting clients
    #[arg(long, default_value_t = false)]
    serve: bool,
    #[arg(long, default_value_t = 9000)]
    port: u16,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let workflow_config = if let Some(path) = args.workflow.as_ref() {
        WorkflowConfig::load(path)?
    } else {
        let exclude_bins = match args.exclude_bins.as_deref() {
            None => None,
            Some(&[first, last]) => Some([first, last]),
            Some(other) => return Err(anyhow!("--exclude-bins needs two values, got {:?}", other)),
        };
        let pipeline = PipelineArgs {
            interval_minutes: args.interval,
            exclude_bins,
            missing_policy: args.missing_policy,
            shortfall_correction: args.shortfall_correction,
        };
        WorkflowConfig::from_args(
            pipeline,
            args.input_dir.clone(),
            args.output_dir.clone(),
            args.sites.clone(),
            args.dates.clone(),
            args.parallel,
        )
    };

    let runner = Arc::new(Runner::new(workflow_config.clone()));
    let source = TelegramSource::new(&workflow_config.input_dir);
    let gui_bridge = GuiBridge::new();

    if let Some(minutes) = args.synthetic {
        for (seed, job) in workflow_config.jobs().into_iter().enumerate() {
            if source.path_for(&job.site, job.date).exists() {
                println!("{} {} already has telegrams, not staging synthetic data", job.site, job.date);
                continue;
            }
            let generator = GeneratorConfig::for_day(job.date, minutes, seed as u64);
            let telegrams = build_telegrams(&generator, runner.calibration())?;
            let path = source.store(&job.site, job.date, &telegrams)?;
            println!("Staged {} synthetic telegrams -> {}", telegrams.len(), path.display());
        }
    }

    let report = runner
        .run_batch(&source)
        .context("running disdrometer batch")?;

    for outcome in &report.completed {
        let metrics = &outcome.result.metrics;
        let written = report::writer::write_reports(
            &workflow_config.output_dir,
            &outcome.job.site,
            outcome.job.date,
            &outcome.result.records,
            args.json,
        )?;
        println!(
            "{} {} -> records {}, complete {}, gaps {}, sentinel telegrams {} ({})",
            outcome.job.site,
            outcome.job.date,
            metrics.derived_records,
            metrics.complete_intervals,
            metrics.gap_intervals,
            metrics.fallback_samples,
            written[0].display()
        );
    }
    for (job, reason) in &report.skipped {
        println!("{} {} skipped: {}", job.site, job.date, reason);
    }

    if let Some(last) = report.completed.last() {
        let model = VisualizationModel {
            site: last.job.site.clone(),
            date: Some(last.job.date),
            records: last.result.records.clone(),
            notes: vec![format!("{} skipped", report.skipped.len())],
        };
        gui_bridge.publish(&model)?;
    }

    if args.serve {
        gui_bridge.serve(runner.clone(), gui_bind_address(args.port));
        gui_bridge.publish_status("HTTP bridge running (Ctrl+C to stop)...");
        let runtime = TokioBuilder::new_current_thread()
            .enable_all()
            .build()
            .context("creating runtime for signal handling")?;
        runtime.block_on(async {
            signal::ctrl_c().await.context("awaiting Ctrl+C to exit")?;
            Ok::<(), anyhow::Error>(())
        })?;
    }

    Ok(())
}
