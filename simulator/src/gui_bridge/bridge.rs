use crate::generator::profile::{build_telegrams, GeneratorConfig};
use crate::gui_bridge::model::VisualizationModel;
use crate::workflow::runner::{Runner, WorkflowResult};
use anyhow::{anyhow, Result};
use dsdcore::telegram::RawSample;
use log::{error, info};
use serde_json::json;
use std::{
    net::SocketAddr,
    sync::{Arc, RwLock},
    thread,
};
use tokio::runtime::Builder;
use warp::{http::StatusCode, Filter};

pub fn gui_bind_address(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

#[derive(Debug)]
struct WarpError;

impl warp::reject::Reject for WarpError {}

type SharedModel = Arc<RwLock<VisualizationModel>>;

fn store(state: &SharedModel, source: &str, result: WorkflowResult) -> usize {
    let count = result.records.len();
    let model = VisualizationModel {
        site: source.to_string(),
        date: result.records.first().map(|r| r.start.date()),
        notes: vec![format!(
            "{} records, {} gaps",
            result.metrics.derived_records, result.metrics.gap_intervals
        )],
        records: result.records,
    };
    if let Ok(mut guard) = state.write() {
        *guard = model;
    }
    count
}

/// Bridge that hosts the HTTP endpoint plotting clients poll for records.
pub struct GuiBridge {
    state: SharedModel,
}

impl GuiBridge {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(VisualizationModel::default())),
        }
    }

    /// Starts the HTTP server on a background thread.
    ///
    /// `GET /records` returns the latest model, `POST /ingest` runs a batch of
    /// telegrams and `POST /ingest-config` runs a synthetic batch.
    pub fn serve(&self, runner: Arc<Runner>, addr: SocketAddr) {
        let state_for_filter = self.state.clone();
        let state_filter = warp::any().map(move || state_for_filter.clone());
        let runner_filter = warp::any().map(move || runner.clone());

        let get_route = warp::path("records")
            .and(warp::get())
            .and(state_filter.clone())
            .map(|state: SharedModel| match state.read() {
                Ok(guard) => warp::reply::json(&*guard),
                Err(_) => warp::reply::json(&json!({"status": "unavailable"})),
            });

        let post_route = warp::path("ingest")
            .and(warp::post())
            .and(warp::body::json())
            .and(state_filter.clone())
            .and(runner_filter.clone())
            .and_then(
                |samples: Vec<RawSample>, state: SharedModel, runner: Arc<Runner>| async move {
                    match runner.execute(samples) {
                        Ok(result) => {
                            let count = store(&state, "ingest", result);
                            Ok::<_, warp::Rejection>(warp::reply::with_status(
                                warp::reply::json(&json!({"status": "ok", "records": count})),
                                StatusCode::OK,
                            ))
                        }
                        Err(err) => {
                            error!("ingest error: {:#}", err);
                            Err(warp::reject::custom(WarpError))
                        }
                    }
                },
            );

        let generator_route = warp::path("ingest-config")
            .and(warp::post())
            .and(warp::body::json())
            .and(state_filter)
            .and(runner_filter)
            .and_then(
                |config: GeneratorConfig, state: SharedModel, runner: Arc<Runner>| async move {
                    match build_telegrams(&config, runner.calibration())
                        .and_then(|telegrams| runner.execute(telegrams))
                    {
                        Ok(result) => {
                            let count = store(&state, "synthetic", result);
                            info!("[GUI] synthetic run from {} -> {} records", config.start, count);
                            Ok::<_, warp::Rejection>(warp::reply::with_status(
                                warp::reply::json(&json!({"status": "ok", "records": count})),
                                StatusCode::OK,
                            ))
                        }
                        Err(err) => {
                            error!("ingest-config error: {:#}", err);
                            Err(warp::reject::custom(WarpError))
                        }
                    }
                },
            );

        thread::spawn(move || {
            let routes = get_route.or(post_route).or(generator_route);
            match Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime.block_on(async move {
                    warp::serve(routes).run(addr).await;
                }),
                Err(err) => error!("failed to build bridge runtime: {}", err),
            }
        });
    }

    pub fn publish(&self, model: &VisualizationModel) -> Result<()> {
        let mut guard = self
            .state
            .write()
            .map_err(|_| anyhow!("visualization state poisoned"))?;
        *guard = model.clone();
        info!(
            "[GUI] {} {:?}: {} records",
            guard.site,
            guard.date,
            guard.records.len()
        );
        Ok(())
    }

    pub fn publish_status(&self, message: &str) {
        println!("[GUI] {}", message);
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> VisualizationModel {
        self.state.read().unwrap().clone()
    }
}

impl Default for GuiBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::config::WorkflowConfig;

    #[test]
    fn gui_bridge_updates_state() {
        let runner = Runner::new(WorkflowConfig::default());
        let gui = GuiBridge::new();
        let generator = GeneratorConfig {
            minutes: 2,
            ..Default::default()
        };
        let telegrams = build_telegrams(&generator, runner.calibration()).unwrap();
        let result = runner.execute(telegrams).unwrap();
        let model = VisualizationModel {
            site: "apu04".into(),
            date: Some(generator.start.date()),
            records: result.records.clone(),
            notes: Vec::new(),
        };
        gui.publish(&model).unwrap();
        assert_eq!(gui.snapshot().records.len(), 2);

        let count = store(&gui.state, "synthetic", result);
        assert_eq!(count, 2);
        assert_eq!(gui.snapshot().site, "synthetic");
    }
}
