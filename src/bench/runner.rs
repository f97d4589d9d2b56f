//! Open-loop benchmark driver.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;

use super::arrival::ArrivalProcess;
use super::config::BenchmarkConfig;
use super::dataset::SyntheticRequest;
use super::executor::RequestExecutor;
use super::recorder::LatencyRecorder;
use super::report::BenchmarkReport;
use crate::dispatch::{build_app, AppState};
use crate::error::Result;

/// Benchmark runner that issues requests through the dispatcher
pub struct BenchmarkRunner {
    config: BenchmarkConfig,
    executor: Arc<RequestExecutor>,
    arrivals: ArrivalProcess,
}

impl BenchmarkRunner {
    pub fn new(config: BenchmarkConfig) -> Result<Self> {
        let executor = Arc::new(RequestExecutor::new(&config)?);
        let arrivals = ArrivalProcess::new(config.request_rate)?;

        Ok(Self {
            config,
            executor,
            arrivals,
        })
    }

    /// Issue every request on its own task and wait for all of them.
    ///
    /// Issuance never waits on completions; the only pause is the arrival
    /// delay between two consecutive requests.
    pub async fn run(&self, requests: Vec<SyntheticRequest>) -> BenchmarkReport {
        let recorder = Arc::new(LatencyRecorder::new());
        let mut rng = make_rng(self.config.seed);
        let total = requests.len();

        tracing::info!(
            requests = total,
            rate = %self.config.request_rate,
            "Starting benchmark run"
        );

        let start = Instant::now();
        let mut handles = Vec::with_capacity(total);

        for (i, request) in requests.into_iter().enumerate() {
            recorder.record_issued();
            let executor = self.executor.clone();
            let recorder = recorder.clone();

            handles.push(tokio::spawn(async move {
                match executor.execute(&request).await {
                    Ok(sample) => recorder.record_success(sample),
                    Err(e) => {
                        tracing::warn!(
                            request = request.index,
                            kind = e.kind(),
                            "An error occurred: {}",
                            e
                        );
                        recorder.record_dropped();
                    }
                }
            }));

            if i + 1 < total {
                let delay = self.arrivals.next_delay(&mut rng);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        // Wait for all in-flight requests to complete
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!("Request task failed: {}", e);
                recorder.record_dropped();
            }
        }

        let summary = recorder.summary(start.elapsed());
        tracing::info!(
            completed = summary.completed,
            dropped = summary.dropped,
            wall_clock_secs = summary.wall_clock_secs,
            "Benchmark run finished"
        );

        BenchmarkReport::new(
            self.config.exp_name.clone(),
            self.config.request_rate,
            summary,
            recorder.samples(),
        )
    }
}

/// Seeded when a seed is given, from entropy otherwise
pub fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Serve a dispatcher on a random local port and return its base URL
pub async fn serve_in_process(state: AppState) -> anyhow::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("http://{}", listener.local_addr()?);

    let app = build_app(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    Ok(url)
}
