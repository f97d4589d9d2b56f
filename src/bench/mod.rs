//! Benchmark harness for the dispatcher.
//!
//! This module provides tools for measuring end-to-end latency through the
//! redirecting dispatcher:
//! - Corpus sampling and synthetic prompts
//! - Poisson arrivals and an open-loop driver
//! - Redirect-resolving streaming executor
//! - Mock completion backend
//! - Report generation

pub mod arrival;
pub mod config;
pub mod dataset;
pub mod executor;
pub mod mock_backend;
pub mod recorder;
pub mod report;
pub mod runner;

pub use arrival::{ArrivalProcess, RequestRate};
pub use config::{BenchmarkConfig, MockBackendConfig};
pub use dataset::{Dataset, RequestLengths, SyntheticRequest};
pub use executor::RequestExecutor;
pub use mock_backend::MockBackend;
pub use recorder::{LatencyRecorder, LatencySample, RunSummary};
pub use report::BenchmarkReport;
pub use runner::{make_rng, serve_in_process, BenchmarkRunner};
