//! Configuration structs for benchmarking.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::arrival::RequestRate;
use crate::dispatch::FORWARD_PATH;

/// Configuration for the mock completion backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockBackendConfig {
    /// Port to listen on (0 for random)
    pub port: u16,
    /// Delay before the first chunk in milliseconds
    pub first_token_latency_ms: u64,
    /// Delay between subsequent chunks in milliseconds
    pub token_latency_ms: u64,
    /// Error rate (0.0 to 1.0)
    pub error_rate: f64,
}

impl Default for MockBackendConfig {
    fn default() -> Self {
        Self {
            port: 0,
            first_token_latency_ms: 20,
            token_latency_ms: 5,
            error_rate: 0.0,
        }
    }
}

/// Configuration for a benchmark run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Base URL of the dispatcher
    pub dispatch_url: String,
    /// Number of requests to issue
    pub num_requests: usize,
    /// Target arrival rate
    pub request_rate: RequestRate,
    /// Model identity sent to the backend
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
    /// Whole-request timeout in seconds
    pub timeout_secs: u64,
    /// Pause between dispatch attempts that did not yield a redirect
    pub resolve_backoff_ms: u64,
    /// Prefix of the per-request CSV artifact
    pub exp_name: String,
    /// Directory the CSV artifact is written to
    pub csv_dir: PathBuf,
    /// Seed for request sampling and arrival draws
    pub seed: Option<u64>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            dispatch_url: "http://127.0.0.1:8000".to_string(),
            num_requests: 100,
            request_rate: RequestRate::Finite(10.0),
            model: "meta-llama/Llama-2-7b-hf".to_string(),
            temperature: 0.0,
            top_p: 1.0,
            timeout_secs: 3 * 3600,
            resolve_backoff_ms: 100,
            exp_name: "testing-exp".to_string(),
            csv_dir: PathBuf::from("csv"),
            seed: None,
        }
    }
}

impl BenchmarkConfig {
    /// Full URL of the dispatcher's forward endpoint
    pub fn forward_url(&self) -> String {
        format!("{}{}", self.dispatch_url.trim_end_matches('/'), FORWARD_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_url() {
        let config = BenchmarkConfig {
            dispatch_url: "http://10.0.0.5:8000/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.forward_url(), "http://10.0.0.5:8000/forward");
    }

    #[test]
    fn test_defaults_match_long_running_client() {
        let config = BenchmarkConfig::default();
        assert_eq!(config.timeout_secs, 10_800);
        assert_eq!(config.resolve_backoff_ms, 100);
    }
}
