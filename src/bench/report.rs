//! Report generation for benchmark results.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use super::arrival::RequestRate;
use super::recorder::{LatencySample, RunSummary};

/// Complete result of one benchmark run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub exp_name: String,
    pub request_rate: RequestRate,
    pub summary: RunSummary,
    /// Per-request rows; kept out of the JSON export
    #[serde(skip)]
    pub samples: Vec<LatencySample>,
}

impl BenchmarkReport {
    pub fn new(
        exp_name: impl Into<String>,
        request_rate: RequestRate,
        summary: RunSummary,
        samples: Vec<LatencySample>,
    ) -> Self {
        Self {
            exp_name: exp_name.into(),
            request_rate,
            summary,
            samples,
        }
    }

    /// Print the result summary and the request latency block
    pub fn print_summary(&self) {
        let s = &self.summary;

        println!();
        println!("RESULT SUMMARY");
        println!("Request rate: {} req/s", self.request_rate);
        println!("Prompt count: {} (issued {}, dropped {})", s.completed, s.issued, s.dropped);
        println!("Total time: {:.2} s", s.wall_clock_secs);
        println!("Request Throughput: {:.2} requests/s", s.request_throughput);
        println!("Output Token Throughput: {:.2} tokens/s", s.output_token_throughput);
        println!();

        println!("REQUEST LATENCIES");
        println!("Avg: {:.2} s", s.latency_avg_secs);
        println!("50p: {:.4} s", s.latency_p50_secs);
        println!("90p: {:.4} s", s.latency_p90_secs);
        println!("99p: {:.4} s", s.latency_p99_secs);
        println!(
            "TTFT 50p/99p: {:.4} / {:.4} s",
            s.ttft_p50_secs, s.ttft_p99_secs
        );
        println!(
            "Token latency mean/50p/99p: {:.2} / {:.2} / {:.2} ms",
            s.token_latency_mean_ms, s.token_latency_p50_ms, s.token_latency_p99_ms
        );
        println!();

        println!("Easy Paste:");
        println!("{}", self.easy_paste());
    }

    /// Spreadsheet formula splitting rate, count, time, throughputs and
    /// latency percentiles into cells
    pub fn easy_paste(&self) -> String {
        let s = &self.summary;
        format!(
            "=SPLIT(\"{},{},{:.2},{},{},{},{},{}\", \",\")",
            self.request_rate,
            s.completed,
            s.wall_clock_secs,
            s.request_throughput,
            s.output_token_throughput,
            s.latency_p50_secs,
            s.latency_p90_secs,
            s.latency_p99_secs
        )
    }

    /// Export the report as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// `input_len,output_len,latency_secs` rows, one per completed request
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        for sample in &self.samples {
            let _ = writeln!(
                out,
                "{},{},{}",
                sample.input_len,
                sample.output_len,
                sample.latency.as_secs_f64()
            );
        }
        out
    }

    /// Write the per-request CSV to `<dir>/<exp_name>_<YYYYmmdd_HHMMSS>.csv`
    pub fn write_csv(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("{}_{}.csv", self.exp_name, stamp));
        std::fs::write(&path, self.to_csv())?;
        Ok(path)
    }
}
