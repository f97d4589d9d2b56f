//! Per-run aggregation of completed-request timings.

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Timing of one successfully completed request
#[derive(Debug, Clone, PartialEq)]
pub struct LatencySample {
    pub input_len: u32,
    /// Requested output length
    pub output_len: u32,
    /// From the backend request to end of stream
    pub latency: Duration,
    /// Gaps between consecutive chunks after the first
    pub token_latencies: Vec<Duration>,
    pub time_to_first_token: Duration,
}

/// Collects samples for a single benchmark run.
///
/// Created at run start and dropped with the run, so runs never share state.
#[derive(Default)]
pub struct LatencyRecorder {
    samples: Mutex<Vec<LatencySample>>,
    issued: AtomicU64,
    dropped: AtomicU64,
}

impl LatencyRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a request handed to an executor
    pub fn record_issued(&self) {
        self.issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, sample: LatencySample) {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sample);
    }

    /// Count a request that failed and is excluded from the statistics
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len() as u64
    }

    /// Completed samples, in completion order
    pub fn samples(&self) -> Vec<LatencySample> {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Aggregate statistics over `wall_clock`, the duration of the whole run
    pub fn summary(&self, wall_clock: Duration) -> RunSummary {
        let samples = self.samples();
        let elapsed = wall_clock.as_secs_f64();
        let completed = samples.len() as u64;

        let per_sec = |value: f64| if elapsed > 0.0 { value / elapsed } else { 0.0 };

        let mut latencies: Vec<f64> = samples.iter().map(|s| s.latency.as_secs_f64()).collect();
        latencies.sort_by(f64::total_cmp);
        let mut ttfts: Vec<f64> = samples
            .iter()
            .map(|s| s.time_to_first_token.as_secs_f64())
            .collect();
        ttfts.sort_by(f64::total_cmp);

        // Requested lengths; assumes the backend generated exactly max_tokens
        let output_tokens: u64 = samples.iter().map(|s| s.output_len as u64).sum();

        let token_latency = token_latency_stats(&samples);

        RunSummary {
            issued: self.issued(),
            completed,
            dropped: self.dropped(),
            wall_clock_secs: elapsed,
            request_throughput: per_sec(completed as f64),
            output_token_throughput: per_sec(output_tokens as f64),
            latency_avg_secs: mean(&latencies),
            latency_p50_secs: percentile(&latencies, 50.0),
            latency_p90_secs: percentile(&latencies, 90.0),
            latency_p99_secs: percentile(&latencies, 99.0),
            ttft_p50_secs: percentile(&ttfts, 50.0),
            ttft_p99_secs: percentile(&ttfts, 99.0),
            token_latency_mean_ms: token_latency.0,
            token_latency_p50_ms: token_latency.1,
            token_latency_p99_ms: token_latency.2,
        }
    }
}

/// Aggregate result of one benchmark run. Latency fields are 0 when nothing
/// completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub issued: u64,
    pub completed: u64,
    pub dropped: u64,
    pub wall_clock_secs: f64,
    pub request_throughput: f64,
    pub output_token_throughput: f64,
    pub latency_avg_secs: f64,
    pub latency_p50_secs: f64,
    pub latency_p90_secs: f64,
    pub latency_p99_secs: f64,
    pub ttft_p50_secs: f64,
    pub ttft_p99_secs: f64,
    pub token_latency_mean_ms: f64,
    pub token_latency_p50_ms: f64,
    pub token_latency_p99_ms: f64,
}

/// Percentile of ascending `sorted` with linear interpolation between the two
/// nearest ranks
pub fn percentile(sorted: &[f64], pct: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (pct.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// (mean, p50, p99) of all inter-token gaps in milliseconds
fn token_latency_stats(samples: &[LatencySample]) -> (f64, f64, f64) {
    // Microsecond resolution, up to three hours, 3 significant figures
    let Ok(mut hist) = Histogram::<u64>::new_with_bounds(1, 3 * 3600 * 1_000_000, 3) else {
        return (0.0, 0.0, 0.0);
    };

    for gap in samples.iter().flat_map(|s| &s.token_latencies) {
        hist.saturating_record((gap.as_micros() as u64).max(1));
    }

    if hist.is_empty() {
        return (0.0, 0.0, 0.0);
    }

    (
        hist.mean() / 1000.0,
        hist.value_at_quantile(0.5) as f64 / 1000.0,
        hist.value_at_quantile(0.99) as f64 / 1000.0,
    )
}
