//! Offline-profiled throughputs (tokens/sec) for LLaMA-2-7B.
//!
//! Rows are input-length buckets, columns output-length buckets.

use super::backend::ThroughputMatrix;

pub const LLAMA2_7B_A10G: ThroughputMatrix = [
    [33.96, 12.35, 3.98, 1.46, 0.44, 0.13],
    [25.49, 7.85, 2.99, 1.12, 0.39, 0.11],
    [11.47, 5.5, 2.15, 0.86, 0.32, 0.11],
    [6.16, 2.62, 1.32, 0.6, 0.26, 0.11],
    [3.1, 1.51, 0.77, 0.38, 0.17, 0.07],
    [1.61, 0.81, 0.42, 0.22, 0.11, 0.04],
];

pub const LLAMA2_7B_A100: ThroughputMatrix = [
    [46.7, 21.65, 10.38, 4.68, 1.7, 0.51],
    [44.48, 21.41, 9.77, 3.97, 1.57, 0.45],
    [33.7, 17.13, 7.58, 3.29, 1.28, 0.52],
    [18.59, 9.19, 4.74, 2.42, 1.04, 0.47],
    [9.85, 5.56, 3.01, 1.62, 0.73, 0.3],
    [5.22, 3.08, 1.72, 0.97, 0.48, 0.2],
];

/// Built-in profile for an accelerator label, case-insensitive
pub fn lookup(gpu_type: &str) -> Option<ThroughputMatrix> {
    match gpu_type.to_ascii_uppercase().as_str() {
        "A10G" => Some(LLAMA2_7B_A10G),
        "A100" => Some(LLAMA2_7B_A100),
        _ => None,
    }
}

/// Labels with a built-in profile
pub fn known_gpu_types() -> &'static [&'static str] {
    &["A10G", "A100"]
}
