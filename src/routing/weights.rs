//! Normalised routing weights derived from backend throughputs.

use super::backend::{Backend, ThroughputMatrix};
use super::bucket::NUM_BUCKETS;
use crate::error::{Result, RouterError};

/// Per-backend weights, aligned with the registration order of the backend list
/// they were computed from.
///
/// For every bucket pair the weights over all backends sum to 1. Every cell's
/// denominator depends on the whole backend set, so the table is only ever
/// rebuilt in full.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTable {
    weights: Vec<ThroughputMatrix>,
}

impl WeightTable {
    /// `weight[b][i][j] = tput[b][i][j] / sum over b' of tput[b'][i][j]`
    pub fn compute(backends: &[Backend]) -> Result<Self> {
        if backends.is_empty() {
            return Err(RouterError::Configuration(
                "cannot compute weights for an empty backend set".to_string(),
            ));
        }

        let mut weights = vec![[[0.0; NUM_BUCKETS]; NUM_BUCKETS]; backends.len()];

        for i in 0..NUM_BUCKETS {
            for j in 0..NUM_BUCKETS {
                let aggregate: f64 = backends.iter().map(|b| b.tputs[i][j]).sum();
                if aggregate <= 0.0 || !aggregate.is_finite() {
                    return Err(RouterError::Configuration(format!(
                        "no backend has throughput for bucket ({}, {})",
                        i, j
                    )));
                }
                for (weight, backend) in weights.iter_mut().zip(backends) {
                    weight[i][j] = backend.tputs[i][j] / aggregate;
                }
            }
        }

        Ok(Self { weights })
    }

    /// Number of backends the table was computed for
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Weight of backend `backend` for the `(input_bucket, output_bucket)` cell
    pub fn weight(&self, backend: usize, input_bucket: usize, output_bucket: usize) -> f64 {
        self.weights[backend][input_bucket][output_bucket]
    }

    /// Weights of every backend for one cell, in registration order
    pub fn cell(&self, input_bucket: usize, output_bucket: usize) -> impl Iterator<Item = f64> + '_ {
        self.weights
            .iter()
            .map(move |w| w[input_bucket][output_bucket])
    }
}
