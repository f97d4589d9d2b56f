use serde::{Deserialize, Serialize};

use super::bucket::NUM_BUCKETS;
use super::profiles;
use crate::error::{Result, RouterError};

/// Tokens/sec indexed by `[input_bucket][output_bucket]`
pub type ThroughputMatrix = [[f64; NUM_BUCKETS]; NUM_BUCKETS];

/// A serving instance the dispatcher can redirect to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backend {
    /// Accelerator label, e.g. "A10G"
    pub gpu_type: String,
    /// `host:port` of the backend's completion server
    pub address: String,
    /// Offline-profiled throughput per bucket pair
    pub tputs: ThroughputMatrix,
}

impl Backend {
    pub fn new(
        gpu_type: impl Into<String>,
        address: impl Into<String>,
        tputs: ThroughputMatrix,
    ) -> Self {
        Self {
            gpu_type: gpu_type.into(),
            address: address.into(),
            tputs,
        }
    }

    /// Backend using the built-in profile for its accelerator label
    pub fn from_profile(gpu_type: &str, address: impl Into<String>) -> Result<Self> {
        let tputs = profiles::lookup(gpu_type).ok_or_else(|| {
            RouterError::Configuration(format!(
                "no throughput profile for accelerator '{}' (known: {})",
                gpu_type,
                profiles::known_gpu_types().join(", ")
            ))
        })?;
        Ok(Self::new(gpu_type, address, tputs))
    }

    /// Where clients are redirected for this backend
    pub fn completions_url(&self) -> String {
        format!("http://{}/v1/completions", self.address)
    }

    /// Reject empty addresses and negative or non-finite throughputs
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(RouterError::Configuration(format!(
                "backend '{}' has an empty address",
                self.gpu_type
            )));
        }
        for (i, row) in self.tputs.iter().enumerate() {
            for (j, &tput) in row.iter().enumerate() {
                if !tput.is_finite() || tput < 0.0 {
                    return Err(RouterError::Configuration(format!(
                        "backend '{}' has invalid throughput {} at bucket ({}, {})",
                        self.gpu_type, tput, i, j
                    )));
                }
            }
        }
        Ok(())
    }
}
