//! Backend selection strategies.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::backend::Backend;
use super::bucket::size_bucket;
use super::weights::WeightTable;
use crate::error::{Result, RouterError};

/// Sizes of one request, as far as routing is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub input_len: u32,
    pub output_len: Option<u32>,
}

impl RequestDescriptor {
    pub fn new(input_len: u32, output_len: Option<u32>) -> Self {
        Self {
            input_len,
            output_len,
        }
    }
}

/// Chooses the backend a request is redirected to.
///
/// Implementations own their backend registry; it is fixed once the policy is
/// shared, so `select` never takes a lock on it.
pub trait RoutingPolicy: Send + Sync {
    /// Policy name for logs and `/stats`
    fn name(&self) -> &'static str;

    /// Registered backends, in registration order
    fn backends(&self) -> &[Backend];

    fn select(&self, request: &RequestDescriptor) -> Result<&Backend>;
}

/// Which policy the dispatcher runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PolicyKind {
    RoundRobin,
    #[default]
    WeightedRandom,
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyKind::RoundRobin => write!(f, "round_robin"),
            PolicyKind::WeightedRandom => write!(f, "weighted_random"),
        }
    }
}

impl std::str::FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "round_robin" | "rr" => Ok(PolicyKind::RoundRobin),
            "weighted_random" | "weighted" => Ok(PolicyKind::WeightedRandom),
            _ => Err(format!("Unknown routing policy: {}", s)),
        }
    }
}

impl PolicyKind {
    /// Build the policy over `backends`, failing on an unusable registry
    pub fn build(self, backends: Vec<Backend>) -> Result<Arc<dyn RoutingPolicy>> {
        Ok(match self {
            PolicyKind::RoundRobin => Arc::new(RoundRobin::new(backends)?),
            PolicyKind::WeightedRandom => Arc::new(WeightedRandomBucketed::new(backends)?),
        })
    }
}

fn validate_registry(backends: &[Backend]) -> Result<()> {
    if backends.is_empty() {
        return Err(RouterError::Configuration(
            "backend registry is empty".to_string(),
        ));
    }
    backends.iter().try_for_each(Backend::validate)
}

// ==================================================================================================
// Round robin
// ==================================================================================================

/// Cycles through the backends in registration order, ignoring request size
#[derive(Debug)]
pub struct RoundRobin {
    backends: Vec<Backend>,
    next: AtomicUsize,
}

impl RoundRobin {
    pub fn new(backends: Vec<Backend>) -> Result<Self> {
        validate_registry(&backends)?;
        Ok(Self {
            backends,
            next: AtomicUsize::new(0),
        })
    }

    /// Replace the backend set and restart the cycle at index 0
    pub fn set_backends(&mut self, backends: Vec<Backend>) -> Result<()> {
        validate_registry(&backends)?;
        self.backends = backends;
        *self.next.get_mut() = 0;
        Ok(())
    }
}

impl RoutingPolicy for RoundRobin {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn backends(&self) -> &[Backend] {
        &self.backends
    }

    fn select(&self, _request: &RequestDescriptor) -> Result<&Backend> {
        let n = self.backends.len();
        // The closure always returns Some, so both arms carry the previous index
        let idx = match self
            .next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| Some((i + 1) % n))
        {
            Ok(prev) | Err(prev) => prev,
        };
        Ok(&self.backends[idx])
    }
}

// ==================================================================================================
// Weighted random over (input, output) size buckets
// ==================================================================================================

/// Picks a backend at random, weighted by its share of the profiled
/// throughput for the request's (input, output) bucket pair
#[derive(Debug, Clone)]
pub struct WeightedRandomBucketed {
    backends: Vec<Backend>,
    table: WeightTable,
}

impl WeightedRandomBucketed {
    pub fn new(backends: Vec<Backend>) -> Result<Self> {
        validate_registry(&backends)?;
        let table = WeightTable::compute(&backends)?;
        Ok(Self { backends, table })
    }

    /// Replace the backend set and recompute every weight.
    ///
    /// On error the previous backend set and table stay in place.
    pub fn set_backends(&mut self, backends: Vec<Backend>) -> Result<()> {
        validate_registry(&backends)?;
        self.table = WeightTable::compute(&backends)?;
        self.backends = backends;
        Ok(())
    }

    pub fn weights(&self) -> &WeightTable {
        &self.table
    }

    /// Select with an explicit uniform draw `r` in `[0, 1)`
    pub fn select_with_draw(&self, request: &RequestDescriptor, r: f64) -> Result<&Backend> {
        let output_len = request.output_len.ok_or_else(|| {
            RouterError::ContractViolation(
                "weighted routing requires a requested output length (max_tokens)".to_string(),
            )
        })?;

        let i = size_bucket(request.input_len);
        let j = size_bucket(output_len);

        let mut cumulative = 0.0;
        let mut last_eligible = None;
        for (backend, weight) in self.backends.iter().zip(self.table.cell(i, j)) {
            if weight <= 0.0 {
                continue;
            }
            cumulative += weight;
            if r <= cumulative {
                return Ok(backend);
            }
            last_eligible = Some(backend);
        }

        // Rounding left the cumulative sum just short of r
        Ok(last_eligible.unwrap_or(&self.backends[self.backends.len() - 1]))
    }
}

impl RoutingPolicy for WeightedRandomBucketed {
    fn name(&self) -> &'static str {
        "weighted_random"
    }

    fn backends(&self) -> &[Backend] {
        &self.backends
    }

    fn select(&self, request: &RequestDescriptor) -> Result<&Backend> {
        let r: f64 = rand::thread_rng().gen();
        self.select_with_draw(request, r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::bucket::NUM_BUCKETS;
    use crate::routing::profiles::{LLAMA2_7B_A100, LLAMA2_7B_A10G};
    use crate::routing::ThroughputMatrix;
    use std::collections::HashMap;

    fn paper_backends() -> Vec<Backend> {
        vec![
            Backend::new("A10G", "10.0.0.1:8000", LLAMA2_7B_A10G),
            Backend::new("A100", "10.0.0.2:8000", LLAMA2_7B_A100),
        ]
    }

    fn flat(t: f64) -> ThroughputMatrix {
        [[t; NUM_BUCKETS]; NUM_BUCKETS]
    }

    #[test]
    fn test_policy_kind_parse() {
        assert_eq!(
            "round_robin".parse::<PolicyKind>().unwrap(),
            PolicyKind::RoundRobin
        );
        assert_eq!(
            "Weighted-Random".parse::<PolicyKind>().unwrap(),
            PolicyKind::WeightedRandom
        );
        assert!("jsq".parse::<PolicyKind>().is_err());
        assert_eq!(PolicyKind::RoundRobin.to_string(), "round_robin");
    }

    #[test]
    fn test_round_robin_cycles_from_zero() {
        let backends: Vec<Backend> = (0..3)
            .map(|n| Backend::new(format!("gpu{}", n), format!("10.0.0.{}:8000", n), flat(1.0)))
            .collect();
        let policy = RoundRobin::new(backends).unwrap();
        let req = RequestDescriptor::new(10, None);

        let picked: Vec<&str> = (0..6)
            .map(|_| policy.select(&req).unwrap().gpu_type.as_str())
            .collect();
        assert_eq!(picked, vec!["gpu0", "gpu1", "gpu2", "gpu0", "gpu1", "gpu2"]);
    }

    #[test]
    fn test_round_robin_concurrent_cycles_are_fair() {
        let backends: Vec<Backend> = (0..4)
            .map(|n| Backend::new(format!("gpu{}", n), format!("10.0.0.{}:8000", n), flat(1.0)))
            .collect();
        let policy = Arc::new(RoundRobin::new(backends).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let policy = policy.clone();
                std::thread::spawn(move || {
                    let req = RequestDescriptor::new(1, None);
                    (0..100)
                        .map(|_| policy.select(&req).unwrap().gpu_type.clone())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for handle in handles {
            for name in handle.join().unwrap() {
                *counts.entry(name).or_default() += 1;
            }
        }
        // 800 calls over 4 backends is exactly 200 full cycles
        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|&c| c == 200));
    }

    #[test]
    fn test_round_robin_set_backends_resets_cycle() {
        let mut policy = RoundRobin::new(paper_backends()).unwrap();
        let req = RequestDescriptor::new(1, None);
        policy.select(&req).unwrap();

        policy
            .set_backends(vec![Backend::new("A100", "10.0.0.9:8000", flat(1.0))])
            .unwrap();
        assert_eq!(policy.select(&req).unwrap().address, "10.0.0.9:8000");
        assert!(policy.set_backends(vec![]).is_err());
    }

    #[test]
    fn test_weighted_requires_output_length() {
        let policy = WeightedRandomBucketed::new(paper_backends()).unwrap();
        let err = policy
            .select(&RequestDescriptor::new(10, None))
            .unwrap_err();
        assert!(matches!(err, RouterError::ContractViolation(_)));
    }

    #[test]
    fn test_weighted_draws_for_first_cell() {
        let policy = WeightedRandomBucketed::new(paper_backends()).unwrap();
        let req = RequestDescriptor::new(10, Some(10));

        assert_eq!(policy.select_with_draw(&req, 0.2).unwrap().gpu_type, "A10G");
        assert_eq!(policy.select_with_draw(&req, 0.9).unwrap().gpu_type, "A100");
    }

    #[test]
    fn test_weighted_zero_draw_skips_zero_weight_backends() {
        let mut first = flat(1.0);
        first[0][0] = 0.0;
        let backends = vec![
            Backend::new("idle", "10.0.0.1:8000", first),
            Backend::new("busy", "10.0.0.2:8000", flat(1.0)),
        ];
        let policy = WeightedRandomBucketed::new(backends).unwrap();
        let picked = policy
            .select_with_draw(&RequestDescriptor::new(1, Some(1)), 0.0)
            .unwrap();
        assert_eq!(picked.gpu_type, "busy");
    }

    #[test]
    fn test_weighted_draw_near_one_always_selects() {
        let backends: Vec<Backend> = (0..3)
            .map(|n| Backend::new(format!("gpu{}", n), format!("10.0.0.{}:8000", n), flat(1.0)))
            .collect();
        let policy = WeightedRandomBucketed::new(backends).unwrap();
        let req = RequestDescriptor::new(300, Some(2000));

        let r = 1.0 - f64::EPSILON;
        assert_eq!(policy.select_with_draw(&req, r).unwrap().gpu_type, "gpu2");
        // A draw past the accumulated total still lands on the last backend
        assert_eq!(
            policy.select_with_draw(&req, 1.0 + 1e-9).unwrap().gpu_type,
            "gpu2"
        );
    }

    #[test]
    fn test_weighted_selection_tracks_throughput_share() {
        let backends = vec![
            Backend::new("slow", "10.0.0.1:8000", flat(1.0)),
            Backend::new("fast", "10.0.0.2:8000", flat(3.0)),
        ];
        let policy = WeightedRandomBucketed::new(backends).unwrap();
        let req = RequestDescriptor::new(50, Some(50));

        let fast = (0..20_000)
            .filter(|_| policy.select(&req).unwrap().gpu_type == "fast")
            .count();
        let share = fast as f64 / 20_000.0;
        assert!((share - 0.75).abs() < 0.02, "fast share was {}", share);
    }

    #[test]
    fn test_weighted_set_backends_keeps_old_table_on_error() {
        let mut policy = WeightedRandomBucketed::new(paper_backends()).unwrap();
        let before = policy.weights().clone();

        let err = policy
            .set_backends(vec![Backend::new("dead", "10.0.0.3:8000", flat(0.0))])
            .unwrap_err();
        assert!(matches!(err, RouterError::Configuration(_)));
        assert_eq!(policy.weights(), &before);
        assert_eq!(policy.backends().len(), 2);

        policy
            .set_backends(vec![Backend::new("A100", "10.0.0.2:8000", LLAMA2_7B_A100)])
            .unwrap();
        assert_eq!(policy.weights().len(), 1);
    }

    #[test]
    fn test_build_rejects_empty_registry() {
        assert!(PolicyKind::RoundRobin.build(vec![]).is_err());
        assert!(PolicyKind::WeightedRandom.build(vec![]).is_err());
        let policy = PolicyKind::WeightedRandom.build(paper_backends()).unwrap();
        assert_eq!(policy.name(), "weighted_random");
    }
}
