//! Request routing across heterogeneous accelerators.
//!
//! Requests are classified into (input, output) size buckets; each backend
//! carries an offline-profiled throughput for every bucket pair, and the
//! weighted policy sends a request to a backend with probability proportional
//! to that backend's share of the cell's total throughput.

pub mod backend;
pub mod bucket;
pub mod policy;
pub mod profiles;
pub mod weights;

pub use backend::{Backend, ThroughputMatrix};
pub use bucket::{size_bucket, NUM_BUCKETS};
pub use policy::{PolicyKind, RoundRobin, RoutingPolicy, WeightedRandomBucketed};
pub use weights::WeightTable;
