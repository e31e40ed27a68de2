#![forbid(unsafe_code)]
//! termeval-tree: evaluation trees for term-based circuit simulation.
//!
//! Responsibilities:
//! - Hold a linear evaluation plan where circuits extend cached prefixes.
//! - Split a plan into closed, independently owned sub-trees (by size, by
//!   count, or by a cost budget) and remap caller element indices.
//! - Cache exact or path-magnitude-pruned compact polynomials per circuit
//!   and merge them into one tape buffer.
//! - Provide debug-time verification helpers.
//!
//! **No communication and no threads** here. Workers own one sub-tree each.

pub mod cache;
pub mod cost;
pub mod metrics;
pub mod pruned;
pub mod split;
pub mod subtree;
pub mod tree;
pub mod verify;

pub use cost::{entry_cost, PartitionCost};
pub use pruned::{FailedCircuit, PrunedCacheReport, SopmSweep, MAX_LISTED_FAILURES};
pub use tree::{EvalTree, PolyCacheEntry};
