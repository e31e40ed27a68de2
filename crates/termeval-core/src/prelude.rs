//! Convenient re-exports for downstream crates.

pub use crate::calc::{
    CompactDeriv, CompactForm, PrunedPolyreps, PrunedRequest, ReuseCache, TermCalculator,
};
pub use crate::circuit::{Circuit, ElIndices, Entry, IndexMap, Label};
pub use crate::comm::{DistContext, LocalContext};
pub use crate::config::{
    CachePolicy, CostBudget, CostMetric, FailurePolicy, PruningConfig, SplitConfig, TreeConfig,
};
pub use crate::error::{Error, Result};
pub use crate::id::{Rank, SubTreeId};
pub use crate::manifest::{ManifestId, PartitionManifest, SubTreeSummary};
pub use crate::poly::{CompactPoly, MergedPolys, TapeBounds};
