//! Partition manifest handed to distributed workers.
//!
//! A manifest pins down exactly how a tree was split: every worker that
//! rebuilds the same tree from the same circuits must arrive at the same
//! `tree_digest` and per-sub-tree layout.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hash::Hash256;
use crate::id::SubTreeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestId(pub Uuid);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTreeSummary {
    pub id: SubTreeId,
    /// Entries held by the sub-tree, scaffolding included.
    pub len: usize,
    pub num_final_strings: usize,
    pub num_final_els: usize,
    /// Parent final-element indices covered by this sub-tree.
    pub parent_final_els: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionManifest {
    pub id: ManifestId,

    /// Stable hash of the parent's entries and evaluation order.
    pub tree_digest: Hash256,

    pub num_final_strings: usize,
    pub num_final_els: usize,
    pub sub_trees: Vec<SubTreeSummary>,

    /// Number of communicator groups the sub-trees are meant to be spread
    /// over; `None` when the caller gave no hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_sub_tree_comms: Option<usize>,

    /// Library version string for provenance.
    pub version: String,

    /// Milliseconds since Unix epoch (UTC).
    pub created_ms: u64,
}

impl PartitionManifest {
    pub fn new(
        tree_digest: Hash256,
        num_final_strings: usize,
        num_final_els: usize,
        created_ms: u64,
    ) -> Self {
        Self {
            id: ManifestId(Uuid::new_v4()),
            tree_digest,
            num_final_strings,
            num_final_els,
            sub_trees: Vec::new(),
            num_sub_tree_comms: None,
            version: crate::VERSION.to_string(),
            created_ms,
        }
    }

    pub fn with_num_sub_tree_comms(mut self, n: usize) -> Self {
        self.num_sub_tree_comms = Some(n);
        self
    }

    pub fn with_sub_tree(mut self, summary: SubTreeSummary) -> Self {
        self.sub_trees.push(summary);
        self
    }
}
