//! The polynomial-term calculator collaborator.
//!
//! The calculator derives raw polynomials from a physical model. Trees only
//! consume it through [`TermCalculator`]; the concrete implementation lives
//! with the model, outside this workspace.

use std::any::Any;
use std::collections::HashMap;

use num_complex::Complex64;

use crate::circuit::Label;
use crate::comm::DistContext;
use crate::config::PruningConfig;
use crate::error::Result;
use crate::poly::CompactPoly;

/// Process-local memo keyed by representation identity.
///
/// Owned by a tree and passed to the calculator unchanged; the tree only
/// ever clears it.
#[derive(Default)]
pub struct ReuseCache {
    slots: HashMap<String, Box<dyn Any + Send>>,
}

impl ReuseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.slots.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn insert<T: Any + Send>(&mut self, key: impl Into<String>, value: T) {
        self.slots.insert(key.into(), Box::new(value));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

impl std::fmt::Debug for ReuseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReuseCache")
            .field("len", &self.slots.len())
            .finish()
    }
}

/// A raw polynomial representation that can be flattened to tapes.
pub trait CompactForm {
    fn compact_complex(&self) -> CompactPoly;
}

impl CompactForm for CompactPoly {
    fn compact_complex(&self) -> CompactPoly {
        self.clone()
    }
}

/// Arguments of a pruned derivation for one circuit.
pub struct PrunedRequest<'a> {
    pub prep: &'a Label,
    pub elabels: &'a [Label],
    pub ops: &'a [Label],
    pub rep_cache: &'a mut ReuseCache,
    pub op_cache: &'a mut ReuseCache,
    pub comm: Option<&'a dyn DistContext>,
    pub pruning: &'a PruningConfig,
    /// Threshold used the last time this circuit was pruned, if any.
    pub current_threshold: Option<f64>,
}

/// Result of a pruned derivation for one circuit.
#[derive(Debug, Clone)]
pub struct PrunedPolyreps<R> {
    /// One raw representation per outcome label.
    pub polyreps: Vec<R>,
    pub npaths: usize,
    pub threshold: f64,
    pub target_sopm: f64,
    pub achieved_sopm: f64,
}

pub trait TermCalculator {
    type PolyRep: CompactForm;

    /// Exact compact polynomials, one per outcome label.
    fn prs_as_compact_polys(
        &self,
        prep: &Label,
        elabels: &[Label],
        ops: &[Label],
        comm: Option<&dyn DistContext>,
    ) -> Result<Vec<CompactPoly>>;

    /// Path-integral truncated to the paths above a magnitude threshold.
    fn prs_as_pruned_polyreps(
        &self,
        req: PrunedRequest<'_>,
    ) -> Result<PrunedPolyreps<Self::PolyRep>>;

    /// Per-outcome gap between the coverage achieved at `threshold` and the
    /// ideal sum of path magnitudes.
    fn circuit_pathmagnitude_gap(
        &self,
        prep: &Label,
        elabels: &[Label],
        ops: &[Label],
        rep_cache: &ReuseCache,
        op_cache: &ReuseCache,
        threshold: f64,
    ) -> Result<Vec<f64>>;
}

/// Differentiates a concatenated tape pair with respect to a parameter subset.
pub trait CompactDeriv {
    fn compact_deriv(
        &self,
        vtape: &[i64],
        ctape: &[Complex64],
        wrt_params: &[usize],
    ) -> Result<CompactPoly>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuse_cache_is_type_erased() {
        let mut c = ReuseCache::new();
        c.insert("Gx", 3usize);
        c.insert("Gy", String::from("rep"));
        assert_eq!(c.get::<usize>("Gx"), Some(&3));
        assert_eq!(c.get::<usize>("Gy"), None);
        assert!(c.contains("Gy"));
        assert_eq!(c.len(), 2);
        c.clear();
        assert!(c.is_empty());
    }
}
