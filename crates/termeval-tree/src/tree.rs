//! The evaluation tree: a fixed-size entry array plus the metadata that maps
//! entries to circuits, outcome labels, and (for sub-trees) parent indices.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use termeval_core::calc::ReuseCache;
use termeval_core::circuit::{Circuit, Entry, IndexMap, Label};
use termeval_core::error::{Error, Result};
use termeval_core::hash::hash_serde;
use termeval_core::id::SubTreeId;
use termeval_core::manifest::{PartitionManifest, SubTreeSummary};
use termeval_core::poly::{CompactPoly, MergedPolys};

/// Cached polynomials of one circuit: one compact polynomial per final
/// element, plus the path-magnitude threshold they were pruned at (`None`
/// for exact polynomials).
#[derive(Debug, Clone, PartialEq)]
pub struct PolyCacheEntry {
    pub threshold: Option<f64>,
    pub polys: Vec<CompactPoly>,
}

#[derive(Debug, Default)]
pub struct EvalTree {
    pub(crate) entries: Vec<Entry>,
    pub(crate) eval_order: Vec<usize>,
    pub(crate) num_final_strs: usize,
    pub(crate) cache_size: usize,

    /// Distinct operation labels of the final circuits (preparation excluded).
    pub(crate) op_labels: Vec<Label>,
    /// Outcome labels of each final circuit.
    pub(crate) elabels: Vec<Vec<Label>>,
    pub(crate) num_final_els: usize,

    // Set only on trees produced by `split`.
    pub(crate) parent_index_map: Option<Vec<usize>>,
    pub(crate) final_to_parent_final: Option<IndexMap>,
    pub(crate) final_els_to_parent_final_els: Option<Vec<usize>>,

    /// Original circuit index -> current slot, once splitting has permuted slots.
    pub(crate) original_index_lookup: Option<BTreeMap<usize, usize>>,
    pub(crate) sub_trees: Vec<EvalTree>,
    /// Communicator groups the caller plans to spread sub-trees over.
    pub(crate) num_sub_tree_comms: Option<usize>,

    pub(crate) poly_cache: HashMap<Circuit, PolyCacheEntry>,
    pub(crate) merged: Option<MergedPolys>,
    pub(crate) rep_cache: ReuseCache,
    pub(crate) op_cache: ReuseCache,
}

impl EvalTree {
    /// An empty tree; call [`EvalTree::initialize`] before use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and initialize a tree in one step.
    pub fn from_circuits(circuits: Vec<(Circuit, Vec<Label>)>) -> Result<Self> {
        let mut tree = Self::new();
        tree.initialize(circuits)?;
        Ok(tree)
    }

    /// Initialize from `(circuit, outcome labels)` pairs.
    ///
    /// Circuits must be pairwise distinct. Every entry builds its circuit from
    /// scratch and the evaluation order is the identity.
    pub fn initialize(&mut self, circuits: Vec<(Circuit, Vec<Label>)>) -> Result<()> {
        let mut seen = HashSet::with_capacity(circuits.len());
        for (c, _) in &circuits {
            if !seen.insert(c) {
                return Err(Error::Usage(format!("duplicate circuit {c}")));
            }
        }

        let (circuit_list, elabels): (Vec<Circuit>, Vec<Vec<Label>>) = circuits.into_iter().unzip();
        let entries = circuit_list.iter().map(Entry::standalone).collect();
        let eval_order = (0..circuit_list.len()).collect();
        self.install(&circuit_list, elabels, entries, eval_order, 0)
    }

    /// Adopt entries produced by an upstream prefix-reuse planner.
    ///
    /// The first `circuits.len()` slots are the final circuits, in caller
    /// order; any further slots are scaffolding. Replaying `eval_order` must
    /// rebuild exactly `circuits`.
    pub fn from_entries(
        circuits: Vec<(Circuit, Vec<Label>)>,
        entries: Vec<Entry>,
        eval_order: Vec<usize>,
    ) -> Result<Self> {
        if entries.len() < circuits.len() {
            return Err(Error::Usage(format!(
                "{} entries cannot hold {} circuits",
                entries.len(),
                circuits.len()
            )));
        }
        let mut seen = vec![false; entries.len()];
        for &i in &eval_order {
            match seen.get_mut(i) {
                Some(s) if !*s => *s = true,
                _ => {
                    return Err(Error::Usage(format!(
                        "evaluation order is not a permutation (slot {i})"
                    )))
                }
            }
        }
        if eval_order.len() != entries.len() {
            return Err(Error::Usage(
                "evaluation order does not visit every entry".into(),
            ));
        }

        let cache_size = entries
            .iter()
            .filter_map(|e| e.cache_slot)
            .collect::<BTreeSet<_>>()
            .len();
        let (circuit_list, elabels): (Vec<Circuit>, Vec<Vec<Label>>) = circuits.into_iter().unzip();
        let mut tree = Self::new();
        tree.install(&circuit_list, elabels, entries, eval_order, cache_size)?;
        Ok(tree)
    }

    fn install(
        &mut self,
        circuit_list: &[Circuit],
        elabels: Vec<Vec<Label>>,
        entries: Vec<Entry>,
        eval_order: Vec<usize>,
        cache_size: usize,
    ) -> Result<()> {
        self.entries = entries;
        self.eval_order = eval_order;
        self.num_final_strs = circuit_list.len();
        self.cache_size = cache_size;
        self.num_final_els = elabels.iter().map(Vec::len).sum();
        self.elabels = elabels;
        self.op_labels = collect_op_labels(circuit_list);

        self.parent_index_map = None;
        self.final_to_parent_final = None;
        self.final_els_to_parent_final_els = None;
        self.original_index_lookup = None;
        self.sub_trees.clear();
        self.clear_caches();

        if self.generate_circuit_list(true)? != circuit_list {
            return Err(Error::Invariant(
                "evaluation order does not reproduce the circuit list".into(),
            ));
        }
        Ok(())
    }

    /// Replay the evaluation order and return the circuit built at each slot.
    pub(crate) fn slot_circuits(&self) -> Result<Vec<Circuit>> {
        let mut cache: HashMap<usize, Circuit> = HashMap::with_capacity(self.cache_size);
        let mut slots: Vec<Option<Circuit>> = vec![None; self.entries.len()];

        for &i in &self.eval_order {
            let entry = &self.entries[i];
            let circuit = match entry.start {
                None => Circuit::new(entry.remainder.clone()),
                Some(s) => cache
                    .get(&s)
                    .ok_or_else(|| {
                        Error::Invariant(format!(
                            "slot {i} extends cache slot {s} before it is populated"
                        ))
                    })?
                    .extended(&entry.remainder),
            };
            if let Some(slot) = entry.cache_slot {
                cache.insert(slot, circuit.clone());
            }
            slots[i] = Some(circuit);
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(i, c)| c.ok_or_else(|| Error::Invariant(format!("slot {i} never evaluated"))))
            .collect()
    }

    /// The final circuits this tree evaluates.
    ///
    /// With `permute` the list is in the order originally passed to
    /// `initialize`; without it, in the tree's current slot order.
    pub fn generate_circuit_list(&self, permute: bool) -> Result<Vec<Circuit>> {
        let mut slots = self.slot_circuits()?;
        slots.truncate(self.num_final_strs);

        match (&self.original_index_lookup, permute) {
            (Some(lookup), true) => {
                let mut finals: Vec<Option<Circuit>> = vec![None; self.num_final_strs];
                for (&iorig, &icur) in lookup {
                    if iorig < self.num_final_strs {
                        finals[iorig] = slots.get(icur).cloned();
                    }
                }
                finals
                    .into_iter()
                    .enumerate()
                    .map(|(i, c)| {
                        c.ok_or_else(|| {
                            Error::Invariant(format!("original circuit {i} has no slot"))
                        })
                    })
                    .collect()
            }
            _ => Ok(slots),
        }
    }

    /// Number of distinct reusable prefix slots in use.
    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn num_final_strings(&self) -> usize {
        self.num_final_strs
    }

    pub fn num_final_els(&self) -> usize {
        self.num_final_els
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn evaluation_order(&self) -> &[usize] {
        &self.eval_order
    }

    pub fn op_labels(&self) -> &[Label] {
        &self.op_labels
    }

    /// Outcome labels per final circuit, in current slot order.
    pub fn outcome_labels(&self) -> &[Vec<Label>] {
        &self.elabels
    }

    pub fn num_outcomes(&self) -> Vec<usize> {
        self.elabels.iter().map(Vec::len).collect()
    }

    /// Start offset of each final circuit in the flat element index space.
    pub fn element_offsets(&self) -> Vec<usize> {
        let mut offsets = Vec::with_capacity(self.elabels.len());
        let mut acc = 0;
        for e in &self.elabels {
            offsets.push(acc);
            acc += e.len();
        }
        offsets
    }

    pub fn sub_trees(&self) -> &[EvalTree] {
        &self.sub_trees
    }

    pub fn parent_index_map(&self) -> Option<&[usize]> {
        self.parent_index_map.as_deref()
    }

    pub fn final_to_parent_final_map(&self) -> Option<&IndexMap> {
        self.final_to_parent_final.as_ref()
    }

    pub fn final_els_to_parent_final_els_map(&self) -> Option<&[usize]> {
        self.final_els_to_parent_final_els.as_deref()
    }

    pub fn original_index_lookup(&self) -> Option<&BTreeMap<usize, usize>> {
        self.original_index_lookup.as_ref()
    }

    /// The merged compact-polynomial buffer, once a cache pass has run.
    pub fn merged_polys(&self) -> Option<&MergedPolys> {
        self.merged.as_ref()
    }

    pub fn cached_polys(&self, circuit: &Circuit) -> Option<&PolyCacheEntry> {
        self.poly_cache.get(circuit)
    }

    pub fn rep_cache(&self) -> &ReuseCache {
        &self.rep_cache
    }

    pub fn op_cache(&self) -> &ReuseCache {
        &self.op_cache
    }

    /// Drop every cached polynomial, the merged buffer, and both reuse caches.
    pub fn clear_caches(&mut self) {
        self.poly_cache.clear();
        self.merged = None;
        self.rep_cache.clear();
        self.op_cache.clear();
    }

    /// Structural copy: entries, order, labels, and parent linkage. Caches and
    /// sub-trees are not copied.
    pub fn copy(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            eval_order: self.eval_order.clone(),
            num_final_strs: self.num_final_strs,
            cache_size: self.cache_size,
            op_labels: self.op_labels.clone(),
            elabels: self.elabels.clone(),
            num_final_els: self.num_final_els,
            parent_index_map: self.parent_index_map.clone(),
            final_to_parent_final: self.final_to_parent_final.clone(),
            final_els_to_parent_final_els: self.final_els_to_parent_final_els.clone(),
            original_index_lookup: self.original_index_lookup.clone(),
            num_sub_tree_comms: self.num_sub_tree_comms,
            ..Self::default()
        }
    }

    /// Record how many communicator groups the sub-trees will be spread
    /// over. Carried into [`EvalTree::partition_manifest`]; splitting does
    /// not read it.
    pub fn set_num_sub_tree_comms(&mut self, n: usize) -> Result<()> {
        if n == 0 {
            return Err(Error::Usage("num_sub_tree_comms must be > 0".into()));
        }
        self.num_sub_tree_comms = Some(n);
        Ok(())
    }

    pub fn num_sub_tree_comms(&self) -> Option<usize> {
        self.num_sub_tree_comms
    }

    /// Describe the current split for distribution to workers.
    pub fn partition_manifest(&self) -> Result<PartitionManifest> {
        let digest = hash_serde(&(&self.entries, &self.eval_order))?;
        let created_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let mut manifest =
            PartitionManifest::new(digest, self.num_final_strs, self.num_final_els, created_ms);
        if let Some(n) = self.num_sub_tree_comms {
            manifest = manifest.with_num_sub_tree_comms(n);
        }
        for (i, st) in self.sub_trees.iter().enumerate() {
            manifest = manifest.with_sub_tree(SubTreeSummary {
                id: SubTreeId::new(i as u64),
                len: st.len(),
                num_final_strings: st.num_final_strs,
                num_final_els: st.num_final_els,
                parent_final_els: st.final_els_to_parent_final_els.clone().unwrap_or_default(),
            });
        }
        Ok(manifest)
    }
}

/// Sorted distinct operation labels, preparation labels excluded.
pub(crate) fn collect_op_labels(circuits: &[Circuit]) -> Vec<Label> {
    circuits
        .iter()
        .flat_map(|c| c.op_string().iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circ(labels: &[&str]) -> Circuit {
        labels.iter().copied().collect()
    }

    fn outcomes() -> Vec<Label> {
        vec![Label::from("0"), Label::from("1")]
    }

    #[test]
    fn initialize_counts_elements() {
        let tree = EvalTree::from_circuits(vec![
            (circ(&["rho0"]), outcomes()),
            (circ(&["rho0", "Gx"]), vec![Label::from("0")]),
            (circ(&["rho0", "Gy", "Gx"]), outcomes()),
        ])
        .unwrap();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.num_final_strings(), 3);
        assert_eq!(tree.num_final_els(), 5);
        assert_eq!(tree.num_outcomes(), vec![2, 1, 2]);
        assert_eq!(tree.element_offsets(), vec![0, 2, 3]);
        assert_eq!(tree.evaluation_order(), &[0, 1, 2]);
        assert_eq!(tree.cache_size(), 0);
        assert_eq!(tree.op_labels(), &[Label::from("Gx"), Label::from("Gy")]);
    }

    #[test]
    fn duplicate_circuits_are_rejected() {
        let err = EvalTree::from_circuits(vec![
            (circ(&["rho0", "Gx"]), outcomes()),
            (circ(&["rho0", "Gx"]), outcomes()),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }

    #[test]
    fn from_entries_replays_prefixes() {
        let circuits = vec![
            (circ(&["rho0", "Gx"]), outcomes()),
            (circ(&["rho0", "Gx", "Gy"]), outcomes()),
        ];
        let entries = vec![
            Entry {
                start: None,
                remainder: circ(&["rho0", "Gx"]).labels().to_vec(),
                cache_slot: Some(0),
            },
            Entry {
                start: Some(0),
                remainder: vec![Label::from("Gy")],
                cache_slot: None,
            },
        ];
        let tree = EvalTree::from_entries(circuits.clone(), entries, vec![0, 1]).unwrap();
        assert_eq!(tree.cache_size(), 1);
        let expected: Vec<Circuit> = circuits.into_iter().map(|(c, _)| c).collect();
        assert_eq!(tree.generate_circuit_list(true).unwrap(), expected);
    }

    #[test]
    fn from_entries_rejects_dependency_before_producer() {
        let circuits = vec![
            (circ(&["rho0", "Gx"]), outcomes()),
            (circ(&["rho0", "Gx", "Gy"]), outcomes()),
        ];
        let entries = vec![
            Entry {
                start: None,
                remainder: circ(&["rho0", "Gx"]).labels().to_vec(),
                cache_slot: Some(0),
            },
            Entry {
                start: Some(0),
                remainder: vec![Label::from("Gy")],
                cache_slot: None,
            },
        ];
        let err = EvalTree::from_entries(circuits, entries, vec![1, 0]).unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));
    }

    #[test]
    fn from_entries_rejects_bad_order() {
        let circuits = vec![(circ(&["rho0"]), outcomes())];
        let entries = vec![Entry::standalone(&circ(&["rho0"]))];
        assert!(EvalTree::from_entries(circuits.clone(), entries.clone(), vec![0, 0]).is_err());
        assert!(EvalTree::from_entries(circuits, entries, vec![]).is_err());
    }

    #[test]
    fn copy_drops_caches() {
        let mut tree = EvalTree::from_circuits(vec![(circ(&["rho0"]), outcomes())]).unwrap();
        tree.rep_cache.insert("x", 1u8);
        let cpy = tree.copy();
        assert!(cpy.rep_cache().is_empty());
        assert_eq!(cpy.entries(), tree.entries());
        assert_eq!(cpy.num_final_els(), 2);
    }

    #[test]
    fn manifest_digest_is_stable_across_rebuilds() {
        let build = || {
            EvalTree::from_circuits(vec![
                (circ(&["rho0"]), outcomes()),
                (circ(&["rho0", "Gx"]), outcomes()),
            ])
            .unwrap()
        };
        let a = build().partition_manifest().unwrap();
        let b = build().partition_manifest().unwrap();
        assert_eq!(a.tree_digest, b.tree_digest);
        assert_ne!(a.id, b.id);
        assert!(a.sub_trees.is_empty());

        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["num_final_els"], 4);
    }
}
