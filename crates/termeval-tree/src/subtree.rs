//! Materializing a child tree from a set of parent slots.

use std::collections::HashMap;

use termeval_core::circuit::{Entry, IndexMap};
use termeval_core::error::{Error, Result};

use crate::split::permute_parent_element;
use crate::tree::{collect_op_labels, EvalTree};

impl EvalTree {
    /// Build an independent child tree.
    ///
    /// `parent_indices[i]` is the parent slot copied into child slot `i`; the
    /// first `num_final` of them are the child's final circuits and
    /// `final_map` says which parent final circuits they are.
    /// `full_eval_order` is the child's evaluation order over child slots,
    /// scaffolding included. Cache slots are renumbered into the child's own
    /// slot space as entries are copied.
    pub(crate) fn create_sub_tree(
        &self,
        parent_indices: Vec<usize>,
        num_final: usize,
        full_eval_order: Vec<usize>,
        final_map: IndexMap,
    ) -> Result<EvalTree> {
        let mut entries: Vec<Option<Entry>> = vec![None; parent_indices.len()];
        let mut slot_map: HashMap<usize, usize> = HashMap::new();
        let mut next_slot = 0;

        for &ik in &full_eval_order {
            let k = parent_indices[ik];
            let parent_entry = permute_parent_element(&parent_indices, self.entries[k].clone());
            if entries[ik].is_some() {
                return Err(Error::Invariant(format!(
                    "sub-tree slot {ik} populated twice"
                )));
            }

            let start = match parent_entry.start {
                None => None,
                Some(s) => Some(slot_map.get(&s).copied().ok_or_else(|| {
                    Error::Invariant(format!(
                        "sub-tree not closed: parent slot {k} extends cache slot {s} held outside it"
                    ))
                })?),
            };
            let cache_slot = parent_entry.cache_slot.map(|s| {
                let c = next_slot;
                next_slot += 1;
                slot_map.insert(s, c);
                c
            });
            entries[ik] = Some(Entry {
                start,
                remainder: parent_entry.remainder,
                cache_slot,
            });
        }

        let entries = entries
            .into_iter()
            .enumerate()
            .map(|(i, e)| e.ok_or_else(|| Error::Invariant(format!("sub-tree slot {i} unpopulated"))))
            .collect::<Result<Vec<_>>>()?;

        let parent_finals = final_map.indices();
        if parent_finals.len() != num_final {
            return Err(Error::Invariant(format!(
                "final map covers {} circuits, expected {num_final}",
                parent_finals.len()
            )));
        }
        let elabels: Vec<_> = parent_finals
            .iter()
            .map(|&kk| self.elabels[kk].clone())
            .collect();
        let parent_offsets = self.element_offsets();
        let final_els: Vec<usize> = parent_finals
            .iter()
            .flat_map(|&kk| parent_offsets[kk]..parent_offsets[kk] + self.elabels[kk].len())
            .collect();

        let mut sub = EvalTree {
            entries,
            eval_order: full_eval_order,
            num_final_strs: num_final,
            cache_size: next_slot,
            num_final_els: final_els.len(),
            elabels,
            parent_index_map: Some(parent_indices),
            final_to_parent_final: Some(final_map),
            final_els_to_parent_final_els: Some(final_els),
            ..EvalTree::default()
        };
        let circuits = sub.generate_circuit_list(false)?;
        sub.op_labels = collect_op_labels(&circuits);
        Ok(sub)
    }
}
