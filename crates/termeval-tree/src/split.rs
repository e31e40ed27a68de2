//! Splitting a tree into self-contained sub-trees.
//!
//! Part I picks index sets (fixed-size blocks, fixed-count blocks, or a
//! cost-balanced greedy walk) and closes each set over its prefix chains.
//! Part II permutes the parent so every sub-tree's final circuits form a
//! contiguous block, materializes the sub-trees, and rewrites the caller's
//! element-index map to the new ordering.

use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use termeval_core::circuit::{ElIndices, Entry, IndexMap};
use termeval_core::config::CostBudget;
use termeval_core::error::{Error, Result};

use crate::cost::entry_cost;
use crate::metrics::emit_span;
use crate::tree::EvalTree;

/// Index sets chosen in Part I.
type SubTreeSets = Vec<BTreeSet<usize>>;

/// Applied to every retained entry when slots move (`perm` is the slot
/// mapping in effect). Entries refer to cache slots, not to other entries'
/// positions, so moving them needs no rewrite.
pub(crate) fn permute_parent_element(_perm: &[usize], entry: Entry) -> Entry {
    entry
}

impl EvalTree {
    /// Split into sub-trees bounded by `max_sub_tree_size` entries or into
    /// `num_sub_trees` blocks. Exactly one of the two must be given.
    ///
    /// Returns `el_indices` rewritten for the permuted element order; callers
    /// must use the returned map to interpret results after the split.
    ///
    /// When the tree already fits (fewer than `max_sub_tree_size` entries, or
    /// `num_sub_trees == 1`) the tree is left unsplit: sub-trees from an
    /// earlier split are dropped and `el_indices` is returned unchanged.
    pub fn split(
        &mut self,
        el_indices: &ElIndices,
        max_sub_tree_size: Option<usize>,
        num_sub_trees: Option<usize>,
    ) -> Result<ElIndices> {
        let started = Instant::now();
        let sets = match (max_sub_tree_size, num_sub_trees) {
            (Some(_), Some(_)) | (None, None) => {
                return Err(Error::Usage(
                    "specify either max_sub_tree_size or num_sub_trees".into(),
                ))
            }
            (None, Some(0)) => {
                return Err(Error::Usage("num_sub_trees must be > 0".into()));
            }
            (Some(0), None) => {
                return Err(Error::Usage("max_sub_tree_size must be > 0".into()));
            }
            (Some(max), None) => {
                if self.len() < max {
                    self.sub_trees.clear();
                    return Ok(el_indices.clone());
                }
                self.fixed_size_sets(max)
            }
            (None, Some(n)) => {
                if n == 1 {
                    self.sub_trees.clear();
                    return Ok(el_indices.clone());
                }
                self.fixed_count_sets(n)
            }
        };
        let sets = self.close_over_dependencies(sets)?;
        tracing::debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "split done initial prep"
        );

        self.finish_split(el_indices, sets)
    }

    /// Split with the cost-balanced greedy walk.
    ///
    /// A no-op (input map returned unchanged, earlier sub-trees dropped) when
    /// the whole tree fits in a single sub-tree.
    pub fn split_by_cost(&mut self, el_indices: &ElIndices, budget: CostBudget) -> Result<ElIndices> {
        if !(budget.max_cost.is_finite() && budget.max_cost > 0.0) {
            return Err(Error::Usage(format!(
                "max_cost must be positive and finite, got {}",
                budget.max_cost
            )));
        }
        if !budget.max_cost_rate.is_finite() {
            return Err(Error::Usage("max_cost_rate must be finite".into()));
        }
        let (sets, total_cost) = self.cost_balanced_sets(budget)?;
        tracing::debug!(
            sub_trees = sets.len(),
            total_cost,
            metric = ?budget.metric,
            "cost walk finished"
        );
        if sets.len() <= 1 {
            self.sub_trees.clear();
            return Ok(el_indices.clone());
        }
        self.finish_split(el_indices, sets)
    }

    fn fixed_size_sets(&self, max: usize) -> SubTreeSets {
        let len = self.len();
        let mut sets = Vec::new();
        let mut k = 0;
        while k < len {
            let end = (k + max).min(len);
            sets.push((k..end).collect());
            k = end;
        }
        sets
    }

    /// `n` contiguous blocks; the last one absorbs the remainder.
    fn fixed_count_sets(&self, n: usize) -> SubTreeSets {
        let len = self.len();
        let n = n.min(len).max(1);
        let size = len / n;
        (0..n)
            .map(|i| {
                let end = if i < n - 1 { (i + 1) * size } else { len };
                (i * size..end).collect()
            })
            .collect()
    }

    /// For each slot, the slot whose cached result it extends.
    pub(crate) fn producers(&self) -> Result<Vec<Option<usize>>> {
        let mut owner: HashMap<usize, usize> = HashMap::with_capacity(self.cache_size);
        let mut producers = vec![None; self.entries.len()];
        for &k in &self.eval_order {
            let entry = &self.entries[k];
            if let Some(s) = entry.start {
                let p = owner.get(&s).copied().ok_or_else(|| {
                    Error::Invariant(format!("slot {k} extends unpopulated cache slot {s}"))
                })?;
                producers[k] = Some(p);
            }
            if let Some(slot) = entry.cache_slot {
                owner.insert(slot, k);
            }
        }
        Ok(producers)
    }

    /// The transitive prefix chain of `k`, nearest prefix first.
    pub(crate) fn chain(&self, k: usize, producers: &[Option<usize>]) -> Result<Vec<usize>> {
        let mut out = Vec::new();
        let mut j = producers[k];
        while let Some(p) = j {
            if out.len() >= self.entries.len() {
                return Err(Error::Invariant(format!(
                    "prefix chain from slot {k} does not terminate"
                )));
            }
            out.push(p);
            j = producers[p];
        }
        Ok(out)
    }

    fn close_over_dependencies(&self, sets: SubTreeSets) -> Result<SubTreeSets> {
        if self.cache_size == 0 {
            return Ok(sets);
        }
        let producers = self.producers()?;
        sets.into_iter()
            .map(|set| -> Result<BTreeSet<usize>> {
                let mut closed = set.clone();
                for &k in &set {
                    closed.extend(self.chain(k, &producers)?);
                }
                Ok(closed)
            })
            .collect()
    }

    /// Greedy walk in evaluation order, closing a sub-tree whenever the next
    /// entry (plus any prefix chain it drags in) would reach the threshold.
    fn cost_balanced_sets(&self, budget: CostBudget) -> Result<(SubTreeSets, f64)> {
        let producers = self.producers()?;
        let cost_of = |k: usize| entry_cost(budget.metric, &self.entries[k]);

        let mut max_cost = budget.max_cost;
        let mut sets = Vec::new();
        let mut cur: BTreeSet<usize> = BTreeSet::new();
        let mut cur_cost = 0.0;
        let mut total_cost = 0.0;

        for &k in &self.eval_order {
            let chain = self.chain(k, &producers)?;
            let missing: Vec<usize> = chain.iter().copied().filter(|j| !cur.contains(j)).collect();
            let cost = cost_of(k) + missing.iter().map(|&j| cost_of(j)).sum::<f64>();

            if cur.is_empty() || cur_cost + cost < max_cost {
                cur_cost += cost;
                cur.insert(k);
                cur.extend(missing);
            } else {
                sets.push(std::mem::take(&mut cur));
                total_cost += cur_cost;
                cur.insert(k);
                cur.extend(chain.iter().copied());
                cur_cost = cost_of(k) + chain.iter().map(|&j| cost_of(j)).sum::<f64>();
            }
            max_cost += budget.max_cost_rate;
        }
        if !cur.is_empty() {
            sets.push(cur);
            total_cost += cur_cost;
        }
        Ok((sets, total_cost))
    }

    fn finish_split(&mut self, el_indices: &ElIndices, sets: SubTreeSets) -> Result<ElIndices> {
        let started = Instant::now();
        let len = self.len();
        let nfinal = self.num_final_strs;

        // Each final circuit is "final" in the first sub-tree containing it;
        // later sub-trees only hold it as scaffolding.
        let mut claimed = vec![false; nfinal];
        let mut rev_perm: Vec<usize> = Vec::with_capacity(len);
        let mut layouts: Vec<(Vec<usize>, Vec<usize>)> = Vec::with_capacity(sets.len());
        for set in &sets {
            let mut finals = Vec::new();
            let mut others = Vec::new();
            for &i in set {
                if i >= len {
                    return Err(Error::Invariant(format!("sub-tree index {i} out of range")));
                }
                if i < nfinal && !claimed[i] {
                    claimed[i] = true;
                    finals.push(i);
                } else {
                    others.push(i);
                }
            }
            if finals.is_empty() {
                continue;
            }
            rev_perm.extend_from_slice(&finals);
            layouts.push((finals, others));
        }
        if rev_perm.len() != nfinal {
            return Err(Error::Invariant(format!(
                "sub-trees cover {} of {} final circuits",
                rev_perm.len(),
                nfinal
            )));
        }
        rev_perm.extend(nfinal..len);
        let mut perm = vec![0; len];
        for (new, &old) in rev_perm.iter().enumerate() {
            perm[old] = new;
        }

        let updated = self.permute_slots(&perm, &rev_perm, el_indices)?;

        let mut sub_trees = Vec::with_capacity(layouts.len());
        let mut start = 0;
        for (finals, others) in &layouts {
            let nf = finals.len();
            let parent_indices: Vec<usize> = finals
                .iter()
                .chain(others.iter())
                .map(|&old| perm[old])
                .collect();
            let position: HashMap<usize, usize> = parent_indices
                .iter()
                .enumerate()
                .map(|(pos, &p)| (p, pos))
                .collect();
            let full_eval_order: Vec<usize> = self
                .eval_order
                .iter()
                .filter_map(|p| position.get(p).copied())
                .collect();

            sub_trees.push(self.create_sub_tree(
                parent_indices,
                nf,
                full_eval_order,
                IndexMap::Slice(start..start + nf),
            )?);
            start += nf;
        }
        self.sub_trees = sub_trees;

        emit_span(
            "split",
            &[
                ("sub_trees", self.sub_trees.len().to_string()),
                ("entries", len.to_string()),
            ],
        );
        tracing::debug!(
            sub_trees = self.sub_trees.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "split done second pass"
        );
        Ok(updated)
    }

    /// Move entries so `perm[old] == new`, keep the evaluation sequence, and
    /// rewrite element indices. Returns the updated caller map.
    fn permute_slots(
        &mut self,
        perm: &[usize],
        rev_perm: &[usize],
        el_indices: &ElIndices,
    ) -> Result<ElIndices> {
        let nfinal = self.num_final_strs;

        let old_offsets = self.element_offsets();
        let old_elabels = std::mem::take(&mut self.elabels);
        self.elabels = rev_perm[..nfinal]
            .iter()
            .map(|&old| old_elabels[old].clone())
            .collect();
        let new_offsets = self.element_offsets();

        let mut el_map = vec![0; self.num_final_els];
        for (old, labels) in old_elabels.iter().enumerate() {
            let new_start = new_offsets[perm[old]];
            for o in 0..labels.len() {
                el_map[old_offsets[old] + o] = new_start + o;
            }
        }

        let old_entries = std::mem::take(&mut self.entries);
        let mut entries: Vec<Option<Entry>> = vec![None; old_entries.len()];
        for (old, e) in old_entries.into_iter().enumerate() {
            entries[perm[old]] = Some(permute_parent_element(perm, e));
        }
        self.entries = entries
            .into_iter()
            .enumerate()
            .map(|(i, e)| e.ok_or_else(|| Error::Invariant(format!("slot {i} unpopulated after permutation"))))
            .collect::<Result<_>>()?;
        self.eval_order = self.eval_order.iter().map(|&i| perm[i]).collect();

        self.original_index_lookup = Some(match self.original_index_lookup.take() {
            Some(lookup) => lookup.into_iter().map(|(orig, cur)| (orig, perm[cur])).collect(),
            None => (0..nfinal).map(|i| (i, perm[i])).collect(),
        });

        // Slot contents moved, so per-slot merged results are stale.
        self.merged = None;

        el_indices
            .iter()
            .map(|(&k, map)| -> Result<(usize, IndexMap)> {
                let moved = map
                    .indices()
                    .into_iter()
                    .map(|e| {
                        el_map.get(e).copied().ok_or_else(|| {
                            Error::Usage(format!("element index {e} out of range"))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok((k, IndexMap::from_indices(moved)))
            })
            .collect()
    }
}
