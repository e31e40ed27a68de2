//! Debug-time verification helpers for evaluation trees.
//!
//! Intended for tests and debug builds to catch a broken plan early
//! (bad ordering, open sub-trees, lost or duplicated finals). They panic on
//! violation.

use std::collections::HashSet;

use crate::tree::EvalTree;

/// Verify the evaluation order is a permutation and every entry's start slot
/// is produced before the entry is evaluated.
pub fn assert_eval_order_valid(tree: &EvalTree) {
    let n = tree.len();
    let mut seen = vec![false; n];
    let mut produced = HashSet::<usize>::new();
    for &i in tree.evaluation_order() {
        assert!(i < n, "evaluation order names slot {i} of a {n}-entry tree");
        assert!(!seen[i], "slot {i} appears twice in the evaluation order");
        seen[i] = true;
        let e = &tree.entries()[i];
        if let Some(s) = e.start {
            assert!(
                produced.contains(&s),
                "slot {i} extends cache slot {s} before it is produced"
            );
        }
        if let Some(c) = e.cache_slot {
            produced.insert(c);
        }
    }
    assert_eq!(
        tree.evaluation_order().len(),
        n,
        "evaluation order does not cover every slot"
    );
}

/// Verify every sub-tree reproduces the parent circuits it claims to hold.
pub fn assert_split_closed(tree: &EvalTree) {
    let parent = tree
        .slot_circuits()
        .unwrap_or_else(|e| panic!("parent tree does not replay: {e}"));
    for (k, sub) in tree.sub_trees().iter().enumerate() {
        assert_eval_order_valid(sub);
        let map = sub
            .parent_index_map()
            .unwrap_or_else(|| panic!("sub-tree {k} has no parent index map"));
        let circuits = sub
            .slot_circuits()
            .unwrap_or_else(|e| panic!("sub-tree {k} does not replay: {e}"));
        for (i, c) in circuits.iter().enumerate() {
            assert_eq!(
                c, &parent[map[i]],
                "sub-tree {k} slot {i} differs from parent slot {}",
                map[i]
            );
        }
    }
}

/// Verify the sub-trees' final circuits and final elements each cover the
/// parent's exactly once.
pub fn assert_partition_exact(tree: &EvalTree) {
    if tree.sub_trees().is_empty() {
        return;
    }
    let mut finals = vec![0usize; tree.num_final_strings()];
    let mut els = vec![0usize; tree.num_final_els()];
    for (k, sub) in tree.sub_trees().iter().enumerate() {
        let fmap = sub
            .final_to_parent_final_map()
            .unwrap_or_else(|| panic!("sub-tree {k} has no final map"));
        for i in fmap.indices() {
            finals[i] += 1;
        }
        let emap = sub
            .final_els_to_parent_final_els_map()
            .unwrap_or_else(|| panic!("sub-tree {k} has no element map"));
        assert_eq!(emap.len(), sub.num_final_els(), "sub-tree {k} element map length");
        for &e in emap {
            els[e] += 1;
        }
    }
    for (i, &c) in finals.iter().enumerate() {
        assert_eq!(c, 1, "parent final {i} claimed {c} times");
    }
    for (e, &c) in els.iter().enumerate() {
        assert_eq!(c, 1, "parent element {e} claimed {c} times");
    }
}
