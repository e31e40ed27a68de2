//! Lightweight cost model used by the splitter.
//!
//! An entry costs either 1 (balances sub-tree sizes) or its remainder length
//! (balances the number of incremental apply operations).

use serde::{Deserialize, Serialize};
use termeval_core::circuit::Entry;
use termeval_core::config::CostMetric;

use crate::tree::EvalTree;

pub fn entry_cost(metric: CostMetric, entry: &Entry) -> f64 {
    match metric {
        CostMetric::Size => 1.0,
        CostMetric::Applys => entry.remainder.len() as f64,
    }
}

/// Summary of how cost is spread across a split (used for reporting).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionCost {
    /// Cost of each sub-tree, scaffolding entries included.
    pub sub_tree_costs: Vec<f64>,
    pub total_cost: f64,
    pub max_sub_tree_cost: f64,
}

impl PartitionCost {
    pub fn from_sub_tree_costs(costs: Vec<f64>) -> Self {
        let mut total_cost = 0.0;
        let mut max_sub_tree_cost: f64 = 0.0;
        for &c in &costs {
            total_cost += c;
            max_sub_tree_cost = max_sub_tree_cost.max(c);
        }
        Self {
            sub_tree_costs: costs,
            total_cost,
            max_sub_tree_cost,
        }
    }

    /// Max over mean sub-tree cost; 1.0 is perfectly balanced.
    pub fn imbalance(&self) -> f64 {
        if self.sub_tree_costs.is_empty() || self.total_cost == 0.0 {
            return 1.0;
        }
        let mean = self.total_cost / self.sub_tree_costs.len() as f64;
        self.max_sub_tree_cost / mean
    }
}

impl EvalTree {
    /// Total cost of evaluating this tree under `metric`.
    pub fn cost(&self, metric: CostMetric) -> f64 {
        self.entries.iter().map(|e| entry_cost(metric, e)).sum()
    }

    /// Per-sub-tree cost of the current split (empty when unsplit).
    pub fn partition_cost(&self, metric: CostMetric) -> PartitionCost {
        PartitionCost::from_sub_tree_costs(self.sub_trees.iter().map(|t| t.cost(metric)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termeval_core::circuit::Label;

    #[test]
    fn metrics_differ_on_remainder_length() {
        let e = Entry {
            start: Some(0),
            remainder: vec![Label::from("Gx"), Label::from("Gy")],
            cache_slot: None,
        };
        assert_eq!(entry_cost(CostMetric::Size, &e), 1.0);
        assert_eq!(entry_cost(CostMetric::Applys, &e), 2.0);
    }

    #[test]
    fn imbalance_of_even_split_is_one() {
        let p = PartitionCost::from_sub_tree_costs(vec![2.0, 2.0]);
        assert_eq!(p.total_cost, 4.0);
        assert_eq!(p.imbalance(), 1.0);
        let q = PartitionCost::from_sub_tree_costs(vec![3.0, 1.0]);
        assert_eq!(q.imbalance(), 1.5);
        assert_eq!(PartitionCost::default().imbalance(), 1.0);
    }
}
