//! Planner and cache configuration that callers can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Knobs forwarded to the calculator when deriving pruned polynomials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PruningConfig {
    /// Memory budget (bytes) the calculator may use; `None` means unbounded.
    pub mem_limit: Option<usize>,
    /// Allowed gap between the achieved and the ideal sum of path magnitudes.
    pub pathmagnitude_gap: f64,
    /// Terms with a smaller magnitude are never kept.
    pub min_term_mag: f64,
    /// Upper bound on the number of paths kept per circuit.
    pub max_paths: usize,
}

impl Default for PruningConfig {
    fn default() -> Self {
        Self {
            mem_limit: None,
            pathmagnitude_gap: 1e-3,
            min_term_mag: 1e-8,
            max_paths: 1000,
        }
    }
}

impl PruningConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.pathmagnitude_gap.is_finite() && self.pathmagnitude_gap >= 0.0) {
            return Err(Error::Config(format!(
                "pathmagnitude_gap must be finite and >= 0, got {}",
                self.pathmagnitude_gap
            )));
        }
        if !(self.min_term_mag.is_finite() && self.min_term_mag >= 0.0) {
            return Err(Error::Config(format!(
                "min_term_mag must be finite and >= 0, got {}",
                self.min_term_mag
            )));
        }
        Ok(())
    }
}

/// What to do when a circuit misses its target sum of path magnitudes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Count the failure and keep going.
    #[default]
    ContinueAndReport,
    /// Stop the sweep at the first failing circuit.
    StopOnFirstFailure,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    /// Reuse a cached pruned polynomial without re-validating its threshold.
    /// Off by default: every pruned pass resets the reuse caches and recomputes.
    pub reuse_cached_thresholds: bool,
    pub failure_policy: FailurePolicy,
}

/// Which cost each entry contributes during a cost-balanced split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostMetric {
    /// Every entry costs 1: balances sub-tree sizes.
    #[default]
    Size,
    /// Cost is the remainder length: balances apply operations.
    Applys,
}

impl CostMetric {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "size" => Some(CostMetric::Size),
            "applys" => Some(CostMetric::Applys),
            _ => None,
        }
    }
}

/// Cost threshold for a greedy split. The threshold grows by
/// `max_cost_rate` after every visited entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostBudget {
    pub max_cost: f64,
    #[serde(default)]
    pub max_cost_rate: f64,
    #[serde(default)]
    pub metric: CostMetric,
}

impl CostBudget {
    pub fn new(max_cost: f64, metric: CostMetric) -> Self {
        Self {
            max_cost,
            max_cost_rate: 0.0,
            metric,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    pub max_sub_tree_size: Option<usize>,
    pub num_sub_trees: Option<usize>,
    pub cost: Option<CostBudget>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeConfig {
    pub pruning: PruningConfig,
    pub cache: CachePolicy,
    pub split: SplitConfig,
}

impl TreeConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `TERMEVAL_MEM_LIMIT`: calculator memory limit in bytes
    /// - `TERMEVAL_PATHMAG_GAP`: allowed path-magnitude gap
    /// - `TERMEVAL_MIN_TERM_MAG`: minimum per-term magnitude
    /// - `TERMEVAL_MAX_PATHS`: maximum kept paths per circuit
    /// - `TERMEVAL_REUSE_THRESHOLDS`: `true` to reuse cached thresholds
    /// - `TERMEVAL_STOP_ON_FAILURE`: `true` to stop at the first SOPM failure
    /// - `TERMEVAL_MAX_SUB_TREE_SIZE`: split into sub-trees of at most this many entries
    /// - `TERMEVAL_NUM_SUB_TREES`: split into this many sub-trees
    /// - `TERMEVAL_MAX_COST`: split with the cost walk at this threshold
    /// - `TERMEVAL_MAX_COST_RATE`: threshold drift per visited entry (cost walk only)
    /// - `TERMEVAL_COST_METRIC`: `size` or `applys` (cost walk only)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`TreeConfig::from_env`], reading values through `get`.
    /// Unparseable values are ignored.
    pub fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(s) = get("TERMEVAL_MEM_LIMIT") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.pruning.mem_limit = Some(v);
            }
        }

        if let Some(s) = get("TERMEVAL_PATHMAG_GAP") {
            if let Ok(v) = s.parse::<f64>() {
                cfg.pruning.pathmagnitude_gap = v;
            }
        }

        if let Some(s) = get("TERMEVAL_MIN_TERM_MAG") {
            if let Ok(v) = s.parse::<f64>() {
                cfg.pruning.min_term_mag = v;
            }
        }

        if let Some(s) = get("TERMEVAL_MAX_PATHS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.pruning.max_paths = v;
            }
        }

        if let Some(s) = get("TERMEVAL_REUSE_THRESHOLDS") {
            if let Ok(v) = s.parse::<bool>() {
                cfg.cache.reuse_cached_thresholds = v;
            }
        }

        if let Some(s) = get("TERMEVAL_STOP_ON_FAILURE") {
            if let Ok(v) = s.parse::<bool>() {
                cfg.cache.failure_policy = if v {
                    FailurePolicy::StopOnFirstFailure
                } else {
                    FailurePolicy::ContinueAndReport
                };
            }
        }

        if let Some(s) = get("TERMEVAL_MAX_SUB_TREE_SIZE") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.split.max_sub_tree_size = Some(v);
            }
        }

        if let Some(s) = get("TERMEVAL_NUM_SUB_TREES") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.split.num_sub_trees = Some(v);
            }
        }

        if let Some(s) = get("TERMEVAL_MAX_COST") {
            if let Ok(v) = s.parse::<f64>() {
                let mut budget = CostBudget::new(v, CostMetric::default());
                if let Some(rate) = get("TERMEVAL_MAX_COST_RATE").and_then(|r| r.parse::<f64>().ok()) {
                    budget.max_cost_rate = rate;
                }
                if let Some(metric) = get("TERMEVAL_COST_METRIC").and_then(|m| CostMetric::parse(&m)) {
                    budget.metric = metric;
                }
                cfg.split.cost = Some(budget);
            }
        }

        cfg
    }
}
