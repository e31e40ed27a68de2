//! Path-magnitude-pruned polynomial cache and its staleness sweep.

use serde::{Deserialize, Serialize};
use termeval_core::calc::{CompactForm, PrunedRequest, TermCalculator};
use termeval_core::circuit::Circuit;
use termeval_core::comm::DistContext;
use termeval_core::config::{CachePolicy, FailurePolicy, PruningConfig};
use termeval_core::error::{Error, Result};
use termeval_core::id::Rank;
use termeval_core::poly::CompactPoly;
use tracing::info;

use crate::metrics::emit_span;
use crate::tree::{EvalTree, PolyCacheEntry};

/// Failing circuits beyond this count are kept in the report but not logged.
pub const MAX_LISTED_FAILURES: usize = 10;

/// A circuit whose kept paths fell short of the target magnitude sum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedCircuit {
    pub circuit: Circuit,
    pub npaths: usize,
    pub threshold: f64,
    pub target_sopm: f64,
    pub achieved_sopm: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrunedCacheReport {
    pub num_failed: usize,
    pub failed: Vec<FailedCircuit>,
    pub total_paths: usize,
    pub total_target_sopm: f64,
    pub total_achieved_sopm: f64,
    pub num_circuits: usize,
    pub rank: Option<Rank>,
    /// Set when `StopOnFirstFailure` cut the pass short. The merged buffer
    /// is left unset in that case.
    pub aborted: bool,
}

/// Outcome of [`EvalTree::num_circuit_sopm_failures`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SopmSweep {
    /// Circuits that had a pruned cache entry to test.
    pub tested: usize,
    pub failed_circuits: usize,
    /// Outcome elements whose gap exceeded the allowance.
    pub failed_elements: usize,
    pub failing: Vec<Circuit>,
}

fn rank_prefix(rank: Option<Rank>) -> String {
    match rank {
        Some(r) => format!("Rank{}: ", r.get()),
        None => String::new(),
    }
}

impl EvalTree {
    /// Derive pruned polynomials for every circuit and populate the merged
    /// buffer.
    ///
    /// A circuit whose achieved sum of path magnitudes is below its target
    /// is a soft failure: it is recorded in the report, and only stops the
    /// pass under [`FailurePolicy::StopOnFirstFailure`].
    ///
    /// Unless `policy.reuse_cached_thresholds` is set, the reuse caches are
    /// reset and every circuit is recomputed. With it set, a circuit that
    /// already has a pruned entry is reused as-is and contributes no paths
    /// and no failure to the totals.
    ///
    /// The merged buffer is dropped before any work, so it is only present
    /// after a pass that completed.
    pub fn cache_p_pruned_polys<C>(
        &mut self,
        calc: &C,
        comm: Option<&dyn DistContext>,
        pruning: &PruningConfig,
        policy: CachePolicy,
    ) -> Result<PrunedCacheReport>
    where
        C: TermCalculator + ?Sized,
    {
        self.merged = None;
        pruning.validate()?;
        let recalc = !policy.reuse_cached_thresholds;
        if recalc {
            self.rep_cache.clear();
            self.op_cache.clear();
        }

        let mut report = PrunedCacheReport {
            num_circuits: self.num_final_strs,
            rank: comm.map(|c| c.rank()),
            ..PrunedCacheReport::default()
        };
        let mut per_slot: Vec<Option<Vec<CompactPoly>>> = vec![None; self.num_final_strs];

        for (i, circuit) in self.final_slots_in_eval_order()? {
            let current_threshold = self.poly_cache.get(&circuit).and_then(|e| e.threshold);

            if !recalc && current_threshold.is_some() {
                per_slot[i] = self.poly_cache.get(&circuit).map(|e| e.polys.clone());
                continue;
            }

            let prep = circuit.prep_label().ok_or(Error::MissingPrep(i))?;
            let out = calc.prs_as_pruned_polyreps(PrunedRequest {
                prep,
                elabels: &self.elabels[i],
                ops: circuit.op_string(),
                rep_cache: &mut self.rep_cache,
                op_cache: &mut self.op_cache,
                comm,
                pruning,
                current_threshold,
            })?;
            self.check_poly_count(i, out.polyreps.len())?;

            let polys: Vec<CompactPoly> = out.polyreps.iter().map(|r| r.compact_complex()).collect();
            report.total_paths += out.npaths;
            report.total_target_sopm += out.target_sopm;
            report.total_achieved_sopm += out.achieved_sopm;

            let failed = out.achieved_sopm < out.target_sopm;
            if failed {
                report.num_failed += 1;
                report.failed.push(FailedCircuit {
                    circuit: circuit.clone(),
                    npaths: out.npaths,
                    threshold: out.threshold,
                    target_sopm: out.target_sopm,
                    achieved_sopm: out.achieved_sopm,
                });
            }

            self.poly_cache.insert(
                circuit,
                PolyCacheEntry {
                    threshold: Some(out.threshold),
                    polys: polys.clone(),
                },
            );
            per_slot[i] = Some(polys);

            if failed && policy.failure_policy == FailurePolicy::StopOnFirstFailure {
                report.aborted = true;
                break;
            }
        }

        if !report.aborted {
            self.merge_slot_polys(per_slot)?;
        }
        log_pruned_report(&report);
        emit_span(
            "cache_p_pruned_polys",
            &[
                ("circuits", report.num_circuits.to_string()),
                ("failed", report.num_failed.to_string()),
                ("paths", report.total_paths.to_string()),
            ],
        );
        Ok(report)
    }

    /// Count cached circuits whose pruned polynomials no longer meet
    /// `pathmagnitude_gap`. Circuits without a pruned entry are skipped.
    /// No cache is touched.
    pub fn num_circuit_sopm_failures<C>(&self, calc: &C, pathmagnitude_gap: f64) -> Result<SopmSweep>
    where
        C: TermCalculator + ?Sized,
    {
        let mut sweep = SopmSweep::default();
        for (i, circuit) in self.final_slots_in_eval_order()? {
            let Some(threshold) = self.poly_cache.get(&circuit).and_then(|e| e.threshold) else {
                continue;
            };
            sweep.tested += 1;

            let prep = circuit.prep_label().ok_or(Error::MissingPrep(i))?;
            let gaps = calc.circuit_pathmagnitude_gap(
                prep,
                &self.elabels[i],
                circuit.op_string(),
                &self.rep_cache,
                &self.op_cache,
                threshold,
            )?;
            let over = gaps.iter().filter(|&&g| g > pathmagnitude_gap).count();
            if over > 0 {
                sweep.failed_elements += over;
                sweep.failed_circuits += 1;
                sweep.failing.push(circuit);
            }
        }

        info!(
            "tested {} circuits: {} failures ({} elements)",
            sweep.tested, sweep.failed_circuits, sweep.failed_elements
        );
        for c in sweep.failing.iter().take(MAX_LISTED_FAILURES) {
            info!(" -> {c}");
        }
        Ok(sweep)
    }
}

fn log_pruned_report(report: &PrunedCacheReport) {
    if report.total_paths == 0 || report.num_circuits == 0 {
        return;
    }
    let rank = rank_prefix(report.rank);
    let n = report.num_circuits;
    info!(
        "{rank}Pruned path-integral: kept {} paths w/magnitude {:.4} (target={:.4}, #circuits={}, #failed={})",
        report.total_paths, report.total_achieved_sopm, report.total_target_sopm, n, report.num_failed
    );
    info!(
        "{rank}  (avg per circuit paths={}, magnitude={:.4}, target={:.4})",
        report.total_paths / n,
        report.total_achieved_sopm / n as f64,
        report.total_target_sopm / n as f64
    );
    for f in report.failed.iter().take(MAX_LISTED_FAILURES) {
        info!(
            " -> {} npaths={} threshold={:.4e} target={:.4} achieved={:.4}",
            f.circuit, f.npaths, f.threshold, f.target_sopm, f.achieved_sopm
        );
    }
    if report.failed.len() > MAX_LISTED_FAILURES {
        info!(" -> ... and {} more", report.failed.len() - MAX_LISTED_FAILURES);
    }
}
