//! Exact polynomial cache.
//!
//! Circuits are visited in evaluation order. The merged buffer lists every
//! final element in final-element index order, which is what downstream
//! probability evaluation indexes by.

use termeval_core::calc::{CompactDeriv, TermCalculator};
use termeval_core::circuit::Circuit;
use termeval_core::comm::DistContext;
use termeval_core::error::{Error, Result};
use termeval_core::poly::{CompactPoly, MergedPolys};

use crate::metrics::emit_span;
use crate::tree::{EvalTree, PolyCacheEntry};

impl EvalTree {
    /// Final slots in evaluation order, paired with their circuits.
    pub(crate) fn final_slots_in_eval_order(&self) -> Result<Vec<(usize, Circuit)>> {
        let mut circuits = self.slot_circuits()?;
        circuits.truncate(self.num_final_strs);
        let mut out: Vec<(usize, Circuit)> = Vec::with_capacity(self.num_final_strs);
        for &i in &self.eval_order {
            if i < self.num_final_strs {
                out.push((i, std::mem::take(&mut circuits[i])));
            }
        }
        Ok(out)
    }

    /// Concatenate per-slot polynomials into the merged buffer.
    pub(crate) fn merge_slot_polys(&mut self, per_slot: Vec<Option<Vec<CompactPoly>>>) -> Result<()> {
        let mut merged = MergedPolys::default();
        for (i, polys) in per_slot.iter().enumerate() {
            let polys = polys
                .as_ref()
                .ok_or_else(|| Error::Invariant(format!("no polynomials computed for slot {i}")))?;
            for p in polys {
                merged.push(p);
            }
        }
        if merged.num_polys() != self.num_final_els {
            return Err(Error::Invariant(format!(
                "merged buffer holds {} polynomials for {} final elements",
                merged.num_polys(),
                self.num_final_els
            )));
        }
        self.merged = Some(merged);
        Ok(())
    }

    pub(crate) fn check_poly_count(&self, slot: usize, got: usize) -> Result<()> {
        let want = self.elabels[slot].len();
        if got != want {
            return Err(Error::Calculator(format!(
                "calculator returned {got} polynomials for slot {slot} with {want} outcomes"
            )));
        }
        Ok(())
    }

    /// Compute (or reuse) exact compact polynomials for every circuit and
    /// populate the merged buffer.
    ///
    /// Only exact entries are reused. A circuit whose cached polynomials were
    /// pruned is recomputed and its entry replaced. The merged buffer is
    /// dropped up front, so a failed pass leaves it empty.
    pub fn cache_p_polys<C>(&mut self, calc: &C, comm: Option<&dyn DistContext>) -> Result<()>
    where
        C: TermCalculator + ?Sized,
    {
        self.merged = None;
        let mut per_slot: Vec<Option<Vec<CompactPoly>>> = vec![None; self.num_final_strs];
        let mut computed = 0usize;

        for (i, circuit) in self.final_slots_in_eval_order()? {
            let exact = self.poly_cache.get(&circuit).filter(|e| e.threshold.is_none());
            let polys = match exact {
                Some(entry) => entry.polys.clone(),
                None => {
                    let prep = circuit.prep_label().ok_or(Error::MissingPrep(i))?;
                    let polys =
                        calc.prs_as_compact_polys(prep, &self.elabels[i], circuit.op_string(), comm)?;
                    self.check_poly_count(i, polys.len())?;
                    self.poly_cache.insert(
                        circuit,
                        PolyCacheEntry {
                            threshold: None,
                            polys: polys.clone(),
                        },
                    );
                    computed += 1;
                    polys
                }
            };
            per_slot[i] = Some(polys);
        }

        self.merge_slot_polys(per_slot)?;
        emit_span(
            "cache_p_polys",
            &[
                ("circuits", self.num_final_strs.to_string()),
                ("computed", computed.to_string()),
            ],
        );
        Ok(())
    }

    /// Differentiate the merged buffer with respect to `wrt_params`.
    pub fn merged_deriv(&self, deriv: &dyn CompactDeriv, wrt_params: &[usize]) -> Result<CompactPoly> {
        let merged = self
            .merged
            .as_ref()
            .ok_or_else(|| Error::Usage("polynomial cache has not been populated".into()))?;
        deriv.compact_deriv(merged.vtape(), merged.ctape(), wrt_params)
    }
}
