//! Compact polynomial tapes.
//!
//! A compact polynomial is a pair of flat tapes: a variable tape (monomial
//! exponent / variable-index data) and a complex coefficient tape. Tapes carry
//! no length headers, so several polynomials concatenate without re-encoding;
//! boundaries travel out-of-band in [`TapeBounds`].

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::ops::Range;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompactPoly {
    pub vtape: Vec<i64>,
    pub ctape: Vec<Complex64>,
}

impl CompactPoly {
    pub fn new(vtape: Vec<i64>, ctape: Vec<Complex64>) -> Self {
        Self { vtape, ctape }
    }

    pub fn is_empty(&self) -> bool {
        self.vtape.is_empty() && self.ctape.is_empty()
    }
}

/// Where one polynomial sits inside a merged tape pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapeBounds {
    pub vtape: Range<usize>,
    pub ctape: Range<usize>,
}

/// The tree-wide merged buffer: every element polynomial, in linear
/// evaluation order, concatenated into one tape pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedPolys {
    pub tapes: CompactPoly,
    pub bounds: Vec<TapeBounds>,
}

impl MergedPolys {
    /// Concatenate polynomials in iteration order.
    pub fn concat<'a, I>(polys: I) -> Self
    where
        I: IntoIterator<Item = &'a CompactPoly>,
    {
        let mut merged = MergedPolys::default();
        for p in polys {
            merged.push(p);
        }
        merged
    }

    pub fn push(&mut self, p: &CompactPoly) {
        let v0 = self.tapes.vtape.len();
        let c0 = self.tapes.ctape.len();
        self.tapes.vtape.extend_from_slice(&p.vtape);
        self.tapes.ctape.extend_from_slice(&p.ctape);
        self.bounds.push(TapeBounds {
            vtape: v0..self.tapes.vtape.len(),
            ctape: c0..self.tapes.ctape.len(),
        });
    }

    /// Number of polynomials (final elements) in the buffer.
    pub fn num_polys(&self) -> usize {
        self.bounds.len()
    }

    /// Borrow the tapes of the `i`-th polynomial.
    pub fn poly(&self, i: usize) -> Option<(&[i64], &[Complex64])> {
        let b = self.bounds.get(i)?;
        Some((
            &self.tapes.vtape[b.vtape.clone()],
            &self.tapes.ctape[b.ctape.clone()],
        ))
    }

    pub fn vtape(&self) -> &[i64] {
        &self.tapes.vtape
    }

    pub fn ctape(&self) -> &[Complex64] {
        &self.tapes.ctape
    }
}
