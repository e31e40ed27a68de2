//! Circuits, tree entries, and the index maps that tie sub-trees to parents.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

/// An operation or outcome label (e.g. `"Gx"`, `"rho0"`, `"0"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(String);

impl Label {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Label {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable sequence of labels. The first label is the preparation
/// label; the remainder is the operation string.
///
/// Equality and hashing are structural, so a `Circuit` is its own cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Circuit(Vec<Label>);

impl Circuit {
    pub fn new(labels: Vec<Label>) -> Self {
        Self(labels)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn labels(&self) -> &[Label] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn prep_label(&self) -> Option<&Label> {
        self.0.first()
    }

    pub fn op_string(&self) -> &[Label] {
        self.0.get(1..).unwrap_or(&[])
    }

    /// `self` followed by `suffix`.
    pub fn extended(&self, suffix: &[Label]) -> Self {
        let mut labels = Vec::with_capacity(self.0.len() + suffix.len());
        labels.extend_from_slice(&self.0);
        labels.extend_from_slice(suffix);
        Self(labels)
    }
}

impl<S: Into<Label>> FromIterator<S> for Circuit {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, l) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{l}")?;
        }
        write!(f, ")")
    }
}

/// Build instruction for one tree slot.
///
/// The circuit at this slot is the circuit held in reuse-cache slot `start`
/// (or the empty circuit) followed by `remainder`. When `cache_slot` is set
/// the result is stored there for later entries to extend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub start: Option<usize>,
    pub remainder: Vec<Label>,
    pub cache_slot: Option<usize>,
}

impl Entry {
    /// An entry that builds `circuit` from scratch and caches nothing.
    pub fn standalone(circuit: &Circuit) -> Self {
        Self {
            start: None,
            remainder: circuit.labels().to_vec(),
            cache_slot: None,
        }
    }
}

/// A "slice or index array" into some flat index space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexMap {
    Slice(Range<usize>),
    Indices(Vec<usize>),
}

impl IndexMap {
    /// Collapse a contiguous ascending run to a slice; keep anything else as-is.
    pub fn from_indices(indices: Vec<usize>) -> Self {
        let contiguous = indices.windows(2).all(|w| w[1] == w[0] + 1);
        match (contiguous, indices.first()) {
            (true, Some(&first)) => IndexMap::Slice(first..first + indices.len()),
            (true, None) => IndexMap::Slice(0..0),
            (false, _) => IndexMap::Indices(indices),
        }
    }

    pub fn indices(&self) -> Vec<usize> {
        match self {
            IndexMap::Slice(r) => r.clone().collect(),
            IndexMap::Indices(v) => v.clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            IndexMap::Slice(r) => r.len(),
            IndexMap::Indices(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Original circuit index → final-element indices of that circuit.
pub type ElIndices = BTreeMap<usize, IndexMap>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prep_and_op_string() {
        let c: Circuit = ["rho0", "Gx", "Gy"].into_iter().collect();
        assert_eq!(c.prep_label().map(Label::as_str), Some("rho0"));
        assert_eq!(c.op_string(), &[Label::from("Gx"), Label::from("Gy")]);
        assert!(Circuit::empty().op_string().is_empty());
        assert_eq!(c.to_string(), "(rho0,Gx,Gy)");
    }

    #[test]
    fn index_map_collapses_contiguous_runs() {
        assert_eq!(IndexMap::from_indices(vec![4, 5, 6]), IndexMap::Slice(4..7));
        assert_eq!(
            IndexMap::from_indices(vec![4, 6]),
            IndexMap::Indices(vec![4, 6])
        );
        assert_eq!(IndexMap::Slice(2..4).indices(), vec![2, 3]);
        assert!(IndexMap::from_indices(vec![]).is_empty());
    }
}
