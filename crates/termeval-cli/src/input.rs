//! Circuit-list documents.
//!
//! Example:
//! ```yaml
//! circuits:
//!   - labels: ["rho0", "Gx"]
//!     outcomes: ["0", "1"]
//!   - labels: ["rho0", "Gx", "Gy"]
//!     outcomes: ["0", "1"]
//! ```
//!
//! JSON documents with the same shape are accepted when the file name ends
//! in `.json`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use termeval_core::circuit::{Circuit, Label};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitDoc {
    pub circuits: Vec<CircuitDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitDef {
    pub labels: Vec<String>,
    pub outcomes: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("invalid YAML circuit list: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid JSON circuit list: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parse a circuit list, choosing the format from `path`'s extension.
pub fn parse_circuits(path: &Path, src: &str) -> Result<Vec<(Circuit, Vec<Label>)>, InputError> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let doc: CircuitDoc = if is_json {
        serde_json::from_str(src)?
    } else {
        serde_yaml::from_str(src)?
    };
    Ok(doc
        .circuits
        .into_iter()
        .map(|c| {
            (
                c.labels.into_iter().collect::<Circuit>(),
                c.outcomes.into_iter().map(Label::from).collect(),
            )
        })
        .collect())
}
