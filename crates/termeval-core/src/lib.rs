#![forbid(unsafe_code)]
//! termeval-core: shared types for term-based circuit evaluation trees.
//!
//! Holds circuits and tree entries, compact polynomial tapes, configuration,
//! manifests, and the collaborator traits (calculator, distributed context).
//! **No planning logic** here; `termeval-tree` builds on these types.

pub mod calc;
pub mod circuit;
pub mod comm;
pub mod config;
pub mod error;
pub mod hash;
pub mod id;
pub mod manifest;
pub mod poly;
pub mod prelude;

pub use error::{Error, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
