use thiserror::Error;

/// Canonical result for core and the planning crates.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Caller passed an argument combination the operation cannot honor.
    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Internal invariant failed: {0}")]
    Invariant(String),

    /// Errors raised by the external polynomial calculator are mapped here.
    #[error("Calculator error: {0}")]
    Calculator(String),

    #[error("circuit at slot {0} has no preparation label")]
    MissingPrep(usize),

    #[error("Hashing error: {0}")]
    Hash(String),

    #[error("Distributed context error: {0}")]
    Comm(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Hash(e.to_string())
    }
}
