//! Error types shared by the registry crates

use thiserror::Error;

/// Result type alias for registry operations
pub type Result<T> = std::result::Result<T, AccregError>;

/// Error taxonomy of an ingestion run.
///
/// Structural data problems (a certificate without an OGRN, a program without
/// a code) are not errors; they are skipped at record granularity and only
/// logged. Everything here either stops a run or fails it.
#[derive(Error, Debug)]
pub enum AccregError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing or placeholder settings; the run stops before touching anything.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An operation was invoked without what it needs to run at all.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    /// A unique or foreign-key rule rejected a write.
    #[error("Constraint violation on {table}: {message}")]
    Constraint { table: String, message: String },
}

impl AccregError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    pub fn constraint(table: &str, message: impl Into<String>) -> Self {
        Self::Constraint {
            table: table.to_string(),
            message: message.into(),
        }
    }

    /// Whether this error belongs to the persistence class (rolled back and
    /// reported as a failed run).
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Constraint { .. })
    }
}
