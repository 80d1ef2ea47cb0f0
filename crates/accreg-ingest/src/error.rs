//! Errors that fail an ingestion run
//!
//! Stage-local failures that merely stop a run (download, extraction) have
//! their own types in `fetch` and `archive`; record-level problems in the XML
//! are skip reasons, not errors.

use accreg_common::AccregError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] AccregError),
}

impl IngestError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Common(AccregError::precondition(message))
    }

    pub fn constraint(table: &str, message: impl Into<String>) -> Self {
        Self::Common(AccregError::constraint(table, message))
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Common(AccregError::config(message))
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Common(AccregError::Precondition(_)))
    }

    /// Storage-class failure: the run's transaction has been rolled back.
    pub fn is_persistence(&self) -> bool {
        match self {
            Self::Database(_) => true,
            Self::Common(inner) => inner.is_persistence(),
            _ => false,
        }
    }
}
