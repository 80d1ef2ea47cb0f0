//! Accreditation registry ingestion
//!
//! Loads the published registry of state accreditation certificates (a ZIP
//! of large XML files) into a relational store of organizations, their
//! branches, specialty groups, specialties, regions and accredited programs.
//!
//! # Pipeline
//!
//! - [`fetch`]: streams the archive into the cache directory
//! - [`archive`]: validates and extracts it, purging XML from earlier runs
//! - [`parser`]: walks each XML file certificate by certificate
//! - [`reconcile`]: merges parsed records in one transaction, two passes
//! - [`orchestrator`]: runs the stages in order and decides when to stop
//!
//! # Example
//!
//! ```no_run
//! use accreg_ingest::{IngestConfig, MemoryStore, UpdateOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let orchestrator = UpdateOrchestrator::new(IngestConfig::from_env()?)?;
//!     let store = MemoryStore::new();
//!     let outcome = orchestrator.run_update(Some(&store)).await?;
//!     println!("success: {}", outcome.is_success());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod archive;
pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod reconcile;
pub mod region;
pub mod store;

pub use config::IngestConfig;
pub use error::{IngestError, Result};
pub use models::{OrganizationRecord, ProgramRecord};
pub use orchestrator::{StopReason, UpdateOrchestrator, UpdateOutcome};
pub use parser::{ParseSummary, RegistryParser};
pub use reconcile::{ReconcileStats, Reconciler};
pub use region::{AddressHeuristic, NoRegionFallback, RegionLocator};
pub use store::{ExecutionContext, MemoryStore, PgContext, Session};
