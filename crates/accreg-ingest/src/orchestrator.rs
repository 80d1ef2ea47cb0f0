//! End-to-end update run
//!
//! ```text
//! CHECK_NEEDED ─▶ DOWNLOAD ─▶ [zip] PURGE_STALE_XML ─▶ EXTRACT ─▶ DELETE_ARCHIVE
//!                                                                    │
//!                                   DONE ◀── RECONCILE ◀── PARSE ◀───┘
//! ```
//!
//! Every stage before reconciliation can stop the run; a stop is logged with
//! its reason and leaves stored data untouched. Only reconciliation writes,
//! and it commits once.

use crate::archive;
use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::fetch::Fetcher;
use crate::parser::{ParseOutput, ParseSummary, RegistryParser};
use crate::reconcile::{ReconcileStats, Reconciler};
use crate::store::ExecutionContext;
use accreg_common::AccregError;
use serde::Serialize;
use std::path::Path;
use tracing::{error, info, warn};

/// Why a run ended before reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum StopReason {
    /// Source URL missing or still the placeholder
    Unconfigured,
    DownloadFailed(String),
    ExtractFailed(String),
    /// Parsing produced no organization records
    NothingParsed,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Unconfigured => write!(f, "source URL is not configured, no update needed"),
            StopReason::DownloadFailed(e) => write!(f, "download failed: {e}"),
            StopReason::ExtractFailed(e) => write!(f, "extraction failed: {e}"),
            StopReason::NothingParsed => write!(f, "no records parsed, nothing to load"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpdateOutcome {
    Completed {
        parse: ParseSummary,
        reconcile: ReconcileStats,
    },
    Stopped {
        #[serde(flatten)]
        reason: StopReason,
    },
}

impl UpdateOutcome {
    /// Coarse result for the trigger: a clean stop counts as success, a
    /// failed download or extraction does not.
    pub fn is_success(&self) -> bool {
        match self {
            UpdateOutcome::Completed { .. } => true,
            UpdateOutcome::Stopped { reason } => matches!(
                reason,
                StopReason::Unconfigured | StopReason::NothingParsed
            ),
        }
    }

    fn stopped(reason: StopReason) -> Self {
        if matches!(reason, StopReason::DownloadFailed(_) | StopReason::ExtractFailed(_)) {
            error!(reason = %reason, "Update stopped");
        } else {
            warn!(reason = %reason, "Update stopped");
        }
        UpdateOutcome::Stopped { reason }
    }
}

pub struct UpdateOrchestrator {
    config: IngestConfig,
    fetcher: Fetcher,
    reconciler: Reconciler,
}

impl UpdateOrchestrator {
    /// Validates the configuration and creates the cache directory.
    pub fn new(config: IngestConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(config.cache_dir())?;

        let fetcher = Fetcher::new(config.clone())
            .map_err(|e| AccregError::Network(e.to_string()))?;

        Ok(Self {
            config,
            fetcher,
            reconciler: Reconciler::default(),
        })
    }

    pub fn with_reconciler(mut self, reconciler: Reconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Run one full update against `ctx`.
    ///
    /// `Err` means the run failed after storage was involved (rolled back) or
    /// was started without an execution context. Stops are `Ok`.
    pub async fn run_update(&self, ctx: Option<&dyn ExecutionContext>) -> Result<UpdateOutcome> {
        let Some(ctx) = ctx else {
            error!("Update triggered without an execution context");
            return Err(IngestError::precondition("update requires an execution context"));
        };

        info!(source_url = %self.config.source_url, "Starting registry update");

        if !self.check_needed() {
            return Ok(UpdateOutcome::stopped(StopReason::Unconfigured));
        }

        let archive_path = match self.fetcher.download().await {
            Ok(path) => path,
            Err(e) => return Ok(UpdateOutcome::stopped(StopReason::DownloadFailed(e.to_string()))),
        };

        if archive::is_zip_path(&archive_path) {
            if let Err(reason) = self.unpack(&archive_path).await {
                return Ok(UpdateOutcome::stopped(reason));
            }
        } else {
            warn!(
                path = %archive_path.display(),
                "Downloaded file is not a ZIP archive, extraction skipped"
            );
        }

        let ParseOutput { records, summary } = self.parse().await?;
        if records.is_empty() {
            return Ok(UpdateOutcome::stopped(StopReason::NothingParsed));
        }

        let stats = self.reconciler.reconcile(Some(ctx), &records).await?;

        info!("Registry update finished");
        Ok(UpdateOutcome::Completed {
            parse: summary,
            reconcile: stats,
        })
    }

    /// Always true once a source is configured; there is no freshness check
    /// against previously loaded data yet.
    fn check_needed(&self) -> bool {
        self.config.is_source_configured()
    }

    async fn unpack(&self, archive_path: &Path) -> std::result::Result<(), StopReason> {
        let cache_dir = self.config.cache_dir();

        if let Err(e) = archive::purge_stale_xml(cache_dir) {
            warn!(dir = %cache_dir.display(), error = %e, "Could not purge stale XML");
        }

        archive::extract_zip(archive_path, cache_dir)
            .await
            .map_err(|e| StopReason::ExtractFailed(e.to_string()))?;

        archive::remove_archive(archive_path);
        Ok(())
    }

    async fn parse(&self) -> Result<ParseOutput> {
        let parser = match self.config.parse_limit {
            Some(limit) => RegistryParser::with_limit(limit),
            None => RegistryParser::new(),
        };
        let dir = self.config.cache_dir().to_path_buf();

        tokio::task::spawn_blocking(move || parser.parse_directory(&dir))
            .await
            .map_err(|e| AccregError::Parse(format!("parse task failed: {e}")).into())
    }
}
