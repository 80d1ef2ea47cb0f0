//! Loader configuration
//!
//! Read from the environment (with `.env` support). The source URL ships with
//! a placeholder value; while it is in place the loader treats every run as
//! "no update possible".

use accreg_common::{AccregError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Placeholder shipped in place of a real source URL.
pub const UNCONFIGURED_SOURCE_URL: &str = "URL_К_ДАННЫМ_РОСОБРНАДЗОРА";

/// Default cache directory for downloaded archives and extracted XML.
pub const DEFAULT_CACHE_PATH: &str = "./data_cache";

/// Archive name used when the URL has no usable last path segment.
pub const DEFAULT_ARCHIVE_NAME: &str = "data.zip";

/// Reserved for update tracking; nothing reads or writes it yet.
pub const METADATA_FILE_NAME: &str = "metadata.json";

pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 60;

/// Download write granularity.
pub const DOWNLOAD_CHUNK_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Source archive URL (`ROSOBRNADZOR_DATA_URL`)
    pub source_url: String,

    /// Cache directory (`DATA_CACHE_PATH`)
    pub cache_dir: PathBuf,

    /// Connect + read timeout for the download (`ACCREG_FETCH_TIMEOUT_SECS`)
    pub fetch_timeout_secs: u64,

    /// Stop parsing after this many records (`ACCREG_PARSE_LIMIT`)
    pub parse_limit: Option<usize>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source_url: UNCONFIGURED_SOURCE_URL.to_string(),
            cache_dir: PathBuf::from(DEFAULT_CACHE_PATH),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            parse_limit: None,
        }
    }
}

impl IngestConfig {
    pub fn new(source_url: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_url: source_url.into(),
            cache_dir: cache_dir.into(),
            ..Self::default()
        }
    }

    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            source_url: std::env::var("ROSOBRNADZOR_DATA_URL").unwrap_or(defaults.source_url),
            cache_dir: std::env::var("DATA_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            fetch_timeout_secs: std::env::var("ACCREG_FETCH_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.fetch_timeout_secs),
            parse_limit: std::env::var("ACCREG_PARSE_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn with_parse_limit(mut self, limit: usize) -> Self {
        self.parse_limit = Some(limit);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err(AccregError::config("cache directory cannot be empty"));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(AccregError::config("fetch timeout must be greater than 0"));
        }
        Ok(())
    }

    /// False while the URL is empty or still the shipped placeholder.
    pub fn is_source_configured(&self) -> bool {
        let url = self.source_url.trim();
        !url.is_empty() && url != UNCONFIGURED_SOURCE_URL
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// File name for the downloaded archive: the URL's last path segment.
    pub fn archive_file_name(&self) -> String {
        archive_name_from_url(&self.source_url)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.cache_dir.join(self.archive_file_name())
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.cache_dir.join(METADATA_FILE_NAME)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

fn archive_name_from_url(source_url: &str) -> String {
    let segment = url::Url::parse(source_url).ok().and_then(|url| {
        url.path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
            .filter(|name| !name.is_empty())
    });

    match segment {
        Some(name) => name,
        None => {
            warn!(
                source_url = %source_url,
                "Could not derive archive name from URL, using '{}'", DEFAULT_ARCHIVE_NAME
            );
            DEFAULT_ARCHIVE_NAME.to_string()
        },
    }
}
