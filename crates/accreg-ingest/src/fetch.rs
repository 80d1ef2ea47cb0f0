//! Registry archive download

use crate::config::{IngestConfig, DOWNLOAD_CHUNK_SIZE};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{error, info, warn};

const USER_AGENT: &str = concat!("accreg-ingest/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Source URL is not configured")]
    NotConfigured,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {url}")]
    Status { url: String, status: StatusCode },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Streams the source archive into the cache directory.
pub struct Fetcher {
    client: Client,
    config: IngestConfig,
}

impl Fetcher {
    pub fn new(config: IngestConfig) -> Result<Self, FetchError> {
        // Bounds each connect and each read, not the whole transfer.
        let client = Client::builder()
            .connect_timeout(config.fetch_timeout())
            .read_timeout(config.fetch_timeout())
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client, config })
    }

    /// Download the configured archive to `cache_dir/<last url segment>`.
    ///
    /// Creates the cache directory when missing. A failed download leaves no
    /// partial file behind.
    pub async fn download(&self) -> Result<PathBuf, FetchError> {
        if !self.config.is_source_configured() {
            warn!("Source URL is not configured, skipping download");
            return Err(FetchError::NotConfigured);
        }

        tokio::fs::create_dir_all(self.config.cache_dir()).await?;

        let target = self.config.archive_path();
        match self.download_to(&self.config.source_url, &target).await {
            Ok(bytes) => {
                info!(path = %target.display(), bytes, "Archive downloaded");
                Ok(target)
            },
            Err(e) => {
                error!(url = %self.config.source_url, error = %e, "Download failed");
                if let Err(remove_err) = tokio::fs::remove_file(&target).await {
                    if remove_err.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %target.display(), error = %remove_err, "Could not remove partial download");
                    }
                }
                Err(e)
            },
        }
    }

    async fn download_to(&self, url: &str, output_path: &Path) -> Result<u64, FetchError> {
        info!(url = %url, "Downloading registry archive");

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }

        let pb = progress_bar(response.content_length(), output_path);

        let file = tokio::fs::File::create(output_path).await?;
        let mut writer = BufWriter::with_capacity(DOWNLOAD_CHUNK_SIZE, file);
        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            pb.set_position(downloaded);
        }
        writer.flush().await?;

        pb.finish_and_clear();
        Ok(downloaded)
    }
}

fn progress_bar(total: Option<u64>, output_path: &Path) -> ProgressBar {
    let pb = match total {
        Some(len) => ProgressBar::new(len),
        None => ProgressBar::new_spinner(),
    };
    let style = ProgressStyle::default_bar()
        .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);

    let name = output_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    pb.set_message(format!("Downloading {name}"));
    pb
}
