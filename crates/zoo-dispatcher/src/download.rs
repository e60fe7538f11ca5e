//! Artifact downloader
//!
//! Fetches the artifact behind a job's primary URI (falling back to the
//! secondary URI once), writes it to the download directory, and computes
//! the content digests downstream consumers key on.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use zoo_common::digest::ArtifactDigests;
use zoo_common::{Result, ZooError};

/// What one download attempt produced
///
/// Exactly one `Failed` reaches the coordinator when no bytes arrive,
/// regardless of how many URIs were tried.
#[derive(Debug, Clone)]
pub enum DownloadOutcome {
    Complete {
        path: PathBuf,
        digests: ArtifactDigests,
    },
    Failed {
        reason: String,
    },
}

/// HTTP client for fetching artifacts
pub struct Downloader {
    client: reqwest::Client,
    download_dir: PathBuf,
}

impl Downloader {
    /// Create a new downloader writing into `download_dir`
    pub fn new(
        download_dir: impl Into<PathBuf>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| ZooError::download("<client>", e.to_string()))?;

        Ok(Self {
            client,
            download_dir: download_dir.into(),
        })
    }

    /// Fetch the artifact and persist it under its filename
    pub async fn download(
        &self,
        primary: &str,
        secondary: &str,
        filename: &str,
    ) -> DownloadOutcome {
        let bytes = match self.fetch(primary).await {
            Ok(bytes) => bytes,
            Err(primary_reason) => {
                if secondary.is_empty() || secondary == primary {
                    return DownloadOutcome::Failed {
                        reason: primary_reason,
                    };
                }
                warn!(
                    primary = %primary,
                    reason = %primary_reason,
                    "Primary download failed, trying secondary URI"
                );
                match self.fetch(secondary).await {
                    Ok(bytes) => bytes,
                    Err(secondary_reason) => {
                        return DownloadOutcome::Failed {
                            reason: format!(
                                "primary: {}; secondary: {}",
                                primary_reason, secondary_reason
                            ),
                        }
                    },
                }
            },
        };

        let digests = ArtifactDigests::of(&bytes);
        let path = self.artifact_path(filename);

        match tokio::fs::write(&path, &bytes).await {
            Ok(()) => {
                debug!(path = %path.display(), size = bytes.len(), "Artifact written");
                DownloadOutcome::Complete { path, digests }
            },
            Err(e) => DownloadOutcome::Failed {
                reason: format!("could not write '{}': {}", path.display(), e),
            },
        }
    }

    async fn fetch(&self, uri: &str) -> std::result::Result<Vec<u8>, String> {
        let response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("HTTP status {}", response.status()));
        }

        let bytes = response.bytes().await.map_err(|e| e.to_string())?;
        Ok(bytes.to_vec())
    }

    /// Where an artifact with this filename lands on disk
    ///
    /// Only the final path component of `filename` is used, so a
    /// descriptor cannot steer writes outside the download directory.
    pub fn artifact_path(&self, filename: &str) -> PathBuf {
        let name = Path::new(filename)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| filename.to_string());
        self.download_dir.join(name)
    }
}
