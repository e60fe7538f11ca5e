//! Inbound and outbound wire types
//!
//! The inbound work message and the re-queue message share one shape,
//! `JobDescriptor`. Successful analyses leave the process as one
//! `EnrichmentRecord` per success.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use zoo_common::digest::ArtifactDigests;

use crate::work::WorkSuccess;

/// One job as delivered on the work queue (and as re-published on the
/// re-queue key)
///
/// `attempts` is carried through unchanged on re-queue; bounding retries is
/// the upstream producer's responsibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    #[serde(rename = "primaryURI")]
    pub primary_uri: String,
    #[serde(rename = "secondaryURI")]
    pub secondary_uri: String,
    pub filename: String,
    /// Task kind (e.g. `YARA`) to per-kind argument strings
    pub tasks: BTreeMap<String, Vec<String>>,
    pub attempts: u32,
}

impl JobDescriptor {
    /// Decode a raw delivery body
    pub fn decode(body: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(body)
    }

    /// Empty re-queue descriptor carrying this job's identity
    pub fn requeue_seed(&self) -> Self {
        Self {
            primary_uri: self.primary_uri.clone(),
            secondary_uri: self.secondary_uri.clone(),
            filename: self.filename.clone(),
            tasks: BTreeMap::new(),
            attempts: self.attempts,
        }
    }

    /// Fold one failed task back into the descriptor
    ///
    /// Collisions on the same kind append into the argument list, so the
    /// merged map is insensitive to observation order up to argument
    /// ordering within a kind.
    pub fn absorb_failure(&mut self, kind: &str, arguments: &[String]) {
        self.tasks
            .entry(kind.to_string())
            .or_default()
            .extend(arguments.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Everything a job produced that is worth publishing
#[derive(Debug, Clone)]
pub struct ResultPackage {
    pub artifact_id: Uuid,
    pub successes: Vec<WorkSuccess>,
    pub digests: ArtifactDigests,
}

impl ResultPackage {
    /// The per-success documents this package serializes to
    pub fn records(&self) -> Vec<EnrichmentRecord> {
        self.successes
            .iter()
            .map(|success| EnrichmentRecord {
                artifact_id: self.artifact_id,
                md5: self.digests.md5.clone(),
                sha1: self.digests.sha1.clone(),
                sha256: self.digests.sha256.clone(),
                kind: success.kind.wire_name().to_string(),
                arguments: success.arguments.clone(),
                data: success.data.clone(),
            })
            .collect()
    }
}

/// Outbound result document, one per successful work task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    #[serde(rename = "artifactID")]
    pub artifact_id: Uuid,
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
    pub kind: String,
    pub arguments: Vec<String>,
    /// Raw enricher response body, passed through as a JSON string value
    pub data: String,
}
