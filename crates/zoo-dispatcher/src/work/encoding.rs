//! Work enumeration and routing-key encoding
//!
//! Maps the symbolic task names of an inbound job onto concrete work
//! tasks, pulling one endpoint uniformly at random from the configured
//! pool for each kind.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

use super::{WorkKind, WorkTask};

/// One kind's endpoint pool, from `zoo.enrichers.<kind>.uri`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointPool {
    pub uri: Vec<String>,
}

impl EndpointPool {
    pub fn new(uri: Vec<String>) -> Self {
        Self { uri }
    }
}

/// Enricher base URLs per task kind, from `zoo.enrichers.*`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointPools {
    pub metadata: EndpointPool,
    pub yara: EndpointPool,
    pub vtsample: EndpointPool,
    pub assemblyapp: EndpointPool,
}

/// Result of enumerating one job's task map
#[derive(Debug, Clone)]
pub struct EnumeratedWork {
    /// Tasks that will actually run
    pub tasks: Vec<WorkTask>,
    /// Kinds that were dropped: unknown names, or names without a
    /// configured endpoint pool
    pub dropped: Vec<String>,
}

impl EndpointPools {
    /// The configured pool for one kind
    pub fn pool(&self, kind: WorkKind) -> &[String] {
        match kind {
            WorkKind::Metadata => &self.metadata.uri,
            WorkKind::Yara => &self.yara.uri,
            WorkKind::VtSample => &self.vtsample.uri,
            WorkKind::AssemblyApp => &self.assemblyapp.uri,
        }
    }

    pub fn is_empty(&self) -> bool {
        WorkKind::all().iter().all(|kind| self.pool(*kind).is_empty())
    }

    /// Build the work tasks for one job
    ///
    /// The task map is partitioned up front: recognized kinds with a
    /// non-empty pool become tasks, everything else lands in `dropped`.
    /// Endpoint selection is uniform random per task from a thread-local
    /// RNG, so parallel coordinators never share seeding.
    pub fn enumerate(
        &self,
        job_key: u64,
        artifact_id: Uuid,
        tasks: &BTreeMap<String, Vec<String>>,
        timeout: Duration,
    ) -> EnumeratedWork {
        let mut rng = rand::thread_rng();
        let mut supported = Vec::new();
        let mut dropped = Vec::new();

        for (name, arguments) in tasks {
            let endpoint = WorkKind::from_wire(name)
                .and_then(|kind| self.pool(kind).choose(&mut rng).map(|url| (kind, url)));

            match endpoint {
                Some((kind, url)) => supported.push(WorkTask {
                    job_key,
                    artifact_id,
                    timeout,
                    kind,
                    endpoint: url.clone(),
                    arguments: arguments.clone(),
                }),
                None => dropped.push(name.clone()),
            }
        }

        EnumeratedWork {
            tasks: supported,
            dropped,
        }
    }
}

/// Publish routing key for one successful task kind
pub fn routing_key(kind: WorkKind) -> String {
    format!("{}.result.static.zoo", kind.pool_name())
}
