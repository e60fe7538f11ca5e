//! Work tasks: one enricher invocation per configured task kind
//!
//! A work task knows how to call its enricher and how to classify the
//! reply. `run` never fails the future; every transport error and non-200
//! status is folded into a `WorkResult::Failure` so the barrier logic
//! upstream stays uniform.

pub mod encoding;

use std::time::Duration;
use uuid::Uuid;

/// Analyzer classes with a configured enricher pool
///
/// `HASHES` and `PEINFO` are valid wire names without a pool; `from_wire`
/// returns `None` for them and they are dropped during enumeration, like
/// any unknown kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkKind {
    Metadata,
    Yara,
    VtSample,
    AssemblyApp,
}

impl WorkKind {
    /// Parse a task-kind string from the inbound message
    pub fn from_wire(kind: &str) -> Option<Self> {
        match kind {
            "FILE_METADATA" => Some(WorkKind::Metadata),
            "YARA" => Some(WorkKind::Yara),
            "VTSAMPLE" => Some(WorkKind::VtSample),
            "ASSEMBLYAPP" => Some(WorkKind::AssemblyApp),
            _ => None,
        }
    }

    /// The kind's name on inbound messages and re-queue descriptors
    pub fn wire_name(&self) -> &'static str {
        match self {
            WorkKind::Metadata => "FILE_METADATA",
            WorkKind::Yara => "YARA",
            WorkKind::VtSample => "VTSAMPLE",
            WorkKind::AssemblyApp => "ASSEMBLYAPP",
        }
    }

    /// The kind's name in configuration and routing keys
    pub fn pool_name(&self) -> &'static str {
        match self {
            WorkKind::Metadata => "metadata",
            WorkKind::Yara => "yara",
            WorkKind::VtSample => "vtsample",
            WorkKind::AssemblyApp => "assemblyapp",
        }
    }

    /// All kinds with an enricher pool
    pub fn all() -> [WorkKind; 4] {
        [
            WorkKind::Metadata,
            WorkKind::Yara,
            WorkKind::VtSample,
            WorkKind::AssemblyApp,
        ]
    }
}

impl std::fmt::Display for WorkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}

/// One fan-out unit: a single enricher invocation for one artifact
#[derive(Debug, Clone)]
pub struct WorkTask {
    /// Broker delivery tag of the job this task belongs to
    pub job_key: u64,
    /// Fresh opaque identifier generated per job
    pub artifact_id: Uuid,
    pub timeout: Duration,
    pub kind: WorkKind,
    /// Concrete URL chosen from the endpoint pool for this kind
    pub endpoint: String,
    pub arguments: Vec<String>,
}

/// Outcome of one successful work task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkSuccess {
    pub kind: WorkKind,
    pub arguments: Vec<String>,
    pub routing_key: String,
    /// Raw enricher response body
    pub data: String,
}

/// Outcome of one failed work task
///
/// Failures carry no routing key; they travel on the configured re-queue
/// key as part of a merged descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkFailure {
    pub kind: WorkKind,
    pub arguments: Vec<String>,
    /// Human-readable classification of what went wrong
    pub data: String,
}

/// Outcome of one work task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkResult {
    Success(WorkSuccess),
    Failure(WorkFailure),
}

impl WorkResult {
    pub fn is_success(&self) -> bool {
        matches!(self, WorkResult::Success(_))
    }
}

impl WorkTask {
    /// The concrete request URL: endpoint base, then the artifact
    /// identifier, then each argument in order, with no separator
    pub fn request_url(&self) -> String {
        let mut url = format!("{}{}", self.endpoint, self.artifact_id);
        for argument in &self.arguments {
            url.push_str(argument);
        }
        url
    }

    /// Invoke the enricher and classify the reply
    pub async fn run(&self, client: &reqwest::Client) -> WorkResult {
        let url = self.request_url();
        tracing::debug!(kind = %self.kind, url = %url, "Dispatching work task");

        let response = client.get(&url).timeout(self.timeout).send().await;

        match response {
            Ok(response) => match response.status().as_u16() {
                200 => match response.text().await {
                    Ok(body) => self.success(body),
                    Err(e) => self.failure(format!("wildcard failure: {}", e)),
                },
                404 => self.failure("Not found (File already deleted?)".to_string()),
                500 => self.failure(format!("{} service failed, check local logs", self.kind)),
                code => self.failure(format!("Some other code: {}", code)),
            },
            Err(e) => self.failure(format!("wildcard failure: {}", e)),
        }
    }

    fn success(&self, data: String) -> WorkResult {
        WorkResult::Success(WorkSuccess {
            kind: self.kind,
            arguments: self.arguments.clone(),
            routing_key: encoding::routing_key(self.kind),
            data,
        })
    }

    fn failure(&self, data: String) -> WorkResult {
        WorkResult::Failure(WorkFailure {
            kind: self.kind,
            arguments: self.arguments.clone(),
            data,
        })
    }

    /// Failure for a task that never got to report (coordinator eviction)
    pub fn evicted(&self) -> WorkFailure {
        WorkFailure {
            kind: self.kind,
            arguments: self.arguments.clone(),
            data: "wildcard failure: evicted before completion".to_string(),
        }
    }
}
