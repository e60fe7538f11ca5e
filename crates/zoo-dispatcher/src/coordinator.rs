//! Per-job coordination engine
//!
//! One `JobCoordinator` owns a single job from the moment its message is
//! pulled off the broker until the delivery tag is settled and every
//! temporary resource is released. The coordinator is event-driven: the
//! download, the fan-out workers, the publisher confirmations, and the
//! dispatcher's ack signal all post `JobEvent`s into a private channel,
//! and a five-flag standoff barrier decides when the job may terminate.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use zoo_common::digest::ArtifactDigests;

use crate::download::{DownloadOutcome, Downloader};
use crate::messages::{JobDescriptor, ResultPackage};
use crate::publisher::Publisher;
use crate::work::{WorkFailure, WorkResult, WorkSuccess, WorkTask};

/// Grace period for the forced publishes during eviction
const EVICTION_PUBLISH_GRACE: Duration = Duration::from_secs(5);

/// Ack/nack decision a coordinator sends to the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    Ack(u64),
    Nack(u64),
}

impl AckDecision {
    pub fn tag(&self) -> u64 {
        match self {
            AckDecision::Ack(tag) | AckDecision::Nack(tag) => *tag,
        }
    }
}

/// Events driving one coordinator's state machine
#[derive(Debug)]
pub enum JobEvent {
    DownloadOk {
        path: PathBuf,
        digests: ArtifactDigests,
    },
    DownloadFailed {
        reason: String,
    },
    /// One fan-out worker reported back
    WorkFinished {
        index: usize,
        result: WorkResult,
    },
    /// Publisher confirmation for the success bundle
    ResultPublished,
    /// Publisher confirmation for the re-queue bundle
    RemainderPublished,
    /// The dispatcher finished the broker ack for this tag
    ConsumerAckDone,
}

/// The per-job completion barrier
///
/// Each flag latches to true exactly once. `local` covers the coordinator's
/// own work (download + fan-out), `result` and `remainder` the two publish
/// confirmations, `consumer` the broker ack round-trip, and `nack` marks an
/// unrecoverable job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Standoff {
    pub local: bool,
    pub result: bool,
    pub remainder: bool,
    pub consumer: bool,
    pub nack: bool,
}

impl Standoff {
    /// Local work and both publishes done, broker ack still outstanding
    pub fn ack_ready(&self) -> bool {
        self.local && self.result && self.remainder && !self.consumer
    }

    /// The job is unrecoverable and the dispatcher has been told to nack
    pub fn nack_ready(&self) -> bool {
        self.local && self.nack
    }

    /// Every required flag observed; resources can be released
    pub fn resolved(&self) -> bool {
        self.local && self.result && self.remainder && self.consumer
    }
}

/// Timeouts one coordinator operates under
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Wall-clock deadline for the whole job
    pub deadline: Duration,
    /// HTTP connect timeout for downloads and enricher calls
    pub connect_timeout: Duration,
    /// HTTP request timeout for the artifact download
    pub download_timeout: Duration,
}

/// Per-message state machine owning one job end-to-end
pub struct JobCoordinator {
    tag: u64,
    descriptor: JobDescriptor,
    artifact_id: Uuid,
    work_tasks: Arc<Vec<WorkTask>>,
    publisher: Publisher,
    ack_tx: mpsc::Sender<AckDecision>,
    download_dir: PathBuf,
    settings: CoordinatorSettings,
    client: reqwest::Client,

    standoff: Standoff,
    ack_sent: bool,
    temp_path: Option<PathBuf>,
    digests: Option<ArtifactDigests>,
    successes: Vec<WorkSuccess>,
    failures: Vec<WorkFailure>,
    reported: Vec<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl JobCoordinator {
    /// Start a coordinator for one delivery
    ///
    /// Returns the event sender the dispatcher uses to signal
    /// `ConsumerAckDone`, and the join handle of the coordinator task.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        tag: u64,
        descriptor: JobDescriptor,
        artifact_id: Uuid,
        work_tasks: Vec<WorkTask>,
        publisher: Publisher,
        ack_tx: mpsc::Sender<AckDecision>,
        download_dir: PathBuf,
        settings: CoordinatorSettings,
    ) -> zoo_common::Result<(mpsc::Sender<JobEvent>, JoinHandle<()>)> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|e| zoo_common::ZooError::config(
                format!("could not build the enricher HTTP client: {}", e),
                "Check the TLS backend and timeout settings.",
            ))?;

        let task_count = work_tasks.len();
        let coordinator = Self {
            tag,
            descriptor,
            artifact_id,
            work_tasks: Arc::new(work_tasks),
            publisher,
            ack_tx,
            download_dir,
            settings,
            client,
            standoff: Standoff::default(),
            ack_sent: false,
            temp_path: None,
            digests: None,
            successes: Vec::new(),
            failures: Vec::new(),
            reported: vec![false; task_count],
            workers: Vec::new(),
        };

        // capacity covers every worker reporting at once plus the control
        // events, so no sender ever parks for long
        let (events_tx, events_rx) = mpsc::channel(task_count + 8);
        let loop_tx = events_tx.clone();
        let handle = tokio::spawn(coordinator.run(events_rx, loop_tx));

        Ok((events_tx, handle))
    }

    async fn run(mut self, mut events: mpsc::Receiver<JobEvent>, events_tx: mpsc::Sender<JobEvent>) {
        info!(
            tag = self.tag,
            artifact_id = %self.artifact_id,
            filename = %self.descriptor.filename,
            tasks = self.work_tasks.len(),
            "Coordinator started"
        );

        let deadline = tokio::time::sleep(self.settings.deadline);
        tokio::pin!(deadline);

        self.start_download(events_tx.clone());

        loop {
            tokio::select! {
                () = &mut deadline => {
                    warn!(tag = self.tag, "Job deadline exceeded, forcing eviction");
                    self.force_evict().await;
                    break;
                },
                maybe = events.recv() => match maybe {
                    Some(event) => self.handle(event, &events_tx).await,
                    None => break,
                },
            }

            if self.standoff.nack_ready() {
                debug!(tag = self.tag, "Job unrecoverable, terminating");
                break;
            }

            self.maybe_ack().await;

            if self.standoff.resolved() {
                self.cleanup().await;
                break;
            }
        }

        debug!(tag = self.tag, standoff = ?self.standoff, "Coordinator terminated");
    }

    async fn handle(&mut self, event: JobEvent, events_tx: &mpsc::Sender<JobEvent>) {
        match event {
            JobEvent::DownloadFailed { reason } => {
                error!(
                    tag = self.tag,
                    filename = %self.descriptor.filename,
                    reason = %reason,
                    "Artifact download failed, job will be re-queued by the broker"
                );
                self.standoff.local = true;
                self.standoff.nack = true;
                if self.ack_tx.send(AckDecision::Nack(self.tag)).await.is_err() {
                    warn!(tag = self.tag, "Dispatcher gone while signalling nack");
                }
            },
            JobEvent::DownloadOk { path, digests } => {
                debug!(tag = self.tag, path = %path.display(), "Artifact downloaded");
                self.temp_path = Some(path);
                self.digests = Some(digests);
                if self.work_tasks.is_empty() {
                    self.finalize(events_tx).await;
                } else {
                    self.start_fan_out(events_tx.clone());
                }
            },
            JobEvent::WorkFinished { index, result } => {
                if let Some(flag) = self.reported.get_mut(index) {
                    *flag = true;
                }
                match result {
                    WorkResult::Success(success) => self.successes.push(success),
                    WorkResult::Failure(failure) => {
                        debug!(
                            tag = self.tag,
                            kind = %failure.kind,
                            reason = %failure.data,
                            "Work task failed"
                        );
                        self.failures.push(failure);
                    },
                }
                if self.reported.iter().all(|done| *done) {
                    self.finalize(events_tx).await;
                }
            },
            JobEvent::ResultPublished => self.standoff.result = true,
            JobEvent::RemainderPublished => self.standoff.remainder = true,
            JobEvent::ConsumerAckDone => self.standoff.consumer = true,
        }
    }

    /// Kick off the artifact download in its own task
    fn start_download(&self, events_tx: mpsc::Sender<JobEvent>) {
        let downloader = Downloader::new(
            self.download_dir.clone(),
            self.settings.connect_timeout,
            self.settings.download_timeout,
        );
        let primary = self.descriptor.primary_uri.clone();
        let secondary = self.descriptor.secondary_uri.clone();
        let filename = self.descriptor.filename.clone();

        tokio::spawn(async move {
            let event = match downloader {
                Ok(downloader) => match downloader.download(&primary, &secondary, &filename).await {
                    DownloadOutcome::Complete { path, digests } => {
                        JobEvent::DownloadOk { path, digests }
                    },
                    DownloadOutcome::Failed { reason } => JobEvent::DownloadFailed { reason },
                },
                Err(e) => JobEvent::DownloadFailed {
                    reason: e.to_string(),
                },
            };
            let _ = events_tx.send(event).await;
        });
    }

    /// Launch every work task concurrently
    fn start_fan_out(&mut self, events_tx: mpsc::Sender<JobEvent>) {
        let work_tasks = Arc::clone(&self.work_tasks);
        for (index, task) in work_tasks.iter().enumerate() {
            let task = task.clone();
            let client = self.client.clone();
            let tx = events_tx.clone();
            self.workers.push(tokio::spawn(async move {
                let result = task.run(&client).await;
                let _ = tx.send(JobEvent::WorkFinished { index, result }).await;
            }));
        }
    }

    /// All task outcomes observed: split, publish, and mark local
    async fn finalize(&mut self, events_tx: &mpsc::Sender<JobEvent>) {
        self.standoff.local = true;
        info!(
            tag = self.tag,
            artifact_id = %self.artifact_id,
            successes = self.successes.len(),
            failures = self.failures.len(),
            "Fan-out complete"
        );

        match self.result_package() {
            Some(package) => {
                let publisher = self.publisher.clone();
                let tx = events_tx.clone();
                let tag = self.tag;
                tokio::spawn(async move {
                    if let Err(e) = publisher.publish_results(&package).await {
                        error!(tag, error = %e, "Result publish failed");
                    }
                    let _ = tx.send(JobEvent::ResultPublished).await;
                });
            },
            None => self.standoff.result = true,
        }

        match self.requeue_descriptor() {
            Some(descriptor) => {
                let publisher = self.publisher.clone();
                let tx = events_tx.clone();
                let tag = self.tag;
                tokio::spawn(async move {
                    if let Err(e) = publisher.publish_requeue(&descriptor).await {
                        error!(tag, error = %e, "Re-queue publish failed");
                    }
                    let _ = tx.send(JobEvent::RemainderPublished).await;
                });
            },
            None => self.standoff.remainder = true,
        }
    }

    /// The success bundle, if there is anything to publish
    fn result_package(&self) -> Option<ResultPackage> {
        if self.successes.is_empty() {
            return None;
        }
        let digests = self.digests.clone()?;
        Some(ResultPackage {
            artifact_id: self.artifact_id,
            successes: self.successes.clone(),
            digests,
        })
    }

    /// The merged descriptor of failed tasks, if any failed
    fn requeue_descriptor(&self) -> Option<JobDescriptor> {
        if self.failures.is_empty() {
            return None;
        }
        let mut descriptor = self.descriptor.requeue_seed();
        for failure in &self.failures {
            descriptor.absorb_failure(failure.kind.wire_name(), &failure.arguments);
        }
        Some(descriptor)
    }

    /// Emit the ack decision exactly once when the barrier allows it
    async fn maybe_ack(&mut self) {
        if self.standoff.ack_ready() && !self.ack_sent {
            self.ack_sent = true;
            if self.ack_tx.send(AckDecision::Ack(self.tag)).await.is_err() {
                warn!(tag = self.tag, "Dispatcher gone while signalling ack");
            }
        }
    }

    /// Deadline expiry: close the barrier through the same publish path
    async fn force_evict(&mut self) {
        for handle in self.workers.drain(..) {
            handle.abort();
        }

        if self.standoff.nack_ready() {
            return;
        }

        if self.temp_path.is_none() {
            // the download never completed; nothing ran, nothing to clean
            self.standoff.local = true;
            self.standoff.nack = true;
            if self.ack_tx.send(AckDecision::Nack(self.tag)).await.is_err() {
                warn!(tag = self.tag, "Dispatcher gone while signalling nack");
            }
            return;
        }

        if !self.standoff.local {
            // tasks that never reported are re-queued like any failure
            let work_tasks = Arc::clone(&self.work_tasks);
            for (index, task) in work_tasks.iter().enumerate() {
                if !self.reported.get(index).copied().unwrap_or(true) {
                    self.failures.push(task.evicted());
                }
            }
            self.standoff.local = true;
        }

        if !self.standoff.result {
            if let Some(package) = self.result_package() {
                let publish = self.publisher.publish_results(&package);
                match tokio::time::timeout(EVICTION_PUBLISH_GRACE, publish).await {
                    Ok(Err(e)) => error!(tag = self.tag, error = %e, "Result publish failed"),
                    Err(_) => warn!(tag = self.tag, "Result publish timed out during eviction"),
                    Ok(Ok(())) => {},
                }
            }
            self.standoff.result = true;
        }

        if !self.standoff.remainder {
            if let Some(descriptor) = self.requeue_descriptor() {
                let publish = self.publisher.publish_requeue(&descriptor);
                match tokio::time::timeout(EVICTION_PUBLISH_GRACE, publish).await {
                    Ok(Err(e)) => error!(tag = self.tag, error = %e, "Re-queue publish failed"),
                    Err(_) => warn!(tag = self.tag, "Re-queue publish timed out during eviction"),
                    Ok(Ok(())) => {},
                }
            }
            self.standoff.remainder = true;
        }

        self.maybe_ack().await;
        self.cleanup().await;
    }

    /// Release per-job resources; runs exactly once, on the success path
    async fn cleanup(&mut self) {
        for handle in self.workers.drain(..) {
            handle.abort();
        }
        if let Some(path) = self.temp_path.take() {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(tag = self.tag, path = %path.display(), "Artifact deleted"),
                Err(e) => warn!(
                    tag = self.tag,
                    path = %path.display(),
                    error = %e,
                    "Could not delete artifact"
                ),
            }
        }
    }
}
