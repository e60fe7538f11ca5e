//! Delivery dispatcher
//!
//! Drives the broker consumer: decodes each delivery into a job, spawns
//! one coordinator per job, and serializes every ack/nack decision back
//! onto the broker channel. The broker-side prefetch window is the only
//! back-pressure mechanism; the dispatcher never pulls beyond it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use zoo_common::Result;

use crate::broker::{BrokerChannel, Delivery};
use crate::config::ZooConfig;
use crate::coordinator::{AckDecision, CoordinatorSettings, JobCoordinator, JobEvent};
use crate::messages::JobDescriptor;
use crate::publisher::Publisher;
use crate::work::encoding::EndpointPools;

/// Long-lived dispatcher: one per process
pub struct Dispatcher {
    channel: Arc<dyn BrokerChannel>,
    publisher: Publisher,
    pools: EndpointPools,
    download_dir: PathBuf,
    task_timeout: Duration,
    settings: CoordinatorSettings,
    /// Event sender of each live coordinator, keyed by delivery tag.
    /// Exactly one coordinator exists per outstanding tag.
    coordinators: HashMap<u64, mpsc::Sender<JobEvent>>,
}

impl Dispatcher {
    pub fn new(channel: Arc<dyn BrokerChannel>, publisher: Publisher, config: &ZooConfig) -> Self {
        Self {
            channel,
            publisher,
            pools: config.enrichers.clone(),
            download_dir: config.download_directory.clone(),
            task_timeout: Duration::from_secs(config.limits.task_timeout_secs),
            settings: CoordinatorSettings {
                deadline: Duration::from_secs(config.limits.job_deadline_secs),
                connect_timeout: Duration::from_millis(config.limits.http_connect_timeout_ms),
                download_timeout: Duration::from_millis(config.limits.download_timeout_ms),
            },
            coordinators: HashMap::new(),
        }
    }

    /// Consume deliveries until the stream ends, then settle what is left
    pub async fn run(mut self, mut deliveries: mpsc::Receiver<Delivery>) -> Result<()> {
        let (ack_tx, mut ack_rx) = mpsc::channel::<AckDecision>(64);

        loop {
            tokio::select! {
                maybe = deliveries.recv() => match maybe {
                    Some(delivery) => self.accept(delivery, &ack_tx).await,
                    None => break,
                },
                Some(decision) = ack_rx.recv() => self.settle(decision).await,
            }
        }

        info!(
            outstanding = self.coordinators.len(),
            "Delivery stream ended, draining in-flight jobs"
        );

        // every coordinator resolves within its deadline; wait at most that
        // long for the remaining decisions
        let drain_deadline = self.settings.deadline + Duration::from_secs(5);
        while !self.coordinators.is_empty() {
            match tokio::time::timeout(drain_deadline, ack_rx.recv()).await {
                Ok(Some(decision)) => self.settle(decision).await,
                Ok(None) | Err(_) => break,
            }
        }

        Ok(())
    }

    /// Decode one delivery and start its coordinator
    async fn accept(&mut self, delivery: Delivery, ack_tx: &mpsc::Sender<AckDecision>) {
        let descriptor = match JobDescriptor::decode(&delivery.body) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!(
                    tag = delivery.tag,
                    error = %e,
                    "Delivery is not a job descriptor, forwarding on the misbehave key"
                );
                if let Err(e) = self.publisher.publish_misbehave(&delivery.body).await {
                    error!(tag = delivery.tag, error = %e, "Misbehave publish failed");
                }
                // settle the tag so a poison message cannot wedge the
                // prefetch window
                if let Err(e) = self.channel.ack(delivery.tag).await {
                    error!(tag = delivery.tag, error = %e, "Broker ack failed");
                }
                return;
            },
        };

        if self.coordinators.contains_key(&delivery.tag) {
            error!(tag = delivery.tag, "Duplicate delivery tag, dropping");
            return;
        }

        let artifact_id = Uuid::new_v4();
        let work = self.pools.enumerate(
            delivery.tag,
            artifact_id,
            &descriptor.tasks,
            self.task_timeout,
        );
        if !work.dropped.is_empty() {
            warn!(
                tag = delivery.tag,
                dropped = ?work.dropped,
                "Task kinds without a configured enricher were dropped"
            );
        }

        debug!(
            tag = delivery.tag,
            artifact_id = %artifact_id,
            filename = %descriptor.filename,
            tasks = work.tasks.len(),
            attempts = descriptor.attempts,
            "Job accepted"
        );

        match JobCoordinator::spawn(
            delivery.tag,
            descriptor,
            artifact_id,
            work.tasks,
            self.publisher.clone(),
            ack_tx.clone(),
            self.download_dir.clone(),
            self.settings.clone(),
        ) {
            Ok((events_tx, _handle)) => {
                self.coordinators.insert(delivery.tag, events_tx);
            },
            Err(e) => {
                error!(tag = delivery.tag, error = %e, "Could not start coordinator");
                if let Err(e) = self.channel.nack_requeue(delivery.tag).await {
                    error!(tag = delivery.tag, error = %e, "Broker nack failed");
                }
            },
        }
    }

    /// Apply one ack/nack decision on the broker, then release the tag
    async fn settle(&mut self, decision: AckDecision) {
        let tag = decision.tag();
        match decision {
            AckDecision::Ack(tag) => {
                if let Err(e) = self.channel.ack(tag).await {
                    error!(tag, error = %e, "Broker ack failed");
                }
                // let the coordinator observe the completed ack round-trip
                if let Some(events_tx) = self.coordinators.get(&tag) {
                    if events_tx.send(JobEvent::ConsumerAckDone).await.is_err() {
                        debug!(tag, "Coordinator already terminated");
                    }
                }
            },
            AckDecision::Nack(tag) => {
                if let Err(e) = self.channel.nack_requeue(tag).await {
                    error!(tag, error = %e, "Broker nack failed");
                }
            },
        }
        self.coordinators.remove(&tag);
    }
}
