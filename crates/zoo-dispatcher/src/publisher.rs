//! Outbound publication
//!
//! Serializes result packages and re-queue descriptors and publishes them
//! with the correct routing keys. Publish failures are logged and reported
//! to the caller; the coordinator's barrier advances either way, leaving
//! delivery guarantees to the broker.

use std::sync::Arc;
use tracing::{debug, warn};
use zoo_common::Result;

use crate::broker::BrokerChannel;
use crate::messages::{JobDescriptor, ResultPackage};

/// Publisher for result, re-queue, and misbehave messages
#[derive(Clone)]
pub struct Publisher {
    channel: Arc<dyn BrokerChannel>,
    requeue_key: String,
    misbehave_key: String,
}

impl Publisher {
    pub fn new(
        channel: Arc<dyn BrokerChannel>,
        requeue_key: impl Into<String>,
        misbehave_key: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            requeue_key: requeue_key.into(),
            misbehave_key: misbehave_key.into(),
        }
    }

    /// Publish one message per success in the package, each under its own
    /// per-kind routing key
    pub async fn publish_results(&self, package: &ResultPackage) -> Result<()> {
        for (success, record) in package.successes.iter().zip(package.records()) {
            let payload = serde_json::to_vec(&record)?;
            self.channel.publish(&success.routing_key, &payload).await?;
            debug!(
                artifact_id = %package.artifact_id,
                routing_key = %success.routing_key,
                "Result published"
            );
        }
        Ok(())
    }

    /// Publish the merged descriptor of failed tasks on the re-queue key
    pub async fn publish_requeue(&self, descriptor: &JobDescriptor) -> Result<()> {
        let payload = serde_json::to_vec(descriptor)?;
        self.channel.publish(&self.requeue_key, &payload).await?;
        debug!(
            filename = %descriptor.filename,
            kinds = descriptor.tasks.len(),
            "Unfinished tasks re-queued"
        );
        Ok(())
    }

    /// Forward a payload the system decoded but cannot process
    pub async fn publish_misbehave(&self, payload: &[u8]) -> Result<()> {
        warn!(size = payload.len(), "Forwarding unprocessable message");
        self.channel.publish(&self.misbehave_key, payload).await
    }
}
