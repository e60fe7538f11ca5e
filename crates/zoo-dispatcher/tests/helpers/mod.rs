//! Shared test helpers: an in-memory broker channel and small utilities

use async_trait::async_trait;
use serde_json::json;
use std::sync::Mutex;
use std::time::Duration;
use zoo_common::Result;
use zoo_dispatcher::broker::BrokerChannel;

/// In-memory broker channel recording every publish, ack, and nack
#[derive(Default)]
pub struct MemoryBroker {
    publishes: Mutex<Vec<(String, Vec<u8>)>>,
    acked: Mutex<Vec<u64>>,
    nacked: Mutex<Vec<u64>>,
    /// Flat operation log: `publish:<key>`, `ack:<tag>`, `nack:<tag>`
    operations: Mutex<Vec<String>>,
}

impl MemoryBroker {
    pub fn operations(&self) -> Vec<String> {
        self.operations.lock().unwrap().clone()
    }

    /// Every payload published under `routing_key`, in publish order
    pub fn published_on(&self, routing_key: &str) -> Vec<Vec<u8>> {
        self.publishes
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key == routing_key)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// All routing keys published to, in publish order
    pub fn routing_keys(&self) -> Vec<String> {
        self.publishes
            .lock()
            .unwrap()
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn acked(&self) -> Vec<u64> {
        self.acked.lock().unwrap().clone()
    }

    pub fn nacked(&self) -> Vec<u64> {
        self.nacked.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrokerChannel for MemoryBroker {
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> Result<()> {
        self.publishes
            .lock()
            .unwrap()
            .push((routing_key.to_string(), payload.to_vec()));
        self.operations
            .lock()
            .unwrap()
            .push(format!("publish:{}", routing_key));
        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> Result<()> {
        self.acked.lock().unwrap().push(delivery_tag);
        self.operations
            .lock()
            .unwrap()
            .push(format!("ack:{}", delivery_tag));
        Ok(())
    }

    async fn nack_requeue(&self, delivery_tag: u64) -> Result<()> {
        self.nacked.lock().unwrap().push(delivery_tag);
        self.operations
            .lock()
            .unwrap()
            .push(format!("nack:{}", delivery_tag));
        Ok(())
    }
}

/// Build an inbound work-message body
pub fn job_body(
    primary: &str,
    secondary: &str,
    filename: &str,
    tasks: &[(&str, &[&str])],
    attempts: u32,
) -> Vec<u8> {
    let tasks: serde_json::Map<String, serde_json::Value> = tasks
        .iter()
        .map(|(kind, arguments)| {
            (
                kind.to_string(),
                json!(arguments.iter().map(|a| a.to_string()).collect::<Vec<_>>()),
            )
        })
        .collect();

    serde_json::to_vec(&json!({
        "primaryURI": primary,
        "secondaryURI": secondary,
        "filename": filename,
        "tasks": tasks,
        "attempts": attempts,
    }))
    .unwrap()
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until(condition: impl Fn() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
