//! Broker channel seam
//!
//! The coordination engine only needs three primitives from the broker:
//! publish, ack, and nack. They live behind `BrokerChannel` so the engine
//! can run against an in-memory fake in tests; `AmqpBroker` is the
//! production implementation on lapin.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use zoo_common::{Result, ZooError};

use crate::config::{QueueConfig, RabbitConfig};

/// One message pulled off the work queue
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Broker-assigned tag identifying this unacked message on the channel
    pub tag: u64,
    pub body: Vec<u8>,
}

/// The broker primitives the coordination engine depends on
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Publish a payload on the configured exchange under `routing_key`
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> Result<()>;

    /// Acknowledge a single delivery (`multiple = false`)
    async fn ack(&self, delivery_tag: u64) -> Result<()>;

    /// Negatively acknowledge a single delivery and re-queue it
    /// (`multiple = false`, `requeue = true`)
    async fn nack_requeue(&self, delivery_tag: u64) -> Result<()>;
}

/// AMQP broker binding: connection, topology declaration, consumption
pub struct AmqpBroker {
    // the connection must stay alive for the channel to remain usable
    _connection: Connection,
    channel: Channel,
    exchange: String,
}

impl AmqpBroker {
    /// Connect and declare the exchange, queues, bindings, and prefetch
    pub async fn connect(rabbit: &RabbitConfig, prefetch: u16) -> Result<Self> {
        let uri = rabbit.host.amqp_uri();
        info!(server = %rabbit.host.server, port = rabbit.host.port, "Connecting to broker");

        let connection = Connection::connect(&uri, ConnectionProperties::default())
            .await
            .map_err(|e| ZooError::broker("connect", e.to_string()))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| ZooError::broker("create_channel", e.to_string()))?;

        channel
            .exchange_declare(
                &rabbit.exchange.name,
                exchange_kind(&rabbit.exchange.kind),
                ExchangeDeclareOptions {
                    durable: rabbit.exchange.durable,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| ZooError::broker("exchange_declare", e.to_string()))?;

        let broker = Self {
            _connection: connection,
            channel,
            exchange: rabbit.exchange.name.clone(),
        };

        broker.declare_queue(&rabbit.workqueue).await?;
        broker.declare_queue(&rabbit.resultsqueue).await?;

        broker
            .channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| ZooError::broker("basic_qos", e.to_string()))?;

        info!(exchange = %rabbit.exchange.name, prefetch, "Broker topology declared");

        Ok(broker)
    }

    async fn declare_queue(&self, queue: &QueueConfig) -> Result<()> {
        self.channel
            .queue_declare(
                &queue.name,
                QueueDeclareOptions {
                    durable: queue.durable,
                    exclusive: queue.exclusive,
                    auto_delete: queue.autodelete,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| ZooError::broker("queue_declare", e.to_string()))?;

        self.channel
            .queue_bind(
                &queue.name,
                &self.exchange,
                &queue.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| ZooError::broker("queue_bind", e.to_string()))?;

        Ok(())
    }

    /// Start consuming the work queue
    ///
    /// Deliveries are pumped into an mpsc channel so the dispatcher never
    /// touches lapin types. The channel capacity matches the broker-side
    /// prefetch; the broker will not push past its own window anyway.
    pub async fn consume(&self, queue_name: &str, capacity: usize) -> Result<mpsc::Receiver<Delivery>> {
        let mut consumer = self
            .channel
            .basic_consume(
                queue_name,
                "zoo-dispatcher",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| ZooError::broker("basic_consume", e.to_string()))?;

        let (tx, rx) = mpsc::channel(capacity.max(1));

        tokio::spawn(async move {
            while let Some(delivery) = consumer.next().await {
                match delivery {
                    Ok(delivery) => {
                        let delivery = Delivery {
                            tag: delivery.delivery_tag,
                            body: delivery.data,
                        };
                        if tx.send(delivery).await.is_err() {
                            // dispatcher gone, stop pumping
                            break;
                        }
                    },
                    Err(e) => {
                        error!(error = %e, "Broker consumer error");
                        break;
                    },
                }
            }
            warn!("Broker consumer stream ended");
        });

        Ok(rx)
    }
}

#[async_trait]
impl BrokerChannel for AmqpBroker {
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> Result<()> {
        let confirm = self
            .channel
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default(),
            )
            .await
            .map_err(|e| ZooError::publish(routing_key, e.to_string()))?;

        confirm
            .await
            .map_err(|e| ZooError::publish(routing_key, e.to_string()))?;

        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> Result<()> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions { multiple: false })
            .await
            .map_err(|e| ZooError::broker("basic_ack", e.to_string()))
    }

    async fn nack_requeue(&self, delivery_tag: u64) -> Result<()> {
        self.channel
            .basic_nack(
                delivery_tag,
                BasicNackOptions {
                    multiple: false,
                    requeue: true,
                },
            )
            .await
            .map_err(|e| ZooError::broker("basic_nack", e.to_string()))
    }
}

fn exchange_kind(kind: &str) -> ExchangeKind {
    match kind {
        "direct" => ExchangeKind::Direct,
        "fanout" => ExchangeKind::Fanout,
        "headers" => ExchangeKind::Headers,
        _ => ExchangeKind::Topic,
    }
}
