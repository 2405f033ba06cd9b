//! RabbitMQ-backed [`MessageBroker`].
//!
//! The queue is durable, non-exclusive, non-auto-delete; messages go
//! through the default exchange with the queue name as routing key and
//! persistent delivery mode. A lost connection degrades the broker
//! instead of crashing it: publishes fail loudly, consumption yields
//! errors, and reconnection is attempted at most once per
//! `reconnect_delay`.

use std::sync::Arc;
use std::time::Instant;

use dotalytics_core::AppError;
use dotalytics_core::job::JobMessage;
use dotalytics_core::traits::{BrokerDelivery, MessageBroker};
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::BrokerConfig;

/// AMQP delivery mode 2 marks a message as persistent.
const PERSISTENT: u8 = 2;

#[derive(Default)]
struct BrokerState {
    connection: Option<Connection>,
    channel: Option<Channel>,
    consumer: Option<Consumer>,
    last_attempt: Option<Instant>,
}

impl BrokerState {
    fn reset(&mut self) {
        self.connection = None;
        self.channel = None;
        self.consumer = None;
    }
}

/// Clones share the underlying connection and channel.
#[derive(Clone)]
pub struct RabbitBroker {
    config: BrokerConfig,
    state: Arc<Mutex<BrokerState>>,
}

impl RabbitBroker {
    /// Create a broker and attempt the first connection. A failure here
    /// does not abort startup; the broker starts degraded and reconnects
    /// on use.
    pub async fn connect(config: BrokerConfig) -> Self {
        let broker = Self {
            config,
            state: Arc::new(Mutex::new(BrokerState::default())),
        };

        {
            let mut state = broker.state.lock().await;
            match broker.establish(&mut state).await {
                Ok(_) => tracing::info!(queue = %broker.config.queue_name, "Connected to broker"),
                Err(e) => {
                    tracing::warn!(error = %e, "Broker unavailable at startup, will reconnect on use");
                }
            }
        }

        broker
    }

    /// Connect, declare the durable queue, and apply the prefetch cap.
    /// Stores the connection and channel in `state` on success.
    async fn establish(&self, state: &mut BrokerState) -> Result<Channel, AppError> {
        state.last_attempt = Some(Instant::now());

        let connection =
            Connection::connect(&self.config.amqp_url, ConnectionProperties::default())
                .await
                .map_err(|e| AppError::BrokerError(format!("Connection failed: {e}")))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| AppError::BrokerError(format!("Channel open failed: {e}")))?;

        channel
            .queue_declare(
                &self.config.queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| AppError::BrokerError(format!("Queue declare failed: {e}")))?;

        channel
            .basic_qos(self.config.prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| AppError::BrokerError(format!("Setting prefetch failed: {e}")))?;

        state.connection = Some(connection);
        state.channel = Some(channel.clone());
        state.consumer = None;
        Ok(channel)
    }

    /// Return a live channel, reconnecting if the previous one died and
    /// the reconnect delay has elapsed.
    async fn channel(&self, state: &mut BrokerState) -> Result<Channel, AppError> {
        if let Some(channel) = &state.channel
            && channel.status().connected()
        {
            return Ok(channel.clone());
        }

        state.reset();
        if let Some(last) = state.last_attempt
            && last.elapsed() < self.config.reconnect_delay
        {
            return Err(AppError::BrokerError(
                "Broker unavailable, reconnect pending".to_string(),
            ));
        }

        tracing::info!(queue = %self.config.queue_name, "Reconnecting to broker");
        self.establish(state).await
    }

    async fn consumer(&self) -> Result<Consumer, AppError> {
        let mut state = self.state.lock().await;
        if let Some(consumer) = &state.consumer {
            return Ok(consumer.clone());
        }

        let channel = self.channel(&mut state).await?;
        let tag = format!("dotalytics-{}", Uuid::new_v4());
        let consumer = channel
            .basic_consume(
                &self.config.queue_name,
                &tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| AppError::BrokerError(format!("Consume failed: {e}")))?;

        state.consumer = Some(consumer.clone());
        Ok(consumer)
    }
}

impl MessageBroker for RabbitBroker {
    type Delivery = RabbitDelivery;

    async fn publish(&self, message: &JobMessage) -> Result<(), AppError> {
        let payload = serde_json::to_vec(message)?;

        let channel = {
            let mut state = self.state.lock().await;
            self.channel(&mut state).await?
        };

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(PERSISTENT);

        let result = channel
            .basic_publish(
                "",
                &self.config.queue_name,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await;

        let confirm = match result {
            Ok(confirm) => confirm,
            Err(e) => {
                self.state.lock().await.reset();
                return Err(AppError::BrokerError(format!("Publish failed: {e}")));
            }
        };
        confirm
            .await
            .map_err(|e| AppError::BrokerError(format!("Publish not confirmed: {e}")))?;

        tracing::debug!(job_id = message.job_id, queue = %self.config.queue_name, "Message published");
        Ok(())
    }

    async fn next_delivery(&self) -> Result<Option<RabbitDelivery>, AppError> {
        // The consumer clone is awaited outside the state lock so a
        // blocked wait never stalls publishers sharing this broker.
        let mut consumer = self.consumer().await?;

        match consumer.next().await {
            Some(Ok(delivery)) => Ok(Some(RabbitDelivery { inner: delivery })),
            Some(Err(e)) => {
                self.state.lock().await.reset();
                Err(AppError::BrokerError(format!("Delivery failed: {e}")))
            }
            None => {
                // Stream end means the channel died under us.
                self.state.lock().await.reset();
                Ok(None)
            }
        }
    }

    async fn queue_depth(&self) -> Result<u32, AppError> {
        let channel = {
            let mut state = self.state.lock().await;
            self.channel(&mut state).await?
        };

        // Re-declaring an existing durable queue is idempotent and
        // reports its current message count.
        let queue = channel
            .queue_declare(
                &self.config.queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| AppError::BrokerError(format!("Queue declare failed: {e}")))?;

        Ok(queue.message_count())
    }
}

/// One unacknowledged RabbitMQ delivery.
pub struct RabbitDelivery {
    inner: lapin::message::Delivery,
}

impl BrokerDelivery for RabbitDelivery {
    fn payload(&self) -> &[u8] {
        &self.inner.data
    }

    async fn ack(self) -> Result<(), AppError> {
        self.inner
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| AppError::BrokerError(format!("Ack failed: {e}")))
    }

    async fn nack(self, requeue: bool) -> Result<(), AppError> {
        self.inner
            .nack(BasicNackOptions {
                requeue,
                ..Default::default()
            })
            .await
            .map_err(|e| AppError::BrokerError(format!("Nack failed: {e}")))
    }
}
