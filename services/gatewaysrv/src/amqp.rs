//! Durable AMQP publisher
//!
//! One connection and channel, lazily (re)established. The queue is
//! declared durable, non-exclusive, non-auto-delete; messages are published
//! persistent with `application/json` content type to the default exchange
//! (routing key = queue name). Only the forwarder publishes; workers never
//! touch the broker.

use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::RabbitMqSection;
use crate::error::{GatewayError, Result};

pub struct AmqpPublisher {
    config: RabbitMqSection,
    url: String,
    state: Mutex<Option<(Connection, Channel)>>,
}

impl AmqpPublisher {
    pub fn new(config: RabbitMqSection) -> Self {
        let url = config.amqp_url();
        Self {
            config,
            url,
            state: Mutex::new(None),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.config.queue_name
    }

    async fn ensure_channel(&self) -> Result<Channel> {
        let mut state = self.state.lock().await;

        if let Some((connection, channel)) = state.as_ref() {
            if connection.status().connected() && channel.status().connected() {
                return Ok(channel.clone());
            }
            debug!("AMQP channel stale; reconnecting");
        }

        let connection = Connection::connect(&self.url, ConnectionProperties::default())
            .await
            .map_err(|e| GatewayError::Broker(format!("Connect failed: {e}")))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| GatewayError::Broker(format!("Channel open failed: {e}")))?;

        channel
            .queue_declare(
                &self.config.queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| GatewayError::Broker(format!("Queue declare failed: {e}")))?;

        info!(
            "AMQP connected: {}:{} queue={}",
            self.config.host, self.config.port, self.config.queue_name
        );

        *state = Some((connection, channel.clone()));
        Ok(channel)
    }

    /// Publish one persistent JSON message to the durable queue.
    pub async fn publish_json(&self, payload: &[u8]) -> Result<()> {
        let channel = self.ensure_channel().await?;

        let confirm = channel
            .basic_publish(
                "",
                &self.config.queue_name,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(2), // persistent
            )
            .await
            .map_err(|e| GatewayError::Broker(format!("Publish failed: {e}")))?;

        confirm
            .await
            .map_err(|e| GatewayError::Broker(format!("Publish not confirmed: {e}")))?;

        Ok(())
    }

    /// Drop the cached connection so the next publish reconnects.
    pub async fn reset(&self) {
        *self.state.lock().await = None;
    }
}
