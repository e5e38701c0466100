//! AMQP broker adapter backed by lapin.

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tokio::sync::Mutex;
use uuid::Uuid;

use std::sync::Arc;

use crate::broker::{Acker, Delivery, MessageBroker, PublishOptions, Subscription};
use crate::error::Result;

struct Inner {
    connection: Connection,
    publish_channel: Mutex<Channel>,
}

/// AMQP 0.9.1 broker adapter.
///
/// Clones share one connection. Publishing goes through a single dedicated
/// channel guarded by a mutex; every subscription gets a fresh channel of
/// its own, so no channel is ever shared across tasks unguarded.
#[derive(Clone)]
pub struct AmqpBroker {
    inner: Arc<Inner>,
}

impl AmqpBroker {
    /// Connects to the broker at the given AMQP URI.
    pub async fn connect(uri: &str) -> Result<Self> {
        let connection = Connection::connect(uri, ConnectionProperties::default()).await?;
        let publish_channel = connection.create_channel().await?;

        tracing::info!(uri, "connected to AMQP broker");

        Ok(Self {
            inner: Arc::new(Inner {
                connection,
                publish_channel: Mutex::new(publish_channel),
            }),
        })
    }

    /// Closes the connection. Called once at service shutdown.
    pub async fn close(&self) -> Result<()> {
        self.inner.connection.close(200, "shutdown").await?;
        Ok(())
    }

    async fn declare_on(&self, channel: &Channel, topic: &str) -> Result<()> {
        channel
            .exchange_declare(
                topic,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageBroker for AmqpBroker {
    async fn declare_topic(&self, topic: &str) -> Result<()> {
        let channel = self.inner.publish_channel.lock().await;
        self.declare_on(&channel, topic).await
    }

    async fn bind_queue(
        &self,
        topic: &str,
        routing_keys: &[&str],
    ) -> Result<Box<dyn Subscription>> {
        // Fresh channel per subscription; the receive loop owns it.
        let channel = self.inner.connection.create_channel().await?;
        self.declare_on(&channel, topic).await?;

        let queue = channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        for routing_key in routing_keys {
            channel
                .queue_bind(
                    queue.name().as_str(),
                    topic,
                    routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
        }

        let consumer = channel
            .basic_consume(
                queue.name().as_str(),
                &format!("consumer-{}", Uuid::new_v4()),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        tracing::info!(topic, ?routing_keys, queue = %queue.name(), "bound queue");

        Ok(Box::new(AmqpSubscription {
            _channel: channel,
            consumer,
        }))
    }

    async fn publish(
        &self,
        topic: &str,
        routing_key: &str,
        body: &[u8],
        opts: PublishOptions,
    ) -> Result<()> {
        let delivery_mode = if opts.durable { 2 } else { 1 };
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(delivery_mode);

        let channel = self.inner.publish_channel.lock().await;
        channel
            .basic_publish(
                topic,
                routing_key,
                BasicPublishOptions::default(),
                body,
                properties,
            )
            .await?
            .await?;

        Ok(())
    }
}

struct AmqpSubscription {
    // Keeps the channel (and its exclusive queue) alive for the consumer.
    _channel: Channel,
    consumer: lapin::Consumer,
}

#[async_trait]
impl Subscription for AmqpSubscription {
    async fn next_delivery(&mut self) -> Result<Option<Delivery>> {
        match self.consumer.next().await {
            Some(Ok(delivery)) => Ok(Some(Delivery {
                routing_key: delivery.routing_key.as_str().to_string(),
                body: delivery.data,
                acker: Box::new(AmqpAcker {
                    acker: delivery.acker,
                }),
            })),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }
}

struct AmqpAcker {
    acker: lapin::acker::Acker,
}

#[async_trait]
impl Acker for AmqpAcker {
    async fn ack(self: Box<Self>) -> Result<()> {
        self.acker.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn nack(self: Box<Self>, requeue: bool) -> Result<()> {
        self.acker
            .nack(BasicNackOptions {
                requeue,
                ..Default::default()
            })
            .await?;
        Ok(())
    }
}
