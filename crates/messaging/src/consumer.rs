//! Generic at-least-once consumption loop.
//!
//! Per-message state machine:
//!
//! ```text
//! Received ──► Decoding ──► Dispatching ──► Acknowledged
//!                 │              │
//!                 │              ├──► Rejected(requeue)     transient failure
//!                 │              └──► DeadLetter + ack      retry budget spent
//!                 └──► Acknowledged + drop                  malformed message
//! ```
//!
//! A malformed message can never become well-formed by redelivery, so decode
//! failures are acknowledged and dropped. Dispatch failures are requeued with
//! a bounded attempt counter; once the budget is exhausted the message is
//! routed to the dead-letter routing key instead of looping forever.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::broker::{Delivery, MessageBroker, PublishOptions};
use crate::envelope::Envelope;
use crate::error::{DecodeError, Result};
use crate::event::{DomainEvent, routing};

/// A fully decoded inbound message handed to an [`EventHandler`].
#[derive(Debug, Clone)]
pub struct DecodedEvent {
    /// Routing key the message arrived under.
    pub routing_key: String,
    /// The wire envelope, giving handlers the idempotency key, timestamp and
    /// raw payload.
    pub envelope: Envelope,
    /// The typed event.
    pub event: DomainEvent,
}

/// A transient dispatch failure; the message will be retried.
///
/// Business-rule outcomes (e.g. insufficient stock) are not errors and must
/// be resolved inside the handler by emitting the corresponding outcome
/// event.
#[derive(Debug, Error)]
#[error("Dispatch failed: {0}")]
pub struct HandlerError(String);

impl HandlerError {
    /// Creates a handler error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Business-logic dispatch target for decoded events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Processes one decoded event.
    async fn handle(&self, event: &DecodedEvent) -> std::result::Result<(), HandlerError>;
}

/// Tuning knobs for the consumer runtime.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Upper bound on one dispatch, including the hop to the persistence
    /// layer. Exceeding it counts as a dispatch failure.
    pub dispatch_timeout: Duration,
    /// Dispatch attempts before a message is dead-lettered.
    pub max_attempts: u32,
    /// Routing key exhausted messages are re-published under.
    pub dead_letter_routing_key: String,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            dispatch_timeout: Duration::from_secs(10),
            max_attempts: 5,
            dead_letter_routing_key: routing::DEAD_LETTER.to_string(),
        }
    }
}

/// Wrapper re-published to the dead-letter routing key once a message has
/// exhausted its retry budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    /// The routing key the message originally arrived under.
    pub original_routing_key: String,
    /// The envelope as it was last delivered.
    pub envelope: Envelope,
}

/// Generic at-least-once consumer: bind, receive, decode, dispatch, resolve.
pub struct ConsumerRuntime<B, H> {
    broker: B,
    topic: String,
    routing_keys: Vec<String>,
    handler: H,
    config: ConsumerConfig,
    attempts: HashMap<(String, String), u32>,
}

impl<B, H> ConsumerRuntime<B, H>
where
    B: MessageBroker,
    H: EventHandler,
{
    /// Creates a runtime consuming the given routing keys with default
    /// configuration.
    pub fn new(
        broker: B,
        topic: impl Into<String>,
        routing_keys: &[&str],
        handler: H,
    ) -> Self {
        Self::with_config(broker, topic, routing_keys, handler, ConsumerConfig::default())
    }

    /// Creates a runtime with explicit configuration.
    pub fn with_config(
        broker: B,
        topic: impl Into<String>,
        routing_keys: &[&str],
        handler: H,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            broker,
            topic: topic.into(),
            routing_keys: routing_keys.iter().map(|k| k.to_string()).collect(),
            handler,
            config,
            attempts: HashMap::new(),
        }
    }

    /// Runs the receive loop until the subscription ends.
    ///
    /// A single bad message never terminates the loop; only transport
    /// failures (broken channel, failed acknowledgement) propagate.
    #[tracing::instrument(skip(self), fields(topic = %self.topic))]
    pub async fn run(mut self) -> Result<()> {
        self.broker.declare_topic(&self.topic).await?;
        let keys: Vec<&str> = self.routing_keys.iter().map(String::as_str).collect();
        let mut subscription = self.broker.bind_queue(&self.topic, &keys).await?;

        tracing::info!(routing_keys = ?self.routing_keys, "consumer started");

        while let Some(delivery) = subscription.next_delivery().await? {
            self.process(delivery).await?;
        }

        tracing::info!("consumer stopped");
        Ok(())
    }

    async fn process(&mut self, delivery: Delivery) -> Result<()> {
        let decoded = match Self::decode(&delivery) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(
                    routing_key = %delivery.routing_key,
                    error = %e,
                    "dropping malformed message"
                );
                metrics::counter!("events_dropped_total").increment(1);
                return delivery.acker.ack().await;
            }
        };

        let dispatched = tokio::time::timeout(
            self.config.dispatch_timeout,
            self.handler.handle(&decoded),
        )
        .await;

        let attempt_key = (
            decoded.routing_key.clone(),
            decoded.envelope.idempotency_key.as_str().to_string(),
        );

        match dispatched {
            Ok(Ok(())) => {
                self.attempts.remove(&attempt_key);
                metrics::counter!("events_consumed_total").increment(1);
                delivery.acker.ack().await
            }
            Ok(Err(e)) => {
                self.handle_failure(delivery, decoded, attempt_key, e.to_string())
                    .await
            }
            Err(_) => {
                self.handle_failure(delivery, decoded, attempt_key, "dispatch timed out".into())
                    .await
            }
        }
    }

    async fn handle_failure(
        &mut self,
        delivery: Delivery,
        decoded: DecodedEvent,
        attempt_key: (String, String),
        reason: String,
    ) -> Result<()> {
        let attempts = self.attempts.entry(attempt_key.clone()).or_insert(0);
        *attempts += 1;
        let attempts = *attempts;

        if attempts < self.config.max_attempts {
            tracing::warn!(
                routing_key = %decoded.routing_key,
                idempotency_key = %decoded.envelope.idempotency_key,
                attempts,
                reason,
                "dispatch failed, requeueing"
            );
            metrics::counter!("events_requeued_total").increment(1);
            return delivery.acker.nack(true).await;
        }

        // Retry budget spent. Park the message on the dead-letter key so it
        // stops poisoning the queue, but keep it durable for inspection.
        let dead_letter = DeadLetter {
            original_routing_key: decoded.routing_key.clone(),
            envelope: decoded.envelope.clone(),
        };
        let body = serde_json::to_vec(&dead_letter)?;

        match self
            .broker
            .publish(
                &self.topic,
                &self.config.dead_letter_routing_key,
                &body,
                PublishOptions::default(),
            )
            .await
        {
            Ok(()) => {
                self.attempts.remove(&attempt_key);
                tracing::error!(
                    routing_key = %decoded.routing_key,
                    idempotency_key = %decoded.envelope.idempotency_key,
                    attempts,
                    reason,
                    "retry budget exhausted, dead-lettered"
                );
                metrics::counter!("events_dead_lettered_total").increment(1);
                delivery.acker.ack().await
            }
            Err(e) => {
                // Could not park the message; keep it in the queue rather
                // than lose it.
                tracing::error!(error = %e, "dead-letter publish failed, requeueing");
                delivery.acker.nack(true).await
            }
        }
    }

    fn decode(delivery: &Delivery) -> std::result::Result<DecodedEvent, DecodeError> {
        let envelope = Envelope::decode(&delivery.body)?;
        let event = DomainEvent::decode(&delivery.routing_key, &envelope.payload)?;
        Ok(DecodedEvent {
            routing_key: delivery.routing_key.clone(),
            envelope,
            event,
        })
    }
}

impl<B, H> ConsumerRuntime<B, H>
where
    B: MessageBroker + 'static,
    H: EventHandler + 'static,
{
    /// Spawns the receive loop on its own task.
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }
}
