//! Publisher for typed domain events.

use common::IdempotencyKey;

use crate::broker::{MessageBroker, PublishOptions};
use crate::envelope::Envelope;
use crate::error::Result;
use crate::event::DomainEvent;

/// Builds envelopes for domain events and emits them durably.
#[derive(Clone)]
pub struct EventPublisher<B> {
    broker: B,
    topic: String,
}

impl<B: MessageBroker> EventPublisher<B> {
    /// Creates a publisher for the given topic, declaring it up front.
    pub async fn bind(broker: B, topic: impl Into<String>) -> Result<Self> {
        let topic = topic.into();
        broker.declare_topic(&topic).await?;
        Ok(Self { broker, topic })
    }

    /// Returns the topic this publisher writes to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wraps the event in an envelope and publishes it with durable delivery.
    ///
    /// A fresh idempotency key is generated only when the caller supplied
    /// none. Callers re-publishing on behalf of an existing business event
    /// must pass the original key so retries stay idempotent downstream.
    /// Transport failures surface to the caller; nothing is swallowed.
    #[tracing::instrument(skip(self, event), fields(routing_key = event.routing_key()))]
    pub async fn publish(
        &self,
        event: &DomainEvent,
        key: Option<IdempotencyKey>,
    ) -> Result<IdempotencyKey> {
        let key = key.unwrap_or_else(IdempotencyKey::generate);
        let payload = event.to_payload()?;
        let envelope = Envelope::with_key(key.clone(), payload);
        let body = envelope.encode()?;

        self.broker
            .publish(
                &self.topic,
                event.routing_key(),
                &body,
                PublishOptions::default(),
            )
            .await?;

        metrics::counter!("events_published_total").increment(1);
        tracing::info!(routing_key = event.routing_key(), %key, "event published");

        Ok(key)
    }
}
