//! Broker adapter contract over a topic-based publish/subscribe transport.

use async_trait::async_trait;

use crate::Result;

/// Options controlling how a message is published.
#[derive(Debug, Clone, Copy)]
pub struct PublishOptions {
    /// Persist the message so a broker restart does not lose it.
    pub durable: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self { durable: true }
    }
}

/// Acknowledgement handle for one in-flight delivery.
///
/// Every delivery must be resolved exactly once: `ack` for handled messages
/// (including malformed ones that are dropped on purpose), `nack` with
/// `requeue` for transient dispatch failures.
#[async_trait]
pub trait Acker: Send {
    /// Acknowledges the delivery.
    async fn ack(self: Box<Self>) -> Result<()>;

    /// Rejects the delivery, optionally returning it to the queue.
    async fn nack(self: Box<Self>, requeue: bool) -> Result<()>;
}

/// One message handed to a consumer.
pub struct Delivery {
    /// Routing key the message was published under.
    pub routing_key: String,
    /// Raw message body.
    pub body: Vec<u8>,
    /// Handle to ack or reject this delivery.
    pub acker: Box<dyn Acker>,
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("routing_key", &self.routing_key)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// A queue bound to a topic for a set of routing keys, scoped to one caller.
///
/// Binding creates an exclusive, auto-deleted queue, which gives broadcast
/// semantics: every running subscriber receives every matching message.
#[async_trait]
pub trait Subscription: Send {
    /// Waits for the next delivery.
    ///
    /// Returns `None` once the broker shuts down and the queue is drained.
    async fn next_delivery(&mut self) -> Result<Option<Delivery>>;
}

/// Thin wrapper over a topic-based publish/subscribe transport.
///
/// Implementations own their connection handling; the channel objects behind
/// a broker are not safe for concurrent use and must be owned by a single
/// task or guarded internally.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Declares the durable topic, creating it if it does not exist.
    async fn declare_topic(&self, topic: &str) -> Result<()>;

    /// Binds a fresh exclusive queue to the topic for the given routing keys.
    async fn bind_queue(
        &self,
        topic: &str,
        routing_keys: &[&str],
    ) -> Result<Box<dyn Subscription>>;

    /// Publishes a message to the topic under the given routing key.
    async fn publish(
        &self,
        topic: &str,
        routing_key: &str,
        body: &[u8],
        opts: PublishOptions,
    ) -> Result<()>;
}
