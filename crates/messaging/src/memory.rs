//! In-memory broker implementation for tests and single-process wiring.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, RwLock, watch};

use crate::broker::{Acker, Delivery, MessageBroker, PublishOptions, Subscription};
use crate::error::{MessagingError, Result};

#[derive(Default)]
struct QueueState {
    messages: VecDeque<(String, Vec<u8>)>,
}

struct SharedQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl SharedQueue {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        })
    }

    async fn push_back(&self, routing_key: String, body: Vec<u8>) {
        self.state
            .lock()
            .await
            .messages
            .push_back((routing_key, body));
        self.notify.notify_one();
    }

    async fn push_front(&self, routing_key: String, body: Vec<u8>) {
        self.state
            .lock()
            .await
            .messages
            .push_front((routing_key, body));
        self.notify.notify_one();
    }

    async fn pop(&self) -> Option<(String, Vec<u8>)> {
        self.state.lock().await.messages.pop_front()
    }
}

struct Binding {
    routing_keys: Vec<String>,
    queue: Arc<SharedQueue>,
}

#[derive(Default)]
struct Topics {
    bindings: HashMap<String, Vec<Binding>>,
}

/// In-memory message broker with the same contract as the AMQP adapter.
///
/// Every `bind_queue` call gets its own queue, so all subscribers see every
/// matching message (broadcast). Requeued messages return to the front of
/// their queue, matching AMQP redelivery order for a single consumer.
#[derive(Clone)]
pub struct InMemoryBroker {
    topics: Arc<RwLock<Topics>>,
    closed_tx: Arc<watch::Sender<bool>>,
    closed_rx: watch::Receiver<bool>,
}

impl InMemoryBroker {
    /// Creates a new empty broker.
    pub fn new() -> Self {
        let (closed_tx, closed_rx) = watch::channel(false);
        Self {
            topics: Arc::new(RwLock::new(Topics::default())),
            closed_tx: Arc::new(closed_tx),
            closed_rx,
        }
    }

    /// Shuts the broker down. Subscriptions drain their queues and then end.
    pub fn close(&self) {
        let _ = self.closed_tx.send(true);
    }

    fn is_closed(&self) -> bool {
        *self.closed_rx.borrow()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn declare_topic(&self, topic: &str) -> Result<()> {
        let mut topics = self.topics.write().await;
        topics.bindings.entry(topic.to_string()).or_default();
        Ok(())
    }

    async fn bind_queue(
        &self,
        topic: &str,
        routing_keys: &[&str],
    ) -> Result<Box<dyn Subscription>> {
        let mut topics = self.topics.write().await;
        let bindings = topics
            .bindings
            .get_mut(topic)
            .ok_or_else(|| MessagingError::TopicNotDeclared(topic.to_string()))?;

        let queue = SharedQueue::new();
        bindings.push(Binding {
            routing_keys: routing_keys.iter().map(|k| k.to_string()).collect(),
            queue: Arc::clone(&queue),
        });

        Ok(Box::new(InMemorySubscription {
            queue,
            closed_rx: self.closed_rx.clone(),
        }))
    }

    async fn publish(
        &self,
        topic: &str,
        routing_key: &str,
        body: &[u8],
        _opts: PublishOptions,
    ) -> Result<()> {
        if self.is_closed() {
            return Err(MessagingError::Closed);
        }

        let topics = self.topics.read().await;
        let bindings = topics
            .bindings
            .get(topic)
            .ok_or_else(|| MessagingError::TopicNotDeclared(topic.to_string()))?;

        for binding in bindings {
            if binding.routing_keys.iter().any(|k| k == routing_key) {
                binding
                    .queue
                    .push_back(routing_key.to_string(), body.to_vec())
                    .await;
            }
        }

        Ok(())
    }
}

struct InMemorySubscription {
    queue: Arc<SharedQueue>,
    closed_rx: watch::Receiver<bool>,
}

#[async_trait]
impl Subscription for InMemorySubscription {
    async fn next_delivery(&mut self) -> Result<Option<Delivery>> {
        loop {
            if let Some((routing_key, body)) = self.queue.pop().await {
                let acker = Box::new(InMemoryAcker {
                    queue: Arc::clone(&self.queue),
                    routing_key: routing_key.clone(),
                    body: body.clone(),
                });
                return Ok(Some(Delivery {
                    routing_key,
                    body,
                    acker,
                }));
            }

            if *self.closed_rx.borrow() {
                return Ok(None);
            }

            let mut closed_rx = self.closed_rx.clone();
            tokio::select! {
                _ = self.queue.notify.notified() => {}
                _ = closed_rx.changed() => {}
            }
        }
    }
}

struct InMemoryAcker {
    queue: Arc<SharedQueue>,
    routing_key: String,
    body: Vec<u8>,
}

#[async_trait]
impl Acker for InMemoryAcker {
    async fn ack(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    async fn nack(self: Box<Self>, requeue: bool) -> Result<()> {
        if requeue {
            self.queue.push_front(self.routing_key, self.body).await;
        }
        Ok(())
    }
}
