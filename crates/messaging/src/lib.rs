pub mod amqp;
pub mod broker;
pub mod consumer;
pub mod envelope;
pub mod error;
pub mod event;
pub mod memory;
pub mod publisher;

pub use amqp::AmqpBroker;
pub use broker::{Acker, Delivery, MessageBroker, PublishOptions, Subscription};
pub use consumer::{ConsumerConfig, ConsumerRuntime, DecodedEvent, EventHandler, HandlerError};
pub use envelope::Envelope;
pub use error::{DecodeError, MessagingError, Result};
pub use event::{
    DomainEvent, EVENTS_TOPIC, OrderLine, OrderPayload, ReserveFailedPayload,
    ReserveSucceededPayload, routing,
};
pub use memory::InMemoryBroker;
pub use publisher::EventPublisher;
