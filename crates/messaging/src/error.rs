use thiserror::Error;

/// Errors that can occur when talking to the message broker.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// An AMQP transport error occurred.
    #[error("Transport error: {0}")]
    Transport(#[from] lapin::Error),

    /// A message was published to a topic that was never declared.
    #[error("Topic not declared: {0}")]
    TopicNotDeclared(String),

    /// The broker was closed while a subscription was still active.
    #[error("Broker closed")]
    Closed,

    /// A serialization error occurred while building a wire message.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while decoding an inbound message.
///
/// Decode errors are never retriable: a malformed message cannot become
/// well-formed by redelivery, so the consumer runtime acknowledges and
/// drops the message instead of requeueing it.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The message body was not valid JSON or was missing required fields.
    #[error("Malformed envelope: {0}")]
    Envelope(#[from] serde_json::Error),

    /// The payload field was a string that did not contain valid JSON.
    #[error("Payload string is not valid JSON")]
    PayloadString,

    /// The routing key does not map to any known event variant.
    #[error("Unknown routing key: {0}")]
    UnknownRoutingKey(String),

    /// The payload shape did not match the schema for its routing key.
    #[error("Payload does not match schema for '{routing_key}': {source}")]
    PayloadSchema {
        routing_key: String,
        source: serde_json::Error,
    },
}

/// Result type for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;
