//! The wire envelope wrapping every domain event.

use chrono::{DateTime, Utc};
use common::IdempotencyKey;
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Wire wrapper carrying the idempotency key, timestamp and payload of one
/// event.
///
/// The routing key travels on the transport, not in the body. Wire format:
///
/// ```json
/// {"idempotency_key": "…", "timestamp": "2026-01-02T03:04:05Z", "payload": {…}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique key for this logical business event.
    pub idempotency_key: IdempotencyKey,

    /// When the event occurred, UTC.
    #[serde(rename = "timestamp")]
    pub occurred_at: DateTime<Utc>,

    /// Routing-key-specific payload.
    pub payload: serde_json::Value,
}

impl Envelope {
    /// Creates an envelope stamped with the current time and a fresh key.
    pub fn new(payload: serde_json::Value) -> Self {
        Self::with_key(IdempotencyKey::generate(), payload)
    }

    /// Creates an envelope carrying an existing idempotency key.
    ///
    /// Used when re-publishing on behalf of an existing business event so
    /// downstream deduplication keeps working across retries.
    pub fn with_key(idempotency_key: IdempotencyKey, payload: serde_json::Value) -> Self {
        Self {
            idempotency_key,
            occurred_at: Utc::now(),
            payload,
        }
    }

    /// Serializes the envelope to its wire form.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parses an envelope from raw bytes.
    ///
    /// Rejects non-JSON bodies, missing fields and unparsable timestamps.
    /// A payload delivered as a JSON-encoded string is unwrapped once, for
    /// producers that double-encode; anything else that is not an object is
    /// left to the typed event decoder to reject.
    pub fn decode(body: &[u8]) -> Result<Self, DecodeError> {
        let mut envelope: Envelope = serde_json::from_slice(body)?;

        if let serde_json::Value::String(raw) = &envelope.payload {
            envelope.payload =
                serde_json::from_str(raw).map_err(|_| DecodeError::PayloadString)?;
        }

        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let payload = serde_json::json!({"order_id": 1, "items": [{"book_id": 42, "quantity": 2}]});
        let envelope = Envelope::with_key(IdempotencyKey::new("key-1"), payload.clone());

        let bytes = envelope.encode().unwrap();
        let decoded = Envelope::decode(&bytes).unwrap();

        assert_eq!(decoded.idempotency_key, envelope.idempotency_key);
        assert_eq!(decoded.occurred_at, envelope.occurred_at);
        assert_eq!(decoded.payload, payload);
    }

    #[test]
    fn decode_rejects_non_json() {
        let result = Envelope::decode(b"not json at all");
        assert!(matches!(result, Err(DecodeError::Envelope(_))));
    }

    #[test]
    fn decode_rejects_missing_fields() {
        let result = Envelope::decode(br#"{"idempotency_key": "k"}"#);
        assert!(matches!(result, Err(DecodeError::Envelope(_))));
    }

    #[test]
    fn decode_rejects_bad_timestamp() {
        let body = br#"{"idempotency_key": "k", "timestamp": "yesterday", "payload": {}}"#;
        let result = Envelope::decode(body);
        assert!(matches!(result, Err(DecodeError::Envelope(_))));
    }

    #[test]
    fn decode_accepts_offset_timestamps() {
        let body =
            br#"{"idempotency_key": "k", "timestamp": "2026-01-02T03:04:05+00:00", "payload": {}}"#;
        let envelope = Envelope::decode(body).unwrap();
        assert_eq!(envelope.idempotency_key.as_str(), "k");
    }

    #[test]
    fn decode_unwraps_string_payload() {
        let body = br#"{"idempotency_key": "k", "timestamp": "2026-01-02T03:04:05Z", "payload": "{\"order_id\": 7}"}"#;
        let envelope = Envelope::decode(body).unwrap();
        assert_eq!(envelope.payload["order_id"], 7);
    }

    #[test]
    fn decode_rejects_unparsable_string_payload() {
        let body = br#"{"idempotency_key": "k", "timestamp": "2026-01-02T03:04:05Z", "payload": "{{nope"}"#;
        let result = Envelope::decode(body);
        assert!(matches!(result, Err(DecodeError::PayloadString)));
    }

    #[test]
    fn new_generates_fresh_keys() {
        let a = Envelope::new(serde_json::json!({}));
        let b = Envelope::new(serde_json::json!({}));
        assert_ne!(a.idempotency_key, b.idempotency_key);
    }
}
