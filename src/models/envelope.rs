/// Queue envelope carried through the channel backend
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wrapper record for a queued message
///
/// Serialized as JSON on the wire with fields
/// `{id, type, payload, retry_count, created_at, expires_at}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEnvelope {
    /// Generated unique message id
    pub id: String,

    /// Message type, interpreted by the stage handler
    #[serde(rename = "type")]
    pub message_type: String,

    /// Message payload mapping
    pub payload: serde_json::Value,

    /// Number of failed handler invocations so far
    pub retry_count: u32,

    pub created_at: DateTime<Utc>,

    /// Optional expiry; expired envelopes are dropped on dequeue
    pub expires_at: Option<DateTime<Utc>>,
}

impl QueueEnvelope {
    /// Creates a new envelope with a generated id and zero retry count
    pub fn new(message_type: &str, payload: serde_json::Value, ttl_secs: Option<u64>) -> Self {
        let created_at = Utc::now();
        let expires_at = ttl_secs.map(|secs| created_at + chrono::Duration::seconds(secs as i64));
        Self {
            id: Uuid::new_v4().to_string(),
            message_type: message_type.to_string(),
            payload,
            retry_count: 0,
            created_at,
            expires_at,
        }
    }

    /// Returns true if the envelope has passed its expiry instant
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires) if expires <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_envelope_has_zero_retries() {
        let envelope = QueueEnvelope::new("snapshot", json!({"url": "http://example.com/"}), None);
        assert_eq!(envelope.retry_count, 0);
        assert!(envelope.expires_at.is_none());
        assert!(!envelope.id.is_empty());
    }

    #[test]
    fn test_wire_format_field_names() {
        let envelope = QueueEnvelope::new("snapshot", json!({}), Some(60));
        let wire = serde_json::to_value(&envelope).unwrap();
        assert!(wire.get("id").is_some());
        assert!(wire.get("type").is_some());
        assert!(wire.get("payload").is_some());
        assert!(wire.get("retry_count").is_some());
        assert!(wire.get("created_at").is_some());
        assert!(wire.get("expires_at").is_some());
    }

    #[test]
    fn test_expiry() {
        let envelope = QueueEnvelope::new("snapshot", json!({}), Some(60));
        assert!(!envelope.is_expired(Utc::now()));
        assert!(envelope.is_expired(Utc::now() + chrono::Duration::seconds(120)));

        let no_ttl = QueueEnvelope::new("snapshot", json!({}), None);
        assert!(!no_ttl.is_expired(Utc::now() + chrono::Duration::days(365)));
    }
}
