//! Integration event contract and wire encoding

use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::EventBusError;

/// Header carrying the concrete event type name.
pub const HEADER_EVENT_TYPE: &str = "event-type";
/// Header carrying the RFC 3339 occurrence timestamp.
pub const HEADER_TIMESTAMP: &str = "timestamp";
/// Header carrying the resolved ordering key.
pub const HEADER_ORDERING_KEY: &str = "ordering-key";

/// Contract for events published through the bus.
///
/// Payloads travel as JSON; keep field names camelCase
/// (`#[serde(rename_all = "camelCase")]`) so producers and consumers in
/// every service agree on the wire form.
///
/// Events sharing an ordering key are routed to the same partition and
/// observed by a single consumer in publish order; events with
/// different keys have no relative ordering. Delivery is at-least-once:
/// offsets advance only after a handler succeeds, so every handler must
/// tolerate duplicate invocation.
///
/// ```rust,ignore
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// #[serde(rename_all = "camelCase")]
/// struct MessageSentEvent {
///     message_id: String,
///     conversation_id: String,
///     sent_at: DateTime<Utc>,
/// }
///
/// impl IntegrationEvent for MessageSentEvent {
///     const EVENT_TYPE: &'static str = "MessageSentEvent";
///
///     fn event_id(&self) -> String {
///         self.message_id.clone()
///     }
///
///     fn occurred_at(&self) -> DateTime<Utc> {
///         self.sent_at
///     }
///
///     fn ordering_key(&self) -> Option<String> {
///         Some(self.conversation_id.clone())
///     }
/// }
/// ```
pub trait IntegrationEvent: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Event type name, e.g. `"MessageSentEvent"`. Selects the handler
    /// on the consuming side and feeds topic resolution; must be unique
    /// across the platform.
    const EVENT_TYPE: &'static str;

    /// Identity of this event instance; the ordering-key fallback.
    fn event_id(&self) -> String;

    /// When the event occurred.
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Partition/ordering key, when the event defines one.
    fn ordering_key(&self) -> Option<String> {
        None
    }
}

/// Serialize an event payload for the wire.
pub fn encode_payload<E: IntegrationEvent>(event: &E) -> Result<Vec<u8>, EventBusError> {
    serde_json::to_vec(event).map_err(|e| EventBusError::Serialization(e.to_string()))
}

/// Deserialize a payload received from the wire.
pub fn decode_payload<E: IntegrationEvent>(payload: &[u8]) -> Result<E, EventBusError> {
    serde_json::from_slice(payload).map_err(|e| EventBusError::Deserialization(e.to_string()))
}
