//! Error types for event bus operations

use thiserror::Error;

/// Errors surfaced by publishers, consumer runtimes, and handlers.
#[derive(Error, Debug)]
pub enum EventBusError {
    /// Missing or invalid settings; prevents client construction
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Broker rejection or timeout on send
    #[error("Publish failed: {0}")]
    Publish(String),

    /// Failed to serialize an event payload
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Failed to deserialize an event payload
    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    /// A registered handler returned an error
    #[error("Handler failed for {event_type}: {message}")]
    Handler {
        /// Event type the failing handler was registered for
        event_type: String,
        /// Underlying handler error
        message: String,
    },

    /// Transient broker/network failure while consuming
    #[error("Consume failed: {0}")]
    ConsumeTransport(String),

    /// Failed to commit a consumer offset
    #[error("Commit failed: {0}")]
    Commit(String),
}

impl EventBusError {
    /// Check if this error is worth retrying at the caller's discretion.
    ///
    /// The bus itself never retries: publish failures go back to the
    /// caller, consume failures are retried by the broker through
    /// redelivery of uncommitted offsets.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EventBusError::Publish(_)
                | EventBusError::ConsumeTransport(_)
                | EventBusError::Commit(_)
        )
    }

    pub(crate) fn handler(event_type: &str, source: impl std::fmt::Display) -> Self {
        EventBusError::Handler {
            event_type: event_type.to_string(),
            message: source.to_string(),
        }
    }
}

impl From<rdkafka::error::KafkaError> for EventBusError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        match &err {
            rdkafka::error::KafkaError::MessageProduction(_) => {
                EventBusError::Publish(err.to_string())
            }
            rdkafka::error::KafkaError::ClientCreation(_)
            | rdkafka::error::KafkaError::ClientConfig(..) => {
                EventBusError::Configuration(err.to_string())
            }
            rdkafka::error::KafkaError::ConsumerCommit(_) => EventBusError::Commit(err.to_string()),
            _ => EventBusError::ConsumeTransport(err.to_string()),
        }
    }
}
