//! Configuration for publishers and consumer runtimes

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EventBusError;

/// Strategy used to derive a topic name from an event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicStrategy {
    /// One topic per producing service: `{prefix}.{service}`
    Service,
    /// One topic per event type: `{prefix}.{event}`
    #[default]
    Event,
}

/// Broker acknowledgment level for published events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckLevel {
    /// Wait for all in-sync replicas
    #[default]
    All,
    /// Wait for the partition leader only
    One,
    /// Fire and forget
    None,
}

impl AckLevel {
    pub(crate) fn as_kafka_value(self) -> &'static str {
        match self {
            AckLevel::All => "all",
            AckLevel::One => "1",
            AckLevel::None => "0",
        }
    }
}

/// Where a consumer group with no committed position starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetReset {
    /// Start from the oldest retained message
    Earliest,
    /// Start from new messages only
    #[default]
    Latest,
}

impl OffsetReset {
    pub(crate) fn as_kafka_value(self) -> &'static str {
        match self {
            OffsetReset::Earliest => "earliest",
            OffsetReset::Latest => "latest",
        }
    }
}

/// Configuration shared by [`EventPublisher`](crate::EventPublisher) and
/// [`ConsumerRuntime`](crate::ConsumerRuntime).
///
/// Topic resolution inputs (prefix, strategy, overrides, service name,
/// client id) must match between producing and consuming services for
/// them to agree on topic names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    /// Comma-separated Kafka bootstrap broker list
    pub bootstrap_servers: String,
    /// Prefix prepended to every resolved topic
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    /// Topic naming strategy applied when no override matches
    #[serde(default)]
    pub default_topic_strategy: TopicStrategy,
    /// Explicit event-type to topic mappings, consulted before any strategy
    #[serde(default)]
    pub event_topic_overrides: HashMap<String, String>,
    /// Logical service name used by the service strategy
    #[serde(default)]
    pub service_name: Option<String>,
    /// Kafka client id; also the service-name fallback
    pub client_id: String,
    /// Producer acknowledgment level
    #[serde(default)]
    pub ack_level: AckLevel,
    /// Broker-side deduplication of producer retries
    #[serde(default = "default_true")]
    pub enable_idempotence: bool,
    /// Consumer group id
    #[serde(default)]
    pub consumer_group_id: String,
    /// Offset reset behavior for a group with no committed position
    #[serde(default)]
    pub auto_offset_reset: OffsetReset,
    /// Topics to subscribe to when no handlers were registered
    #[serde(default)]
    pub manual_topic_fallback: Vec<String>,
    /// Consumer session timeout in milliseconds
    #[serde(default = "default_session_timeout")]
    pub session_timeout_ms: u32,
    /// Upper bound on the wait for a publish acknowledgment
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout: Duration,
}

fn default_topic_prefix() -> String {
    "emis".to_string()
}

fn default_true() -> bool {
    true
}

fn default_session_timeout() -> u32 {
    30000
}

fn default_publish_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            topic_prefix: default_topic_prefix(),
            default_topic_strategy: TopicStrategy::default(),
            event_topic_overrides: HashMap::new(),
            service_name: None,
            client_id: "emis".to_string(),
            ack_level: AckLevel::default(),
            enable_idempotence: true,
            consumer_group_id: String::new(),
            auto_offset_reset: OffsetReset::default(),
            manual_topic_fallback: Vec::new(),
            session_timeout_ms: default_session_timeout(),
            publish_timeout: default_publish_timeout(),
        }
    }
}

impl EventBusConfig {
    /// Create a configuration with the given broker list and client id.
    pub fn new(bootstrap_servers: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            client_id: client_id.into(),
            ..Default::default()
        }
    }

    /// Set the topic prefix.
    pub fn with_topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = prefix.into();
        self
    }

    /// Set the default topic strategy.
    pub fn with_strategy(mut self, strategy: TopicStrategy) -> Self {
        self.default_topic_strategy = strategy;
        self
    }

    /// Map an event type to an explicit topic, bypassing the strategy.
    pub fn with_topic_override(
        mut self,
        event_type: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        self.event_topic_overrides
            .insert(event_type.into(), topic.into());
        self
    }

    /// Set the service name used by the service strategy.
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Set the producer acknowledgment level.
    pub fn with_ack_level(mut self, level: AckLevel) -> Self {
        self.ack_level = level;
        self
    }

    /// Disable the idempotent producer.
    pub fn without_idempotence(mut self) -> Self {
        self.enable_idempotence = false;
        self
    }

    /// Set the consumer group id.
    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.consumer_group_id = group_id.into();
        self
    }

    /// Start a fresh consumer group from the oldest retained messages.
    pub fn from_earliest(mut self) -> Self {
        self.auto_offset_reset = OffsetReset::Earliest;
        self
    }

    /// Set the topics consumed when no handlers were registered.
    pub fn with_manual_topics(mut self, topics: Vec<String>) -> Self {
        self.manual_topic_fallback = topics;
        self
    }

    /// Set the publish acknowledgment timeout.
    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    /// Check the settings every client needs.
    pub fn validate(&self) -> Result<(), EventBusError> {
        if self.bootstrap_servers.trim().is_empty() {
            return Err(EventBusError::Configuration(
                "bootstrap_servers must not be empty".to_string(),
            ));
        }
        if self.client_id.trim().is_empty() {
            return Err(EventBusError::Configuration(
                "client_id must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Additional settings required before a consumer can join its group.
    pub fn validate_consumer(&self) -> Result<(), EventBusError> {
        self.validate()?;
        if self.consumer_group_id.trim().is_empty() {
            return Err(EventBusError::Configuration(
                "consumer_group_id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
