//! Event publishing over a Kafka producer

use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use tracing::{debug, info};

use crate::config::EventBusConfig;
use crate::error::EventBusError;
use crate::event::{
    self, HEADER_EVENT_TYPE, HEADER_ORDERING_KEY, HEADER_TIMESTAMP, IntegrationEvent,
};
use crate::topic::TopicResolver;

/// Publishes integration events to their resolved topics.
///
/// Safe to call from any number of tasks; the underlying producer
/// serializes network I/O internally. `publish` blocks the caller until
/// the broker acknowledges per the configured ack level and never
/// retries on its own: rejections and timeouts surface as
/// [`EventBusError::Publish`] and retry policy belongs to the caller.
pub struct EventPublisher {
    producer: FutureProducer,
    resolver: TopicResolver,
    publish_timeout: Duration,
}

impl EventPublisher {
    /// Build a publisher from configuration.
    pub fn new(config: &EventBusConfig) -> Result<Self, EventBusError> {
        config.validate()?;

        let mut client_config = ClientConfig::new();
        client_config.set("bootstrap.servers", &config.bootstrap_servers);
        client_config.set("client.id", &config.client_id);
        client_config.set("acks", config.ack_level.as_kafka_value());
        client_config.set(
            "enable.idempotence",
            if config.enable_idempotence {
                "true"
            } else {
                "false"
            },
        );

        let producer: FutureProducer = client_config
            .create()
            .map_err(|e| EventBusError::Configuration(e.to_string()))?;

        info!(brokers = %config.bootstrap_servers, client_id = %config.client_id, "Created Kafka producer");

        Ok(Self {
            producer,
            resolver: TopicResolver::new(config),
            publish_timeout: config.publish_timeout,
        })
    }

    /// Publish an event, optionally overriding its ordering key.
    ///
    /// Key precedence: the explicit argument, then the event's own
    /// [`IntegrationEvent::ordering_key`], then its id. The key becomes
    /// the partition key, so everything published under one key reaches
    /// a single consumer in publish order.
    pub async fn publish<E: IntegrationEvent>(
        &self,
        event: &E,
        ordering_key: Option<&str>,
    ) -> Result<(), EventBusError> {
        let key = resolve_ordering_key(event, ordering_key);
        let topic = self.resolver.resolve(E::EVENT_TYPE);
        let payload = event::encode_payload(event)?;
        let timestamp = event.occurred_at().to_rfc3339();

        let headers = OwnedHeaders::new()
            .insert(Header {
                key: HEADER_EVENT_TYPE,
                value: Some(E::EVENT_TYPE.as_bytes()),
            })
            .insert(Header {
                key: HEADER_TIMESTAMP,
                value: Some(timestamp.as_bytes()),
            })
            .insert(Header {
                key: HEADER_ORDERING_KEY,
                value: Some(key.as_bytes()),
            });

        let record = FutureRecord::to(&topic)
            .payload(&payload)
            .key(&key)
            .headers(headers);

        debug!(
            topic = %topic,
            event_type = E::EVENT_TYPE,
            ordering_key = %key,
            "Publishing event"
        );

        self.producer
            .send(record, self.publish_timeout)
            .await
            .map_err(|(e, _)| EventBusError::Publish(e.to_string()))?;

        Ok(())
    }
}

fn resolve_ordering_key<E: IntegrationEvent>(event: &E, explicit: Option<&str>) -> String {
    match explicit {
        Some(key) => key.to_string(),
        None => event.ordering_key().unwrap_or_else(|| event.event_id()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct StudentCreatedIntegrationEvent {
        student_id: String,
        school_id: Option<String>,
        created_at: DateTime<Utc>,
    }

    impl IntegrationEvent for StudentCreatedIntegrationEvent {
        const EVENT_TYPE: &'static str = "StudentCreatedIntegrationEvent";

        fn event_id(&self) -> String {
            self.student_id.clone()
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.created_at
        }

        fn ordering_key(&self) -> Option<String> {
            self.school_id.clone()
        }
    }

    fn event(school_id: Option<&str>) -> StudentCreatedIntegrationEvent {
        StudentCreatedIntegrationEvent {
            student_id: "student-42".to_string(),
            school_id: school_id.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_explicit_key_wins() {
        let key = resolve_ordering_key(&event(Some("school-1")), Some("override"));
        assert_eq!(key, "override");
    }

    #[test]
    fn test_event_key_used_when_no_explicit() {
        let key = resolve_ordering_key(&event(Some("school-1")), None);
        assert_eq!(key, "school-1");
    }

    #[test]
    fn test_event_id_is_last_resort() {
        let key = resolve_ordering_key(&event(None), None);
        assert_eq!(key, "student-42");
    }
}
