//! Topic name resolution

use std::collections::HashMap;

use crate::config::{EventBusConfig, TopicStrategy};

/// Maps event type names to topic names.
///
/// Resolution is deterministic and total: explicit overrides win,
/// otherwise the configured strategy derives the name, and malformed
/// inputs degrade to the `default` service segment instead of failing.
/// Producers and consumers built from the same configuration therefore
/// always agree on topics.
#[derive(Debug, Clone)]
pub struct TopicResolver {
    prefix: String,
    strategy: TopicStrategy,
    overrides: HashMap<String, String>,
    service_name: Option<String>,
    client_id: String,
}

impl TopicResolver {
    /// Snapshot the resolution inputs from a configuration.
    pub fn new(config: &EventBusConfig) -> Self {
        Self {
            prefix: config.topic_prefix.clone(),
            strategy: config.default_topic_strategy,
            overrides: config.event_topic_overrides.clone(),
            service_name: config.service_name.clone(),
            client_id: config.client_id.clone(),
        }
    }

    /// Resolve the topic for an event type.
    pub fn resolve(&self, event_type: &str) -> String {
        if let Some(topic) = self.overrides.get(event_type) {
            return topic.clone();
        }

        match self.strategy {
            TopicStrategy::Service => format!("{}.{}", self.prefix, self.service_segment()),
            TopicStrategy::Event => {
                let remainder = event_type.replace("Event", "").replace("Integration", "");
                format!("{}.{}", self.prefix, remainder.to_lowercase())
            }
        }
    }

    /// Service segment: the explicit service name when set, otherwise
    /// the first `-`-separated piece of the client id with any
    /// `-producer`/`-consumer` suffix removed.
    fn service_segment(&self) -> String {
        let name = match self.service_name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                let base = self
                    .client_id
                    .strip_suffix("-producer")
                    .or_else(|| self.client_id.strip_suffix("-consumer"))
                    .unwrap_or(&self.client_id);
                base.split('-').next().unwrap_or_default().to_string()
            }
        };

        if name.is_empty() {
            "default".to_string()
        } else {
            name.to_lowercase()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(strategy: TopicStrategy, client_id: &str) -> TopicResolver {
        TopicResolver::new(
            &EventBusConfig::new("localhost:9092", client_id)
                .with_topic_prefix("emis")
                .with_strategy(strategy),
        )
    }

    #[test]
    fn test_event_strategy_strips_suffixes() {
        let resolver = resolver(TopicStrategy::Event, "chat-producer");
        assert_eq!(resolver.resolve("MessageSentEvent"), "emis.messagesent");
    }

    #[test]
    fn test_event_strategy_strips_integration_marker() {
        let resolver = resolver(TopicStrategy::Event, "x");
        assert_eq!(
            resolver.resolve("StudentCreatedIntegrationEvent"),
            "emis.studentcreated"
        );
    }

    #[test]
    fn test_service_strategy_derives_from_client_id() {
        let resolver = resolver(TopicStrategy::Service, "chat-producer");
        assert_eq!(resolver.resolve("MessageSentEvent"), "emis.chat");
    }

    #[test]
    fn test_service_strategy_prefers_explicit_name() {
        let resolver = TopicResolver::new(
            &EventBusConfig::new("localhost:9092", "chat-producer")
                .with_topic_prefix("emis")
                .with_strategy(TopicStrategy::Service)
                .with_service_name("Messaging"),
        );
        assert_eq!(resolver.resolve("MessageSentEvent"), "emis.messaging");
    }

    #[test]
    fn test_service_strategy_takes_first_segment() {
        let resolver = resolver(TopicStrategy::Service, "chat-gateway-consumer");
        assert_eq!(resolver.resolve("MessageSentEvent"), "emis.chat");
    }

    #[test]
    fn test_service_strategy_degrades_to_default() {
        {
            let resolver = resolver(TopicStrategy::Service, "");
            assert_eq!(resolver.resolve("MessageSentEvent"), "emis.default");
        }
        {
            let resolver = resolver(TopicStrategy::Service, "-producer");
            assert_eq!(resolver.resolve("MessageSentEvent"), "emis.default");
        }
    }

    #[test]
    fn test_override_wins_regardless_of_strategy() {
        for strategy in [TopicStrategy::Service, TopicStrategy::Event] {
            let resolver = TopicResolver::new(
                &EventBusConfig::new("localhost:9092", "chat-producer")
                    .with_topic_prefix("emis")
                    .with_strategy(strategy)
                    .with_topic_override("MessageSentEvent", "legacy.chat-messages"),
            );
            assert_eq!(resolver.resolve("MessageSentEvent"), "legacy.chat-messages");
        }
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let resolver = resolver(TopicStrategy::Event, "chat-producer");
        let first = resolver.resolve("ConversationArchivedEvent");
        assert_eq!(resolver.resolve("ConversationArchivedEvent"), first);
    }
}
