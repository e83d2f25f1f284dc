//! # EMIS Event Bus
//!
//! Kafka-backed integration event bus for the EMIS platform.
//!
//! The bus moves integration events between services over a partitioned,
//! ordered log:
//!
//! - **Topic resolution** - deterministic event-type-to-topic mapping
//!   shared by producers and consumers
//! - **Ordered publishing** - per-key partition routing, so events for
//!   one conversation/student/teacher arrive in publish order
//! - **Consumer-group dispatch** - a sequential poll loop with manual,
//!   after-success offset commits (at-least-once delivery)
//! - **Debounced projections** - per-key coalescing of bursty secondary
//!   effects such as conversation-summary upserts
//!
//! ## Example
//!
//! ```rust,ignore
//! use emis_eventbus::{
//!     DebounceScheduler, EventBusBuilder, EventBusConfig, FnEventHandler, IntegrationEvent,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
//! #[serde(rename_all = "camelCase")]
//! struct MessageSentEvent {
//!     message_id: String,
//!     conversation_id: String,
//!     sent_at: chrono::DateTime<chrono::Utc>,
//! }
//!
//! impl IntegrationEvent for MessageSentEvent {
//!     const EVENT_TYPE: &'static str = "MessageSentEvent";
//!     fn event_id(&self) -> String { self.message_id.clone() }
//!     fn occurred_at(&self) -> chrono::DateTime<chrono::Utc> { self.sent_at }
//!     fn ordering_key(&self) -> Option<String> { Some(self.conversation_id.clone()) }
//! }
//!
//! async fn example() -> Result<(), emis_eventbus::EventBusError> {
//!     let config = EventBusConfig::new("localhost:9092", "chat-consumer")
//!         .with_group_id("chat-consumers");
//!     let bus = EventBusBuilder::new(config);
//!
//!     // Producer side
//!     let publisher = bus.publisher()?;
//!     // publisher.publish(&event, None).await?;
//!
//!     // Consumer side
//!     let mut registry = bus.registry();
//!     registry.register::<MessageSentEvent, _>(FnEventHandler(|event: MessageSentEvent| async move {
//!         println!("message {} in {}", event.message_id, event.conversation_id);
//!         Ok(())
//!     }));
//!
//!     let runtime = bus.consumer(registry)?;
//!     runtime.run(CancellationToken::new()).await
//! }
//! ```
//!
//! ## Delivery semantics
//!
//! Offsets are committed one message at a time, after the registered
//! handler succeeds. Delivery is therefore at-least-once: a crash or
//! handler failure replays the message, and every handler must tolerate
//! duplicates. There is no retry machinery inside the bus - publish
//! failures surface to the caller, consume failures are retried by the
//! broker through redelivery.

pub mod config;
pub mod consumer;
pub mod debounce;
pub mod error;
pub mod event;
pub mod publisher;
pub mod registry;
pub mod topic;

pub use config::{AckLevel, EventBusConfig, OffsetReset, TopicStrategy};
pub use consumer::{ConsumerRuntime, InboundMessage, KafkaMessageSource, MessageSource};
pub use debounce::DebounceScheduler;
pub use error::EventBusError;
pub use event::{
    HEADER_EVENT_TYPE, HEADER_ORDERING_KEY, HEADER_TIMESTAMP, IntegrationEvent, decode_payload,
    encode_payload,
};
pub use publisher::EventPublisher;
pub use registry::{EventHandler, FnEventHandler, HandlerRegistry};
pub use topic::TopicResolver;

/// Builder wiring one configuration into the bus components.
pub struct EventBusBuilder {
    config: EventBusConfig,
}

impl EventBusBuilder {
    /// Create a builder with the given configuration.
    pub fn new(config: EventBusConfig) -> Self {
        Self { config }
    }

    /// The wrapped configuration.
    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }

    /// Build a registry that resolves topics with this configuration.
    pub fn registry(&self) -> HandlerRegistry {
        HandlerRegistry::new(&self.config)
    }

    /// Build a publisher.
    pub fn publisher(&self) -> Result<EventPublisher, EventBusError> {
        EventPublisher::new(&self.config)
    }

    /// Build a consumer runtime dispatching to `registry`.
    pub fn consumer(&self, registry: HandlerRegistry) -> Result<ConsumerRuntime, EventBusError> {
        ConsumerRuntime::new(&self.config, registry)
    }
}
