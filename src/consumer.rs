//! Consumer runtime: poll, decode, dispatch, commit

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rdkafka::Message as KafkaMessage;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Headers;
use rdkafka::{Offset, TopicPartitionList};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::EventBusConfig;
use crate::error::EventBusError;
use crate::event::{HEADER_EVENT_TYPE, HEADER_ORDERING_KEY, HEADER_TIMESTAMP};
use crate::registry::HandlerRegistry;

const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// A message taken off the broker, decoupled from the client library.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Topic the message was read from
    pub topic: String,
    /// Partition within the topic
    pub partition: i32,
    /// Offset within the partition
    pub offset: i64,
    /// Raw partition key
    pub key: Option<Vec<u8>>,
    /// Transport headers
    pub headers: HashMap<String, String>,
    /// Serialized event payload
    pub payload: Vec<u8>,
}

impl InboundMessage {
    /// The `event-type` header; empty when the header is absent, which
    /// dispatches like any other unknown type.
    pub fn event_type(&self) -> &str {
        self.headers
            .get(HEADER_EVENT_TYPE)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// The `ordering-key` header, when present.
    pub fn ordering_key(&self) -> Option<&str> {
        self.headers.get(HEADER_ORDERING_KEY).map(String::as_str)
    }

    /// The `timestamp` header parsed as an occurrence time.
    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        self.headers
            .get(HEADER_TIMESTAMP)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|ts| ts.with_timezone(&Utc))
    }
}

/// Broker-facing seam of the consumer runtime.
///
/// The Kafka implementation owns a `StreamConsumer`; tests substitute
/// an in-memory source to drive the dispatch loop without a broker.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Wait up to `timeout` for the next message. `Ok(None)` means the
    /// poll timed out without yielding one.
    async fn poll(&self, timeout: Duration) -> Result<Option<InboundMessage>, EventBusError>;

    /// Durably advance the read position past `msg`.
    async fn commit(&self, msg: &InboundMessage) -> Result<(), EventBusError>;

    /// Close the source, flushing client-side state.
    async fn close(&self) -> Result<(), EventBusError>;
}

/// Kafka-backed [`MessageSource`] with manual offset commits.
pub struct KafkaMessageSource {
    consumer: StreamConsumer,
}

impl KafkaMessageSource {
    /// Build a consumer subscribed to `topics` as part of the
    /// configured group. Auto-commit is off: the runtime commits each
    /// offset individually after its handler succeeds.
    pub fn new(config: &EventBusConfig, topics: &[String]) -> Result<Self, EventBusError> {
        config.validate_consumer()?;

        let mut client_config = ClientConfig::new();
        client_config.set("bootstrap.servers", &config.bootstrap_servers);
        client_config.set("client.id", &config.client_id);
        client_config.set("group.id", &config.consumer_group_id);
        client_config.set(
            "auto.offset.reset",
            config.auto_offset_reset.as_kafka_value(),
        );
        client_config.set("enable.auto.commit", "false");
        client_config.set("session.timeout.ms", config.session_timeout_ms.to_string());

        let consumer: StreamConsumer = client_config
            .create()
            .map_err(|e| EventBusError::Configuration(e.to_string()))?;

        let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topic_refs)
            .map_err(|e| EventBusError::ConsumeTransport(e.to_string()))?;

        info!(
            topics = ?topics,
            group_id = %config.consumer_group_id,
            "Subscribed to Kafka topics"
        );

        Ok(Self { consumer })
    }
}

#[async_trait]
impl MessageSource for KafkaMessageSource {
    async fn poll(&self, timeout: Duration) -> Result<Option<InboundMessage>, EventBusError> {
        let message = match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => return Ok(None),
            Ok(Err(e)) => return Err(EventBusError::from(e)),
            Ok(Ok(message)) => message,
        };

        let mut headers = HashMap::new();
        if let Some(kafka_headers) = message.headers() {
            for header in kafka_headers.iter() {
                if let Some(value) = header.value {
                    headers.insert(
                        header.key.to_string(),
                        String::from_utf8_lossy(value).to_string(),
                    );
                }
            }
        }

        Ok(Some(InboundMessage {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(|k| k.to_vec()),
            headers,
            payload: message.payload().map(|p| p.to_vec()).unwrap_or_default(),
        }))
    }

    async fn commit(&self, msg: &InboundMessage) -> Result<(), EventBusError> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&msg.topic, msg.partition, Offset::Offset(msg.offset + 1))
            .map_err(|e| EventBusError::Commit(e.to_string()))?;
        self.consumer
            .commit(&offsets, CommitMode::Sync)
            .map_err(|e| EventBusError::Commit(e.to_string()))
    }

    async fn close(&self) -> Result<(), EventBusError> {
        self.consumer.unsubscribe();
        Ok(())
    }
}

/// Sequential poll, decode, dispatch, commit loop over a consumer group
/// membership.
///
/// One message is in flight at a time: handler invocation is awaited
/// inline, which bounds in-flight work and keeps commit order equal to
/// processing order. A slow handler delays everything behind it on this
/// runtime's topics; scale out by running more instances in the same
/// group and letting the broker balance partitions.
///
/// Lifecycle: constructed stopped, [`run`](ConsumerRuntime::run) is the
/// running state, cancellation moves it through stopping (close and
/// final flush of the underlying consumer) back to stopped.
pub struct ConsumerRuntime {
    source: Option<Arc<dyn MessageSource>>,
    registry: Arc<HandlerRegistry>,
    poll_timeout: Duration,
}

impl ConsumerRuntime {
    /// Build a runtime over a Kafka consumer subscribed to the
    /// registry's resolved topics, or to the configured manual fallback
    /// list when no handler was registered. With both empty the runtime
    /// stays idle instead of exiting, so a deploy with no subscriptions
    /// does not crash-loop.
    pub fn new(config: &EventBusConfig, registry: HandlerRegistry) -> Result<Self, EventBusError> {
        let topics = Self::subscription_topics(config, &registry);

        let source: Option<Arc<dyn MessageSource>> = if topics.is_empty() {
            warn!("No handlers registered and no manual topics configured; consumer will idle");
            None
        } else {
            Some(Arc::new(KafkaMessageSource::new(config, &topics)?))
        };

        Ok(Self {
            source,
            registry: Arc::new(registry),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        })
    }

    /// Build a runtime over an explicit source: the seam used by tests
    /// and alternative transports.
    pub fn with_source(source: Arc<dyn MessageSource>, registry: HandlerRegistry) -> Self {
        Self {
            source: Some(source),
            registry: Arc::new(registry),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    fn subscription_topics(config: &EventBusConfig, registry: &HandlerRegistry) -> Vec<String> {
        if registry.is_empty() {
            config.manual_topic_fallback.clone()
        } else {
            registry.topics().into_iter().collect()
        }
    }

    /// Run until cancelled or until a handler fails.
    ///
    /// A handler error stops the loop and is returned with the failed
    /// message's offset uncommitted, so a restarted runtime (or another
    /// group member after rebalancing) sees the message again. Broker
    /// transport errors are logged and never stop the loop. An in-flight
    /// handler is not interrupted by cancellation; the signal takes
    /// effect once the current message finishes.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), EventBusError> {
        let Some(source) = &self.source else {
            info!("Consumer runtime idle; waiting for shutdown");
            cancel.cancelled().await;
            return Ok(());
        };

        info!(handlers = self.registry.len(), "Consumer runtime started");
        let result = self.poll_loop(source, &cancel).await;

        if let Err(e) = source.close().await {
            warn!(error = %e, "Error closing consumer");
        }
        info!("Consumer runtime stopped");
        result
    }

    async fn poll_loop(
        &self,
        source: &Arc<dyn MessageSource>,
        cancel: &CancellationToken,
    ) -> Result<(), EventBusError> {
        loop {
            let polled = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                polled = source.poll(self.poll_timeout) => polled,
            };

            let message = match polled {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(e) => {
                    // Transport failures are transient; the loop must
                    // outlive them.
                    error!(error = %e, "Broker error while polling");
                    continue;
                }
            };

            self.dispatch(source, &message, cancel).await?;
        }
    }

    async fn dispatch(
        &self,
        source: &Arc<dyn MessageSource>,
        message: &InboundMessage,
        cancel: &CancellationToken,
    ) -> Result<(), EventBusError> {
        let event_type = message.event_type();

        let Some(entry) = self.registry.get(event_type) else {
            // Left uncommitted: a handler may exist after the next
            // deploy, and committing here would drop the event for good.
            warn!(
                event_type,
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                "No handler registered for event type"
            );
            return Ok(());
        };

        debug!(
            event_type,
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            ordering_key = message.ordering_key().unwrap_or(""),
            "Dispatching event"
        );

        match entry.invoke(message.payload.clone(), cancel.clone()).await {
            Ok(()) => {
                if let Err(e) = source.commit(message).await {
                    // Redelivery after a failed commit is covered by
                    // handler idempotence.
                    error!(error = %e, "Offset commit failed");
                }
                Ok(())
            }
            Err(e) => {
                error!(
                    event_type,
                    offset = message.offset,
                    error = %e,
                    "Event handler failed; offset not committed"
                );
                Err(e)
            }
        }
    }
}
