//! Handler registration and type-erased dispatch

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::EventBusConfig;
use crate::error::EventBusError;
use crate::event::{self, IntegrationEvent};
use crate::topic::TopicResolver;

/// Handles a single event type.
///
/// Handlers run inside the consumer loop; the offset of a message is
/// committed only after `handle` returns `Ok`, so a failing or crashed
/// handler sees the same message again after a restart. Handlers must
/// therefore be idempotent, e.g. by making the downstream effect an
/// upsert keyed by entity id.
#[async_trait]
pub trait EventHandler<E: IntegrationEvent>: Send + Sync + 'static {
    /// Process one event. The token is the runtime's shutdown signal;
    /// long-running handlers may observe it to bail out early.
    async fn handle(&self, event: E, cancel: &CancellationToken) -> Result<(), EventBusError>;
}

/// Adapter turning a plain async closure into an [`EventHandler`].
pub struct FnEventHandler<F>(pub F);

#[async_trait]
impl<E, F, Fut> EventHandler<E> for FnEventHandler<F>
where
    E: IntegrationEvent,
    F: Fn(E) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<(), EventBusError>> + Send,
{
    async fn handle(&self, event: E, _cancel: &CancellationToken) -> Result<(), EventBusError> {
        (self.0)(event).await
    }
}

type DispatchFn = Arc<
    dyn Fn(Vec<u8>, CancellationToken) -> BoxFuture<'static, Result<(), EventBusError>>
        + Send
        + Sync,
>;

/// A registered event type: its resolved topic and the closure that
/// decodes a raw payload and invokes the typed handler.
pub(crate) struct HandlerEntry {
    pub(crate) topic: String,
    dispatch: DispatchFn,
}

impl HandlerEntry {
    pub(crate) fn invoke(
        &self,
        payload: Vec<u8>,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<(), EventBusError>> {
        (self.dispatch)(payload, cancel)
    }
}

/// Registry mapping event type names to handler descriptors.
///
/// Built once at startup, before the consumer loop begins, and
/// immutable afterwards. Each registration closes over its payload
/// type, so dispatch needs no runtime type lookup: the consumer matches
/// the `event-type` header against this map and runs the stored
/// closure. Registering the same event type twice replaces the earlier
/// handler.
pub struct HandlerRegistry {
    resolver: TopicResolver,
    entries: HashMap<&'static str, HandlerEntry>,
}

impl HandlerRegistry {
    /// Create a registry resolving topics from the given configuration.
    pub fn new(config: &EventBusConfig) -> Self {
        Self {
            resolver: TopicResolver::new(config),
            entries: HashMap::new(),
        }
    }

    /// Register a handler for `E`, resolving its topic as a side effect.
    pub fn register<E, H>(&mut self, handler: H)
    where
        E: IntegrationEvent,
        H: EventHandler<E>,
    {
        let topic = self.resolver.resolve(E::EVENT_TYPE);
        let handler = Arc::new(handler);
        let invoke: DispatchFn = Arc::new(move |payload: Vec<u8>, cancel: CancellationToken| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let decoded = event::decode_payload::<E>(&payload)
                    .map_err(|e| EventBusError::handler(E::EVENT_TYPE, e))?;
                handler
                    .handle(decoded, &cancel)
                    .await
                    .map_err(|e| EventBusError::handler(E::EVENT_TYPE, e))
            })
        });

        debug!(event_type = E::EVENT_TYPE, topic = %topic, "Registered event handler");
        self.entries.insert(
            E::EVENT_TYPE,
            HandlerEntry {
                topic,
                dispatch: invoke,
            },
        );
    }

    /// Decode `payload` and invoke the handler registered for
    /// `event_type`. Returns `None` on a lookup miss, leaving the
    /// unroutable-event policy to the caller.
    pub async fn dispatch(
        &self,
        event_type: &str,
        payload: Vec<u8>,
        cancel: CancellationToken,
    ) -> Option<Result<(), EventBusError>> {
        let entry = self.entries.get(event_type)?;
        Some(entry.invoke(payload, cancel).await)
    }

    /// Union of the registered handlers' resolved topics, deduplicated.
    pub fn topics(&self) -> BTreeSet<String> {
        self.entries
            .values()
            .map(|entry| entry.topic.clone())
            .collect()
    }

    /// Number of registered event types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no handlers were registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn get(&self, event_type: &str) -> Option<&HandlerEntry> {
        self.entries.get(event_type)
    }
}
