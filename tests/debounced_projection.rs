//! A registered handler feeding a debounced projection, the way the
//! chat service maintains conversation summaries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use emis_eventbus::{
    DebounceScheduler, EventBusConfig, FnEventHandler, HandlerRegistry, IntegrationEvent,
    encode_payload,
};

const WINDOW: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationUpdatedEvent {
    conversation_id: String,
    last_message_preview: String,
    updated_at: DateTime<Utc>,
}

impl IntegrationEvent for ConversationUpdatedEvent {
    const EVENT_TYPE: &'static str = "ConversationUpdatedEvent";

    fn event_id(&self) -> String {
        self.conversation_id.clone()
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn ordering_key(&self) -> Option<String> {
        Some(self.conversation_id.clone())
    }
}

/// Stand-in for the summary store; upserts guard against stale writes
/// by comparing the embedded timestamp, since partition order is not
/// guaranteed across restarts.
#[derive(Default)]
struct SummaryStore {
    rows: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
    upserts: Mutex<Vec<String>>,
}

impl SummaryStore {
    fn upsert(&self, event: ConversationUpdatedEvent) {
        self.upserts
            .lock()
            .unwrap()
            .push(event.last_message_preview.clone());

        let mut rows = self.rows.lock().unwrap();
        match rows.get(&event.conversation_id) {
            Some((_, stored_at)) if *stored_at > event.updated_at => {}
            _ => {
                rows.insert(
                    event.conversation_id.clone(),
                    (event.last_message_preview, event.updated_at),
                );
            }
        }
    }
}

fn event(conversation_id: &str, preview: &str) -> ConversationUpdatedEvent {
    ConversationUpdatedEvent {
        conversation_id: conversation_id.to_string(),
        last_message_preview: preview.to_string(),
        updated_at: Utc::now(),
    }
}

#[tokio::test(start_paused = true)]
async fn burst_of_updates_reaches_the_store_twice() {
    let store = Arc::new(SummaryStore::default());
    let scheduler = Arc::new(DebounceScheduler::new());

    let mut registry = HandlerRegistry::new(&EventBusConfig::new(
        "localhost:9092",
        "chat-consumer",
    ));
    {
        let store = store.clone();
        let scheduler = scheduler.clone();
        registry.register::<ConversationUpdatedEvent, _>(FnEventHandler(
            move |event: ConversationUpdatedEvent| {
                let store = store.clone();
                let scheduler = scheduler.clone();
                async move {
                    let key = event.conversation_id.clone();
                    scheduler
                        .submit(&key, event, WINDOW, move |latest| async move {
                            store.upsert(latest);
                        })
                        .await;
                    Ok(())
                }
            },
        ));
    }

    // Three updates for one conversation inside the window.
    let cancel = CancellationToken::new();
    for (i, preview) in ["first", "second", "third"].into_iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        let event = event("conv-1", preview);
        let payload = encode_payload(&event).unwrap();
        registry
            .dispatch("ConversationUpdatedEvent", payload, cancel.clone())
            .await
            .expect("handler registered")
            .unwrap();
    }

    // The first update was applied immediately.
    assert_eq!(*store.upserts.lock().unwrap(), vec!["first".to_string()]);

    // After the window closes only the newest update follows.
    tokio::time::sleep(WINDOW + Duration::from_millis(10)).await;
    assert_eq!(
        *store.upserts.lock().unwrap(),
        vec!["first".to_string(), "third".to_string()]
    );
    assert_eq!(
        store.rows.lock().unwrap().get("conv-1").map(|(p, _)| p.clone()),
        Some("third".to_string())
    );
}

#[test]
fn stale_update_does_not_overwrite_newer_row() {
    let store = SummaryStore::default();

    let newer = event("conv-1", "newer");
    let mut stale = event("conv-1", "stale");
    stale.updated_at = newer.updated_at - chrono::Duration::seconds(30);

    store.upsert(newer);
    store.upsert(stale);

    assert_eq!(
        store.rows.lock().unwrap().get("conv-1").map(|(p, _)| p.clone()),
        Some("newer".to_string())
    );
}
