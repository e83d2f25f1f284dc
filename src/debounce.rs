//! Per-key debounced coalescing of bursty downstream effects

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

type StoredEffect<E> = Box<dyn FnOnce(E) -> BoxFuture<'static, ()> + Send>;

struct PendingUpdate<E> {
    /// Latest event and effect seen since the fast path ran; `None`
    /// until a second submission arrives within the window, so a lone
    /// submission fires exactly once.
    latest: Option<(E, StoredEffect<E>)>,
    /// Bumped on every timer reset; a timer task only acts if its
    /// captured value still matches.
    seq: u64,
    timer: JoinHandle<()>,
}

/// Coalesces bursts of per-key updates into at most two effect runs.
///
/// The first submission for a key runs its effect immediately, so a
/// brand-new entity (say, a conversation that must show up in a list)
/// is visible without delay. Further submissions within the window
/// replace the stored event and push the deadline out; when the window
/// finally elapses the most recent effect runs once and the key resets.
/// A burst of N submissions therefore produces exactly two invocations,
/// carrying the first and the last event; everything in between is
/// dropped.
///
/// Handlers submit into the scheduler and never touch timer state.
/// Partition order is not re-checked here: effects that write
/// downstream state should compare an embedded timestamp against the
/// stored row before overwriting, in case messages for one key were
/// processed out of order across restarts.
pub struct DebounceScheduler<E> {
    pending: Arc<Mutex<HashMap<String, PendingUpdate<E>>>>,
}

impl<E: Send + 'static> DebounceScheduler<E> {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Submit an update for `key`.
    ///
    /// The effect runs on the caller's task for the immediate fast path
    /// and on a timer task for the deferred one; in both cases it runs
    /// outside the table lock, so a slow effect never blocks other keys.
    pub async fn submit<F, Fut>(&self, key: &str, event: E, window: Duration, effect: F)
    where
        F: FnOnce(E) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let effect: StoredEffect<E> = Box::new(move |event| Box::pin(effect(event)));

        let immediate = {
            let mut pending = self.pending.lock().await;
            match pending.entry(key.to_string()) {
                Entry::Vacant(slot) => {
                    let timer = self.arm_timer(key.to_string(), 0, window);
                    slot.insert(PendingUpdate {
                        latest: None,
                        seq: 0,
                        timer,
                    });
                    Some((event, effect))
                }
                Entry::Occupied(mut slot) => {
                    let update = slot.get_mut();
                    update.timer.abort();
                    update.seq += 1;
                    update.latest = Some((event, effect));
                    update.timer = self.arm_timer(key.to_string(), update.seq, window);
                    None
                }
            }
        };

        if let Some((event, effect)) = immediate {
            debug!(key, "Debounce fast path");
            effect(event).await;
        }
    }

    /// Number of keys currently inside their window.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    fn arm_timer(&self, key: String, seq: u64, window: Duration) -> JoinHandle<()> {
        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            tokio::time::sleep(window).await;

            let fired = {
                let mut table = pending.lock().await;
                // A reset may have raced this timer; the newer timer
                // owns the key then.
                let current = table.get(&key).is_some_and(|update| update.seq == seq);
                if current {
                    table.remove(&key).and_then(|update| update.latest)
                } else {
                    None
                }
            };

            if let Some((event, effect)) = fired {
                debug!(key = %key, "Debounce window elapsed");
                effect(event).await;
            }
        })
    }
}

impl<E: Send + 'static> Default for DebounceScheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}
