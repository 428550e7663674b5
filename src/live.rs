use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::swap::merge;
use crate::swap::{SwapRecord, SwapUpdate};

#[derive(Debug)]
struct Slot {
    subscriber: String,
    token: u64,
    tx: mpsc::UnboundedSender<SwapUpdate>,
}

#[derive(Debug, Default)]
struct HubInner {
    next_token: u64,
    slots: HashMap<String, Vec<Slot>>,
}

impl HubInner {
    fn remove(&mut self, swap_id: &str, token: u64) {
        if let Some(slots) = self.slots.get_mut(swap_id) {
            slots.retain(|s| s.token != token);
            if slots.is_empty() {
                self.slots.remove(swap_id);
            }
        }
    }
}

/// In-process fan-out of swap updates, keyed by swap id.
///
/// Each `(subscriber, swap_id)` pair holds at most one live subscription.
/// Dropping the hub closes every subscription.
#[derive(Debug, Clone, Default)]
pub struct UpdateHub {
    inner: Arc<Mutex<HubInner>>,
}

impl UpdateHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `subscriber` to `swap_id`, closing any earlier subscription of the same pair.
    pub fn subscribe(&self, subscriber: impl Into<String>, swap_id: impl Into<String>) -> Subscription {
        let subscriber = subscriber.into();
        let swap_id = swap_id.into();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut inner = self.inner.lock().expect("hub mutex poisoned");
        inner.next_token += 1;
        let token = inner.next_token;
        let slots = inner.slots.entry(swap_id.clone()).or_default();
        let replaced = slots.len();
        slots.retain(|s| s.subscriber != subscriber);
        if slots.len() != replaced {
            tracing::debug!(%subscriber, %swap_id, "replace subscription");
        }
        slots.push(Slot {
            subscriber: subscriber.clone(),
            token,
            tx,
        });
        drop(inner);

        Subscription {
            swap_id,
            subscriber,
            token,
            rx,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Delivers `update` to every live subscriber of `swap_id`. Returns how many received it.
    pub fn publish(&self, swap_id: &str, update: &SwapUpdate) -> usize {
        let mut inner = self.inner.lock().expect("hub mutex poisoned");
        let Some(slots) = inner.slots.get_mut(swap_id) else {
            return 0;
        };
        slots.retain(|s| s.tx.send(update.clone()).is_ok());
        let delivered = slots.len();
        if delivered == 0 {
            inner.slots.remove(swap_id);
        }
        tracing::trace!(%swap_id, status = %update.status, delivered, "publish");
        delivered
    }

    pub fn subscriber_count(&self, swap_id: &str) -> usize {
        self.inner
            .lock()
            .expect("hub mutex poisoned")
            .slots
            .get(swap_id)
            .map_or(0, Vec::len)
    }
}

/// Receiving end of one hub subscription. Unsubscribes on drop.
#[derive(Debug)]
pub struct Subscription {
    swap_id: String,
    subscriber: String,
    token: u64,
    rx: mpsc::UnboundedReceiver<SwapUpdate>,
    hub: Weak<Mutex<HubInner>>,
}

impl Subscription {
    pub fn swap_id(&self) -> &str {
        &self.swap_id
    }

    pub fn subscriber(&self) -> &str {
        &self.subscriber
    }

    /// Next update, or `None` once the hub is gone or this subscription was replaced.
    pub async fn recv(&mut self) -> Option<SwapUpdate> {
        self.rx.recv().await
    }

    /// An already delivered update, without waiting.
    pub fn try_recv(&mut self) -> Option<SwapUpdate> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade()
            && let Ok(mut inner) = hub.lock()
        {
            inner.remove(&self.swap_id, self.token);
        }
    }
}

/// Settled swaps receive no further updates worth listening for.
pub fn needs_subscription(record: &SwapRecord) -> bool {
    !record.is_settled()
}

/// Folds updates from `subscription` into `record`, publishing every changed
/// snapshot on `snapshots`. Returns the last snapshot once the swap settles or
/// the subscription closes.
pub async fn track(
    record: SwapRecord,
    mut subscription: Subscription,
    snapshots: watch::Sender<SwapRecord>,
) -> SwapRecord {
    let mut current = record;
    while !current.is_settled() {
        let Some(update) = subscription.recv().await else {
            tracing::debug!(swap_id = %current.id, "subscription closed");
            break;
        };
        let Some(next) = merge::merge(&current, &update) else {
            continue;
        };
        current = next;
        snapshots.send_replace(current.clone());
    }
    if current.is_settled() {
        tracing::info!(swap_id = %current.id, "swap settled; stop tracking");
    }
    current
}

/// Spawns [`track`] on the current runtime, returning the snapshot receiver and the task.
pub fn spawn_tracker(
    record: SwapRecord,
    subscription: Subscription,
) -> (watch::Receiver<SwapRecord>, JoinHandle<SwapRecord>) {
    let (tx, rx) = watch::channel(record.clone());
    let handle = tokio::spawn(track(record, subscription, tx));
    (rx, handle)
}
