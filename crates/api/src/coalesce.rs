//! Request coalescing for side-effecting creations.
//!
//! Concurrent callers asking for the same key share one in-flight creation.
//! A successful result keeps answering for that key until `window` has
//! passed; a failed or abandoned creation is forgotten at once so the next
//! caller can try again.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::debug;

type Slot<V> = Arc<OnceCell<V>>;
type Slots<K, V> = Arc<Mutex<HashMap<K, Slot<V>>>>;

fn lock<K, V>(slots: &Mutex<HashMap<K, Slot<V>>>) -> MutexGuard<'_, HashMap<K, Slot<V>>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

fn remove_if_current<K: Hash + Eq, V>(slots: &Mutex<HashMap<K, Slot<V>>>, key: &K, slot: &Slot<V>) {
    let mut slots = lock(slots);
    if slots.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
        slots.remove(key);
    }
}

/// A map from key to an in-flight or recently finished creation.
#[derive(Debug)]
pub struct Coalescer<K, V> {
    slots: Slots<K, V>,
    window: Duration,
}

/// Held by each caller while it waits on a slot. Dropping the last holder
/// of an unfinished slot (after an error, or when the caller's task is
/// cancelled mid-creation) removes it from the map.
struct SlotGuard<'a, K: Hash + Eq, V> {
    slots: &'a Mutex<HashMap<K, Slot<V>>>,
    key: K,
    slot: Slot<V>,
}

impl<K: Hash + Eq, V> Drop for SlotGuard<'_, K, V> {
    fn drop(&mut self) {
        // One reference in the map, one here: nobody else is waiting.
        if !self.slot.initialized() && Arc::strong_count(&self.slot) <= 2 {
            remove_if_current(self.slots, &self.key, &self.slot);
        }
    }
}

impl<K, V> Coalescer<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a coalescer whose results expire `window` after they resolve.
    pub fn new(window: Duration) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            window,
        }
    }

    /// Run `create` for `key` unless a creation for it is in flight or
    /// recently finished, in which case its result is returned instead.
    pub async fn run<F, Fut, E>(&self, key: K, create: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let guard = SlotGuard {
            slot: lock(&self.slots).entry(key.clone()).or_default().clone(),
            slots: &self.slots,
            key,
        };

        if let Some(value) = guard.slot.get() {
            debug!("Coalesced with a finished creation");
            return Ok(value.clone());
        }

        let mut ran = false;
        let result = guard
            .slot
            .get_or_try_init(|| {
                ran = true;
                create()
            })
            .await
            .cloned();

        match &result {
            Ok(_) if ran => self.expire_after_window(guard.key.clone(), Arc::clone(&guard.slot)),
            Ok(_) => debug!("Coalesced with an in-flight creation"),
            Err(_) => debug!("Creation failed"),
        }

        result
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    /// Whether no keys are tracked.
    pub fn is_empty(&self) -> bool {
        lock(&self.slots).is_empty()
    }

    fn expire_after_window(&self, key: K, slot: Slot<V>) {
        let slots = Arc::clone(&self.slots);
        let window = self.window;

        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            remove_if_current(&slots, &key, &slot);
        });
    }
}
