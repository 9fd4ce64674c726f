use ecomap_economics::EntityId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

const PRUNE_THRESHOLD: usize = 256;

/// One async mutex per record id, created on first use.
///
/// Guards are owned so they can move into a spawned task together with the
/// work they protect.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    locks: Arc<Mutex<HashMap<EntityId, Arc<Mutex<()>>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &EntityId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            if locks.len() >= PRUNE_THRESHOLD {
                // Only the map holds a reference: nobody waits on these.
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(key.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub async fn tracked_keys(&self) -> usize {
        self.locks.lock().await.len()
    }
}
