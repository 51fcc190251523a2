//! At-most-one in-flight sync per local id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slot = Arc<AsyncMutex<()>>;

#[derive(Debug, Default)]
pub struct InFlightRegistry {
    slots: Mutex<HashMap<String, Slot>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        // The map holds no invariants a panicking holder could break.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Waits until no other sync holds `local_id`, then claims it.
    pub async fn acquire(&self, local_id: &str) -> InFlightGuard<'_> {
        let slot = {
            let mut slots = self.slots();
            slots
                .entry(local_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let guard = slot.lock_owned().await;
        InFlightGuard {
            registry: self,
            local_id: local_id.to_string(),
            guard: Some(guard),
        }
    }

    pub fn is_in_flight(&self, local_id: &str) -> bool {
        self.slots()
            .get(local_id)
            .map(|slot| slot.try_lock().is_err())
            .unwrap_or(false)
    }

    fn release(&self, local_id: &str) {
        let mut slots = self.slots();
        let idle = slots
            .get(local_id)
            .map(|slot| Arc::strong_count(slot) == 1)
            .unwrap_or(false);
        if idle {
            slots.remove(local_id);
        }
    }
}

#[derive(Debug)]
pub struct InFlightGuard<'a> {
    registry: &'a InFlightRegistry,
    local_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.registry.release(&self.local_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn tracks_and_releases_slots() {
        let registry = InFlightRegistry::new();
        assert!(!registry.is_in_flight("a"));
        {
            let _guard = registry.acquire("a").await;
            assert!(registry.is_in_flight("a"));
            assert!(!registry.is_in_flight("b"));
        }
        assert!(!registry.is_in_flight("a"));
        assert!(registry.slots().is_empty());
    }

    #[tokio::test]
    async fn second_claim_waits_for_first() {
        let registry = Arc::new(InFlightRegistry::new());
        let first = registry.acquire("a").await;

        let contender = Arc::clone(&registry);
        let waiter = tokio::spawn(async move {
            let _guard = contender.acquire("a").await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish")
            .expect("waiter task");
    }
}
