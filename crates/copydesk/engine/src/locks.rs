use copydesk_types::ContentId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

const PRUNE_THRESHOLD: usize = 1024;

/// One async mutex per content aggregate.
///
/// Transitions on the same content are serialised; different content items
/// proceed independently.
#[derive(Default)]
pub(crate) struct ContentLocks {
    slots: Mutex<HashMap<ContentId, Arc<AsyncMutex<()>>>>,
}

impl ContentLocks {
    pub(crate) async fn acquire(&self, content_id: &ContentId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self
                .slots
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if slots.len() > PRUNE_THRESHOLD {
                slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            }
            slots
                .entry(content_id.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        slot.lock_owned().await
    }
}
