// Personal queue: an ordered shortlist of item ids, persisted locally.

use tracing::warn;

use super::ItemId;
use crate::local::{LocalStore, QUEUE_KEY};

/// Ordered, duplicate-free list of item ids the local user is watching.
///
/// When backed by a [`LocalStore`] every mutation is written through under
/// `draft_queue`. A failed write is logged and the in-memory queue stays
/// authoritative for the session.
#[derive(Clone, Default)]
pub struct Queue {
    items: Vec<ItemId>,
    store: Option<LocalStore>,
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("items", &self.items)
            .field("persisted", &self.store.is_some())
            .finish()
    }
}

impl Queue {
    /// An in-memory queue (tests, simulated sessions without local storage).
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore the queue from local storage. Unreadable state starts empty.
    pub fn load(store: LocalStore) -> Self {
        let mut items: Vec<ItemId> = store.get_or_discard(QUEUE_KEY).unwrap_or_default();
        let mut seen = std::collections::HashSet::new();
        items.retain(|id| seen.insert(*id));
        Queue {
            items,
            store: Some(store),
        }
    }

    pub fn items(&self) -> &[ItemId] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.items.contains(&id)
    }

    /// Append `id` unless already queued. Returns whether it was added.
    pub fn enqueue(&mut self, id: ItemId) -> bool {
        if self.contains(id) {
            return false;
        }
        self.items.push(id);
        self.persist();
        true
    }

    /// Remove `id` if present. Returns whether it was removed.
    pub fn dequeue(&mut self, id: ItemId) -> bool {
        let before = self.items.len();
        self.items.retain(|&x| x != id);
        let removed = self.items.len() != before;
        if removed {
            self.persist();
        }
        removed
    }

    /// The first `n` entries.
    pub fn preview(&self, n: usize) -> &[ItemId] {
        &self.items[..n.min(self.items.len())]
    }

    fn persist(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.set(QUEUE_KEY, &self.items) {
                warn!("Failed to persist queue: {e:#}");
            }
        }
    }
}
