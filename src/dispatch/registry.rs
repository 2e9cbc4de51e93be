//! Handler Registry
//!
//! Ordered multimap from a key to the handlers registered under it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

// shared by every registry so an id never names handlers in two of them
static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Token returned by registration, used to remove that one handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    fn next() -> Self {
        HandlerId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Ordered multimap of handlers
///
/// Handlers under one key keep their registration order.
pub struct HandlerRegistry<K, H> {
    entries: BTreeMap<K, Vec<(HandlerId, H)>>,
}

impl<K: Ord, H> Default for HandlerRegistry<K, H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, H> HandlerRegistry<K, H> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Append a handler under `key`
    pub fn insert(&mut self, key: K, handler: H) -> HandlerId {
        let id = HandlerId::next();
        self.entries.entry(key).or_default().push((id, handler));
        id
    }

    /// Remove the handler registered as `id`
    pub fn remove(&mut self, id: HandlerId) -> bool {
        let mut found = false;
        for handlers in self.entries.values_mut() {
            if let Some(pos) = handlers.iter().position(|(hid, _)| *hid == id) {
                handlers.remove(pos);
                found = true;
                break;
            }
        }
        if found {
            self.entries.retain(|_, handlers| !handlers.is_empty());
        }
        found
    }

    /// Handlers under `key`, in registration order
    pub fn get<Q>(&self, key: &Q) -> impl Iterator<Item = &H>
    where
        K: std::borrow::Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.entries
            .get(key)
            .into_iter()
            .flat_map(|handlers| handlers.iter().map(|(_, h)| h))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
