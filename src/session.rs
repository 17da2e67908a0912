//! Persisted per-user selections.
//!
//! The core only defines the storage seam; the browser-side persistence
//! adapter lives with the embedding application. The in-memory store backs
//! tests and the companion binary.

use std::sync::Mutex;

/// Selections that survive a page reload.
pub trait SessionStore: Send + Sync {
    /// Chain id of the last explicitly selected network.
    fn selected_network(&self) -> Option<u64>;
    fn set_selected_network(&self, chain_id: u64);

    /// Whether the user has accepted the terms of service.
    fn terms_accepted(&self) -> bool;
    fn set_terms_accepted(&self, accepted: bool);
}

/// Non-persisting store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    selected_network: Option<u64>,
    terms_accepted: bool,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn selected_network(&self) -> Option<u64> {
        self.lock().selected_network
    }

    fn set_selected_network(&self, chain_id: u64) {
        self.lock().selected_network = Some(chain_id);
    }

    fn terms_accepted(&self) -> bool {
        self.lock().terms_accepted
    }

    fn set_terms_accepted(&self, accepted: bool) {
        self.lock().terms_accepted = accepted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemorySessionStore::new();
        assert_eq!(store.selected_network(), None);
        assert!(!store.terms_accepted());

        store.set_selected_network(1);
        store.set_terms_accepted(true);
        assert_eq!(store.selected_network(), Some(1));
        assert!(store.terms_accepted());
    }
}
