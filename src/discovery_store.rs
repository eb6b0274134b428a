//! Transient map from responder address to its last-seen workspace listing.
//!
//! Cleared at the start of each discovery phase, populated by the inbound
//! dispatcher as `/workspaces` replies arrive, and read once by the role
//! decider at the end of the wait window.

use std::collections::HashMap;
use std::sync::Mutex;

/// Display name → workspace identifier, as parsed out of a `/workspaces` reply.
pub type WorkspaceListing = HashMap<String, String>;

#[derive(Default)]
pub struct DiscoveryStore {
    inner: Mutex<HashMap<String, WorkspaceListing>>,
}

impl DiscoveryStore {
    pub fn new() -> Self {
        DiscoveryStore::default()
    }

    pub fn clear(&self) {
        self.inner.lock().expect("discovery store mutex poisoned").clear();
    }

    pub fn upsert(&self, ip: impl Into<String>, listing: WorkspaceListing) {
        self.inner
            .lock()
            .expect("discovery store mutex poisoned")
            .insert(ip.into(), listing);
    }

    /// A frozen copy of everything seen since the last `clear`.
    pub fn snapshot(&self) -> HashMap<String, WorkspaceListing> {
        self.inner.lock().expect("discovery store mutex poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_removes_everything_previously_upserted() {
        let store = DiscoveryStore::new();
        let mut listing = HashMap::new();
        listing.insert("show_main".to_owned(), "abc123".to_owned());
        store.upsert("10.0.0.1", listing);
        assert_eq!(store.snapshot().len(), 1);

        store.clear();
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn later_upsert_for_same_ip_overwrites() {
        let store = DiscoveryStore::new();
        let mut first = HashMap::new();
        first.insert("a".to_owned(), "1".to_owned());
        store.upsert("10.0.0.1", first);

        let mut second = HashMap::new();
        second.insert("b".to_owned(), "2".to_owned());
        store.upsert("10.0.0.1", second);

        let snap = store.snapshot();
        assert_eq!(snap.len(), 1);
        assert!(snap["10.0.0.1"].contains_key("b"));
    }
}
