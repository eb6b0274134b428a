//! The live, in-memory endpoint registry: role → `Endpoint`, plus the
//! address → role reverse map the dispatcher and liveness loop both need.
//!
//! This is distinct from the persisted `PairingRecord` (which never carries
//! timestamps): `refresh_from_record` rebuilds this registry's identity
//! fields from disk every tick, while `mark_seen` is driven purely by
//! inbound traffic and never persisted.

use crate::clock::Clock;
use crate::model::{Endpoint, PairingRecord, Role};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Inner {
    by_role: HashMap<Role, Endpoint>,
    reverse: HashMap<String, Role>,
}

pub struct EndpointRegistry {
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl EndpointRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        EndpointRegistry {
            clock,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Rebuilds identity fields (address, workspace name/id) from the
    /// persisted record, preserving each endpoint's `last_seen` if its role
    /// was already tracked, and rebuilds the reverse map from scratch.
    pub fn refresh_from_record(&self, record: &PairingRecord) {
        let mut guard = self.inner.lock().expect("endpoint registry mutex poisoned");
        let mut by_role = HashMap::new();
        let mut reverse = HashMap::new();

        for role in Role::ALL {
            if let Some(rec) = record.endpoint(role) {
                let last_seen = guard.by_role.get(&role).and_then(|ep| ep.last_seen);
                let endpoint = Endpoint {
                    role,
                    address: rec.ip.clone(),
                    workspace_name: Some(rec.workspace_name.clone()),
                    workspace_id: Some(rec.workspace_id.clone()),
                    last_seen,
                };
                reverse.insert(rec.ip.clone(), role);
                by_role.insert(role, endpoint);
            }
        }

        guard.by_role = by_role;
        guard.reverse = reverse;
    }

    pub fn snapshot(&self, role: Role) -> Option<Endpoint> {
        self.inner
            .lock()
            .expect("endpoint registry mutex poisoned")
            .by_role
            .get(&role)
            .cloned()
    }

    pub fn all(&self) -> Vec<Endpoint> {
        self.inner
            .lock()
            .expect("endpoint registry mutex poisoned")
            .by_role
            .values()
            .cloned()
            .collect()
    }

    pub fn role_for_address(&self, ip: &str) -> Option<Role> {
        self.inner
            .lock()
            .expect("endpoint registry mutex poisoned")
            .reverse
            .get(ip)
            .copied()
    }

    /// Marks `ip` as last-seen now, if it maps to a tracked role.
    pub fn mark_seen(&self, ip: &str) {
        let now = self.clock.now();
        let mut guard = self.inner.lock().expect("endpoint registry mutex poisoned");
        if let Some(role) = guard.reverse.get(ip).copied() {
            if let Some(ep) = guard.by_role.get_mut(&role) {
                ep.mark_seen(now);
            }
        }
    }

    /// Updates the workspace identifier of a tracked role in place (used by
    /// reconcile after a drift is detected), leaving `last_seen` untouched.
    pub fn update_workspace_id(&self, role: Role, workspace_id: String) {
        let mut guard = self.inner.lock().expect("endpoint registry mutex poisoned");
        if let Some(ep) = guard.by_role.get_mut(&role) {
            ep.workspace_id = Some(workspace_id);
        }
    }
}
