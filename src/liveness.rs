//! Heartbeat cadence, offline detection, and exponential-backoff workspace
//! identifier reconciliation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::warn;

use crate::clock::Clock;
use crate::endpoints::EndpointRegistry;
use crate::model::Role;
use crate::protocol::Protocol;
use crate::store::Store;

const THUMP_THROTTLE: Duration = Duration::from_secs(2);
const RECONCILE_THROTTLE: Duration = Duration::from_secs(5);
const BACKOFF_BASE: Duration = Duration::from_secs(2);
const BACKOFF_MAX: Duration = Duration::from_secs(20);
const HEAL_MISMATCH_WINDOW: Duration = Duration::from_secs(3);

pub struct Liveness {
    protocol: Arc<Protocol>,
    endpoints: Arc<EndpointRegistry>,
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    last_thump: Mutex<HashMap<(String, String), Instant>>,
    last_reconcile: Mutex<HashMap<Role, Instant>>,
    backoff: Mutex<HashMap<Role, Duration>>,
    next_try: Mutex<HashMap<Role, Instant>>,
    heal_mismatch_until: Mutex<HashMap<Role, Instant>>,
}

impl Liveness {
    pub fn new(protocol: Arc<Protocol>, endpoints: Arc<EndpointRegistry>, store: Arc<Store>, clock: Arc<dyn Clock>) -> Self {
        Liveness {
            protocol,
            endpoints,
            store,
            clock,
            last_thump: Mutex::new(HashMap::new()),
            last_reconcile: Mutex::new(HashMap::new()),
            backoff: Mutex::new(HashMap::new()),
            next_try: Mutex::new(HashMap::new()),
            heal_mismatch_until: Mutex::new(HashMap::new()),
        }
    }

    /// Re-primes (throttled) and re-connects (throttled), then sends at
    /// most one `/thump` per 2 s per (ip, wsid).
    pub async fn thump_fire(&self, role: Role) {
        let ep = match self.endpoints.snapshot(role) {
            Some(ep) => ep,
            None => return,
        };
        let wsid = match &ep.workspace_id {
            Some(w) => w.clone(),
            None => return,
        };

        self.protocol.ensure_app_flags(&ep.address, false);
        self.protocol.ensure_connected(&ep.address, &wsid, false).await;

        let now = self.clock.now();
        let key = (ep.address.clone(), wsid.clone());
        {
            let mut guard = self.last_thump.lock().expect("liveness mutex poisoned");
            if let Some(&last) = guard.get(&key) {
                if now.saturating_duration_since(last) < THUMP_THROTTLE {
                    return;
                }
            }
            guard.insert(key, now);
        }
        self.protocol.send_thump(&ep.address, &wsid);
    }

    /// Attempts a reconcile for `role` if both the backoff gate and the 5 s
    /// per-role throttle allow it. Returns whether it actually ran.
    pub async fn maybe_reconcile(&self, role: Role) -> bool {
        let now = self.clock.now();

        if let Some(&next) = self.next_try.lock().expect("liveness mutex poisoned").get(&role) {
            if now < next {
                return false;
            }
        }
        {
            let mut guard = self.last_reconcile.lock().expect("liveness mutex poisoned");
            if let Some(&last) = guard.get(&role) {
                if now.saturating_duration_since(last) < RECONCILE_THROTTLE {
                    return false;
                }
            }
            guard.insert(role, now);
        }

        self.reconcile_endpoint(role).await;
        true
    }

    async fn reconcile_endpoint(&self, role: Role) {
        let ep = match self.endpoints.snapshot(role) {
            Some(ep) => ep,
            None => return,
        };
        let desired_name = match &ep.workspace_name {
            Some(name) => name.clone(),
            None => return,
        };

        self.protocol.ensure_app_flags(&ep.address, true);
        let reply = self.protocol.request_workspaces(&ep.address).await;
        let listing = reply.as_ref().and_then(Protocol::parse_workspaces);

        let new_id = match listing.and_then(|l| l.get(&desired_name).cloned()) {
            Some(id) => id,
            None => {
                self.bump_backoff(role);
                return;
            }
        };

        if ep.workspace_id.as_deref() != Some(new_id.as_str()) {
            self.persist_new_workspace_id(role, &new_id);
            warn!(%role, old = ?ep.workspace_id, new = %new_id, "workspace identifier drifted, reconciled");
        }

        self.protocol.ensure_connected(&ep.address, &new_id, true).await;
        self.protocol.ensure_app_flags(&ep.address, true);
        self.reset_backoff(role);
    }

    /// Operator-triggered, non-destructive variant: never renames, only
    /// flags a mismatch on the LED if the expected workspace is missing.
    pub async fn heal(&self) {
        for role in Role::ALL {
            let ep = match self.endpoints.snapshot(role) {
                Some(ep) => ep,
                None => continue,
            };
            let desired_name = match &ep.workspace_name {
                Some(name) => name.clone(),
                None => continue,
            };

            self.protocol.ensure_app_flags(&ep.address, true);
            let reply = self.protocol.request_workspaces(&ep.address).await;
            let listing = reply.as_ref().and_then(Protocol::parse_workspaces);

            match listing.and_then(|l| l.get(&desired_name).cloned()) {
                None => self.mark_heal_mismatch(role),
                Some(new_id) if ep.workspace_id.as_deref() != Some(new_id.as_str()) => {
                    self.persist_new_workspace_id(role, &new_id);
                }
                Some(_) => {}
            }
        }
    }

    pub fn heal_mismatch_active(&self, role: Role) -> bool {
        let now = self.clock.now();
        self.heal_mismatch_until
            .lock()
            .expect("liveness mutex poisoned")
            .get(&role)
            .is_some_and(|&expiry| now < expiry)
    }

    fn mark_heal_mismatch(&self, role: Role) {
        let expiry = self.clock.now() + HEAL_MISMATCH_WINDOW;
        self.heal_mismatch_until
            .lock()
            .expect("liveness mutex poisoned")
            .insert(role, expiry);
    }

    fn persist_new_workspace_id(&self, role: Role, new_id: &str) {
        self.endpoints.update_workspace_id(role, new_id.to_owned());
        let mut record = self.store.load();
        if let Some(rec) = record.endpoints.get_mut(role.as_str()) {
            rec.workspace_id = new_id.to_owned();
        }
        if let Err(e) = self.store.save(&record) {
            warn!(%role, error = %e, "failed to persist reconciled workspace identifier");
        }
    }

    fn bump_backoff(&self, role: Role) {
        let now = self.clock.now();
        let mut backoff = self.backoff.lock().expect("liveness mutex poisoned");
        let current = backoff.get(&role).copied().unwrap_or(Duration::ZERO);
        let next = if current.is_zero() {
            BACKOFF_BASE
        } else {
            (current * 2).min(BACKOFF_MAX)
        };
        backoff.insert(role, next);
        self.next_try
            .lock()
            .expect("liveness mutex poisoned")
            .insert(role, now + next);
    }

    fn reset_backoff(&self, role: Role) {
        self.backoff.lock().expect("liveness mutex poisoned").remove(&role);
        self.next_try.lock().expect("liveness mutex poisoned").remove(&role);
    }

    #[cfg(test)]
    pub(crate) fn current_backoff(&self, role: Role) -> Duration {
        self.backoff
            .lock()
            .expect("liveness mutex poisoned")
            .get(&role)
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::config::NetworkConfig;
    use crate::send_worker::SendWorker;
    use crate::waiters::WaiterRegistry;

    fn build() -> (Liveness, Arc<FakeClock>) {
        let clock = Arc::new(FakeClock::new());
        let endpoints = Arc::new(EndpointRegistry::new(clock.clone()));
        let send = SendWorker::spawn();
        let waiters = Arc::new(WaiterRegistry::new());
        let network = NetworkConfig {
            qlab_port: 53000,
            listen_addr: "0.0.0.0".to_owned(),
            reply_port: 53001,
            broadcast_addr: "255.255.255.255".to_owned(),
            passcode: None,
        };
        let protocol = Arc::new(Protocol::new(send, waiters, endpoints.clone(), clock.clone(), network));
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::new(dir.path().join("state.json")));
        let liveness = Liveness::new(protocol, endpoints, store, clock.clone());
        (liveness, clock)
    }

    #[test]
    fn backoff_doubles_from_base_and_caps_at_twenty_seconds() {
        let (liveness, _clock) = build();
        liveness.bump_backoff(Role::Primary);
        assert_eq!(liveness.current_backoff(Role::Primary), Duration::from_secs(2));
        liveness.bump_backoff(Role::Primary);
        assert_eq!(liveness.current_backoff(Role::Primary), Duration::from_secs(4));
        for _ in 0..10 {
            liveness.bump_backoff(Role::Primary);
        }
        assert_eq!(liveness.current_backoff(Role::Primary), Duration::from_secs(20));
    }

    #[test]
    fn reset_backoff_clears_it() {
        let (liveness, _clock) = build();
        liveness.bump_backoff(Role::Primary);
        liveness.reset_backoff(Role::Primary);
        assert_eq!(liveness.current_backoff(Role::Primary), Duration::ZERO);
    }

    #[test]
    fn heal_mismatch_expires_after_the_window() {
        let (liveness, clock) = build();
        liveness.mark_heal_mismatch(Role::Backup);
        assert!(liveness.heal_mismatch_active(Role::Backup));
        clock.advance(HEAL_MISMATCH_WINDOW + Duration::from_millis(1));
        assert!(!liveness.heal_mismatch_active(Role::Backup));
    }
}
