//! Reply-waiter registry: a keyed one-shot rendezvous between an outbound
//! request and the inbound reply that answers it.
//!
//! `tokio::sync::oneshot` was considered and rejected: it conflates waking
//! and retrieving into a single consuming receive, but `spec.md` §4.3 treats
//! "wake" (`set`) and "retrieve-and-remove" (`pop`) as distinct operations
//! with an explicit benign-race note for late replies. A `Notify` per key
//! plus a separate payload map models the four operations directly.

use crate::model::WaiterKey;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Default)]
pub struct WaiterRegistry {
    notifies: Mutex<HashMap<WaiterKey, Arc<Notify>>>,
    payloads: Mutex<HashMap<WaiterKey, Value>>,
}

impl WaiterRegistry {
    pub fn new() -> Self {
        WaiterRegistry::default()
    }

    /// Creates a fresh rendezvous under `key`, overwriting any prior one.
    /// `Notify::notify_one` stores a single permit when called with no
    /// waiter parked yet, so a reply landing between `arm` and the
    /// subsequent `wait` is not lost.
    pub fn arm(&self, key: WaiterKey) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.notifies.lock().expect("waiter mutex poisoned").insert(key.clone(), notify.clone());
        self.payloads.lock().expect("waiter mutex poisoned").remove(&key);
        notify
    }

    /// Deposits the payload and wakes the armed event under `key`, if any.
    pub fn set(&self, key: &WaiterKey, payload: Value) {
        self.payloads
            .lock()
            .expect("waiter mutex poisoned")
            .insert(key.clone(), payload);
        if let Some(notify) = self.notifies.lock().expect("waiter mutex poisoned").get(key) {
            notify.notify_one();
        }
    }

    /// Removes and returns the payload under `key`, forgetting the event.
    pub fn pop(&self, key: &WaiterKey) -> Option<Value> {
        self.notifies.lock().expect("waiter mutex poisoned").remove(key);
        self.payloads.lock().expect("waiter mutex poisoned").remove(key)
    }

    /// Forgets both the event and any payload under `key` without reading it.
    pub fn cleanup(&self, key: &WaiterKey) {
        self.notifies.lock().expect("waiter mutex poisoned").remove(key);
        self.payloads.lock().expect("waiter mutex poisoned").remove(key);
    }

    /// Convenience for the common `arm, send, wait, pop-or-cleanup` pattern.
    pub async fn wait_for(&self, key: WaiterKey, timeout: std::time::Duration) -> Option<Value> {
        let notify = self.arm(key.clone());
        let _ = tokio::time::timeout(timeout, notify.notified()).await;
        let payload = self.pop(&key);
        self.cleanup(&key);
        payload
    }
}
