//! Composes the re-prime / list-workspaces / connect / cue-action request
//! sequences out of the send worker and reply-waiter registry.

use rosc::OscType;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

use crate::clock::Clock;
use crate::config::NetworkConfig;
use crate::endpoints::EndpointRegistry;
use crate::model::WaiterKey;
use crate::send_worker::SendWorker;
use crate::waiters::WaiterRegistry;

const FLAG_PRIME_THROTTLE: Duration = Duration::from_secs(10);
const CONNECT_THROTTLE: Duration = Duration::from_secs(6);
const WORKSPACES_TIMEOUT: Duration = Duration::from_millis(900);
const CONNECT_TIMEOUT: Duration = Duration::from_millis(700);

pub struct Protocol {
    send: SendWorker,
    waiters: Arc<WaiterRegistry>,
    endpoints: Arc<EndpointRegistry>,
    clock: Arc<dyn Clock>,
    network: NetworkConfig,
    last_primed: Mutex<HashMap<String, std::time::Instant>>,
    last_connect_attempt: Mutex<HashMap<String, std::time::Instant>>,
}

impl Protocol {
    pub fn new(
        send: SendWorker,
        waiters: Arc<WaiterRegistry>,
        endpoints: Arc<EndpointRegistry>,
        clock: Arc<dyn Clock>,
        network: NetworkConfig,
    ) -> Self {
        Protocol {
            send,
            waiters,
            endpoints,
            clock,
            network,
            last_primed: Mutex::new(HashMap::new()),
            last_connect_attempt: Mutex::new(HashMap::new()),
        }
    }

    /// Primes the remote to talk back to us: reply port, always-reply,
    /// don't-forget-me. Throttled to once per 10 s per address unless `force`.
    pub fn ensure_app_flags(&self, ip: &str, force: bool) {
        if !force {
            let now = self.clock.now();
            let mut guard = self.last_primed.lock().expect("protocol mutex poisoned");
            if let Some(&last) = guard.get(ip) {
                if now.saturating_duration_since(last) < FLAG_PRIME_THROTTLE {
                    return;
                }
            }
            guard.insert(ip.to_owned(), now);
        } else {
            self.last_primed
                .lock()
                .expect("protocol mutex poisoned")
                .insert(ip.to_owned(), self.clock.now());
        }

        self.send.send_app(
            ip,
            self.network.qlab_port,
            "/udpReplyPort",
            vec![OscType::Int(i32::from(self.network.reply_port))],
        );
        self.send.send_app(ip, self.network.qlab_port, "/alwaysReply", vec![]);
        self.send.send_app(ip, self.network.qlab_port, "/forgetMeNot", vec![]);
    }

    /// Arms, sends `/workspaces`, waits, returns the parsed reply envelope.
    pub async fn request_workspaces(&self, ip: &str) -> Option<Value> {
        let key = WaiterKey::Workspaces { ip: ip.to_owned() };
        let notify = self.waiters.arm(key.clone());
        self.send.send_app(ip, self.network.qlab_port, "/workspaces", vec![]);
        let _ = tokio::time::timeout(WORKSPACES_TIMEOUT, notify.notified()).await;
        let payload = self.waiters.pop(&key);
        self.waiters.cleanup(&key);
        payload
    }

    /// Parses a `/workspaces` reply envelope into display-name → identifier.
    /// Accepts the documented field synonyms and strips `.qlab5`/`.qlab4`
    /// suffixes from names for comparison purposes.
    pub fn parse_workspaces(reply: &Value) -> Option<HashMap<String, String>> {
        if reply.get("status").and_then(Value::as_str) != Some("ok") {
            return None;
        }
        let data = reply.get("data")?.as_array()?;
        let mut out = HashMap::new();
        for entry in data {
            let name = entry
                .get("displayName")
                .or_else(|| entry.get("name"))
                .or_else(|| entry.get("fileName"))
                .and_then(Value::as_str)?;
            let id = entry
                .get("uniqueID")
                .or_else(|| entry.get("id"))
                .or_else(|| entry.get("workspace_id"))
                .and_then(Value::as_str)?;
            let stripped = strip_qlab_suffix(name);
            out.insert(stripped.to_owned(), id.to_owned());
        }
        Some(out)
    }

    /// Arms on `connect:<ip>:<wsid>`, sends the connect request (with
    /// passcode if configured), and reports whether the reply was `ok`.
    pub async fn connect_endpoint(&self, ip: &str, workspace_id: &str) -> bool {
        let key = WaiterKey::Connect {
            ip: ip.to_owned(),
            workspace_id: workspace_id.to_owned(),
        };
        let notify = self.waiters.arm(key.clone());

        let args = match &self.network.passcode {
            Some(passcode) => vec![OscType::String(passcode.clone())],
            None => vec![],
        };
        self.send
            .send_ws(ip, self.network.qlab_port, workspace_id, "connect", args);

        let _ = tokio::time::timeout(CONNECT_TIMEOUT, notify.notified()).await;
        let payload = self.waiters.pop(&key);
        self.waiters.cleanup(&key);

        let ok = payload
            .and_then(|p| p.get("status").and_then(Value::as_str).map(str::to_owned))
            .as_deref()
            == Some("ok");
        if ok {
            self.endpoints.mark_seen(ip);
        }
        ok
    }

    /// Throttled (6 s) connect attempt; on failure, forces a re-prime and
    /// retries once.
    pub async fn ensure_connected(&self, ip: &str, workspace_id: &str, force: bool) -> bool {
        if !force {
            let now = self.clock.now();
            let mut guard = self.last_connect_attempt.lock().expect("protocol mutex poisoned");
            if let Some(&last) = guard.get(ip) {
                if now.saturating_duration_since(last) < CONNECT_THROTTLE {
                    return false;
                }
            }
            guard.insert(ip.to_owned(), now);
        } else {
            self.last_connect_attempt
                .lock()
                .expect("protocol mutex poisoned")
                .insert(ip.to_owned(), self.clock.now());
        }

        if self.connect_endpoint(ip, workspace_id).await {
            return true;
        }
        debug!(ip, workspace_id, "connect attempt failed, re-priming and retrying");
        self.ensure_app_flags(ip, true);
        self.connect_endpoint(ip, workspace_id).await
    }

    /// Sends a heartbeat request; the matching reply is observed by the
    /// dispatcher, which marks the address last-seen.
    pub fn send_thump(&self, ip: &str, workspace_id: &str) {
        self.send
            .send_ws(ip, self.network.qlab_port, workspace_id, "thump", vec![]);
    }

    /// Fire-and-forget cue action; the acknowledgement (if any) is observed
    /// by the dispatcher's ack-callback path, never awaited here.
    pub fn send_action(&self, ip: &str, workspace_id: &str, suffix: &str) {
        self.send
            .send_ws(ip, self.network.qlab_port, workspace_id, suffix, vec![]);
    }
}

fn strip_qlab_suffix(name: &str) -> &str {
    name.strip_suffix(".qlab5")
        .or_else(|| name.strip_suffix(".qlab4"))
        .unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_workspaces_accepts_field_synonyms_and_strips_suffix() {
        let reply = json!({
            "status": "ok",
            "data": [
                {"displayName": "show_main.qlab5", "uniqueID": "abc"},
                {"name": "other", "id": "def"},
                {"fileName": "third.qlab4", "workspace_id": "ghi"},
            ]
        });
        let parsed = Protocol::parse_workspaces(&reply).unwrap();
        assert_eq!(parsed.get("show_main"), Some(&"abc".to_owned()));
        assert_eq!(parsed.get("other"), Some(&"def".to_owned()));
        assert_eq!(parsed.get("third"), Some(&"ghi".to_owned()));
    }

    #[test]
    fn parse_workspaces_rejects_non_ok_status() {
        let reply = json!({"status": "error", "data": []});
        assert!(Protocol::parse_workspaces(&reply).is_none());
    }
}
