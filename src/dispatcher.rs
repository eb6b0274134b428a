//! The single shared UDP listener: parses every inbound datagram and routes
//! it to the reply-waiter registry, the discovery store, the endpoint
//! registry's last-seen tracking, or the acknowledgement callback.

use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::discovery_store::DiscoveryStore;
use crate::endpoints::EndpointRegistry;
use crate::model::{Role, WaiterKey};
use crate::osc;
use crate::protocol::Protocol;
use crate::waiters::WaiterRegistry;

/// Payloads above this size are silently dropped (`spec.md` §4.4).
const MAX_PAYLOAD_BYTES: usize = 200_000;

const ACKNOWLEDGED_ACTION_SUFFIXES: &[&str] =
    &["/go", "/panic", "/stop", "/pause", "/resume", "/select/next", "/select/previous"];

/// Invoked when a cue action is acknowledged by a known role, so the
/// supervisor can light the corresponding LED.
pub type AckSink = Box<dyn Fn(Role) + Send + Sync>;

pub struct Dispatcher {
    waiters: Arc<WaiterRegistry>,
    discovery: Arc<DiscoveryStore>,
    endpoints: Arc<EndpointRegistry>,
    ack_sink: AckSink,
}

impl Dispatcher {
    pub fn new(
        waiters: Arc<WaiterRegistry>,
        discovery: Arc<DiscoveryStore>,
        endpoints: Arc<EndpointRegistry>,
        ack_sink: AckSink,
    ) -> Self {
        Dispatcher {
            waiters,
            discovery,
            endpoints,
            ack_sink,
        }
    }

    /// Binds the shared listen socket and dispatches forever. Returns only
    /// on a fatal socket error.
    pub async fn run(self: Arc<Self>, listen_addr: &str, port: u16) -> std::io::Result<()> {
        let sock = UdpSocket::bind((listen_addr, port)).await?;
        let mut buf = vec![0u8; 65536];
        loop {
            let (len, src) = sock.recv_from(&mut buf).await?;
            if len > MAX_PAYLOAD_BYTES {
                debug!(len, "dropping oversized inbound datagram");
                continue;
            }
            self.handle_datagram(&buf[..len], src);
        }
    }

    fn handle_datagram(&self, bytes: &[u8], src: SocketAddr) {
        let (outer_addr, args) = match osc::decode_message(bytes) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(error = %e, "failed to decode inbound datagram");
                return;
            }
        };

        let raw = match osc::single_string_arg(&args) {
            Some(raw) => raw,
            None => {
                debug!(%outer_addr, "inbound argument was not a single string, dropping");
                return;
            }
        };

        let envelope: Value = match serde_json::from_str(raw) {
            Ok(v @ Value::Object(_)) => v,
            Ok(_) => {
                debug!("inbound payload was not a JSON object, dropping");
                return;
            }
            Err(e) => {
                debug!(error = %e, "inbound payload was not valid JSON, dropping");
                return;
            }
        };

        let src_ip = src.ip().to_string();
        let status = envelope.get("status").and_then(Value::as_str);
        let inner_address = envelope.get("address").and_then(Value::as_str).unwrap_or("");
        let workspace_id = envelope.get("workspace_id").and_then(Value::as_str);

        // Rule 1: /workspaces reply.
        if outer_addr.starts_with("/reply/workspaces") || inner_address == "/workspaces" {
            self.waiters.set(&WaiterKey::Workspaces { ip: src_ip.clone() }, envelope.clone());
            if let Some(listing) = Protocol::parse_workspaces(&envelope) {
                self.discovery.upsert(src_ip.clone(), listing);
            }
            return;
        }

        // Rule 2: connect reply.
        if inner_address.ends_with("/connect") {
            if let Some(wsid) = workspace_id {
                self.waiters.set(
                    &WaiterKey::Connect {
                        ip: src_ip.clone(),
                        workspace_id: wsid.to_owned(),
                    },
                    envelope.clone(),
                );
                if status == Some("ok") {
                    self.endpoints.mark_seen(&src_ip);
                }
                return;
            }
        }

        // Rule 3: thump reply.
        if inner_address.ends_with("/thump") && status == Some("ok") {
            self.endpoints.mark_seen(&src_ip);
            return;
        }

        // Rule 4: acknowledged cue action.
        if status == Some("ok")
            && ACKNOWLEDGED_ACTION_SUFFIXES.iter().any(|suffix| inner_address.ends_with(suffix))
        {
            self.endpoints.mark_seen(&src_ip);
            match self.endpoints.role_for_address(&src_ip) {
                Some(role) => (self.ack_sink)(role),
                None => debug!(ip = %src_ip, %inner_address, "ack from address outside the role map, ignoring"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    fn make_dispatcher(acked: Arc<Mutex<Vec<Role>>>) -> Dispatcher {
        let waiters = Arc::new(WaiterRegistry::new());
        let discovery = Arc::new(DiscoveryStore::new());
        let endpoints = Arc::new(EndpointRegistry::new(Arc::new(SystemClock)));
        let sink: AckSink = Box::new(move |role| acked.lock().unwrap().push(role));
        Dispatcher::new(waiters, discovery, endpoints, sink)
    }

    #[test]
    fn workspaces_reply_updates_discovery_store() {
        let acked = Arc::new(Mutex::new(vec![]));
        let dispatcher = make_dispatcher(acked);
        let envelope = json!({
            "status": "ok",
            "address": "/workspaces",
            "data": [{"displayName": "show_main", "uniqueID": "abc"}],
        });
        let bytes = osc::encode_string("/reply/workspaces", envelope.to_string()).unwrap();
        dispatcher.handle_datagram(&bytes, "10.0.0.1:53001".parse().unwrap());

        let snap = dispatcher.discovery.snapshot();
        assert_eq!(snap["10.0.0.1"].get("show_main"), Some(&"abc".to_owned()));
    }

    #[test]
    fn oversized_argument_payload_is_silently_dropped() {
        let acked = Arc::new(Mutex::new(vec![]));
        let dispatcher = make_dispatcher(acked.clone());
        let huge = "x".repeat(MAX_PAYLOAD_BYTES + 1);
        // Not going through `run`'s length gate here directly, but a
        // malformed/non-JSON giant string still must not panic.
        let bytes = osc::encode_string("/reply/workspaces", huge).unwrap();
        dispatcher.handle_datagram(&bytes, "10.0.0.1:53001".parse().unwrap());
        assert!(acked.lock().unwrap().is_empty());
    }

    #[test]
    fn ack_for_unmapped_address_is_ignored_not_panicking() {
        let acked = Arc::new(Mutex::new(vec![]));
        let dispatcher = make_dispatcher(acked.clone());
        let envelope = json!({"status": "ok", "address": "/workspace/xyz/go"});
        let bytes = osc::encode_string("/reply", envelope.to_string()).unwrap();
        dispatcher.handle_datagram(&bytes, "10.0.0.9:53001".parse().unwrap());
        assert!(acked.lock().unwrap().is_empty());
    }

    #[test]
    fn non_object_json_is_dropped() {
        let ran = Arc::new(AtomicBool::new(false));
        let _ = ran.load(Ordering::SeqCst);
        let acked = Arc::new(Mutex::new(vec![]));
        let dispatcher = make_dispatcher(acked.clone());
        let bytes = osc::encode_string("/reply", "[1,2,3]").unwrap();
        dispatcher.handle_datagram(&bytes, "10.0.0.1:53001".parse().unwrap());
        assert!(acked.lock().unwrap().is_empty());
    }
}
