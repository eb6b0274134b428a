//! Serialized outbound send loop.
//!
//! Input callbacks (buttons, encoder) and protocol helpers must never block
//! on network I/O, so every outbound datagram funnels through a bounded
//! queue drained by one long-lived worker task. Enqueue is non-blocking;
//! on overflow the message is dropped and a warning logged: one producer
//! side, one drain loop, running on the async runtime already in use
//! elsewhere in the daemon rather than a per-client thread model.

use rosc::OscType;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::osc;

pub const QUEUE_CAPACITY: usize = 1000;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] osc::OscCodecError),
}

struct QueuedSend {
    address: String,
    port: u16,
    path: String,
    args: Vec<OscType>,
}

#[derive(Clone)]
pub struct SendWorker {
    tx: mpsc::Sender<QueuedSend>,
}

impl SendWorker {
    /// Spawns the drain loop and returns a cheap, cloneable handle to it.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(run(rx));
        SendWorker { tx }
    }

    /// Sends to the remote's application namespace: `<path>` directly.
    pub fn send_app(&self, ip: &str, port: u16, path: &str, args: Vec<OscType>) {
        self.enqueue(ip, port, path.to_owned(), args);
    }

    /// Sends to `/workspace/<wsid>/<suffix>`, normalizing doubled slashes.
    pub fn send_ws(&self, ip: &str, port: u16, wsid: &str, suffix: &str, args: Vec<OscType>) {
        let raw = format!("/workspace/{wsid}/{suffix}");
        let path = normalize_slashes(&raw);
        self.enqueue(ip, port, path, args);
    }

    fn enqueue(&self, ip: &str, port: u16, path: String, args: Vec<OscType>) {
        let item = QueuedSend {
            address: ip.to_owned(),
            port,
            path,
            args,
        };
        if self.tx.try_send(item).is_err() {
            warn!(ip, port, "send queue full, dropping outbound message");
        }
    }
}

fn normalize_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(c);
    }
    out
}

async fn run(mut rx: mpsc::Receiver<QueuedSend>) {
    let mut clients: HashMap<(String, u16), Arc<UdpSocket>> = HashMap::new();

    while let Some(item) = rx.recv().await {
        let key = (item.address.clone(), item.port);
        let sock = match clients.get(&key) {
            Some(sock) => sock.clone(),
            None => match open_client(&item.address, item.port).await {
                Ok(sock) => {
                    let sock = Arc::new(sock);
                    clients.insert(key, sock.clone());
                    sock
                }
                Err(e) => {
                    debug!(ip = %item.address, port = item.port, error = %e, "failed to open client socket");
                    continue;
                }
            },
        };

        let bytes = match osc::encode_args(&item.path, item.args) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(path = %item.path, error = %e, "failed to encode outbound message");
                continue;
            }
        };

        if let Err(e) = sock.send(&bytes).await {
            debug!(ip = %item.address, port = item.port, error = %e, "send failed");
        }
    }
}

async fn open_client(ip: &str, port: u16) -> Result<UdpSocket, std::io::Error> {
    let sock = UdpSocket::bind("0.0.0.0:0").await?;
    let target: SocketAddr = format!("{ip}:{port}").parse().map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "bad destination address")
    })?;
    sock.connect(target).await?;
    Ok(sock)
}

/// One-shot raw broadcast datagram, bypassing the worker queue entirely
/// since it needs an ephemeral broadcast-enabled socket rather than a
/// per-address persistent client.
pub async fn broadcast(
    broadcast_addr: &str,
    port: u16,
    path: &str,
    args: Vec<OscType>,
) -> Result<(), SendError> {
    let sock = UdpSocket::bind("0.0.0.0:0").await?;
    sock.set_broadcast(true)?;
    let bytes = osc::encode_args(path, args)?;
    sock.send_to(&bytes, (broadcast_addr, port)).await?;
    Ok(())
}
