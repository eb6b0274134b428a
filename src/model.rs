//! Shared data types: roles, endpoints, the persisted pairing record, and
//! the transient discovery candidates.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// The three fixed roles. Count is never dynamic — see `spec.md` Non-goals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(rename = "main")]
    Primary,
    Backup,
    #[serde(rename = "aux")]
    Auxiliary,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Primary, Role::Backup, Role::Auxiliary];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Primary => "main",
            Role::Backup => "backup",
            Role::Auxiliary => "aux",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The liveness window: an endpoint not heard from within this long is
/// considered offline.
pub const ONLINE_WINDOW: Duration = Duration::from_secs(8);

/// An assigned remote endpoint for one role.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub role: Role,
    pub address: String,
    pub workspace_name: Option<String>,
    pub workspace_id: Option<String>,
    /// `None` means "never seen a reply".
    pub last_seen: Option<Instant>,
}

impl Endpoint {
    pub fn new(role: Role, address: String, workspace_name: String, workspace_id: String) -> Self {
        Endpoint {
            role,
            address,
            workspace_name: Some(workspace_name),
            workspace_id: Some(workspace_id),
            last_seen: None,
        }
    }

    /// `online ≡ last_seen>0 ∧ (now−last_seen) < 8.0s` (`spec.md` §3).
    pub fn online(&self, now: Instant) -> bool {
        match self.last_seen {
            Some(seen) => now.saturating_duration_since(seen) < ONLINE_WINDOW,
            None => false,
        }
    }

    pub fn mark_seen(&mut self, now: Instant) {
        self.last_seen = Some(now);
    }
}

/// Endpoint as stored on disk: plain strings, no timestamps (liveness is
/// never persisted — it's rebuilt by the heartbeat loop after a restart).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointRecord {
    pub ip: String,
    pub workspace_name: String,
    pub workspace_id: String,
}

/// The persisted pairing record — see `spec.md` §6 for the exact JSON shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingRecord {
    pub paired: bool,
    pub paired_at: i64,
    pub qlab_port: u16,
    pub pi_reply_port: u16,
    pub expected_ws_main: String,
    pub expected_ws_backup: String,
    pub suffix_main: String,
    pub suffix_backup: String,
    pub suffix_aux1: String,
    pub endpoints: std::collections::HashMap<String, EndpointRecord>,
    pub paused: bool,
}

impl Default for PairingRecord {
    fn default() -> Self {
        PairingRecord {
            paired: false,
            paired_at: 0,
            qlab_port: crate::config::DEFAULT_QLAB_PORT,
            pi_reply_port: crate::config::DEFAULT_PI_REPLY_PORT,
            expected_ws_main: String::new(),
            expected_ws_backup: String::new(),
            suffix_main: "_main".to_owned(),
            suffix_backup: "_backup".to_owned(),
            suffix_aux1: "_aux1".to_owned(),
            endpoints: std::collections::HashMap::new(),
            paused: false,
        }
    }
}

impl PairingRecord {
    pub fn endpoint(&self, role: Role) -> Option<&EndpointRecord> {
        self.endpoints.get(role.as_str())
    }

    pub fn set_endpoint(&mut self, role: Role, record: EndpointRecord) {
        self.endpoints.insert(role.as_str().to_owned(), record);
    }
}

/// How a discovered workspace name was classified during role decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    PrimaryTagged,
    BackupTagged,
    AuxiliaryTagged,
    Plain,
}

/// A discovered (address, workspace) pair, classified but not yet assigned.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub address: String,
    pub ws_name: String,
    pub ws_id: String,
    pub kind: CandidateKind,
    /// The display name with its role suffix stripped, used to pair a
    /// `_main`/`_backup` candidate from the same show.
    pub base: String,
}

/// Sentinel base for legacy exact-name matches (`spec.md` §4.6).
pub const LEGACY_BASE: &str = "__legacy_expected__";

/// Key used by the reply-waiter registry (`spec.md` §3, §4.3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WaiterKey {
    Workspaces { ip: String },
    Connect { ip: String, workspace_id: String },
}

impl std::fmt::Display for WaiterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaiterKey::Workspaces { ip } => write!(f, "workspaces:{ip}"),
            WaiterKey::Connect { ip, workspace_id } => write!(f, "connect:{ip}:{workspace_id}"),
        }
    }
}
