//! Two-phase broadcast discovery and the `pair_auto` orchestration that
//! turns a successful role decision into a persisted pairing record.

use rosc::OscType;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{NamingConfig, NetworkConfig};
use crate::discovery_store::{DiscoveryStore, WorkspaceListing};
use crate::endpoints::EndpointRegistry;
use crate::model::{Candidate, EndpointRecord, PairingRecord, Role};
use crate::protocol::Protocol;
use crate::roles::{self, Assignment, DecisionError};
use crate::send_worker;
use crate::store::Store;

async fn broadcast_phase(network: &NetworkConfig, prime_first: bool) {
    if prime_first {
        let _ = send_worker::broadcast(
            &network.broadcast_addr,
            network.qlab_port,
            "/udpReplyPort",
            vec![OscType::Int(i32::from(network.reply_port))],
        )
        .await;
        let _ =
            send_worker::broadcast(&network.broadcast_addr, network.qlab_port, "/alwaysReply", vec![])
                .await;
        let _ =
            send_worker::broadcast(&network.broadcast_addr, network.qlab_port, "/forgetMeNot", vec![])
                .await;
    }
    let _ = send_worker::broadcast(&network.broadcast_addr, network.qlab_port, "/workspaces", vec![]).await;
}

/// Runs the two mandatory broadcast phases and returns the union of
/// responders seen, phase 2 overwriting phase 1 on address collision.
pub async fn discover_two_phase(
    discovery: &DiscoveryStore,
    network: &NetworkConfig,
    wait: Duration,
) -> HashMap<String, WorkspaceListing> {
    discovery.clear();
    broadcast_phase(network, false).await;
    tokio::time::sleep(wait).await;
    let phase1 = discovery.snapshot();

    discovery.clear();
    broadcast_phase(network, true).await;
    tokio::time::sleep(wait).await;
    let phase2 = discovery.snapshot();

    let mut union = phase1;
    union.extend(phase2);
    union
}

fn classify_all(
    responders: &HashMap<String, WorkspaceListing>,
    naming: &NamingConfig,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for (ip, listing) in responders {
        for (ws_name, ws_id) in listing {
            candidates.push(roles::classify(ip.clone(), ws_name.clone(), ws_id.clone(), naming));
        }
    }
    candidates
}

/// Orchestrates discovery + role decision for operator/CLI use, without
/// side effects on the persisted record. Used by the `discover` subcommand.
pub async fn discover(
    discovery: &DiscoveryStore,
    network: &NetworkConfig,
    wait: Duration,
) -> HashMap<String, WorkspaceListing> {
    discover_two_phase(discovery, network, wait).await
}

pub struct PairingContext {
    pub discovery: Arc<DiscoveryStore>,
    pub protocol: Arc<Protocol>,
    pub endpoints: Arc<EndpointRegistry>,
    pub store: Arc<Store>,
    pub network: NetworkConfig,
    pub naming: NamingConfig,
}

/// Full `pair_auto`: discover, decide roles, and on success force-prime,
/// force-connect, persist, and refresh the live endpoint registry.
pub async fn pair_auto(ctx: &PairingContext, wait: Duration) -> Result<Assignment, DecisionError> {
    let responders = discover_two_phase(&ctx.discovery, &ctx.network, wait).await;
    let candidates = classify_all(&responders, &ctx.naming);
    let assignment = roles::decide_roles(&candidates)?;

    for (role, assigned) in roles::role_pairs(&assignment) {
        ctx.protocol.ensure_app_flags(&assigned.address, true);
        ctx.protocol
            .ensure_connected(&assigned.address, &assigned.workspace_id, true)
            .await;
        info!(
            %role,
            ip = %assigned.address,
            workspace = %assigned.workspace_name,
            "assigned role"
        );
    }

    let mut record = PairingRecord {
        paired: true,
        paired_at: wall_clock_now(),
        qlab_port: ctx.network.qlab_port,
        pi_reply_port: ctx.network.reply_port,
        expected_ws_main: ctx.naming.expected_ws_main.clone(),
        expected_ws_backup: ctx.naming.expected_ws_backup.clone(),
        suffix_main: ctx.naming.suffix_main.clone(),
        suffix_backup: ctx.naming.suffix_backup.clone(),
        suffix_aux1: ctx.naming.suffix_aux1.clone(),
        endpoints: HashMap::new(),
        paused: false,
    };
    for (role, assigned) in roles::role_pairs(&assignment) {
        record.set_endpoint(
            role,
            EndpointRecord {
                ip: assigned.address.clone(),
                workspace_name: assigned.workspace_name.clone(),
                workspace_id: assigned.workspace_id.clone(),
            },
        );
    }

    if let Err(e) = ctx.store.save(&record) {
        tracing::warn!(error = %e, "failed to persist pairing record after successful assignment");
    }
    ctx.endpoints.refresh_from_record(&record);

    Ok(assignment)
}

fn wall_clock_now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naming() -> NamingConfig {
        NamingConfig {
            expected_ws_main: "show_main".to_owned(),
            expected_ws_backup: "show_backup".to_owned(),
            suffix_main: "_main".to_owned(),
            suffix_backup: "_backup".to_owned(),
            suffix_aux1: "_aux1".to_owned(),
            backup_optional: true,
            aux_optional: true,
        }
    }

    #[test]
    fn classify_all_flattens_per_address_listings() {
        let mut responders = HashMap::new();
        let mut listing = HashMap::new();
        listing.insert("gala_main".to_owned(), "M".to_owned());
        listing.insert("gala_backup".to_owned(), "K".to_owned());
        responders.insert("10.0.0.1".to_owned(), listing);

        let candidates = classify_all(&responders, &naming());
        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|c| c.address == "10.0.0.1"));
    }
}
