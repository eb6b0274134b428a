/// Integration coverage of the reply-waiter registry's four operations
/// (`arm`, `set`, `pop`, `cleanup`) across concurrent tasks, including the
/// documented benign race where a reply arrives after `cleanup` has already
/// run.
use cuebridge::model::WaiterKey;
use cuebridge::waiters::WaiterRegistry;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn key(ip: &str) -> WaiterKey {
    WaiterKey::Workspaces { ip: ip.to_owned() }
}

#[tokio::test]
async fn arm_then_set_from_another_task_wakes_the_waiter() {
    let registry = Arc::new(WaiterRegistry::new());
    let k = key("10.0.0.1");
    let notify = registry.arm(k.clone());

    let setter = {
        let registry = registry.clone();
        let k = k.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            registry.set(&k, json!({"ok": true}));
        })
    };

    notify.notified().await;
    setter.await.unwrap();

    let payload = registry.pop(&k).unwrap();
    assert_eq!(payload, json!({"ok": true}));
}

#[tokio::test]
async fn set_before_wait_is_not_lost() {
    let registry = WaiterRegistry::new();
    let k = key("10.0.0.2");
    let notify = registry.arm(k.clone());

    registry.set(&k, json!({"early": true}));
    // notify_one stores a permit even with no parked waiter yet.
    notify.notified().await;

    assert_eq!(registry.pop(&k).unwrap(), json!({"early": true}));
}

#[test]
fn pop_without_a_prior_set_returns_none() {
    let registry = WaiterRegistry::new();
    let k = key("10.0.0.3");
    let _notify = registry.arm(k.clone());
    assert!(registry.pop(&k).is_none());
}

#[test]
fn cleanup_then_late_set_is_benign_and_leaves_no_payload() {
    let registry = WaiterRegistry::new();
    let k = key("10.0.0.4");
    let _notify = registry.arm(k.clone());
    registry.cleanup(&k);

    // A reply that lands after cleanup just writes a payload nobody reads.
    registry.set(&k, json!({"late": true}));
    assert!(registry.pop(&k).is_none(), "cleanup must have already forgotten the key");
}

#[test]
fn arming_the_same_key_twice_discards_any_prior_unread_payload() {
    let registry = WaiterRegistry::new();
    let k = key("10.0.0.5");
    registry.arm(k.clone());
    registry.set(&k, json!({"stale": true}));

    registry.arm(k.clone());
    assert!(registry.pop(&k).is_none(), "re-arming must not leak the previous rendezvous's payload");
}

#[tokio::test]
async fn wait_for_returns_the_payload_set_by_a_concurrent_task() {
    let registry = Arc::new(WaiterRegistry::new());
    let k = key("10.0.0.7");

    let setter = {
        let registry = registry.clone();
        let k = k.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            registry.set(&k, json!({"workspaces": {"gala_main": "M"}}));
        })
    };

    let payload = registry.wait_for(k, Duration::from_millis(500)).await;
    setter.await.unwrap();
    assert_eq!(payload, Some(json!({"workspaces": {"gala_main": "M"}})));
}

#[tokio::test]
async fn wait_for_times_out_and_cleans_up_when_nothing_replies() {
    let registry = WaiterRegistry::new();
    let k = key("10.0.0.8");
    let payload = registry.wait_for(k.clone(), Duration::from_millis(20)).await;
    assert!(payload.is_none());
    // cleanup already ran: a late arm should not see a leftover payload.
    let _notify = registry.arm(k.clone());
    assert!(registry.pop(&k).is_none());
}

#[test]
fn distinct_keys_do_not_interfere() {
    let registry = WaiterRegistry::new();
    let connect_key = WaiterKey::Connect {
        ip: "10.0.0.6".to_owned(),
        workspace_id: "abc".to_owned(),
    };
    let workspaces_key = key("10.0.0.6");

    registry.arm(connect_key.clone());
    registry.arm(workspaces_key.clone());
    registry.set(&connect_key, json!({"status": "ok"}));

    assert_eq!(registry.pop(&connect_key).unwrap(), json!({"status": "ok"}));
    assert!(registry.pop(&workspaces_key).is_none());
}
