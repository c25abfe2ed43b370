// Ledger watcher scenarios: payments promote provisional messages, expiry removes local apps.

use std::time::Duration;

use crate::db::Store;
use crate::lifecycle::Mode;
use crate::model::{GossipKind, SpecMessage};
use crate::support::fixtures::{edit_components, flat_spec, owner_key, signed_register, signed_update};
use crate::support::TestNode;
use crate::time;

const PAYMENT_ADDRESS: &str = "t1FleetPayments";

fn message(name: &str) -> SpecMessage {
    signed_register(flat_spec(name, 1.0, 1000.0, 10.0), &owner_key(), time::unix_millis())
}

#[tokio::test]
async fn paid_message_is_promoted_once() {
    let node = TestNode::new();
    let msg = message("AppX");
    assert!(node.components.registry.register_provisional(msg.clone(), 1_000).await.unwrap());

    node.daemon.pay(1_001, "tx1", &msg.hash, PAYMENT_ADDRESS, 45.0);
    node.daemon.set_height(1_001);
    let pass = node.components.watcher.pass().await.unwrap();
    assert_eq!(pass.height, Some(1_001));
    assert_eq!(pass.promoted, 1);

    let record = node.components.registry.current("AppX").await.unwrap().unwrap();
    assert_eq!(record.height, 1_001);
    assert_eq!(record.txid, "tx1");
    assert!(node.store.provisional(&msg.hash).await.unwrap().is_none());

    // Nothing new at the same tip.
    let pass = node.components.watcher.pass().await.unwrap();
    assert_eq!(pass.height, None);
    assert_eq!(pass.promoted, 0);

    // The same hash paid again later is already permanent.
    node.daemon.pay(1_002, "tx2", &msg.hash, PAYMENT_ADDRESS, 45.0);
    node.daemon.set_height(1_002);
    let pass = node.components.watcher.pass().await.unwrap();
    assert_eq!(pass.promoted, 0);
    assert_eq!(pass.requested, 0);
    assert_eq!(node.components.registry.current("AppX").await.unwrap().unwrap().txid, "tx1");
}

#[tokio::test]
async fn underpaid_message_stays_provisional() {
    let node = TestNode::new();
    let msg = message("AppX");
    node.components.registry.register_provisional(msg.clone(), 1_000).await.unwrap();

    node.daemon.pay(1_001, "tx1", &msg.hash, PAYMENT_ADDRESS, 1.0);
    node.daemon.set_height(1_001);
    let pass = node.components.watcher.pass().await.unwrap();
    assert_eq!(pass.underpaid, 1);
    assert_eq!(pass.promoted, 0);
    assert!(node.components.registry.current("AppX").await.unwrap().is_none());
    assert!(node.store.provisional(&msg.hash).await.unwrap().is_some());
}

#[tokio::test]
async fn payment_for_an_unseen_message_asks_peers_and_promotes_later() {
    let node = TestNode::new();
    let msg = message("AppX");

    node.daemon.pay(1_001, "tx1", &msg.hash, PAYMENT_ADDRESS, 45.0);
    node.daemon.set_height(1_001);
    let pass = node.components.watcher.pass().await.unwrap();
    assert_eq!(pass.requested, 1);
    assert_eq!(node.components.watcher.missing(), vec![msg.hash.clone()]);

    for _ in 0..100 {
        if node.peers.gossip_count() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let requests = node.peers.gossip.lock().clone();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|(_, env)| env.kind == GossipKind::AppRequest));

    node.components.registry.register_provisional(msg.clone(), 1_001).await.unwrap();
    node.daemon.set_height(1_002);
    let pass = node.components.watcher.pass().await.unwrap();
    assert_eq!(pass.promoted, 1);
    assert!(node.components.watcher.missing().is_empty());
    assert_eq!(node.components.registry.current("AppX").await.unwrap().unwrap().height, 1_001);
}

#[tokio::test]
async fn pass_resumes_after_the_checkpoint() {
    let node = TestNode::new();
    node.components.watcher.pass().await.unwrap();
    assert_eq!(node.store.checkpoint().await.unwrap().map(|c| c.height), Some(1_000));

    let x = message("AppX");
    let y = message("AppY");
    node.components.registry.register_provisional(x.clone(), 1_000).await.unwrap();
    node.components.registry.register_provisional(y.clone(), 1_000).await.unwrap();
    node.daemon.pay(1_001, "tx1", &x.hash, PAYMENT_ADDRESS, 45.0);
    node.daemon.pay(1_003, "tx3", &y.hash, PAYMENT_ADDRESS, 45.0);
    node.daemon.set_height(1_003);

    let pass = node.components.watcher.pass().await.unwrap();
    assert_eq!(pass.height, Some(1_003));
    assert_eq!(pass.promoted, 2);
    assert!(!pass.behind);
    assert_eq!(node.components.registry.current("AppY").await.unwrap().unwrap().height, 1_003);
}

#[tokio::test]
async fn expired_spec_is_removed_locally() {
    let node = TestNode::new();
    let record = node.publish(flat_spec("Blog", 1.0, 1000.0, 10.0), 1_000).await;
    node.components
        .lifecycle
        .install(&record, None, Mode::Hard, false)
        .await
        .unwrap();

    node.daemon.set_height(23_000);
    let pass = node.components.watcher.pass().await.unwrap();
    assert_eq!(pass.expired, vec!["Blog".to_string()]);
    assert!(node.store.global_spec("Blog").await.unwrap().is_none());
    assert!(node.journal.contains("store.delete_local_app:Blog"));
    assert!(node.journal.contains("volumes.destroy:fleetBlog"));
}

#[tokio::test]
async fn catching_up_never_expires_a_spec_renewed_in_an_unread_block() {
    let node = TestNode::new();
    node.components.watcher.pass().await.unwrap();

    let msg = message("AppX");
    node.components.registry.register_provisional(msg.clone(), 1_000).await.unwrap();
    node.daemon.pay(1_001, "tx1", &msg.hash, PAYMENT_ADDRESS, 45.0);
    node.daemon.set_height(1_001);
    assert_eq!(node.components.watcher.pass().await.unwrap().promoted, 1);
    let record = node.components.registry.current("AppX").await.unwrap().unwrap();
    node.components
        .lifecycle
        .install(&record, None, Mode::Hard, false)
        .await
        .unwrap();

    let mut next = record.spec.clone();
    edit_components(&mut next, |c| c.commands = vec!["--verbose".to_string()]);
    let update = signed_update(next, &owner_key(), time::unix_millis());
    node.components.registry.register_provisional(update.clone(), 1_001).await.unwrap();
    node.daemon.pay(22_500, "tx2", &update.hash, PAYMENT_ADDRESS, 45.0);
    node.daemon.set_height(23_500);

    let pass = node.components.watcher.pass().await.unwrap();
    assert!(pass.behind);
    assert!(pass.expired.is_empty(), "{:?}", pass.expired);

    let mut passes = 1;
    let mut last = pass;
    while last.behind && passes < 100 {
        last = node.components.watcher.pass().await.unwrap();
        assert!(last.expired.is_empty(), "{:?} at {:?}", last.expired, last.height);
        passes += 1;
    }
    assert!(!last.behind);
    assert_eq!(last.height, Some(23_500));

    let current = node.components.registry.current("AppX").await.unwrap().unwrap();
    assert_eq!(current.height, 22_500);
    assert!(node.store.local_app("AppX").await.unwrap().is_some());
    assert!(!node.journal.contains("volumes.destroy:fleetAppX"));
}

#[tokio::test]
async fn syncing_daemon_means_no_work() {
    let node = TestNode::new();
    node.daemon.sync.lock().synced = false;
    let pass = node.components.watcher.pass().await.unwrap();
    assert_eq!(pass, Default::default());
    assert!(node.store.checkpoint().await.unwrap().is_none());
}
