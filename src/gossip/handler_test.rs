use super::*;
use crate::crypto::NodeKey;
use crate::support::{fixtures, peer_key, TestNode, PEER_IPS};
use crate::time;

fn from_peer(kind: GossipKind, payload: serde_json::Value) -> GossipEnvelope {
    GossipEnvelope::seal(kind, PEER_IPS[0], time::unix_millis(), payload, &peer_key(0))
}

fn register_envelope(name: &str) -> (SpecMessage, GossipEnvelope) {
    let msg = fixtures::signed_register(
        fixtures::flat_spec(name, 1.0, 1000.0, 10.0),
        &fixtures::owner_key(),
        time::unix_millis(),
    );
    let env = from_peer(GossipKind::AppRegister, serde_json::to_value(&msg).unwrap());
    (msg, env)
}

/// Relays run on spawned tasks.
async fn delivered(node: &TestNode, count: usize) -> Vec<(String, GossipEnvelope)> {
    for _ in 0..100 {
        if node.peers.gossip_count() >= count {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    node.peers.gossip.lock().clone()
}

#[tokio::test]
async fn register_is_stored_and_relayed_once() {
    let node = TestNode::new();
    let (msg, env) = register_envelope("AppX");

    let outcome = node.components.gossip.handle(env.clone()).await.unwrap();
    assert_eq!(outcome, GossipOutcome::Accepted);
    assert!(node.store.provisional(&msg.hash).await.unwrap().is_some());

    let sent = delivered(&node, 1).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, PEER_IPS[1]);
    assert_eq!(sent[0].1, env);

    assert_eq!(node.components.gossip.handle(env).await.unwrap(), GossipOutcome::Duplicate);
}

#[tokio::test]
async fn store_failure_lets_the_same_envelope_through_later() {
    let node = TestNode::new();
    let (msg, env) = register_envelope("AppX");
    node.store.fail_on("put_provisional");

    let err = node.components.gossip.handle(env.clone()).await.unwrap_err();
    assert_eq!(err.kind(), "infrastructure");
    assert!(node.store.provisional(&msg.hash).await.unwrap().is_none());

    node.store.heal();
    assert_eq!(
        node.components.gossip.handle(env.clone()).await.unwrap(),
        GossipOutcome::Accepted
    );
    assert!(node.store.provisional(&msg.hash).await.unwrap().is_some());
    assert_eq!(node.components.gossip.handle(env).await.unwrap(), GossipOutcome::Duplicate);
}

#[tokio::test]
async fn rejected_signature_stays_rejected_without_marking() {
    let node = TestNode::new();
    let (_, mut env) = register_envelope("AppX");
    env.signature = peer_key(1).sign("something else");

    let err = node.components.gossip.handle(env.clone()).await.unwrap_err();
    assert!(matches!(err, FleetError::Signature(_)));
    let err = node.components.gossip.handle(env).await.unwrap_err();
    assert!(matches!(err, FleetError::Signature(_)));
}

#[tokio::test]
async fn same_message_in_a_new_envelope_is_not_relayed_again() {
    let node = TestNode::new();
    let (msg, env) = register_envelope("AppX");
    node.components.gossip.handle(env).await.unwrap();

    let again = GossipEnvelope::seal(
        GossipKind::AppRegister,
        PEER_IPS[1],
        time::unix_millis() + 1,
        serde_json::to_value(&msg).unwrap(),
        &peer_key(1),
    );
    let outcome = node.components.gossip.handle(again).await.unwrap();
    assert!(matches!(outcome, GossipOutcome::Ignored(_)), "{outcome:?}");
}

#[tokio::test]
async fn sender_outside_the_node_list_is_rejected() {
    let node = TestNode::new();
    let stranger = NodeKey::from_seed([200; 32]);
    let env = GossipEnvelope::seal(
        GossipKind::AppRunning,
        "10.9.9.9:16127",
        time::unix_millis(),
        serde_json::json!({}),
        &stranger,
    );
    let err = node.components.gossip.handle(env).await.unwrap_err();
    assert!(matches!(err, FleetError::Signature(_)));
}

#[tokio::test]
async fn envelope_signed_by_another_key_is_rejected() {
    let node = TestNode::new();
    let (_, env) = register_envelope("AppX");
    let forged = GossipEnvelope::seal(env.kind, &env.ip, env.timestamp, env.payload, &peer_key(1));

    let err = node.components.gossip.handle(forged).await.unwrap_err();
    assert!(matches!(err, FleetError::Signature(_)));
    assert_eq!(node.peers.gossip_count(), 0);
}

#[tokio::test]
async fn update_payload_under_register_kind_is_invalid() {
    let node = TestNode::new();
    let msg = fixtures::signed_update(
        fixtures::flat_spec("AppX", 1.0, 1000.0, 10.0),
        &fixtures::owner_key(),
        time::unix_millis(),
    );
    let env = from_peer(GossipKind::AppRegister, serde_json::to_value(&msg).unwrap());

    let err = node.components.gossip.handle(env).await.unwrap_err();
    assert!(matches!(err, FleetError::Validation(_)));
}

#[tokio::test]
async fn running_report_updates_the_sender_location_only() {
    let node = TestNode::new();
    let now = time::unix_millis();
    let location = AppLocation {
        name: "AppX".to_string(),
        hash: "h1".to_string(),
        ip: PEER_IPS[0].to_string(),
        broadcasted_at: now,
    };
    let env = from_peer(GossipKind::AppRunning, serde_json::to_value(&location).unwrap());
    assert_eq!(node.components.gossip.handle(env).await.unwrap(), GossipOutcome::Accepted);
    assert_eq!(node.store.locations(Some("AppX")).await.unwrap(), vec![location.clone()]);

    let older = AppLocation {
        broadcasted_at: now - 1_000,
        ..location.clone()
    };
    let env = from_peer(GossipKind::AppRunning, serde_json::to_value(&older).unwrap());
    assert!(matches!(
        node.components.gossip.handle(env).await.unwrap(),
        GossipOutcome::Ignored(_)
    ));

    let foreign = AppLocation {
        ip: PEER_IPS[1].to_string(),
        broadcasted_at: now + 1_000,
        ..location
    };
    let env = from_peer(GossipKind::AppRunning, serde_json::to_value(&foreign).unwrap());
    assert!(matches!(
        node.components.gossip.handle(env).await.unwrap(),
        GossipOutcome::Ignored(_)
    ));
    assert_eq!(node.store.locations(Some("AppX")).await.unwrap().len(), 1);
}

#[tokio::test]
async fn request_for_a_known_message_rebroadcasts_it_without_anchoring() {
    let node = TestNode::new();
    let msg = fixtures::signed_register(
        fixtures::flat_spec("AppX", 1.0, 1000.0, 10.0),
        &fixtures::owner_key(),
        time::unix_millis(),
    );
    node.store.put_permanent(msg.anchored("tx1", 900, 45.0)).await.unwrap();

    let env = from_peer(
        GossipKind::AppRequest,
        serde_json::to_value(AppRequest { hash: msg.hash.clone() }).unwrap(),
    );
    assert_eq!(node.components.gossip.handle(env).await.unwrap(), GossipOutcome::Accepted);

    let sent = delivered(&node, 2).await;
    assert_eq!(sent.len(), 2);
    let answer: SpecMessage = serde_json::from_value(sent[0].1.payload.clone()).unwrap();
    assert_eq!(sent[0].1.kind, GossipKind::AppRegister);
    assert_eq!(answer.hash, msg.hash);
    assert!(answer.txid.is_none());
    assert!(answer.height.is_none());
}

#[tokio::test]
async fn request_for_an_unknown_hash_is_ignored() {
    let node = TestNode::new();
    let env = from_peer(
        GossipKind::AppRequest,
        serde_json::to_value(AppRequest { hash: "nope".to_string() }).unwrap(),
    );
    assert!(matches!(
        node.components.gossip.handle(env).await.unwrap(),
        GossipOutcome::Ignored(_)
    ));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(node.peers.gossip_count(), 0);
}
