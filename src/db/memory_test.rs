use super::*;
use crate::support::fixtures;

#[tokio::test]
async fn purge_provisional_drops_only_expired() {
    let store = MemoryStore::new();
    let key = fixtures::owner_key();
    let a = fixtures::signed_register(fixtures::flat_spec("alpha", 1.0, 1000.0, 10.0), &key, 1);
    let b = fixtures::signed_register(fixtures::flat_spec("beta", 1.0, 1000.0, 10.0), &key, 2);

    store
        .put_provisional(ProvisionalMessage { message: a.clone(), received_at: 0, expires_at: 100 })
        .await
        .unwrap();
    store
        .put_provisional(ProvisionalMessage { message: b.clone(), received_at: 0, expires_at: 300 })
        .await
        .unwrap();

    assert_eq!(store.purge_provisional(200).await.unwrap(), 1);
    assert!(store.provisional(&a.hash).await.unwrap().is_none());
    assert!(store.provisional(&b.hash).await.unwrap().is_some());
}

#[tokio::test]
async fn permanent_history_is_height_ordered() {
    let store = MemoryStore::new();
    let key = fixtures::owner_key();
    let spec = fixtures::flat_spec("alpha", 1.0, 1000.0, 10.0);
    let first = fixtures::signed_register(spec.clone(), &key, 1).anchored("tx1", 500, 10.0);
    let second = fixtures::signed_update(spec, &key, 2).anchored("tx2", 200, 10.0);
    store.put_permanent(first).await.unwrap();
    store.put_permanent(second).await.unwrap();

    let heights: Vec<_> = store
        .permanent_for("alpha")
        .await
        .unwrap()
        .iter()
        .map(|m| m.height.unwrap())
        .collect();
    assert_eq!(heights, vec![200, 500]);
}

#[tokio::test]
async fn locations_are_keyed_by_name_and_ip() {
    let store = MemoryStore::new();
    let loc = |ip: &str, at: i64| AppLocation {
        name: "alpha".into(),
        hash: "h".into(),
        ip: ip.into(),
        broadcasted_at: at,
    };
    store.put_location(loc("1.1.1.1", 10)).await.unwrap();
    store.put_location(loc("1.1.1.1", 20)).await.unwrap();
    store.put_location(loc("2.2.2.2", 5)).await.unwrap();

    assert_eq!(store.locations(Some("alpha")).await.unwrap().len(), 2);
    assert_eq!(store.purge_locations(10).await.unwrap(), 1);
    assert_eq!(store.locations(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn snapshot_restore_roundtrip_keeps_records() {
    let store = MemoryStore::new();
    let record = fixtures::local_record(fixtures::flat_spec("alpha", 1.0, 1000.0, 10.0));
    store.put_local_app(record.clone()).await.unwrap();

    let other = MemoryStore::new();
    other.restore(store.snapshot());
    assert_eq!(other.local_app("alpha").await.unwrap(), Some(record));
}
