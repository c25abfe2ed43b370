use std::time::Duration;

use super::TtlCache;

#[test]
fn mark_reports_first_sighting_only() {
    let cache: TtlCache<String> = TtlCache::new(Duration::from_secs(60), 16);
    assert!(cache.mark("abc".to_string()));
    assert!(!cache.mark("abc".to_string()));
    assert!(cache.contains(&"abc".to_string()));
}

#[tokio::test]
async fn entries_expire_after_ttl() {
    let cache: TtlCache<u16, &'static str> = TtlCache::new(Duration::from_millis(30), 16);
    cache.insert(31000, "peer");
    assert_eq!(cache.get(&31000), Some("peer"));

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(cache.get(&31000), None);
    assert!(cache.is_empty());
}

#[test]
fn capacity_drops_oldest_entry() {
    let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60), 2);
    cache.insert(1, ());
    std::thread::sleep(Duration::from_millis(2));
    cache.insert(2, ());
    std::thread::sleep(Duration::from_millis(2));
    cache.insert(3, ());

    assert_eq!(cache.len(), 2);
    assert!(!cache.contains(&1));
    assert!(cache.contains(&2));
    assert!(cache.contains(&3));
}
