use super::*;
use crate::clock::ManualClock;
use chrono::TimeZone;

fn test_clock() -> Arc<ManualClock> {
    let start = Utc
        .with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
        .single()
        .expect("valid timestamp");
    Arc::new(ManualClock::new(start))
}

#[test]
fn entries_expire_after_ttl() {
    let clock = test_clock();
    let cache: TtlCache<String, u32> = TtlCache::new(8, clock.clone());

    cache.insert("a".to_string(), 1, Duration::seconds(60));
    assert_eq!(cache.get(&"a".to_string()), Some(1));

    clock.advance(Duration::seconds(59));
    assert_eq!(cache.get(&"a".to_string()), Some(1));

    clock.advance(Duration::seconds(1));
    assert_eq!(cache.get(&"a".to_string()), None);
    assert!(cache.is_empty());
}

#[test]
fn zero_ttl_is_not_stored() {
    let cache: TtlCache<&str, u32> = TtlCache::new(8, test_clock());
    cache.insert("a", 1, Duration::zero());
    assert_eq!(cache.get(&"a"), None);
}

#[test]
fn capacity_evicts_soonest_expiring() {
    let clock = test_clock();
    let cache: TtlCache<&str, u32> = TtlCache::new(2, clock);

    cache.insert("short", 1, Duration::seconds(10));
    cache.insert("long", 2, Duration::seconds(100));
    cache.insert("newest", 3, Duration::seconds(50));

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get(&"short"), None);
    assert_eq!(cache.get(&"long"), Some(2));
    assert_eq!(cache.get(&"newest"), Some(3));
}

#[test]
fn overwrite_does_not_evict() {
    let cache: TtlCache<&str, u32> = TtlCache::new(2, test_clock());
    cache.insert("a", 1, Duration::seconds(10));
    cache.insert("b", 2, Duration::seconds(10));
    cache.insert("a", 3, Duration::seconds(10));

    assert_eq!(cache.get(&"a"), Some(3));
    assert_eq!(cache.get(&"b"), Some(2));
}

#[test]
fn purge_expired_counts_removed() {
    let clock = test_clock();
    let cache: TtlCache<&str, u32> = TtlCache::new(8, clock.clone());
    cache.insert("a", 1, Duration::seconds(10));
    cache.insert("b", 2, Duration::seconds(30));

    clock.advance(Duration::seconds(20));
    assert_eq!(cache.purge_expired(), 1);
    assert_eq!(cache.len(), 1);

    assert_eq!(cache.remove(&"b"), Some(2));
    cache.insert("c", 3, Duration::seconds(30));
    cache.clear();
    assert!(cache.is_empty());
}

#[test]
fn ttl_past_the_calendar_keeps_entry() {
    let clock = test_clock();
    let cache: TtlCache<&str, u32> = TtlCache::new(8, clock.clone());

    cache.insert("a", 1, Duration::MAX);
    clock.advance(Duration::days(365 * 1000));
    assert_eq!(cache.get(&"a"), Some(1));
}
