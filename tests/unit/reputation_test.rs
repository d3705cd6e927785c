use rampart::security::ban::{InMemoryReputationStore, ReputationStore};
use rampart::security::clock::{Clock, ManualClock};
use rampart::security::normalize::ClientId;
use rampart::security::rate_limit::{FixedWindowTracker, RateTracker};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn id(s: &str) -> ClientId {
    ClientId::parse(s)
}

// ---------------------------------------------------------------------------
// Reputation store
// ---------------------------------------------------------------------------

#[test]
fn never_banned_client_is_not_banned() {
    let clock = ManualClock::new();
    let store = InMemoryReputationStore::new();
    assert!(!store.is_banned(&id("10.0.0.5"), clock.now()));
    assert!(!store.is_banned(&ClientId::unknown(), clock.now()));
}

#[test]
fn ban_holds_strictly_before_expiry() {
    let clock = ManualClock::new();
    let store = InMemoryReputationStore::new();
    let client = id("10.0.0.5");

    store.ban(&client, Duration::from_secs(60), clock.now());
    clock.advance(Duration::from_millis(59_999));
    assert!(store.is_banned(&client, clock.now()));

    clock.advance(Duration::from_millis(1));
    assert!(!store.is_banned(&client, clock.now()));
}

#[test]
fn expired_ban_is_evicted_on_lookup() {
    let clock = ManualClock::new();
    let store = InMemoryReputationStore::new();
    let client = id("10.0.0.5");

    store.ban(&client, Duration::from_secs(10), clock.now());
    assert_eq!(store.len(), 1);
    clock.advance(Duration::from_secs(11));
    assert!(!store.is_banned(&client, clock.now()));
    assert!(store.is_empty());
}

#[test]
fn repeated_violation_keeps_the_later_expiry() {
    let clock = ManualClock::new();
    let store = InMemoryReputationStore::new();
    let client = id("10.0.0.5");

    let long = store.ban(&client, Duration::from_secs(900), clock.now());
    let after_short = store.ban(&client, Duration::from_secs(60), clock.now());
    assert_eq!(long, after_short);

    clock.advance(Duration::from_secs(120));
    assert!(store.is_banned(&client, clock.now()));
}

#[test]
fn mapped_and_plain_ipv4_share_a_ban() {
    let clock = ManualClock::new();
    let store = InMemoryReputationStore::new();
    store.ban(&id("::ffff:10.0.0.5"), Duration::from_secs(60), clock.now());
    assert!(store.is_banned(&id("10.0.0.5"), clock.now()));
}

#[test]
fn concurrent_bans_are_all_visible() {
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(InMemoryReputationStore::new());

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = store.clone();
            let clock = clock.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    let client = id(&format!("10.{t}.0.{i}"));
                    store.ban(&client, Duration::from_secs(60), clock.now());
                    assert!(store.is_banned(&client, clock.now()));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(store.len(), 400);
}

// ---------------------------------------------------------------------------
// Rate tracker
// ---------------------------------------------------------------------------

#[test]
fn first_limit_requests_pass_then_exceeded() {
    let clock = ManualClock::new();
    let tracker = FixedWindowTracker::default();
    let client = id("10.0.0.5");
    let window = Duration::from_secs(60);

    for n in 1..=100 {
        let d = tracker.record_and_check(&client, clock.now(), window, 100);
        assert!(!d.exceeded, "request {n} should pass");
        assert_eq!(d.count, n);
    }
    assert!(tracker.record_and_check(&client, clock.now(), window, 100).exceeded);
    // the exhausted window keeps reporting exceeded
    assert!(tracker.record_and_check(&client, clock.now(), window, 100).exceeded);
}

#[test]
fn counter_resets_after_window_boundary() {
    let clock = ManualClock::new();
    let tracker = FixedWindowTracker::default();
    let client = id("10.0.0.5");
    let window = Duration::from_secs(60);

    for _ in 0..5 {
        tracker.record_and_check(&client, clock.now(), window, 3);
    }
    clock.advance(Duration::from_secs(61));
    let d = tracker.record_and_check(&client, clock.now(), window, 3);
    assert!(!d.exceeded);
    assert_eq!(d.count, 1);
}

#[test]
fn burst_across_boundary_allows_twice_the_limit() {
    let clock = ManualClock::new();
    let tracker = FixedWindowTracker::default();
    let client = id("10.0.0.5");
    let window = Duration::from_secs(60);

    // window opens here
    assert!(!tracker.record_and_check(&client, clock.now(), window, 10).exceeded);

    clock.advance(Duration::from_secs(59));
    for _ in 0..9 {
        assert!(!tracker.record_and_check(&client, clock.now(), window, 10).exceeded);
    }
    assert!(tracker.record_and_check(&client, clock.now(), window, 10).exceeded);

    // two seconds later the window has rolled over: ten more pass
    clock.advance(Duration::from_secs(2));
    for _ in 0..10 {
        assert!(!tracker.record_and_check(&client, clock.now(), window, 10).exceeded);
    }
}

#[test]
fn concurrent_counting_loses_no_increment() {
    let clock = Arc::new(ManualClock::new());
    let tracker = Arc::new(FixedWindowTracker::default());
    let client = id("10.0.0.5");
    let window = Duration::from_secs(60);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let tracker = tracker.clone();
            let clock = clock.clone();
            let client = client.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    tracker.record_and_check(&client, clock.now(), window, 1_000);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let d = tracker.record_and_check(&client, clock.now(), window, 1_000);
    assert_eq!(d.count, 201);
}
