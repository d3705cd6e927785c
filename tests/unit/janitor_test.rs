use rampart::config::types::{FirewallConfig, RouteLimitConfig};
use rampart::metrics::MetricsRegistry;
use rampart::security::ban::ReputationStore;
use rampart::security::clock::{Clock, ManualClock};
use rampart::security::janitor::Janitor;
use rampart::security::normalize::ClientId;
use rampart::security::route_limit::RouteLimits;
use rampart::security::Firewall;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn firewall(clock: Arc<ManualClock>) -> Firewall {
    Firewall::from_config(&FirewallConfig::default(), clock)
}

#[test]
fn sweep_keeps_live_entries() {
    let clock = Arc::new(ManualClock::new());
    let fw = firewall(clock.clone());
    let now = clock.now();

    fw.reputation()
        .ban(&ClientId::parse("10.0.0.1"), Duration::from_secs(30), now);
    fw.reputation()
        .ban(&ClientId::parse("10.0.0.2"), Duration::from_secs(600), now);
    let _ = fw.check_request("/x", None, &ClientId::parse("10.0.0.3"));

    let janitor = Janitor::for_firewall(&fw, Duration::from_secs(60));
    clock.advance(Duration::from_secs(45));
    let report = janitor.run_once();

    assert_eq!(report.bans_removed, 1);
    assert_eq!(report.rate_records_removed, 0);
    assert_eq!(report.banned_remaining, 1);
    assert_eq!(report.tracked_remaining, 1);

    clock.advance(Duration::from_secs(16));
    let report = janitor.run_once();
    assert_eq!(report.rate_records_removed, 1);
    assert_eq!(report.tracked_remaining, 0);
}

#[test]
fn route_limit_records_are_swept_too() {
    let clock = Arc::new(ManualClock::new());
    let fw = firewall(clock.clone());
    let rules = vec![RouteLimitConfig {
        path_prefix: "/verify_otp".to_string(),
        window_secs: 300,
        max_requests: 5,
        message: "OTP spam detected".to_string(),
        kind: None,
    }];
    let limits = Arc::new(RouteLimits::from_config(&rules, 1000, clock.clone()));
    limits
        .check("/verify_otp", &ClientId::parse("10.0.0.5"))
        .unwrap();
    assert_eq!(limits.tracked(), 1);

    let janitor = Janitor::for_firewall(&fw, Duration::from_secs(60)).with_route_limits(limits.clone());
    clock.advance(Duration::from_secs(301));
    assert_eq!(janitor.run_once().route_records_removed, 1);
    assert_eq!(limits.tracked(), 0);
}

#[test]
fn sweep_updates_store_gauges() {
    let clock = Arc::new(ManualClock::new());
    let fw = firewall(clock.clone());
    let metrics = Arc::new(MetricsRegistry::new());
    fw.reputation()
        .ban(&ClientId::parse("10.0.0.1"), Duration::from_secs(600), clock.now());

    Janitor::for_firewall(&fw, Duration::from_secs(60))
        .with_metrics(metrics.clone())
        .run_once();

    let text = metrics.encode().unwrap();
    assert!(text.lines().any(|l| l == "rampart_banned_clients 1"));
    assert!(text.lines().any(|l| l == "rampart_tracked_clients 0"));
}

#[tokio::test(start_paused = true)]
async fn spawned_janitor_sweeps_on_interval_and_stops_on_cancel() {
    let clock = Arc::new(ManualClock::new());
    let fw = firewall(clock.clone());
    let id = ClientId::parse("10.0.0.9");
    fw.reputation().ban(&id, Duration::from_secs(30), clock.now());
    clock.advance(Duration::from_secs(31));

    let shutdown = CancellationToken::new();
    let handle = Janitor::for_firewall(&fw, Duration::from_secs(60)).spawn(shutdown.clone());

    // first tick is skipped: nothing swept yet
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(fw.reputation().len(), 1);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(fw.reputation().len(), 0);

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("janitor should stop after cancel")
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn zero_interval_is_clamped() {
    let clock = Arc::new(ManualClock::new());
    let fw = firewall(clock.clone());
    fw.reputation()
        .ban(&ClientId::parse("10.0.0.9"), Duration::from_secs(30), clock.now());
    clock.advance(Duration::from_secs(31));

    let shutdown = CancellationToken::new();
    let handle = Janitor::for_firewall(&fw, Duration::ZERO).spawn(shutdown.clone());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(fw.reputation().len(), 0);

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("janitor should stop after cancel")
        .unwrap();
}
