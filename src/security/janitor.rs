use super::ban::ReputationStore;
use super::clock::Clock;
use super::rate_limit::RateTracker;
use super::route_limit::RouteLimits;
use super::Firewall;
use crate::metrics::MetricsRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// `tokio::time::interval` panics on a zero period.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// What one sweep removed and what is left.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub bans_removed: usize,
    pub rate_records_removed: usize,
    pub route_records_removed: usize,
    pub banned_remaining: usize,
    pub tracked_remaining: usize,
}

/// Periodic eviction of expired bans and stale rate records.
///
/// Sweeps only touch one shard at a time, so request handlers are never
/// blocked for the duration of a pass. A failed sweep is logged and retried
/// on the next tick.
pub struct Janitor {
    reputation: Arc<dyn ReputationStore>,
    rates: Arc<dyn RateTracker>,
    route_limits: Option<Arc<RouteLimits>>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl Janitor {
    pub fn new(
        reputation: Arc<dyn ReputationStore>,
        rates: Arc<dyn RateTracker>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            reputation,
            rates,
            route_limits: None,
            clock,
            interval: interval.max(MIN_INTERVAL),
            metrics: None,
        }
    }

    /// Janitor over the stores a firewall was built with.
    pub fn for_firewall(firewall: &Firewall, interval: Duration) -> Self {
        Self::new(
            firewall.reputation().clone(),
            firewall.rates().clone(),
            firewall.clock().clone(),
            interval,
        )
    }

    pub fn with_route_limits(mut self, route_limits: Arc<RouteLimits>) -> Self {
        self.route_limits = Some(route_limits);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// One sweep pass at the clock's current instant.
    pub fn run_once(&self) -> SweepReport {
        let now = self.clock.now();

        let bans_removed = self.reputation.sweep(now).unwrap_or_else(|e| {
            warn!(error = %e, "Ban sweep failed, retrying next tick");
            0
        });
        let rate_records_removed = self.rates.sweep(now).unwrap_or_else(|e| {
            warn!(error = %e, "Rate record sweep failed, retrying next tick");
            0
        });
        let route_records_removed = match self.route_limits {
            Some(ref limits) => limits.sweep(now).unwrap_or_else(|e| {
                warn!(error = %e, "Route limit sweep failed, retrying next tick");
                0
            }),
            None => 0,
        };

        let report = SweepReport {
            bans_removed,
            rate_records_removed,
            route_records_removed,
            banned_remaining: self.reputation.len(),
            tracked_remaining: self.rates.len(),
        };

        if let Some(ref m) = self.metrics {
            m.set_store_sizes(report.banned_remaining, report.tracked_remaining);
        }
        debug!(
            bans_removed,
            rate_records_removed,
            route_records_removed,
            banned = report.banned_remaining,
            tracked = report.tracked_remaining,
            "Janitor sweep completed"
        );
        report
    }

    /// Run `run_once` every interval until `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // Skip the first immediate tick
            interval.tick().await;
            info!(interval_secs = self.interval.as_secs(), "Janitor started");

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Janitor stopped");
                        return;
                    }
                    _ = interval.tick() => {
                        self.run_once();
                    }
                }
            }
        })
    }
}
