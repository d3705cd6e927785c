use super::clock::Clock;
use super::normalize::ClientId;
use super::rate_limit::{FixedWindowTracker, RateTracker};
use super::StoreError;
use crate::config::types::RouteLimitConfig;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// A per-route budget was exhausted. No ban follows from this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteLimitExceeded {
    pub retry_after: Duration,
    pub message: String,
    pub kind: Option<String>,
}

impl RouteLimitExceeded {
    /// `{"type": kind, "message": ...}` when the rule carries a kind,
    /// else `{"msg": ...}`.
    pub fn body(&self) -> Value {
        match &self.kind {
            Some(kind) => json!({ "type": kind, "message": self.message }),
            None => json!({ "msg": self.message }),
        }
    }

    /// Whole seconds for the `Retry-After` header, at least 1.
    pub fn retry_after_secs(&self) -> u64 {
        self.retry_after.as_secs().max(1)
    }
}

struct RouteRule {
    path_prefix: String,
    window: Duration,
    max_requests: u32,
    message: String,
    kind: Option<String>,
    tracker: FixedWindowTracker,
}

/// Route-specific limiters applied after the firewall admitted a request,
/// bypass paths included.
pub struct RouteLimits {
    rules: Vec<RouteRule>,
    clock: Arc<dyn Clock>,
}

impl RouteLimits {
    pub fn from_config(
        rules: &[RouteLimitConfig],
        max_tracked_clients: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let rules = rules
            .iter()
            .map(|r| RouteRule {
                path_prefix: r.path_prefix.clone(),
                window: Duration::from_secs(r.window_secs),
                max_requests: r.max_requests,
                message: r.message.clone(),
                kind: r.kind.clone(),
                tracker: FixedWindowTracker::new(max_tracked_clients),
            })
            .collect();
        Self { rules, clock }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Count the request against every rule whose prefix matches `path`.
    /// The first exhausted rule wins.
    pub fn check(&self, path: &str, id: &ClientId) -> Result<(), RouteLimitExceeded> {
        let now = self.clock.now();
        for rule in self.rules.iter().filter(|r| path.starts_with(&r.path_prefix)) {
            let decision = rule
                .tracker
                .record_and_check(id, now, rule.window, rule.max_requests);
            if decision.exceeded {
                warn!(
                    client = %id,
                    path,
                    rule = %rule.path_prefix,
                    count = decision.count,
                    "Route rate limit exceeded"
                );
                return Err(RouteLimitExceeded {
                    retry_after: decision.retry_after,
                    message: rule.message.clone(),
                    kind: rule.kind.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn sweep(&self, now: Instant) -> Result<usize, StoreError> {
        let mut removed = 0;
        for rule in &self.rules {
            removed += rule.tracker.sweep(now)?;
        }
        Ok(removed)
    }

    pub fn tracked(&self) -> usize {
        self.rules.iter().map(|r| r.tracker.len()).sum()
    }
}
