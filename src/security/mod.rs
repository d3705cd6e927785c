pub mod ban;
pub mod clock;
pub mod janitor;
pub mod normalize;
pub mod rate_limit;
pub mod route_limit;
pub mod threat;

use crate::config::types::FirewallConfig;
use crate::metrics::MetricsRegistry;
use axum::http::StatusCode;
use ban::{InMemoryReputationStore, ReputationStore};
use clock::Clock;
use ipnet::IpNet;
use normalize::ClientId;
use rate_limit::{FixedWindowTracker, RateTracker};
use std::sync::Arc;
use std::time::{Duration, Instant};
use threat::ThreatScanner;
use tracing::{debug, warn};

/// A backing store could not complete an operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Why the firewall refused a request. Terminal for that request only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FirewallDenial {
    #[error("IP temporarily blocked")]
    IpBanned,
    #[error("Blocked by firewall")]
    BlockedAgent,
    #[error("Too many requests")]
    RateExceeded,
    #[error("Malicious payload detected")]
    MaliciousPayload,
    #[error("Payload too large")]
    OversizedPayload,
}

impl FirewallDenial {
    pub fn status_code(self) -> StatusCode {
        match self {
            Self::IpBanned | Self::BlockedAgent => StatusCode::FORBIDDEN,
            Self::RateExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::MaliciousPayload => StatusCode::BAD_REQUEST,
            Self::OversizedPayload => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    /// Client-facing message, sent as `{"msg": ...}`.
    pub fn message(self) -> &'static str {
        match self {
            Self::IpBanned => "IP temporarily blocked",
            Self::BlockedAgent => "Blocked by firewall",
            Self::RateExceeded => "Too many requests",
            Self::MaliciousPayload => "Malicious payload detected",
            Self::OversizedPayload => "Payload too large",
        }
    }

    /// Stable label for logs and metrics.
    pub fn reason(self) -> &'static str {
        match self {
            Self::IpBanned => "ip_banned",
            Self::BlockedAgent => "blocked_agent",
            Self::RateExceeded => "rate_exceeded",
            Self::MaliciousPayload => "malicious_payload",
            Self::OversizedPayload => "oversized_payload",
        }
    }
}

/// How a request got past the header checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Path is on the bypass list or the firewall is off; skip the body scan.
    Bypassed,
    /// Ban, agent and rate checks passed; the body still has to be scanned.
    Passed,
}

/// The per-request abuse pipeline:
/// bypass, ban, agent, rate, then (once the body is buffered) payload.
pub struct Firewall {
    enabled: bool,
    bypass_paths: Vec<String>,
    scanner: ThreatScanner,
    reputation: Arc<dyn ReputationStore>,
    rates: Arc<dyn RateTracker>,
    clock: Arc<dyn Clock>,
    rate_window: Duration,
    rate_limit: u32,
    agent_ban: Duration,
    rate_ban: Duration,
    payload_ban: Duration,
    ban_whitelist: Vec<IpNet>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl Firewall {
    /// Firewall backed by process-local in-memory stores.
    pub fn from_config(config: &FirewallConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_stores(
            config,
            Arc::new(InMemoryReputationStore::new()),
            Arc::new(FixedWindowTracker::new(config.max_tracked_clients)),
            clock,
        )
    }

    pub fn with_stores(
        config: &FirewallConfig,
        reputation: Arc<dyn ReputationStore>,
        rates: Arc<dyn RateTracker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            enabled: config.enabled,
            bypass_paths: config.bypass_paths.clone(),
            scanner: ThreatScanner::new(&config.bad_agents, &config.payload_signatures),
            reputation,
            rates,
            clock,
            rate_window: config.rate_window(),
            rate_limit: config.rate_limit,
            agent_ban: config.agent_ban(),
            rate_ban: config.rate_ban(),
            payload_ban: config.payload_ban(),
            ban_whitelist: config.ban_whitelist.clone(),
            metrics: None,
        }
    }

    /// Wire the metrics registry for denial and ban counters.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn reputation(&self) -> &Arc<dyn ReputationStore> {
        &self.reputation
    }

    pub fn rates(&self) -> &Arc<dyn RateTracker> {
        &self.rates
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn is_bypassed(&self, path: &str) -> bool {
        self.bypass_paths.iter().any(|p| path.starts_with(p.as_str()))
    }

    /// Whitelisted clients are never banned or rate limited.
    pub fn is_whitelisted(&self, id: &ClientId) -> bool {
        match id.ip() {
            Some(ip) => self.ban_whitelist.iter().any(|net| net.contains(&ip)),
            None => false,
        }
    }

    /// Run every check that needs only the request head.
    pub fn check_request(
        &self,
        path: &str,
        user_agent: Option<&str>,
        id: &ClientId,
    ) -> Result<Admission, FirewallDenial> {
        if !self.enabled || self.is_bypassed(path) {
            debug!(client = %id, path, "Firewall bypassed");
            return Ok(Admission::Bypassed);
        }

        let now = self.clock.now();

        if self.reputation.is_banned(id, now) {
            return Err(self.deny(id, path, FirewallDenial::IpBanned));
        }

        if self.scanner.scan_agent(user_agent.unwrap_or("")).is_some() {
            self.punish(id, self.agent_ban, FirewallDenial::BlockedAgent, now);
            return Err(self.deny(id, path, FirewallDenial::BlockedAgent));
        }

        if !self.is_whitelisted(id) {
            let decision = self
                .rates
                .record_and_check(id, now, self.rate_window, self.rate_limit);
            if decision.exceeded {
                self.punish(id, self.rate_ban, FirewallDenial::RateExceeded, now);
                return Err(self.deny(id, path, FirewallDenial::RateExceeded));
            }
        }

        Ok(Admission::Passed)
    }

    /// Scan a buffered body. Only meaningful after `check_request`
    /// returned [`Admission::Passed`].
    pub fn check_payload(
        &self,
        path: &str,
        id: &ClientId,
        body: &[u8],
    ) -> Result<(), FirewallDenial> {
        if self.scanner.scan_payload(body).is_some() {
            let now = self.clock.now();
            self.punish(id, self.payload_ban, FirewallDenial::MaliciousPayload, now);
            return Err(self.deny(id, path, FirewallDenial::MaliciousPayload));
        }
        Ok(())
    }

    /// Full pipeline for a request whose body is already in memory.
    pub fn evaluate(
        &self,
        path: &str,
        user_agent: Option<&str>,
        id: &ClientId,
        body: &[u8],
    ) -> Result<Admission, FirewallDenial> {
        let admission = self.check_request(path, user_agent, id)?;
        if admission == Admission::Passed {
            self.check_payload(path, id, body)?;
        }
        Ok(admission)
    }

    /// Log and count a denial decided here or by the host (oversized body).
    pub fn deny(&self, id: &ClientId, path: &str, denial: FirewallDenial) -> FirewallDenial {
        warn!(
            client = %id,
            path,
            reason = denial.reason(),
            status = denial.status_code().as_u16(),
            "Request denied by firewall"
        );
        if let Some(ref m) = self.metrics {
            m.record_firewall_denial(denial.reason());
        }
        denial
    }

    fn punish(&self, id: &ClientId, duration: Duration, cause: FirewallDenial, now: Instant) {
        if self.is_whitelisted(id) {
            debug!(client = %id, reason = cause.reason(), "Whitelisted client exempt from ban");
            return;
        }
        let until = self.reputation.ban(id, duration, now);
        warn!(
            client = %id,
            reason = cause.reason(),
            ban_secs = until.saturating_duration_since(now).as_secs(),
            "Client banned"
        );
        if let Some(ref m) = self.metrics {
            m.record_ban(cause.reason());
        }
    }
}
