pub mod collectors;

use collectors::{HttpDurationLabel, HttpRequestLabel, ReasonLabel};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::{Family, MetricConstructor};
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

/// Constructor for HTTP request duration histograms with predefined buckets.
#[derive(Clone)]
pub struct HttpDurationHistogramBuilder;

impl MetricConstructor<Histogram> for HttpDurationHistogramBuilder {
    fn new_metric(&self) -> Histogram {
        // Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s
        Histogram::new([0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0])
    }
}

/// Gate metrics. Label values come from closed enums or matched route
/// patterns, never from client input.
pub struct MetricsRegistry {
    pub registry: Registry,
    pub firewall_denials_total: Family<ReasonLabel, Counter>,
    pub bans_issued_total: Family<ReasonLabel, Counter>,
    pub banned_clients: Gauge,
    pub tracked_clients: Gauge,
    pub session_rejections_total: Family<ReasonLabel, Counter>,
    pub requests_allowed_total: Counter,
    pub http_requests_total: Family<HttpRequestLabel, Counter>,
    pub http_request_duration_seconds:
        Family<HttpDurationLabel, Histogram, HttpDurationHistogramBuilder>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let firewall_denials_total = Family::<ReasonLabel, Counter>::default();
        registry.register(
            "rampart_firewall_denials",
            "Requests denied by the firewall, by reason",
            firewall_denials_total.clone(),
        );

        let bans_issued_total = Family::<ReasonLabel, Counter>::default();
        registry.register(
            "rampart_bans_issued",
            "Bans issued, by violation class",
            bans_issued_total.clone(),
        );

        let banned_clients = Gauge::default();
        registry.register(
            "rampart_banned_clients",
            "Clients currently holding a ban",
            banned_clients.clone(),
        );

        let tracked_clients = Gauge::default();
        registry.register(
            "rampart_tracked_clients",
            "Clients with a live rate-limit record",
            tracked_clients.clone(),
        );

        let session_rejections_total = Family::<ReasonLabel, Counter>::default();
        registry.register(
            "rampart_session_rejections",
            "Requests rejected by the session gate, by reason",
            session_rejections_total.clone(),
        );

        let requests_allowed_total = Counter::default();
        registry.register(
            "rampart_requests_allowed",
            "Requests admitted by the firewall",
            requests_allowed_total.clone(),
        );

        let http_requests_total = Family::<HttpRequestLabel, Counter>::default();
        registry.register(
            "rampart_http_requests",
            "Total HTTP requests",
            http_requests_total.clone(),
        );

        let http_request_duration_seconds = Family::<
            HttpDurationLabel,
            Histogram,
            HttpDurationHistogramBuilder,
        >::new_with_constructor(
            HttpDurationHistogramBuilder
        );
        registry.register(
            "rampart_http_request_duration_seconds",
            "HTTP request duration in seconds",
            http_request_duration_seconds.clone(),
        );

        Self {
            registry,
            firewall_denials_total,
            bans_issued_total,
            banned_clients,
            tracked_clients,
            session_rejections_total,
            requests_allowed_total,
            http_requests_total,
            http_request_duration_seconds,
        }
    }

    pub fn record_firewall_denial(&self, reason: &str) {
        self.firewall_denials_total
            .get_or_create(&ReasonLabel {
                reason: reason.to_string(),
            })
            .inc();
    }

    pub fn record_ban(&self, reason: &str) {
        self.bans_issued_total
            .get_or_create(&ReasonLabel {
                reason: reason.to_string(),
            })
            .inc();
    }

    pub fn record_session_rejection(&self, reason: &str) {
        self.session_rejections_total
            .get_or_create(&ReasonLabel {
                reason: reason.to_string(),
            })
            .inc();
    }

    pub fn record_allowed(&self) {
        self.requests_allowed_total.inc();
    }

    /// Refresh the store size gauges (called by the janitor after a sweep).
    pub fn set_store_sizes(&self, banned: usize, tracked: usize) {
        self.banned_clients.set(banned as i64);
        self.tracked_clients.set(tracked as i64);
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16) {
        self.http_requests_total
            .get_or_create(&HttpRequestLabel {
                method: method.to_string(),
                path: path.to_string(),
                status: status.to_string(),
            })
            .inc();
    }

    pub fn record_http_request_duration(&self, method: &str, path: &str, duration_secs: f64) {
        self.http_request_duration_seconds
            .get_or_create(&HttpDurationLabel {
                method: method.to_string(),
                path: path.to_string(),
            })
            .observe(duration_secs);
    }

    /// Render the registry in the Prometheus text format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
