pub mod bans;

use crate::config::types::AppConfig;
use crate::metrics::MetricsRegistry;
use crate::security::clock::Clock;
use crate::security::normalize::{ClientId, ClientIdentityResolver};
use crate::security::route_limit::RouteLimits;
use crate::security::{Admission, Firewall, FirewallDenial};
use crate::session::directory::UserDirectory;
use crate::session::{AuthorizedSubject, SessionGate};
use axum::{
    body::Body,
    extract::{ConnectInfo, DefaultBodyLimit, Extension, MatchedPath, State},
    http::{header, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Unified API response envelope for consistent JSON output.
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> (StatusCode, Json<Self>) {
        (
            StatusCode::OK,
            Json(Self {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
    }
}

impl ApiResponse<()> {
    pub fn err(status: StatusCode, msg: impl Into<String>) -> (StatusCode, Json<Self>) {
        (
            status,
            Json(Self {
                success: false,
                data: None,
                error: Some(msg.into()),
            }),
        )
    }
}

#[derive(Clone)]
pub struct AppState {
    pub firewall: Arc<Firewall>,
    pub route_limits: Arc<RouteLimits>,
    pub session: Arc<SessionGate>,
    pub resolver: Arc<ClientIdentityResolver>,
    pub metrics: Arc<MetricsRegistry>,
    pub max_body_bytes: usize,
    /// Serve the registry here when set
    pub metrics_path: Option<String>,
    /// Admin bearer token; the admin API is mounted only when set
    pub api_token: Option<String>,
    pub start_time: Instant,
}

impl AppState {
    /// Wire every gate component from one config, sharing `clock` and one
    /// metrics registry between them.
    pub fn from_config(
        config: &AppConfig,
        directory: Arc<dyn UserDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let metrics = Arc::new(MetricsRegistry::new());
        let firewall =
            Firewall::from_config(&config.firewall, clock.clone()).with_metrics(metrics.clone());
        let route_limits = RouteLimits::from_config(
            &config.route_limits,
            config.firewall.max_tracked_clients,
            clock,
        );
        let session = SessionGate::new(&config.session, directory).with_metrics(metrics.clone());

        Self {
            firewall: Arc::new(firewall),
            route_limits: Arc::new(route_limits),
            session: Arc::new(session),
            resolver: Arc::new(ClientIdentityResolver::new(
                config.firewall.trusted_proxies.clone(),
            )),
            metrics,
            max_body_bytes: config.server.max_body_bytes,
            metrics_path: config
                .metrics
                .enabled
                .then(|| config.metrics.path.clone()),
            api_token: (config.api.enabled && !config.api.token.is_empty())
                .then(|| config.api.token.clone()),
            start_time: Instant::now(),
        }
    }
}

/// The gateway router: firewall and route limits in front of everything,
/// the session gate in front of protected routes.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth_me", get(auth_me_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            session_middleware,
        ));

    let mut app = Router::new()
        .route("/", get(|| async { "Server is running" }))
        .route("/livez", get(|| async { "ok" }))
        .merge(protected);

    if let Some(ref path) = state.metrics_path {
        app = app.route(path, get(metrics_handler));
    }

    if state.api_token.is_some() {
        let admin = Router::new()
            .route("/admin/bans", get(bans::list_bans))
            .route("/admin/bans/{id}", delete(bans::delete_ban))
            .route("/admin/status", get(status_handler))
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                admin_auth_middleware,
            ));
        app = app.merge(admin);
    }

    app.fallback(not_found_handler)
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            route_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            firewall_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            http_metrics_middleware,
        ))
        .with_state(state)
}

fn denial_response(denial: FirewallDenial) -> Response {
    (denial.status_code(), Json(json!({ "msg": denial.message() }))).into_response()
}

/// Resolve the client, run the head checks, buffer and scan the body.
/// Admitted requests carry their [`ClientId`] as an extension.
async fn firewall_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let id = state.resolver.resolve(req.headers(), peer);
    let path = req.uri().path().to_string();
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let admission = match state
        .firewall
        .check_request(&path, user_agent.as_deref(), &id)
    {
        Ok(admission) => admission,
        Err(denial) => return denial_response(denial),
    };

    let mut req = match admission {
        Admission::Bypassed => req,
        Admission::Passed => {
            let declared = req
                .headers()
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<usize>().ok());
            if declared.is_some_and(|len| len > state.max_body_bytes) {
                return denial_response(state.firewall.deny(
                    &id,
                    &path,
                    FirewallDenial::OversizedPayload,
                ));
            }

            let (parts, body) = req.into_parts();
            let bytes = match axum::body::to_bytes(body, state.max_body_bytes).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!(client = %id, error = %e, "Body buffering stopped");
                    return denial_response(state.firewall.deny(
                        &id,
                        &path,
                        FirewallDenial::OversizedPayload,
                    ));
                }
            };

            if let Err(denial) = state.firewall.check_payload(&path, &id, &bytes) {
                return denial_response(denial);
            }
            state.metrics.record_allowed();
            Request::from_parts(parts, Body::from(bytes))
        }
    };

    req.extensions_mut().insert(id);
    next.run(req).await
}

async fn route_limit_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if state.route_limits.is_empty() {
        return next.run(req).await;
    }
    let id = req
        .extensions()
        .get::<ClientId>()
        .cloned()
        .unwrap_or_else(|| state.resolver.resolve(req.headers(), None));

    match state.route_limits.check(req.uri().path(), &id) {
        Ok(()) => next.run(req).await,
        Err(exceeded) => (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, exceeded.retry_after_secs().to_string())],
            Json(exceeded.body()),
        )
            .into_response(),
    }
}

async fn session_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    match state.session.authorize_headers(req.headers()).await {
        Ok(subject) => {
            req.extensions_mut().insert(subject);
            next.run(req).await
        }
        Err(rejection) => (
            rejection.status_code(),
            Json(json!({ "message": rejection.to_string() })),
        )
            .into_response(),
    }
}

/// Records request count and duration per route pattern.
async fn http_metrics_middleware(
    State(state): State<AppState>,
    matched_path: Option<MatchedPath>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let method = req.method().to_string();
    let path = matched_path
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();

    let response = next.run(req).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16();

    state.metrics.record_http_request(&method, &path, status);
    state
        .metrics
        .record_http_request_duration(&method, &path, duration);

    response
}

/// Bearer token auth for the admin API, compared in constant time.
async fn admin_auth_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    use subtle::ConstantTimeEq;

    let Some(ref token) = state.api_token else {
        return ApiResponse::err(StatusCode::SERVICE_UNAVAILABLE, "admin API disabled")
            .into_response();
    };
    let expected = token.as_bytes();

    let provided = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::as_bytes);

    match provided {
        Some(p) if p.len() == expected.len() && bool::from(p.ct_eq(expected)) => {
            next.run(req).await
        }
        _ => ApiResponse::err(StatusCode::UNAUTHORIZED, "unauthorized").into_response(),
    }
}

async fn auth_me_handler(Extension(subject): Extension<AuthorizedSubject>) -> impl IntoResponse {
    Json(json!({ "user": subject }))
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.encode() {
        Ok(buffer) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            buffer,
        )
            .into_response(),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "encoding error").into_response(),
    }
}

#[derive(Serialize)]
struct StatusInfo {
    uptime_secs: u64,
    banned_clients: usize,
    tracked_clients: usize,
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    ApiResponse::ok(StatusInfo {
        uptime_secs: state.start_time.elapsed().as_secs(),
        banned_clients: state.firewall.reputation().len(),
        tracked_clients: state.firewall.rates().len(),
    })
}

async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "msg": "Not found" })))
}
