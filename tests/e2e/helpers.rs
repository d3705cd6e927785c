use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use rampart::api::{build_router, AppState};
use rampart::config::types::AppConfig;
use rampart::security::clock::ManualClock;
use rampart::session::directory::{AccountSnapshot, StaticDirectory};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub const SECRET: &str = "0123456789abcdef0123456789abcdef";
pub const SUBJECT: &str = "65f1c0a2b3d4e5f601234567";
pub const ADMIN_TOKEN: &str = "admin-token-0123456789";
pub const BROWSER: &str = "Mozilla/5.0 (X11; Linux x86_64) Gecko/20100101 Firefox/128.0";
pub const CLIENT: &str = "10.0.0.5";

/// Parse a config from extra TOML sections plus a fixed `[session]` table.
pub fn config(extra: &str) -> AppConfig {
    config_with_session(extra, "")
}

pub fn config_with_session(extra: &str, session_extra: &str) -> AppConfig {
    let toml_str = format!(
        r##"
{extra}

[session]
signing_secret = "{SECRET}"
{session_extra}
"##
    );
    rampart::config::parse_config(&toml_str).unwrap()
}

pub fn verified_account(subject: &str) -> AccountSnapshot {
    AccountSnapshot {
        subject_id: subject.to_string(),
        role: Some("user".to_string()),
        is_deleted: false,
        is_verified: true,
        is_email_verified: true,
        is_mobile_verified: false,
    }
}

/// In-process gateway driven through `oneshot`, on a manual clock.
pub struct TestGateway {
    pub router: Router,
    pub state: AppState,
    pub clock: Arc<ManualClock>,
}

impl TestGateway {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_accounts(config, vec![verified_account(SUBJECT)])
    }

    pub fn with_accounts(config: &AppConfig, accounts: Vec<AccountSnapshot>) -> Self {
        let clock = Arc::new(ManualClock::new());
        let state = AppState::from_config(
            config,
            Arc::new(StaticDirectory::new(accounts)),
            clock.clone(),
        );
        Self {
            router: build_router(state.clone()),
            state,
            clock,
        }
    }

    pub async fn send(&self, req: Request<Body>) -> Response {
        self.router.clone().oneshot(req).await.unwrap()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Session token for `subject` bound to `ua`, valid for an hour.
    pub fn token(&self, subject: &str, ua: Option<&str>) -> String {
        self.state
            .session
            .codec()
            .issue(subject, ua, Duration::from_secs(3600))
            .unwrap()
    }
}

/// GET from [`CLIENT`] with a browser user agent.
pub fn get(path: &str) -> Request<Body> {
    get_from(CLIENT, path)
}

pub fn get_from(client: &str, path: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header("x-forwarded-for", client)
        .header("user-agent", BROWSER)
        .body(Body::empty())
        .unwrap()
}

pub fn get_with_agent(client: &str, path: &str, agent: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header("x-forwarded-for", client)
        .header("user-agent", agent)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(client: &str, path: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("x-forwarded-for", client)
        .header("user-agent", BROWSER)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(resp: Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(resp: Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Assert status and the `{"msg": ...}` body of a firewall decision.
pub async fn assert_msg(resp: Response, status: StatusCode, msg: &str) {
    assert_eq!(resp.status(), status);
    assert_eq!(body_json(resp).await["msg"], msg);
}
