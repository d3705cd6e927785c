use super::{ApiResponse, AppState};
use crate::security::normalize::ClientId;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;

#[derive(Serialize)]
pub struct BanInfo {
    pub client: ClientId,
    pub remaining_secs: u64,
}

pub async fn list_bans(State(state): State<AppState>) -> impl IntoResponse {
    let now = state.firewall.clock().now();
    let mut bans: Vec<BanInfo> = state
        .firewall
        .reputation()
        .banned(now)
        .into_iter()
        .map(|(client, expiry)| BanInfo {
            client,
            remaining_secs: expiry.saturating_duration_since(now).as_secs(),
        })
        .collect();
    bans.sort_by(|a, b| a.client.cmp(&b.client));

    ApiResponse::ok(bans)
}

#[derive(Serialize)]
pub struct UnbanResult {
    pub client: ClientId,
    pub unbanned: bool,
}

pub async fn delete_ban(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> impl IntoResponse {
    let client = ClientId::parse(&raw);
    if client.is_unknown() && raw.trim() != crate::security::normalize::UNKNOWN_CLIENT {
        return ApiResponse::err(StatusCode::BAD_REQUEST, "invalid client identifier")
            .into_response();
    }

    if state.firewall.reputation().unban(&client) {
        ApiResponse::ok(UnbanResult {
            client,
            unbanned: true,
        })
        .into_response()
    } else {
        ApiResponse::err(StatusCode::NOT_FOUND, "client not banned").into_response()
    }
}
