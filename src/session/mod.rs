pub mod directory;
pub mod token;

use crate::config::types::{SessionConfig, SubjectFormat};
use crate::metrics::MetricsRegistry;
use axum::http::{header, HeaderMap, StatusCode};
use directory::UserDirectory;
use serde::Serialize;
use std::sync::Arc;
use token::{TokenCodec, TokenError};
use tracing::{debug, error, warn};

/// Why a protected request was turned away. Sent as `{"message": ...}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionRejection {
    #[error("Authorization token missing")]
    TokenMissing,
    #[error("Invalid token")]
    TokenInvalid,
    #[error("Token expired")]
    TokenExpired,
    #[error("Device mismatch")]
    DeviceMismatch,
    #[error("User not found")]
    AccountNotFound,
    #[error("User deleted")]
    AccountDeleted,
    #[error("User not verified")]
    AccountUnverified,
    #[error("Verification required")]
    VerificationRequired,
    /// The directory could not be consulted
    #[error("Unauthorized")]
    Unauthorized,
}

impl SessionRejection {
    pub fn status_code(self) -> StatusCode {
        match self {
            Self::TokenMissing
            | Self::TokenInvalid
            | Self::TokenExpired
            | Self::DeviceMismatch
            | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::AccountNotFound => StatusCode::NOT_FOUND,
            Self::AccountDeleted | Self::AccountUnverified | Self::VerificationRequired => {
                StatusCode::FORBIDDEN
            }
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::TokenMissing => "token_missing",
            Self::TokenInvalid => "token_invalid",
            Self::TokenExpired => "token_expired",
            Self::DeviceMismatch => "device_mismatch",
            Self::AccountNotFound => "account_not_found",
            Self::AccountDeleted => "account_deleted",
            Self::AccountUnverified => "account_unverified",
            Self::VerificationRequired => "verification_required",
            Self::Unauthorized => "unauthorized",
        }
    }
}

/// Identity handed to downstream handlers for the rest of the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizedSubject {
    pub subject_id: String,
    pub role: Option<String>,
}

/// Verifies the session token and the account behind it.
pub struct SessionGate {
    codec: TokenCodec,
    directory: Arc<dyn UserDirectory>,
    device_binding: bool,
    subject_format: SubjectFormat,
    cookie_name: String,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl SessionGate {
    pub fn new(config: &SessionConfig, directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            codec: TokenCodec::from_config(config),
            directory,
            device_binding: config.device_binding_enabled,
            subject_format: config.subject_format,
            cookie_name: config.cookie_name.clone(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Authorize using the credential and user agent carried in `headers`.
    pub async fn authorize_headers(
        &self,
        headers: &HeaderMap,
    ) -> Result<AuthorizedSubject, SessionRejection> {
        let credential = credential_from_headers(headers, &self.cookie_name);
        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok());
        self.authorize(credential.as_deref(), user_agent).await
    }

    pub async fn authorize(
        &self,
        credential: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<AuthorizedSubject, SessionRejection> {
        let result = self.run_stages(credential, user_agent).await;
        match &result {
            Ok(subject) => debug!(subject = %subject.subject_id, "Session authorized"),
            Err(rejection) => {
                warn!(reason = rejection.reason(), "Session rejected");
                if let Some(ref m) = self.metrics {
                    m.record_session_rejection(rejection.reason());
                }
            }
        }
        result
    }

    async fn run_stages(
        &self,
        credential: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<AuthorizedSubject, SessionRejection> {
        let token = credential
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(SessionRejection::TokenMissing)?;

        let claims = self.codec.verify(token).map_err(|e| match e {
            TokenError::Expired => SessionRejection::TokenExpired,
            other => {
                debug!(error = %other, "Token verification failed");
                SessionRejection::TokenInvalid
            }
        })?;

        let subject_id = claims
            .user_id
            .filter(|s| !s.is_empty())
            .ok_or(SessionRejection::TokenInvalid)?;

        if self.device_binding {
            if let Some(bound) = claims.ua.as_deref().and_then(device_prefix) {
                let current = user_agent.and_then(device_prefix);
                if current.as_deref() != Some(bound.as_str()) {
                    debug!(
                        subject = %subject_id,
                        bound = %bound,
                        current = current.as_deref().unwrap_or(""),
                        "Device prefix differs from issuance"
                    );
                    return Err(SessionRejection::DeviceMismatch);
                }
            }
        }

        if !subject_matches_format(&subject_id, self.subject_format) {
            return Err(SessionRejection::TokenInvalid);
        }

        let account = match self.directory.lookup(&subject_id).await {
            Ok(Some(account)) => account,
            Ok(None) => return Err(SessionRejection::AccountNotFound),
            Err(e) => {
                error!(subject = %subject_id, error = %e, "User directory lookup failed");
                return Err(SessionRejection::Unauthorized);
            }
        };

        if account.is_deleted {
            return Err(SessionRejection::AccountDeleted);
        }
        if !account.is_verified {
            return Err(SessionRejection::AccountUnverified);
        }
        if !account.is_email_verified && !account.is_mobile_verified {
            return Err(SessionRejection::VerificationRequired);
        }

        Ok(AuthorizedSubject {
            subject_id: account.subject_id,
            role: account.role,
        })
    }
}

/// `Authorization: Bearer <token>` first, then the named cookie.
pub fn credential_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| name.trim() == cookie_name)
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
}

/// Lowercased first whitespace-delimited token of a user agent,
/// e.g. `mozilla/5.0`. None for a blank agent.
pub fn device_prefix(user_agent: &str) -> Option<String> {
    user_agent
        .split_whitespace()
        .next()
        .map(|s| s.to_lowercase())
}

/// 24 hexadecimal characters.
pub fn is_object_id(s: &str) -> bool {
    s.len() == 24 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn subject_matches_format(subject_id: &str, format: SubjectFormat) -> bool {
    match format {
        SubjectFormat::ObjectId => is_object_id(subject_id),
        SubjectFormat::Opaque => !subject_id.trim().is_empty(),
    }
}
