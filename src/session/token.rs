use crate::config::types::{SessionConfig, TokenAlgorithm};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// User agent the token was issued to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ua: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("token encoding failed: {0}")]
    Encode(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid(e.to_string()),
        }
    }
}

impl From<TokenAlgorithm> for Algorithm {
    fn from(alg: TokenAlgorithm) -> Self {
        match alg {
            TokenAlgorithm::HS256 => Algorithm::HS256,
            TokenAlgorithm::HS384 => Algorithm::HS384,
            TokenAlgorithm::HS512 => Algorithm::HS512,
        }
    }
}

/// Signs and verifies session tokens with one pinned HMAC algorithm.
pub struct TokenCodec {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(secret: &[u8], algorithm: TokenAlgorithm, leeway_secs: u64) -> Self {
        let algorithm = Algorithm::from(algorithm);
        // Validation::new pins the accepted algorithm list to exactly this one
        let mut validation = Validation::new(algorithm);
        validation.leeway = leeway_secs;
        Self {
            algorithm,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            config.signing_secret.as_bytes(),
            config.algorithm,
            config.leeway_secs,
        )
    }

    pub fn issue_claims(&self, claims: &SessionClaims) -> Result<String, TokenError> {
        jsonwebtoken::encode(&Header::new(self.algorithm), claims, &self.encoding)
            .map_err(|e| TokenError::Encode(e.to_string()))
    }

    /// Mint a token for `subject_id`, bound to `user_agent` when given.
    pub fn issue(
        &self,
        subject_id: &str,
        user_agent: Option<&str>,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        let now = chrono::Utc::now().timestamp();
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        self.issue_claims(&SessionClaims {
            user_id: Some(subject_id.to_string()),
            ua: user_agent.map(str::to_string),
            iat: Some(now),
            exp: now.saturating_add(ttl),
        })
    }

    /// Check signature, algorithm and expiry. Expiry wins over every
    /// payload problem.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, TokenError> {
        // decode deserializes before validating exp, so take any object first
        let data =
            jsonwebtoken::decode::<serde_json::Value>(token, &self.decoding, &self.validation)?;
        serde_json::from_value(data.claims).map_err(|e| TokenError::Invalid(e.to_string()))
    }
}
