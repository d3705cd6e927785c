use crate::config::types::AccountConfig;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;

/// Account state as the user directory reports it at lookup time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSnapshot {
    pub subject_id: String,
    pub role: Option<String>,
    pub is_deleted: bool,
    pub is_verified: bool,
    pub is_email_verified: bool,
    pub is_mobile_verified: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("user directory unavailable: {0}")]
    Unavailable(String),
}

/// Source of truth for account state, consulted once per protected request.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn lookup(&self, subject_id: &str) -> Result<Option<AccountSnapshot>, DirectoryError>;
}

/// Fixed set of accounts loaded from configuration.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    accounts: HashMap<String, AccountSnapshot>,
}

impl StaticDirectory {
    pub fn new(accounts: impl IntoIterator<Item = AccountSnapshot>) -> Self {
        Self {
            accounts: accounts
                .into_iter()
                .map(|a| (a.subject_id.clone(), a))
                .collect(),
        }
    }

    pub fn from_config(accounts: &[AccountConfig]) -> Self {
        Self::new(accounts.iter().map(|a| AccountSnapshot {
            subject_id: a.subject_id.clone(),
            role: a.role.clone(),
            is_deleted: a.deleted,
            is_verified: a.verified,
            is_email_verified: a.email_verified,
            is_mobile_verified: a.mobile_verified,
        }))
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn lookup(&self, subject_id: &str) -> Result<Option<AccountSnapshot>, DirectoryError> {
        Ok(self.accounts.get(subject_id).cloned())
    }
}
