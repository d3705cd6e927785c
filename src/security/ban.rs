use super::normalize::ClientId;
use super::StoreError;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Temporary bans keyed by client id.
///
/// Implementations must make every read-modify-write atomic per id: once
/// `ban` returns, every later `is_banned` for that id sees the ban until it
/// expires, no matter which thread asks.
pub trait ReputationStore: Send + Sync {
    /// True while an unexpired ban exists. An expired entry is evicted by
    /// the lookup itself.
    fn is_banned(&self, id: &ClientId, now: Instant) -> bool;

    /// Ban `id` until `now + duration`. An active longer ban is kept.
    /// Returns the effective expiry.
    fn ban(&self, id: &ClientId, duration: Duration, now: Instant) -> Instant;

    /// Lift a ban. Returns whether one existed.
    fn unban(&self, id: &ClientId) -> bool;

    /// Remove every entry with `expires_at <= now`. Returns how many went.
    fn sweep(&self, now: Instant) -> Result<usize, StoreError>;

    /// Unexpired bans with their expiry.
    fn banned(&self, now: Instant) -> Vec<(ClientId, Instant)>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local reputation store on a sharded concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryReputationStore {
    /// client id -> ban expiry
    bans: DashMap<ClientId, Instant>,
}

impl InMemoryReputationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReputationStore for InMemoryReputationStore {
    fn is_banned(&self, id: &ClientId, now: Instant) -> bool {
        // Atomically remove expired bans (no TOCTOU between get and remove)
        if self
            .bans
            .remove_if(id, |_, expiry| now >= *expiry)
            .is_some()
        {
            info!(client = %id, "Client ban expired");
            return false;
        }

        self.bans.contains_key(id)
    }

    fn ban(&self, id: &ClientId, duration: Duration, now: Instant) -> Instant {
        let requested = now + duration;
        let mut entry = self.bans.entry(id.clone()).or_insert(requested);
        if *entry < requested {
            *entry = requested;
        }
        let effective = *entry;
        drop(entry);
        if effective > requested {
            debug!(
                client = %id,
                requested_secs = duration.as_secs(),
                remaining_secs = (effective - now).as_secs(),
                "Longer ban already active, keeping it"
            );
        }
        effective
    }

    fn unban(&self, id: &ClientId) -> bool {
        let removed = self.bans.remove(id).is_some();
        if removed {
            info!(client = %id, "Client manually unbanned");
        }
        removed
    }

    fn sweep(&self, now: Instant) -> Result<usize, StoreError> {
        let before = self.bans.len();
        self.bans.retain(|_, expiry| now < *expiry);
        Ok(before.saturating_sub(self.bans.len()))
    }

    fn banned(&self, now: Instant) -> Vec<(ClientId, Instant)> {
        self.bans
            .iter()
            .filter(|entry| now < *entry.value())
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    fn len(&self) -> usize {
        self.bans.len()
    }
}
