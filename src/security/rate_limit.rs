use super::normalize::ClientId;
use super::StoreError;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub exceeded: bool,
    /// Requests seen in the current window, this one included
    pub count: u32,
    /// Time until the current window rolls over
    pub retry_after: Duration,
}

/// Fixed-window request counter keyed by client id.
pub trait RateTracker: Send + Sync {
    /// Count one request from `id` and report whether it exceeds `limit`
    /// within the current window. The increment and the comparison happen
    /// under one lock.
    fn record_and_check(
        &self,
        id: &ClientId,
        now: Instant,
        window: Duration,
        limit: u32,
    ) -> RateDecision;

    /// Drop records whose window has aged out. Returns how many went.
    fn sweep(&self, now: Instant) -> Result<usize, StoreError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy)]
struct RateRecord {
    window_start: Instant,
    window: Duration,
    count: u32,
}

impl RateRecord {
    fn fresh(now: Instant, window: Duration) -> Self {
        Self {
            window_start: now,
            window,
            count: 1,
        }
    }

    fn is_stale(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) > self.window
    }
}

/// Approximate limiter: one counter per client, reset at window boundaries.
/// A client can burst up to twice the limit across a boundary.
#[derive(Debug)]
pub struct FixedWindowTracker {
    records: DashMap<ClientId, RateRecord>,
    max_entries: usize,
}

impl FixedWindowTracker {
    pub fn new(max_entries: usize) -> Self {
        Self {
            records: DashMap::new(),
            max_entries,
        }
    }

    /// Make room for a new client when the map is full: sweep stale
    /// records first, then evict the oldest tenth.
    fn ensure_capacity(&self, id: &ClientId, now: Instant) {
        if self.records.contains_key(id) || self.records.len() < self.max_entries {
            return;
        }
        let _ = self.sweep(now);
        if self.records.len() >= self.max_entries {
            let evicted = self.evict_oldest((self.max_entries / 10).max(1));
            warn!(
                tracked_clients = self.records.len(),
                evicted, "Rate tracker at capacity, evicted oldest entries"
            );
        }
    }

    /// Evict the `count` records with the oldest window start.
    fn evict_oldest(&self, count: usize) -> usize {
        if count == 0 || self.records.is_empty() {
            return 0;
        }

        // Collect (key, window_start) without holding shard locks for long
        let mut entries: Vec<(ClientId, Instant)> = self
            .records
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().window_start))
            .collect();

        entries.sort_by_key(|(_, t)| *t);

        let to_evict = entries.len().min(count);
        for (id, _) in entries.into_iter().take(to_evict) {
            self.records.remove(&id);
        }

        to_evict
    }
}

impl Default for FixedWindowTracker {
    fn default() -> Self {
        Self::new(100_000)
    }
}

impl RateTracker for FixedWindowTracker {
    fn record_and_check(
        &self,
        id: &ClientId,
        now: Instant,
        window: Duration,
        limit: u32,
    ) -> RateDecision {
        self.ensure_capacity(id, now);

        let mut record = self
            .records
            .entry(id.clone())
            .and_modify(|r| {
                if r.is_stale(now) {
                    *r = RateRecord::fresh(now, window);
                } else {
                    r.count = r.count.saturating_add(1);
                }
            })
            .or_insert_with(|| RateRecord::fresh(now, window));

        // picks up a changed window size for the next reset
        record.window = window;
        let elapsed = now.saturating_duration_since(record.window_start);
        RateDecision {
            exceeded: record.count > limit,
            count: record.count,
            retry_after: window.saturating_sub(elapsed),
        }
    }

    fn sweep(&self, now: Instant) -> Result<usize, StoreError> {
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_stale(now));
        let removed = before.saturating_sub(self.records.len());
        if removed > 0 {
            debug!(
                removed,
                remaining = self.records.len(),
                "Rate tracker stale cleanup"
            );
        }
        Ok(removed)
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
