//! Retry policy for replaying pending operations

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use crate::models::PendingId;

/// Upper bound on any single backoff delay, whatever `Backoff::max` says.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Exponential backoff between attempts of the same operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    /// Spread each delay uniformly over `[delay / 2, delay]`
    pub jitter: bool,
}

impl Backoff {
    #[must_use]
    pub const fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            jitter: true,
        }
    }

    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Delay before the next attempt after `failures` consecutive failures.
    #[must_use]
    pub fn delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 2_u32.saturating_pow(failures - 1);
        let delay = self
            .initial
            .saturating_mul(factor)
            .min(self.max)
            .min(MAX_RETRY_DELAY);
        if self.jitter && !delay.is_zero() {
            let half = delay / 2;
            half + rand::thread_rng().gen_range(Duration::ZERO..=delay - half)
        } else {
            delay
        }
    }
}

/// How often and how fast a failed operation is retried.
///
/// The default retries every sweep, forever: failed operations stay queued
/// until the remote accepts them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Stop replaying an operation after this many failed attempts.
    /// Exhausted operations remain in the log.
    pub max_attempts: Option<u32>,
    pub backoff: Option<Backoff>,
}

impl RetryPolicy {
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            max_attempts: None,
            backoff: None,
        }
    }

    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    #[must_use]
    pub const fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }
}

/// Whether an operation may be replayed in the current sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Ready,
    /// Backing off until a later sweep
    Deferred,
    /// Reached `max_attempts`
    Exhausted,
}

#[derive(Debug, Clone, Copy)]
struct AttemptState {
    failures: u32,
    retry_at: Instant,
}

/// Per-process failure bookkeeping, keyed by pending id.
///
/// Kept outside the log so queued operations are never rewritten; counts
/// reset when the process restarts.
#[derive(Debug, Default)]
pub struct AttemptTracker {
    entries: HashMap<PendingId, AttemptState>,
}

impl AttemptTracker {
    pub fn admit(&self, policy: &RetryPolicy, id: PendingId, now: Instant) -> Admission {
        let Some(state) = self.entries.get(&id) else {
            return Admission::Ready;
        };
        if policy
            .max_attempts
            .is_some_and(|max_attempts| state.failures >= max_attempts)
        {
            return Admission::Exhausted;
        }
        if now < state.retry_at {
            return Admission::Deferred;
        }
        Admission::Ready
    }

    pub fn record_failure(&mut self, policy: &RetryPolicy, id: PendingId, now: Instant) -> u32 {
        let failures = self.entries.get(&id).map_or(0, |state| state.failures) + 1;
        let delay = policy
            .backoff
            .map_or(Duration::ZERO, |backoff| backoff.delay(failures));
        self.entries.insert(
            id,
            AttemptState {
                failures,
                retry_at: now
                    .checked_add(delay)
                    .unwrap_or_else(|| now + MAX_RETRY_DELAY),
            },
        );
        failures
    }

    pub fn record_success(&mut self, id: PendingId) {
        self.entries.remove(&id);
    }

    /// Forget operations that are no longer queued.
    pub fn retain_queued(&mut self, queued: &HashSet<PendingId>) {
        self.entries.retain(|id, _| queued.contains(id));
    }

    pub fn failures(&self, id: PendingId) -> u32 {
        self.entries.get(&id).map_or(0, |state| state.failures)
    }
}
