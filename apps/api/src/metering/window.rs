//! Fixed-window counter limiter.
//!
//! Answers "has token T used more than L operations in the current window?". A token's
//! window opens on its first counted operation and closes `interval` later, when the
//! backing cache drops the counter. The next operation opens a fresh window at count 1.
//!
//! The `reset` timestamp reported to callers is always `now + interval`, not the true
//! end of the token's window, so displayed countdowns slide forward on every call.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::clock::Clock;
use crate::metering::cache::{BoundedTtlCache, Op};

#[derive(Debug, Clone, Copy)]
pub struct WindowConfig {
    /// Window length and counter lifetime.
    pub interval: Duration,
    /// Maximum number of distinct tokens tracked at once.
    pub max_tokens: usize,
}

impl WindowConfig {
    pub fn hourly(max_tokens: usize) -> Self {
        Self {
            interval: Duration::hours(1),
            max_tokens,
        }
    }

    pub fn per_minute(max_tokens: usize) -> Self {
        Self {
            interval: Duration::minutes(1),
            max_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowUsage {
    pub limit: u32,
    pub remaining: u32,
    pub reset: DateTime<Utc>,
}

/// Result of a limiter lookup. A denial is an ordinary value, never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RateLimitOutcome {
    Allowed(WindowUsage),
    Denied(WindowUsage),
}

impl RateLimitOutcome {
    pub fn success(&self) -> bool {
        matches!(self, RateLimitOutcome::Allowed(_))
    }

    pub fn usage(&self) -> &WindowUsage {
        match self {
            RateLimitOutcome::Allowed(usage) | RateLimitOutcome::Denied(usage) => usage,
        }
    }

    pub fn into_usage(self) -> WindowUsage {
        match self {
            RateLimitOutcome::Allowed(usage) | RateLimitOutcome::Denied(usage) => usage,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u32,
}

pub struct FixedWindowLimiter {
    counters: BoundedTtlCache<Counter>,
    interval: Duration,
}

impl FixedWindowLimiter {
    pub fn new(config: WindowConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            counters: BoundedTtlCache::new(config.max_tokens, config.interval, clock),
            interval: config.interval,
        }
    }

    /// Counts one operation for `token` and reports whether it fits under `limit`.
    ///
    /// The call that brings the count to exactly `limit` still succeeds.
    pub fn check_with_info(&self, limit: u32, token: &str) -> RateLimitOutcome {
        let count = self.counters.compute_with(token, |existing| match existing {
            Some(counter) => {
                counter.count = counter.count.saturating_add(1);
                (Op::Keep, counter.count)
            }
            None => (Op::Put(Counter { count: 1 }), 1),
        });

        self.outcome(limit, count, count <= limit)
    }

    /// Same shape as `check_with_info` without counting anything.
    ///
    /// `Allowed` means the next `check_with_info` would still succeed.
    pub fn get_status(&self, token: &str, limit: u32) -> RateLimitOutcome {
        let count = self.counters.get(token).map_or(0, |c| c.count);
        self.outcome(limit, count, count < limit)
    }

    pub fn tracked_tokens(&self) -> usize {
        self.counters.len()
    }

    fn outcome(&self, limit: u32, count: u32, admitted: bool) -> RateLimitOutcome {
        let usage = WindowUsage {
            limit,
            remaining: limit.saturating_sub(count),
            reset: self.counters.now() + self.interval,
        };
        if admitted {
            RateLimitOutcome::Allowed(usage)
        } else {
            RateLimitOutcome::Denied(usage)
        }
    }
}
