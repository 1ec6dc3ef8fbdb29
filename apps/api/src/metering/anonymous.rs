//! Free allotment for callers who are not signed in.
//!
//! Each client IP gets `ANONYMOUS_MAX_ANALYSES` operations per `ANONYMOUS_RESET_PERIOD`,
//! counted from its first use. Unlike the fixed-window limiter this is an absolute cap:
//! once exhausted, the IP stays denied until the period since first use has elapsed.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::metering::cache::{BoundedTtlCache, Op};

pub const ANONYMOUS_MAX_ANALYSES: u32 = 3;
pub const ANONYMOUS_MAX_TRACKED_IPS: usize = 10_000;

pub const ANONYMOUS_RESET_PERIOD: Duration = Duration::hours(24);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QuotaEntry {
    count: u32,
    first_used_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnonymousDecision {
    Allowed {
        remaining: u32,
        reset_at: DateTime<Utc>,
    },
    Denied {
        remaining: u32,
        reset_at: DateTime<Utc>,
        message: String,
    },
}

impl AnonymousDecision {
    pub fn allowed(&self) -> bool {
        matches!(self, AnonymousDecision::Allowed { .. })
    }

    pub fn remaining(&self) -> u32 {
        match self {
            AnonymousDecision::Allowed { remaining, .. }
            | AnonymousDecision::Denied { remaining, .. } => *remaining,
        }
    }

    pub fn reset_at(&self) -> DateTime<Utc> {
        match self {
            AnonymousDecision::Allowed { reset_at, .. }
            | AnonymousDecision::Denied { reset_at, .. } => *reset_at,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            AnonymousDecision::Denied { message, .. } => Some(message),
            AnonymousDecision::Allowed { .. } => None,
        }
    }
}

/// Read-only view for display. `reset_at` is `None` while the IP has no live entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnonymousStatus {
    pub remaining: u32,
    pub reset_at: Option<DateTime<Utc>>,
}

pub struct AnonymousQuota {
    entries: BoundedTtlCache<QuotaEntry>,
    max_analyses: u32,
    reset_period: Duration,
}

impl AnonymousQuota {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_policy(
            ANONYMOUS_MAX_ANALYSES,
            ANONYMOUS_RESET_PERIOD,
            ANONYMOUS_MAX_TRACKED_IPS,
            clock,
        )
    }

    pub fn with_policy(
        max_analyses: u32,
        reset_period: Duration,
        max_tracked_ips: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            entries: BoundedTtlCache::new(max_tracked_ips, reset_period, clock),
            max_analyses,
            reset_period,
        }
    }

    /// Consumes one operation for `ip` if the allotment allows it.
    pub fn check_anonymous_user(&self, ip: &str) -> AnonymousDecision {
        let now = self.entries.now();
        let max = self.max_analyses;
        let period = self.reset_period;

        let decision = self.entries.compute_with(ip, |existing| {
            let fresh = QuotaEntry {
                count: 1,
                first_used_at: now,
            };

            let entry = match existing {
                Some(entry) if now - entry.first_used_at <= period => *entry,
                _ => {
                    let decision = AnonymousDecision::Allowed {
                        remaining: max.saturating_sub(1),
                        reset_at: now + period,
                    };
                    return (Op::Put(fresh), decision);
                }
            };

            let reset_at = entry.first_used_at + period;
            if entry.count >= max {
                let decision = AnonymousDecision::Denied {
                    remaining: 0,
                    reset_at,
                    message: exhausted_message(max, reset_at - now),
                };
                return (Op::Keep, decision);
            }

            let updated = QuotaEntry {
                count: entry.count + 1,
                ..entry
            };
            let decision = AnonymousDecision::Allowed {
                remaining: max - updated.count,
                reset_at,
            };
            (Op::Put(updated), decision)
        });

        if !decision.allowed() {
            warn!("Anonymous allotment exhausted for {ip}");
        }
        decision
    }

    pub fn get_anonymous_status(&self, ip: &str) -> AnonymousStatus {
        let now = self.entries.now();
        match self.entries.get(ip) {
            Some(entry) if now - entry.first_used_at <= self.reset_period => AnonymousStatus {
                remaining: self.max_analyses.saturating_sub(entry.count),
                reset_at: Some(entry.first_used_at + self.reset_period),
            },
            _ => AnonymousStatus {
                remaining: self.max_analyses,
                reset_at: None,
            },
        }
    }

    /// Forgets everything recorded for `ip`.
    pub fn reset(&self, ip: &str) {
        if self.entries.remove(ip).is_some() {
            info!("Anonymous allotment reset for {ip}");
        }
    }

    pub fn tracked_ips(&self) -> usize {
        self.entries.len()
    }
}

fn exhausted_message(max: u32, until_reset: Duration) -> String {
    let hours = hours_until(until_reset);
    let unit = if hours == 1 { "hour" } else { "hours" };
    format!(
        "You've used all {max} free analyses. Sign in to get more credits, or try again in {hours} {unit}."
    )
}

/// Whole hours, rounded up, never less than one.
fn hours_until(remaining: Duration) -> i64 {
    let secs = remaining.num_seconds().max(0);
    ((secs + 3599) / 3600).max(1)
}
