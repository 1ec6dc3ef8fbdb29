//! Gate in front of the analysis service.
//!
//! `admit` runs before the expensive model call and rejects the request early when the
//! caller is out of allowance. `settle` runs once the analysis has succeeded and charges
//! for it. An `Admission` is consumed by `settle`, so one analysis is charged at most once.
//!
//! Limiter counters are taken at admission and never handed back, even when the analysis
//! later fails or the client goes away.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::errors::AppError;
use crate::metering::anonymous::{AnonymousDecision, AnonymousQuota};
use crate::metering::credits::CreditLedger;
use crate::metering::identity::Caller;
use crate::metering::reconcile::CreditMode;
use crate::metering::window::{FixedWindowLimiter, RateLimitOutcome, WindowUsage};

/// Permission to run one analysis.
#[derive(Debug)]
#[must_use = "an admission must be settled once the analysis succeeds"]
pub enum Admission {
    Authenticated { user_id: Uuid, window: WindowUsage },
    Anonymous {
        ip: String,
        remaining: u32,
        reset_at: DateTime<Utc>,
    },
}

/// What the client should reconcile its local balance to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreditReceipt {
    pub mode: CreditMode,
    pub credits_remaining: i64,
    pub reset_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageReport {
    pub mode: CreditMode,
    pub credits_remaining: i64,
    pub reset_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<WindowUsage>,
}

pub struct MeteringGate {
    analysis_limiter: Arc<FixedWindowLimiter>,
    analysis_limit: u32,
    anonymous: Arc<AnonymousQuota>,
    ledger: Arc<dyn CreditLedger>,
    clock: Arc<dyn Clock>,
}

impl MeteringGate {
    pub fn new(
        analysis_limiter: Arc<FixedWindowLimiter>,
        analysis_limit: u32,
        anonymous: Arc<AnonymousQuota>,
        ledger: Arc<dyn CreditLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            analysis_limiter,
            analysis_limit,
            anonymous,
            ledger,
            clock,
        }
    }

    pub fn anonymous_quota(&self) -> &AnonymousQuota {
        &self.anonymous
    }

    pub async fn admit(&self, caller: &Caller) -> Result<Admission, AppError> {
        match caller {
            Caller::Authenticated { user_id } => {
                let balance = self.ledger.balance(*user_id).await?;
                if balance <= 0 {
                    warn!("User {user_id} has no credits remaining");
                    return Err(AppError::InsufficientCredits);
                }

                match self
                    .analysis_limiter
                    .check_with_info(self.analysis_limit, &user_id.to_string())
                {
                    RateLimitOutcome::Allowed(window) => {
                        debug!(
                            "Admitted user {user_id} ({} of {} left this window)",
                            window.remaining, window.limit
                        );
                        Ok(Admission::Authenticated {
                            user_id: *user_id,
                            window,
                        })
                    }
                    RateLimitOutcome::Denied(window) => {
                        warn!("User {user_id} hit the analysis rate limit");
                        Err(AppError::RateLimited {
                            retry_after_secs: self.clock.seconds_until(window.reset),
                            usage: window,
                        })
                    }
                }
            }
            Caller::Anonymous { ip } => match self.anonymous.check_anonymous_user(ip) {
                AnonymousDecision::Allowed {
                    remaining,
                    reset_at,
                } => {
                    debug!("Admitted anonymous caller {ip} ({remaining} free analyses left)");
                    Ok(Admission::Anonymous {
                        ip: ip.clone(),
                        remaining,
                        reset_at,
                    })
                }
                AnonymousDecision::Denied {
                    message, reset_at, ..
                } => Err(AppError::QuotaExhausted {
                    message,
                    reset_at,
                    retry_after_secs: self.clock.seconds_until(reset_at),
                }),
            },
        }
    }

    /// Charges for a completed analysis.
    pub async fn settle(&self, admission: Admission) -> Result<CreditReceipt, AppError> {
        match admission {
            Admission::Authenticated { user_id, window } => {
                let credits_remaining = self
                    .ledger
                    .consume_one(user_id)
                    .await?
                    .ok_or(AppError::InsufficientCredits)?;
                debug!("Charged user {user_id}, {credits_remaining} credits left");
                Ok(CreditReceipt {
                    mode: CreditMode::Authenticated,
                    credits_remaining,
                    reset_at: Some(window.reset),
                })
            }
            // The anonymous allotment was consumed at admission.
            Admission::Anonymous {
                remaining,
                reset_at,
                ..
            } => Ok(CreditReceipt {
                mode: CreditMode::Anonymous,
                credits_remaining: i64::from(remaining),
                reset_at: Some(reset_at),
            }),
        }
    }

    /// Read-only allowance for display.
    pub async fn usage(&self, caller: &Caller) -> Result<UsageReport, AppError> {
        match caller {
            Caller::Authenticated { user_id } => {
                let credits_remaining = self.ledger.balance(*user_id).await?;
                let window = self
                    .analysis_limiter
                    .get_status(&user_id.to_string(), self.analysis_limit)
                    .into_usage();
                Ok(UsageReport {
                    mode: CreditMode::Authenticated,
                    credits_remaining,
                    reset_at: None,
                    rate_limit: Some(window),
                })
            }
            Caller::Anonymous { ip } => {
                let status = self.anonymous.get_anonymous_status(ip);
                Ok(UsageReport {
                    mode: CreditMode::Anonymous,
                    credits_remaining: i64::from(status.remaining),
                    reset_at: status.reset_at,
                    rate_limit: None,
                })
            }
        }
    }
}
