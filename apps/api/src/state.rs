use std::sync::Arc;

use crate::analysis::ResumeAnalyzer;
use crate::clock::Clock;
use crate::config::Config;
use crate::metering::anonymous::AnonymousQuota;
use crate::metering::credits::CreditLedger;
use crate::metering::gate::MeteringGate;
use crate::metering::window::{FixedWindowLimiter, WindowConfig};

/// Shared application state injected into all route handlers via Axum extractors.
///
/// Each limiter is built once in `main` (or per test) and handed in here; nothing is a
/// process-wide global.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub gate: Arc<MeteringGate>,
    /// Present only when `PARSE_RATE_LIMIT_ENABLED` is set.
    pub parse_limiter: Option<Arc<FixedWindowLimiter>>,
    /// Pluggable analysis backend. Default: HttpResumeAnalyzer.
    pub analyzer: Arc<dyn ResumeAnalyzer>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Builds the limiters from `config` and wires them to the given collaborators.
    pub fn new(
        config: Config,
        ledger: Arc<dyn CreditLedger>,
        analyzer: Arc<dyn ResumeAnalyzer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let analysis_limiter = Arc::new(FixedWindowLimiter::new(
            WindowConfig::hourly(config.analysis_tracked_tokens),
            clock.clone(),
        ));
        let anonymous = Arc::new(AnonymousQuota::new(clock.clone()));
        let gate = Arc::new(MeteringGate::new(
            analysis_limiter,
            config.analysis_limit_per_hour,
            anonymous,
            ledger,
            clock.clone(),
        ));

        let parse_limiter = config.parse_rate_limit_enabled.then(|| {
            Arc::new(FixedWindowLimiter::new(
                WindowConfig::per_minute(config.parse_tracked_tokens),
                clock.clone(),
            ))
        });

        Self {
            config,
            gate,
            parse_limiter,
            analyzer,
            clock,
        }
    }
}
