use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use analyzer_api::analysis::{HttpResumeAnalyzer, ResumeAnalyzer};
use analyzer_api::clock::SystemClock;
use analyzer_api::config::Config;
use analyzer_api::metering::credits::{CreditLedger, InMemoryCreditLedger, PgCreditLedger};
use analyzer_api::routes::build_router;
use analyzer_api::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Analyzer API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize the credit ledger
    let ledger: Arc<dyn CreditLedger> = match &config.database_url {
        Some(url) => Arc::new(PgCreditLedger::connect(url).await?),
        None => {
            warn!(
                "DATABASE_URL not set; credits are kept in memory ({} per new user)",
                config.signup_credits
            );
            Arc::new(InMemoryCreditLedger::new(config.signup_credits))
        }
    };

    // Initialize the analysis client
    let http_analyzer = HttpResumeAnalyzer::new(
        &config.analysis_service_url,
        config.analysis_service_token.clone(),
    )?;
    info!("Analysis client initialized ({})", http_analyzer.endpoint());
    let analyzer: Arc<dyn ResumeAnalyzer> = Arc::new(http_analyzer);

    info!(
        "Analysis limit: {} per hour; parse limit: {}",
        config.analysis_limit_per_hour,
        if config.parse_rate_limit_enabled {
            format!("{} per minute", config.parse_limit_per_minute)
        } else {
            "disabled".to_string()
        }
    );

    // Build app state
    let state = AppState::new(config.clone(), ledger, analyzer, Arc::new(SystemClock));

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the web client domain is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
