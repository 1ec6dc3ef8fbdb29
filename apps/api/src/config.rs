use std::str::FromStr;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Read once at startup; nothing here changes while the server runs.
#[derive(Debug, Clone)]
pub struct Config {
    /// When unset, credits live in memory and reset on restart.
    pub database_url: Option<String>,
    /// Base URL of the analysis service that scores resumes.
    pub analysis_service_url: String,
    pub analysis_service_token: Option<String>,
    pub port: u16,
    pub rust_log: String,
    pub analysis_limit_per_hour: u32,
    pub analysis_tracked_tokens: usize,
    pub parse_rate_limit_enabled: bool,
    pub parse_limit_per_minute: u32,
    pub parse_tracked_tokens: usize,
    /// Starting balance handed out by the in-memory ledger.
    pub signup_credits: i64,
    /// Required by the anonymous-quota reset endpoint; the endpoint is closed without it.
    pub admin_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: optional_env("DATABASE_URL"),
            analysis_service_url: require_env("ANALYSIS_SERVICE_URL")?,
            analysis_service_token: optional_env("ANALYSIS_SERVICE_TOKEN"),
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            analysis_limit_per_hour: parse_env("ANALYSIS_LIMIT_PER_HOUR", 10)?,
            analysis_tracked_tokens: parse_env("ANALYSIS_TRACKED_TOKENS", 500)?,
            parse_rate_limit_enabled: parse_env("PARSE_RATE_LIMIT_ENABLED", false)?,
            parse_limit_per_minute: parse_env("PARSE_LIMIT_PER_MINUTE", 20)?,
            parse_tracked_tokens: parse_env("PARSE_TRACKED_TOKENS", 500)?,
            signup_credits: parse_env("SIGNUP_CREDITS", 5)?,
            admin_token: optional_env("ADMIN_TOKEN"),
        })
    }

    /// Defaults with no database and no admin token.
    pub fn local(analysis_service_url: impl Into<String>) -> Self {
        Config {
            database_url: None,
            analysis_service_url: analysis_service_url.into(),
            analysis_service_token: None,
            port: 8080,
            rust_log: "info".to_string(),
            analysis_limit_per_hour: 10,
            analysis_tracked_tokens: 500,
            parse_rate_limit_enabled: false,
            parse_limit_per_minute: 20,
            parse_tracked_tokens: 500,
            signup_credits: 5,
            admin_token: None,
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: '{raw}'")),
        None => Ok(default),
    }
}
