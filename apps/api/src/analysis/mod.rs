//! Resume analysis, behind a pluggable trait.
//!
//! The scoring itself happens in a separate analysis service. This crate only decides
//! whether a request may reach it (see `metering`) and forwards the request.
//!
//! `AppState` holds an `Arc<dyn ResumeAnalyzer>`, chosen at startup.

pub mod extract;
pub mod handlers;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Analysis service returned {status}: {message}")]
    Api { status: u16, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub resume_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_description: Option<String>,
}

#[async_trait]
pub trait ResumeAnalyzer: Send + Sync {
    /// Scores one resume. The returned JSON is passed through to the client untouched.
    async fn analyze(&self, request: &AnalysisRequest) -> Result<serde_json::Value, AnalysisError>;
}

// ────────────────────────────────────────────────────────────────────────────
// HttpResumeAnalyzer
// ────────────────────────────────────────────────────────────────────────────

/// Forwards analysis requests to `{base_url}/analyze`.
#[derive(Clone)]
pub struct HttpResumeAnalyzer {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpResumeAnalyzer {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, AnalysisError> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()?,
            endpoint: format!("{}/analyze", base_url.trim_end_matches('/')),
            token,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ResumeAnalyzer for HttpResumeAnalyzer {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<serde_json::Value, AnalysisError> {
        let mut call = self.client.post(&self.endpoint).json(request);
        if let Some(token) = &self.token {
            call = call.bearer_auth(token);
        }

        let response = call.send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: serde_json::Value = response.json().await?;
        debug!("Analysis service answered {status}");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let analyzer = HttpResumeAnalyzer::new("http://analysis.internal:9000/", None).unwrap();
        assert_eq!(analyzer.endpoint(), "http://analysis.internal:9000/analyze");
    }

    #[test]
    fn test_request_omits_missing_job_description() {
        let request = AnalysisRequest {
            resume_text: "Rust engineer".to_string(),
            job_description: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("job_description").is_none());
    }

    #[test]
    fn test_request_accepts_missing_job_description() {
        let request: AnalysisRequest =
            serde_json::from_str(r#"{"resume_text": "Rust engineer"}"#).unwrap();
        assert_eq!(request.job_description, None);
    }
}
