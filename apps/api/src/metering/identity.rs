//! Works out who a request is metered against.
//!
//! Authentication happens upstream: the front-door proxy verifies the session and
//! forwards the user id in `x-user-id`. Requests without it are anonymous and are
//! keyed by client IP. These headers carry no proof of origin, so the outermost proxy
//! must be the only writer of them, or both the user id and the anonymous allotment
//! can be spoofed.

use axum::http::HeaderMap;
use uuid::Uuid;

use crate::errors::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// IP headers in the order they are trusted.
const IP_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "cf-connecting-ip"];

/// Key used when no IP header is present. Every such caller shares one allotment.
pub const ANONYMOUS_SENTINEL: &str = "anonymous";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Authenticated { user_id: Uuid },
    Anonymous { ip: String },
}

impl Caller {
    /// Token the limiters count against.
    pub fn token(&self) -> String {
        match self {
            Caller::Authenticated { user_id } => user_id.to_string(),
            Caller::Anonymous { ip } => ip.clone(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Caller::Authenticated { .. })
    }
}

pub fn resolve_caller(headers: &HeaderMap) -> Result<Caller, AppError> {
    match header_str(headers, USER_ID_HEADER) {
        Some(raw) => {
            let user_id = Uuid::parse_str(raw).map_err(|_| AppError::Unauthorized)?;
            Ok(Caller::Authenticated { user_id })
        }
        None => Ok(Caller::Anonymous {
            ip: client_ip(headers),
        }),
    }
}

/// Client IP from request headers, first match wins.
///
/// For `x-forwarded-for` only the first (client-most) hop is used.
pub fn client_ip(headers: &HeaderMap) -> String {
    IP_HEADERS
        .iter()
        .filter_map(|name| header_str(headers, name))
        .filter_map(|value| value.split(',').next())
        .map(str::trim)
        .find(|ip| !ip.is_empty())
        .map(String::from)
        .unwrap_or_else(|| ANONYMOUS_SENTINEL.to_string())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
