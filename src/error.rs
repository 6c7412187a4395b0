use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No response: connect failure, timeout, connectivity lost.
    Network,
    /// Non-success HTTP status other than 429.
    Http,
    RateLimited,
    /// Dropped by the caller; never shown to the user.
    Cancelled,
    /// Response body could not be decoded at all.
    Malformed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Network => "network",
            ErrorKind::Http => "http",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Malformed => "malformed",
        };
        f.write_str(label)
    }
}

/// Error envelope handed to the UI: message, optional status, RFC 3339
/// timestamp and the endpoint that failed.
#[derive(Clone, Debug, Error, PartialEq, Serialize)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            timestamp: now_rfc3339(),
            endpoint: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Maps an HTTP status to `Http` or `RateLimited`.
    pub fn from_status(status: u16, endpoint: &str) -> Self {
        let kind = if status == 429 {
            ErrorKind::RateLimited
        } else {
            ErrorKind::Http
        };
        let reason = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or("");
        let message = if reason.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status} {reason}")
        };
        Self::new(kind, message)
            .with_status(status)
            .with_endpoint(endpoint)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "Request cancelled")
    }

    pub fn connection_lost() -> Self {
        Self::new(
            ErrorKind::Network,
            "Connection lost. Flight data updates paused.",
        )
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind == ErrorKind::RateLimited
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::{ApiError, ErrorKind};

    #[test]
    fn status_maps_to_kind() {
        let limited = ApiError::from_status(429, "/api/v1/etex/flights");
        assert_eq!(limited.kind, ErrorKind::RateLimited);
        assert_eq!(limited.status, Some(429));
        assert_eq!(limited.endpoint.as_deref(), Some("/api/v1/etex/flights"));
        assert!(limited.message.contains("429"));

        let server = ApiError::from_status(503, "/api/v1/status");
        assert_eq!(server.kind, ErrorKind::Http);
        assert!(!server.is_rate_limited());
    }

    #[test]
    fn envelope_serializes_without_empty_fields() {
        let err = ApiError::connection_lost();
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "network");
        assert!(json.get("status").is_none());
        assert!(json.get("endpoint").is_none());
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
        assert_eq!(err.to_string(), "Connection lost. Flight data updates paused.");
    }
}
