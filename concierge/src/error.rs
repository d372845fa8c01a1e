/// Error taxonomy for the concierge
/// Every outbound failure is classified into an `ErrorKind` where it happens
/// (search client, LLM client); everything downstream branches on the kind,
/// never on transport status codes.

use std::fmt;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest slice of an upstream body kept in an error message
const MAX_BODY_IN_MESSAGE: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No capability matched the request
    UnroutableRequest,
    /// Required fields missing; surfaces as a clarification, never as a failure
    IncompleteInput,
    UpstreamAuthError,
    UpstreamPermissionError,
    UpstreamNotFound,
    UpstreamValidationError,
    UpstreamRateLimited,
    UpstreamServerError,
    UpstreamUnknown,
    Cancelled,
}

impl ErrorKind {
    /// Transient kinds, retried by the executor
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::UpstreamRateLimited | ErrorKind::UpstreamServerError | ErrorKind::UpstreamUnknown
        )
    }

    /// Stable wire code
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::UnroutableRequest => "unroutable_request",
            ErrorKind::IncompleteInput => "incomplete_input",
            ErrorKind::UpstreamAuthError => "upstream_auth_error",
            ErrorKind::UpstreamPermissionError => "upstream_permission_error",
            ErrorKind::UpstreamNotFound => "upstream_not_found",
            ErrorKind::UpstreamValidationError => "upstream_validation_error",
            ErrorKind::UpstreamRateLimited => "upstream_rate_limited",
            ErrorKind::UpstreamServerError => "upstream_server_error",
            ErrorKind::UpstreamUnknown => "upstream_unknown",
            ErrorKind::Cancelled => "cancelled",
        }
    }

    /// Generic user-facing text for the kind. Upstream bodies never end up here.
    pub fn public_message(self) -> &'static str {
        match self {
            ErrorKind::UnroutableRequest => {
                "Sorry, I can only help with hotel and flight searches. Could you rephrase your request?"
            }
            ErrorKind::IncompleteInput => "Some required information is missing.",
            ErrorKind::UpstreamAuthError => "The travel search service rejected our credentials.",
            ErrorKind::UpstreamPermissionError => "The travel search service refused this request.",
            ErrorKind::UpstreamNotFound => "No results were found for this request.",
            ErrorKind::UpstreamValidationError => {
                "The travel search service could not process the provided details."
            }
            ErrorKind::UpstreamRateLimited => {
                "The travel search service is busy right now. Please try again shortly."
            }
            ErrorKind::UpstreamServerError => "The travel search service is unavailable right now.",
            ErrorKind::UpstreamUnknown => "Something went wrong while contacting the travel search service.",
            ErrorKind::Cancelled => "The request was cancelled before it could complete.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure of a single outbound call.
/// `message` may carry upstream detail and is meant for logs only.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct UpstreamError {
    pub kind: ErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl UpstreamError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    /// Build from a non-2xx response status and its body
    pub fn from_status(service: &str, status: StatusCode, body: &str) -> Self {
        let message = if body.is_empty() {
            format!("{} returned {}", service, status)
        } else if body.len() > MAX_BODY_IN_MESSAGE {
            let cut = (0..=MAX_BODY_IN_MESSAGE)
                .rev()
                .find(|i| body.is_char_boundary(*i))
                .unwrap_or(0);
            format!("{} returned {}: {}...", service, status, &body[..cut])
        } else {
            format!("{} returned {}: {}", service, status, body)
        };

        Self {
            kind: classify_status(status),
            status: Some(status.as_u16()),
            message,
        }
    }

    /// Build from a reqwest transport or decode failure.
    /// The request URL is stripped; query strings may carry API keys.
    pub fn transport(service: &str, err: reqwest::Error) -> Self {
        let kind = classify_transport(&err);
        let status = err.status().map(|s| s.as_u16());
        let err = err.without_url();

        let mut message = format!("{} request failed: {}", service, err);
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            message.push_str(&format!(": {}", cause));
            source = std::error::Error::source(cause);
        }

        Self { kind, status, message }
    }

    pub fn cancelled(label: &str) -> Self {
        Self::new(ErrorKind::Cancelled, format!("{} cancelled", label))
    }
}

/// Map an HTTP status to an error kind
pub fn classify_status(status: StatusCode) -> ErrorKind {
    match status.as_u16() {
        400 | 422 => ErrorKind::UpstreamValidationError,
        401 => ErrorKind::UpstreamAuthError,
        403 => ErrorKind::UpstreamPermissionError,
        404 => ErrorKind::UpstreamNotFound,
        429 => ErrorKind::UpstreamRateLimited,
        500..=599 => ErrorKind::UpstreamServerError,
        _ => ErrorKind::UpstreamUnknown,
    }
}

/// Map a transport failure to an error kind.
/// Timeouts, connection failures and undecodable bodies are all transient.
pub fn classify_transport(err: &reqwest::Error) -> ErrorKind {
    match err.status() {
        Some(status) => classify_status(status),
        None => ErrorKind::UpstreamUnknown,
    }
}

/// Rejected capability registrations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("capability `{0}` is already registered")]
    DuplicateCapability(String),

    #[error("handler `{handler}` is already bound to capability `{existing}`, cannot bind it to `{duplicate}`")]
    OverlappingHandler {
        handler: String,
        existing: String,
        duplicate: String,
    },

    #[error("capability `{capability}` declares field `{field}` more than once")]
    DuplicateField { capability: String, field: String },

    #[error("capability `{0}` declares no required fields")]
    EmptyRequiredFields(String),
}

/// Startup configuration failures. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(String),

    #[error("invalid value `{value}` for {var}: {reason}")]
    Invalid {
        var: String,
        value: String,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED), ErrorKind::UpstreamAuthError);
        assert_eq!(classify_status(StatusCode::FORBIDDEN), ErrorKind::UpstreamPermissionError);
        assert_eq!(classify_status(StatusCode::NOT_FOUND), ErrorKind::UpstreamNotFound);
        assert_eq!(classify_status(StatusCode::BAD_REQUEST), ErrorKind::UpstreamValidationError);
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), ErrorKind::UpstreamRateLimited);
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY), ErrorKind::UpstreamServerError);
        assert_eq!(classify_status(StatusCode::IM_A_TEAPOT), ErrorKind::UpstreamUnknown);
    }

    #[test]
    fn test_retryable_kinds() {
        let retryable: Vec<ErrorKind> = [
            ErrorKind::UnroutableRequest,
            ErrorKind::IncompleteInput,
            ErrorKind::UpstreamAuthError,
            ErrorKind::UpstreamPermissionError,
            ErrorKind::UpstreamNotFound,
            ErrorKind::UpstreamValidationError,
            ErrorKind::UpstreamRateLimited,
            ErrorKind::UpstreamServerError,
            ErrorKind::UpstreamUnknown,
            ErrorKind::Cancelled,
        ]
        .into_iter()
        .filter(|k| k.is_retryable())
        .collect();

        assert_eq!(
            retryable,
            vec![
                ErrorKind::UpstreamRateLimited,
                ErrorKind::UpstreamServerError,
                ErrorKind::UpstreamUnknown
            ]
        );
    }

    #[test]
    fn test_long_body_is_truncated() {
        let body = "x".repeat(1000);
        let err = UpstreamError::from_status("serpapi", StatusCode::INTERNAL_SERVER_ERROR, &body);
        assert_eq!(err.kind, ErrorKind::UpstreamServerError);
        assert_eq!(err.status, Some(500));
        assert!(err.message.len() < 300);
        assert!(err.message.ends_with("..."));
    }

    #[test]
    fn test_public_message_does_not_leak_detail() {
        let err = UpstreamError::from_status("serpapi", StatusCode::UNAUTHORIZED, "Invalid API key: sk-123");
        assert!(!err.kind.public_message().contains("sk-123"));
    }
}
