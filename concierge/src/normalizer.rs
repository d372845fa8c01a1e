/// Result normalization
/// Shapes an `Outcome` into the response envelope every caller boundary
/// (HTTP, CLI) returns, and picks the HTTP status for it.

use axum::http::StatusCode;
use travel_protocol::ConciergeResponse;

use crate::error::ErrorKind;
use crate::outcome::Outcome;

pub fn normalize(outcome: &Outcome) -> ConciergeResponse {
    match outcome {
        Outcome::Success(payload) => ConciergeResponse::success(payload.clone()),
        Outcome::NeedsClarification {
            message,
            missing_fields,
        } => ConciergeResponse::clarification(message.clone(), missing_fields.clone()),
        Outcome::Failure { kind, .. } => ConciergeResponse::error(kind.as_str(), kind.public_message()),
    }
}

/// Clarifications are valid answers (200). 5xx is reserved for our own
/// misconfiguration and for upstream faults we could not classify further.
pub fn http_status(outcome: &Outcome) -> StatusCode {
    match outcome {
        Outcome::Success(_) | Outcome::NeedsClarification { .. } => StatusCode::OK,
        Outcome::Failure { kind, .. } => match kind {
            ErrorKind::IncompleteInput => StatusCode::OK,
            ErrorKind::UnroutableRequest | ErrorKind::UpstreamValidationError => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::UpstreamNotFound => StatusCode::NOT_FOUND,
            ErrorKind::UpstreamRateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Cancelled => StatusCode::REQUEST_TIMEOUT,
            ErrorKind::UpstreamAuthError | ErrorKind::UpstreamPermissionError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ErrorKind::UpstreamServerError | ErrorKind::UpstreamUnknown => StatusCode::BAD_GATEWAY,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use travel_protocol::ResponseStatus;

    #[test]
    fn test_success_passes_payload_through() {
        let payload = json!([{"name": "Hotel Adlon", "rating": 4.7, "price": "$410", "amenities": []}]);
        let response = normalize(&Outcome::Success(payload.clone()));

        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.data, Some(payload));
        assert!(response.error_kind.is_none());
    }

    #[test]
    fn test_clarification_carries_field_list() {
        let outcome = Outcome::clarification(vec!["check_out_date".to_string(), "adults".to_string()]);
        let response = normalize(&outcome);

        assert_eq!(response.status, ResponseStatus::NeedsClarification);
        assert_eq!(
            response.missing_fields,
            Some(vec!["check_out_date".to_string(), "adults".to_string()])
        );
        let message = response.message.unwrap();
        assert!(message.contains("check_out_date, adults"));
        assert_eq!(http_status(&outcome), StatusCode::OK);
    }

    #[test]
    fn test_failure_hides_internal_message() {
        let outcome = Outcome::failure(
            ErrorKind::UpstreamAuthError,
            "serpapi returned 401 Unauthorized: {\"error\":\"Invalid API key. sk-live-123\"}",
        );
        let response = normalize(&outcome);

        assert_eq!(response.status, ResponseStatus::Error);
        assert_eq!(response.error_kind.as_deref(), Some("upstream_auth_error"));
        assert!(!response.message.unwrap().contains("sk-live-123"));
    }

    #[test]
    fn test_status_codes() {
        let status = |kind| http_status(&Outcome::failure(kind, "x"));

        assert_eq!(status(ErrorKind::UnroutableRequest), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status(ErrorKind::UpstreamRateLimited), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(status(ErrorKind::UpstreamNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status(ErrorKind::UpstreamServerError), StatusCode::BAD_GATEWAY);
        assert_eq!(status(ErrorKind::UpstreamAuthError), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status(ErrorKind::Cancelled), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(http_status(&Outcome::Success(json!([]))), StatusCode::OK);
    }
}
