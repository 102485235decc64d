//! # Broker Errors
//!
//! Every broker or auth failure is classified here; no raw transport error
//! escapes the broker client.
//!
//! | Response | Class |
//! |---|---|
//! | transport failure, 5xx, 408, 429, 401 | Transient |
//! | 422 `ConcurrentOperationInProgress` | Transient |
//! | 404, 410 | NotFound |
//! | 409 | Conflict |
//! | other 4xx | Permanent |

use super::http::HttpResponse;
use super::responses::ErrorResponse;

/// Broker error code reported while another operation holds the resource
const CONCURRENT_OPERATION_IN_PROGRESS: &str = "ConcurrentOperationInProgress";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// Retried with backoff; never surfaced as a terminal condition
    #[error("transient broker error: {0}")]
    Transient(String),
    /// Validation-class rejection; surfaced as a Failed condition
    #[error("broker rejected the request: {0}")]
    Permanent(String),
    #[error("broker resource not found: {0}")]
    NotFound(String),
    #[error("broker reported a conflict: {0}")]
    Conflict(String),
}

/// Classification of an HTTP status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Permanent,
    NotFound,
    Conflict,
}

/// Classify a non-success status code and the broker's error code
pub fn classify(status: u16, error_code: Option<&str>) -> ErrorClass {
    match status {
        401 | 408 | 429 | 500..=599 => ErrorClass::Transient,
        404 | 410 => ErrorClass::NotFound,
        409 => ErrorClass::Conflict,
        422 if error_code == Some(CONCURRENT_OPERATION_IN_PROGRESS) => ErrorClass::Transient,
        400..=499 => ErrorClass::Permanent,
        // Unexpected informational/redirect statuses cannot be trusted as final
        _ => ErrorClass::Transient,
    }
}

impl BrokerError {
    /// Build a classified error from a non-success broker response
    pub fn from_response(operation: &str, response: &HttpResponse) -> Self {
        let body: ErrorResponse = serde_json::from_slice(&response.body).unwrap_or_default();
        let detail = body
            .description
            .clone()
            .or_else(|| body.error.clone())
            .unwrap_or_else(|| String::from_utf8_lossy(&response.body).trim().to_string());
        let message = if detail.is_empty() {
            format!("{operation}: HTTP {}", response.status)
        } else {
            format!("{operation}: HTTP {}: {detail}", response.status)
        };

        match classify(response.status, body.error.as_deref()) {
            ErrorClass::Transient => Self::Transient(message),
            ErrorClass::Permanent => Self::Permanent(message),
            ErrorClass::NotFound => Self::NotFound(message),
            ErrorClass::Conflict => Self::Conflict(message),
        }
    }

    /// Metric label for the outcome
    pub fn label(&self) -> &'static str {
        match self {
            Self::Transient(_) => "transient",
            Self::Permanent(_) => "permanent",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
        }
    }

    /// Human-readable detail for conditions
    pub fn detail(&self) -> &str {
        match self {
            Self::Transient(m) | Self::Permanent(m) | Self::NotFound(m) | Self::Conflict(m) => m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_transient_statuses() {
        for status in [401, 408, 429, 500, 502, 503, 504] {
            assert_eq!(classify(status, None), ErrorClass::Transient, "status {status}");
        }
    }

    #[test]
    fn test_classify_not_found_and_conflict() {
        assert_eq!(classify(404, None), ErrorClass::NotFound);
        assert_eq!(classify(410, None), ErrorClass::NotFound);
        assert_eq!(classify(409, Some("Conflict")), ErrorClass::Conflict);
    }

    #[test]
    fn test_classify_concurrent_operation_is_transient() {
        assert_eq!(
            classify(422, Some("ConcurrentOperationInProgress")),
            ErrorClass::Transient
        );
        assert_eq!(classify(422, Some("UnprocessableEntity")), ErrorClass::Permanent);
    }

    #[test]
    fn test_classify_other_client_errors_are_permanent() {
        assert_eq!(classify(400, None), ErrorClass::Permanent);
        assert_eq!(classify(403, None), ErrorClass::Permanent);
    }

    #[test]
    fn test_from_response_uses_description() {
        let response = HttpResponse::new(400).with_json(&serde_json::json!({
            "error": "BadRequest",
            "description": "plan 'huge' does not exist"
        }));
        let err = BrokerError::from_response("create_instance", &response);
        assert_eq!(
            err,
            BrokerError::Permanent(
                "create_instance: HTTP 400: plan 'huge' does not exist".to_string()
            )
        );
    }

    #[test]
    fn test_from_response_without_body() {
        let err = BrokerError::from_response("poll_operation", &HttpResponse::new(503));
        assert_eq!(err, BrokerError::Transient("poll_operation: HTTP 503".to_string()));
        assert_eq!(err.label(), "transient");
    }
}
