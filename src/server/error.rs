use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::app::{AcquireError, ErrorCategory, ScoutError};

/// Seconds a client is asked to wait after a capacity rejection.
pub const RETRY_AFTER_SECS: u64 = 5;

/// Error returned by HTTP handlers.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    /// A failure while serving `context`, e.g. "Failed to retrieve URL".
    Scout { context: String, source: ScoutError },
}

impl ApiError {
    pub fn scout(context: impl Into<String>, source: ScoutError) -> Self {
        ApiError::Scout {
            context: context.into(),
            source,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Scout { source, .. } => match source {
                ScoutError::TargetNotFound(_) => StatusCode::NOT_FOUND,
                _ => status_for(source.category()),
            },
        }
    }
}

pub fn status_for(category: ErrorCategory) -> StatusCode {
    match category {
        ErrorCategory::Capacity => StatusCode::TOO_MANY_REQUESTS,
        ErrorCategory::Blocked => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCategory::Transport | ErrorCategory::Parse => StatusCode::BAD_GATEWAY,
        ErrorCategory::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorCategory::Request => StatusCode::BAD_REQUEST,
        ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match self {
            ApiError::BadRequest(message) | ApiError::NotFound(message) => {
                json!({ "error": message })
            }
            ApiError::Scout { context, source } => {
                let category = source.category();
                error!(category = category.as_str(), error = %source, "{}", context);
                json!({
                    "error": context,
                    "category": category,
                    "details": source.to_string(),
                })
            }
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::TOO_MANY_REQUESTS {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(RETRY_AFTER_SECS),
            );
        }
        response
    }
}

impl From<AcquireError> for ApiError {
    fn from(err: AcquireError) -> Self {
        ApiError::scout("Failed to retrieve URL", err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_by_category() {
        assert_eq!(status_for(ErrorCategory::Capacity), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(status_for(ErrorCategory::Blocked), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(ErrorCategory::Transport), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(ErrorCategory::Timeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_for(ErrorCategory::Parse), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(ErrorCategory::Request), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(ErrorCategory::Internal),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_capacity_sets_retry_after() {
        let response = ApiError::from(AcquireError::CapacityExceeded { max: 2 }).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "5");
    }

    #[test]
    fn test_invalid_url_is_a_bad_request() {
        let err = url::Url::parse("nope").unwrap_err();
        let api = ApiError::scout("Failed to retrieve URL", err.into());
        assert_eq!(api.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_harvest_failure_has_a_named_category() {
        let api = ApiError::scout(
            "Failed to extract events",
            ScoutError::Config("Invalid selector '[unclosed'".into()),
        );
        let response = api.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["category"], "internal");
        assert!(json["details"].as_str().unwrap().contains("Invalid selector"));
    }

    #[test]
    fn test_unknown_target_is_not_found() {
        let api = ApiError::scout("Unknown target", ScoutError::TargetNotFound("nope".into()));
        assert_eq!(api.status(), StatusCode::NOT_FOUND);
    }
}
