//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pipeline::PipelineError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Pipeline error.
    Pipeline(PipelineError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Pipeline(err) => pipeline_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn pipeline_error_to_response(err: PipelineError) -> (StatusCode, String) {
    let status = match &err {
        PipelineError::InvalidIntent(_) => StatusCode::BAD_REQUEST,
        PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
        PipelineError::DuplicateOrder(_) | PipelineError::InvalidTransition { .. } => {
            StatusCode::CONFLICT
        }
        PipelineError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        PipelineError::Store(_) | PipelineError::Serialization(_) | PipelineError::Interrupted(_) => {
            tracing::error!(error = %err, "pipeline error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError::Pipeline(err)
    }
}

#[cfg(test)]
mod tests {
    use common::{CustomerId, OrderId};

    use super::*;

    fn status_of(err: PipelineError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_bad_request() {
        let response = ApiError::BadRequest("customer_id must not be empty".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_pipeline_errors_map_to_status_codes() {
        assert_eq!(
            status_of(PipelineError::InvalidIntent("no items".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(PipelineError::NotFound(OrderId::new("O1"))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(PipelineError::DuplicateOrder(OrderId::new("O1"))),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(PipelineError::RateLimited(CustomerId::new("C1"))),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_of(PipelineError::Interrupted(OrderId::new("O1"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
