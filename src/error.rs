use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;

use crate::providers::ProviderError;
use crate::recommend::RecommendError;
use crate::routing::RouteError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error(transparent)]
    Recommend(#[from] RecommendError),
}

/// Failure envelope shared by every endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub error: Option<Value>,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, String, Option<Value>) {
        match self {
            ApiError::Route(RouteError::MissingCoordinates) => (
                StatusCode::BAD_REQUEST,
                "Origin and destination coordinates are required".to_string(),
                None,
            ),
            ApiError::Route(RouteError::InvalidCoordinate(e)) => {
                (StatusCode::BAD_REQUEST, e.to_string(), None)
            }
            ApiError::Route(RouteError::Upstream { transport, source }) => (
                upstream_status(source),
                format!("Unable to load the {} route", transport.as_str().to_lowercase()),
                Some(source.diagnostic()),
            ),
            ApiError::Route(RouteError::Interrupted(reason)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Route lookup was interrupted".to_string(),
                Some(Value::String(reason.clone())),
            ),
            ApiError::Recommend(RecommendError::InvalidQuery(reason)) => {
                (StatusCode::BAD_REQUEST, reason.clone(), None)
            }
            ApiError::Recommend(RecommendError::Upstream(source)) => (
                upstream_status(source),
                "Unable to load place recommendations".to_string(),
                Some(source.diagnostic()),
            ),
        }
    }
}

fn upstream_status(source: &ProviderError) -> StatusCode {
    if source.is_timeout() {
        StatusCode::GATEWAY_TIMEOUT
    } else {
        StatusCode::BAD_GATEWAY
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, error) = self.parts();
        if status.is_server_error() {
            tracing::error!("{}: {}", message, self);
        }

        let body = ErrorBody {
            success: false,
            message,
            error,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geokey::TransportType;
    use std::time::Duration;

    #[test]
    fn test_validation_errors_are_client_errors() {
        let (status, _, error) = ApiError::from(RouteError::MissingCoordinates).parts();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(error.is_none());

        let (status, message, _) =
            ApiError::from(RecommendError::InvalidQuery("keyword is required".to_string())).parts();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message, "keyword is required");
    }

    #[test]
    fn test_upstream_errors_carry_diagnostics() {
        let err = ApiError::from(RouteError::Upstream {
            transport: TransportType::Transit,
            source: ProviderError::Status {
                status: 500,
                body: serde_json::json!({"result": {"status": 11}}),
            },
        });
        let (status, message, error) = err.parts();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(message, "Unable to load the transit route");
        assert_eq!(error.unwrap()["body"]["result"]["status"], 11);
    }

    #[test]
    fn test_timeouts_map_to_gateway_timeout() {
        let err = ApiError::from(RecommendError::Upstream(ProviderError::Timeout(
            Duration::from_secs(10),
        )));
        assert_eq!(err.parts().0, StatusCode::GATEWAY_TIMEOUT);
    }
}
