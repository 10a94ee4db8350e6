use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use studylens_utils::{ErrorResponse, StudyError};

/// Wraps a [`StudyError`] so handlers can return it directly.
#[derive(Debug)]
pub struct ApiError(pub StudyError);

impl From<StudyError> for ApiError {
    fn from(error: StudyError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(code = self.0.error_code(), "Request failed: {}", self.0);
        } else {
            tracing::debug!(code = self.0.error_code(), "Request rejected: {}", self.0);
        }

        (status, Json(ErrorResponse::from(self.0))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_maps_to_not_found() {
        let response = ApiError(StudyError::out_of_range(0, 3)).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_external_service_maps_to_bad_gateway() {
        let response = ApiError(StudyError::external_service("vlm", "timeout")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
