//! Mapping workspace errors onto HTTP responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use strata_core::StrataError;

/// Handler error wrapping a [`StrataError`]
#[derive(Debug)]
pub struct ApiError(pub StrataError);

impl From<StrataError> for ApiError {
    fn from(err: StrataError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            StrataError::NotFound(_) => StatusCode::NOT_FOUND,
            StrataError::AlreadyExists(_)
            | StrataError::Conflict(_)
            | StrataError::DirtyState(_)
            | StrataError::ProjectMismatch { .. } => StatusCode::CONFLICT,
            StrataError::InvalidName(_)
            | StrataError::InvalidPath { .. }
            | StrataError::Encode(_)
            | StrataError::Decode(_) => StatusCode::BAD_REQUEST,
            StrataError::Secrets(_) => StatusCode::UNPROCESSABLE_ENTITY,
            StrataError::Cancelled(_) => StatusCode::SERVICE_UNAVAILABLE,
            StrataError::Command { .. } => StatusCode::BAD_GATEWAY,
            StrataError::Io(_) | StrataError::Config(_) | StrataError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, status = status.as_u16(), "request rejected");
        }

        (
            status,
            Json(serde_json::json!({
                "success": false,
                "error": self.0.to_string()
            })),
        )
            .into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (StrataError::not_found("stack 'x'"), StatusCode::NOT_FOUND),
            (StrataError::conflict("updating"), StatusCode::CONFLICT),
            (StrataError::dirty_state("dirty"), StatusCode::CONFLICT),
            (StrataError::decode("bad"), StatusCode::BAD_REQUEST),
            (StrataError::invalid_path("a.b", "oops"), StatusCode::BAD_REQUEST),
            (
                StrataError::Command {
                    exit_code: 1,
                    stderr: "boom".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (StrataError::config("broken"), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }
}
