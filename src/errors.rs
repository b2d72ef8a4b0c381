use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::linking::LinkError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("authentication required")]
    Unauthorized,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("forbidden")]
    Forbidden,

    #[error("account pending approval")]
    PendingApproval,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "unauthenticated",
                "authentication required".to_string(),
            ),
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "invalid_credentials",
                "invalid email or password".to_string(),
            ),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                "permission_error",
                "admin_required",
                "administrator access required".to_string(),
            ),
            AppError::PendingApproval => (
                StatusCode::FORBIDDEN,
                "permission_error",
                "account_pending",
                "your membership request is still awaiting approval".to_string(),
            ),
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "not_found_error",
                "not_found",
                format!("{} not found", what),
            ),
            AppError::Conflict(reason) => (
                StatusCode::CONFLICT,
                "conflict_error",
                "conflict",
                reason.clone(),
            ),
            AppError::Validation(reason) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_request_error",
                "validation_failed",
                reason.clone(),
            ),
            AppError::Link(LinkError::InvalidToken) => (
                StatusCode::BAD_REQUEST,
                "link_error",
                "invalid_token",
                "link token is not valid, request a new link".to_string(),
            ),
            AppError::Link(LinkError::ExpiredToken) => (
                StatusCode::BAD_REQUEST,
                "link_error",
                "expired_token",
                "link token has expired, request a new link".to_string(),
            ),
            AppError::Link(LinkError::AccountNotFound) => (
                StatusCode::NOT_FOUND,
                "not_found_error",
                "not_found",
                "account not found".to_string(),
            ),
            AppError::Link(e) => {
                tracing::error!("Linking error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_errors_map_to_client_errors() {
        let resp = AppError::from(LinkError::InvalidToken).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let resp = AppError::from(LinkError::ExpiredToken).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_storage_failure_is_500() {
        let err = LinkError::StorageUnavailable(anyhow::anyhow!("connection refused"));
        let resp = AppError::from(err).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::Unauthorized.into_response().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden.into_response().status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::PendingApproval.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::NotFound("request").into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Conflict("x".into()).into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Validation("x".into()).into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
