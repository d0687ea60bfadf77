// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::service::ServiceError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub error_code: &'static str,
}

/// Error body returned by every endpoint.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub error_code: String,
}

impl ApiError {
    pub fn new(status: StatusCode, error_code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            error_code,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_input", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "missing_requester", message)
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let (status, error_code) = match &err {
            ServiceError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ServiceError::AccessDenied => (StatusCode::FORBIDDEN, "access_denied"),
            ServiceError::Decryption => (StatusCode::UNPROCESSABLE_ENTITY, "decryption_failed"),
            ServiceError::Integrity(_) => (StatusCode::INTERNAL_SERVER_ERROR, "integrity_error"),
            ServiceError::OracleUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "ledger_unavailable")
            }
            ServiceError::NoData(_) => (StatusCode::CONFLICT, "no_data"),
            ServiceError::AlreadyExists(_) => (StatusCode::CONFLICT, "already_exists"),
            ServiceError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            ServiceError::UploadFailed { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "upload_failed")
            }
            ServiceError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
        };

        if status.is_server_error() {
            tracing::error!(error = %err, error_code, "Request failed");
        }

        // Internal details stay in the log.
        let message = match &err {
            ServiceError::Integrity(_) => "stored data failed an integrity check".to_string(),
            ServiceError::Storage(_) => "internal storage error".to_string(),
            ServiceError::OracleUnavailable(_) => {
                "ledger unavailable, try again later".to_string()
            }
            _ => err.to_string(),
        };

        Self::new(status, error_code, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.error_code.to_string(),
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::UploadStep;
    use axum::body::to_bytes;

    #[test]
    fn service_errors_map_to_status() {
        let cases = [
            (ServiceError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ServiceError::AccessDenied, StatusCode::FORBIDDEN),
            (ServiceError::Decryption, StatusCode::UNPROCESSABLE_ENTITY),
            (ServiceError::Integrity("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (ServiceError::OracleUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (ServiceError::NoData("x".into()), StatusCode::CONFLICT),
            (ServiceError::AlreadyExists("x".into()), StatusCode::CONFLICT),
            (ServiceError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (
                ServiceError::UploadFailed {
                    step: UploadStep::Store,
                    reason: "x".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ServiceError::Storage("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn non_ledger_address_is_bad_request() {
        let oracle = crate::ledger::OracleError::InvalidAddress("'alice'".into());
        let err = ApiError::from(ServiceError::from(oracle));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code, "invalid_input");
    }

    #[test]
    fn broken_and_denied_are_distinguishable() {
        let denied = ApiError::from(ServiceError::AccessDenied);
        let broken = ApiError::from(ServiceError::Decryption);
        assert_eq!(denied.error_code, "access_denied");
        assert_eq!(broken.error_code, "decryption_failed");
    }

    #[test]
    fn internal_details_are_hidden() {
        let err = ApiError::from(ServiceError::Storage("/data/index.redb: EIO".into()));
        assert!(!err.message.contains("index.redb"));
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data","error_code":"invalid_input"}"#);
    }
}
