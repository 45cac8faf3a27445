//! 统一的 API 错误类型：领域错误到 HTTP 状态与 JSON 响应体的映射。

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::{FormRejection, JsonRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use crate::access::AccessError;
use crate::credentials::CredentialError;
use crate::storage::StorageError;
use crate::token::TokenError;
use crate::validation::FieldError;

pub const INVALID_DATA: &str = "Invalid data";
pub const BAD_CREDENTIALS: &str = "Email or password is incorrect";
pub const UNAUTHORIZED: &str = "Unauthorized";
pub const INVALID_TOKEN: &str = "Invalid Token";
pub const FILE_NOT_FOUND: &str = "File not found or access denied";
pub const LINK_REJECTED: &str = "signature invalid or expired";

#[derive(Debug)]
pub enum ApiError {
    Validation(Vec<FieldError>),
    BadRequest(String),
    Unauthorized,
    InvalidToken,
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) | ApiError::InvalidToken => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Validation(errors) => json!({ "message": INVALID_DATA, "errors": errors }),
            ApiError::Unauthorized => json!({ "message": UNAUTHORIZED }),
            ApiError::InvalidToken => json!({ "message": INVALID_TOKEN }),
            ApiError::Internal(detail) => {
                error!(detail, "request failed");
                json!({ "message": "internal error" })
            }
            ApiError::BadRequest(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg) => json!({ "message": msg }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<CredentialError> for ApiError {
    fn from(error: CredentialError) -> Self {
        match error {
            CredentialError::Validation(errors) => ApiError::Validation(errors),
            CredentialError::DuplicateKey(field) => {
                ApiError::Conflict(format!("{field} already registered"))
            }
            CredentialError::InvalidCredentials | CredentialError::NotFound => {
                ApiError::BadRequest(BAD_CREDENTIALS.into())
            }
            CredentialError::Hash(err) => ApiError::Internal(err.to_string()),
            CredentialError::Persistence(err) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(_: TokenError) -> Self {
        ApiError::InvalidToken
    }
}

impl From<AccessError> for ApiError {
    fn from(error: AccessError) -> Self {
        match error {
            AccessError::NotFoundOrDenied | AccessError::Storage(StorageError::NotFound) => {
                ApiError::NotFound(FILE_NOT_FOUND.into())
            }
            AccessError::Storage(err) => ApiError::Internal(err.to_string()),
            AccessError::Persistence(err) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::InvalidKey | StorageError::NotFound => {
                ApiError::NotFound("object not found".into())
            }
            StorageError::SignatureInvalid | StorageError::Expired => {
                ApiError::Forbidden(LINK_REJECTED.into())
            }
            StorageError::Io(err) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(error: MultipartError) -> Self {
        ApiError::BadRequest(error.body_text())
    }
}
