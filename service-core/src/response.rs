//! Uniform JSON envelope returned by every API endpoint.
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

/// Machine-readable failure category carried in `errorCode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    NotFound,
    AlreadyExists,
    AlreadyVerified,
    InvalidEmail,
    #[serde(rename = "_2FaEnabled")]
    TwoFactorEnabled,
    #[serde(rename = "_2FaDisabled")]
    TwoFactorDisabled,
    Unauthorized,
    Forbidden,
    AlreadyLoggedIn,
    InvalidFacebookLink,
    InvalidYoutubeLink,
    InvalidInstagramLink,
    BadRequest,
    TooManyRequests,
    ServerError,
}

impl ErrorCode {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::AlreadyExists
            | ErrorCode::AlreadyVerified
            | ErrorCode::TwoFactorEnabled
            | ErrorCode::TwoFactorDisabled
            | ErrorCode::AlreadyLoggedIn => StatusCode::CONFLICT,
            ErrorCode::InvalidEmail
            | ErrorCode::InvalidFacebookLink
            | ErrorCode::InvalidYoutubeLink
            | ErrorCode::InvalidInstagramLink
            | ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// `{ data, success, message, errorCode }`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    pub success: bool,
    pub message: String,
    pub error_code: Option<ErrorCode>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T, message: impl Into<String>) -> Self {
        Self {
            data: Some(data),
            success: true,
            message: message.into(),
            error_code: None,
        }
    }

    pub fn failure(error_code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            data: None,
            success: false,
            message: message.into(),
            error_code: Some(error_code),
        }
    }
}

impl ApiResponse<()> {
    /// Successful envelope with `data: null`.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            data: None,
            success: true,
            message: message.into(),
            error_code: None,
        }
    }
}
