use service_core::error::AppError;
use service_core::response::ErrorCode;
use thiserror::Error;

use crate::models::ValidationReport;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Email error: {0}")]
    EmailError(String),

    #[error("Email already registered")]
    EmailAlreadyRegistered,

    #[error("{}", .0.message)]
    Rejected(ValidationReport),
}

impl ServiceError {
    pub fn rejected(code: ErrorCode, message: impl Into<String>) -> Self {
        ServiceError::Rejected(ValidationReport::rejected(code, message))
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            ServiceError::Rejected(report) => report.error_code.unwrap_or(ErrorCode::BadRequest),
            ServiceError::EmailAlreadyRegistered => ErrorCode::AlreadyExists,
            _ => ErrorCode::ServerError,
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => AppError::DatabaseError(anyhow::anyhow!(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::EmailError(e) => AppError::EmailError(e),
            ServiceError::EmailAlreadyRegistered => {
                AppError::rejected(ErrorCode::AlreadyExists, "User already exists")
            }
            ServiceError::Rejected(report) => AppError::rejected(
                report.error_code.unwrap_or(ErrorCode::BadRequest),
                report.message,
            ),
        }
    }
}

impl From<AppError> for ServiceError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::EmailError(e) => ServiceError::EmailError(e),
            other => ServiceError::Internal(anyhow::anyhow!(other.to_string())),
        }
    }
}
