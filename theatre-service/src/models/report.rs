use service_core::response::ErrorCode;

/// Outcome of a validation pass. Never persisted.
///
/// `success` with an `error_code` is a soft failure: the request may
/// proceed but needs a further step (the second login factor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub success: bool,
    pub message: String,
    pub error_code: Option<ErrorCode>,
}

impl ValidationReport {
    pub fn passed(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error_code: None,
        }
    }

    pub fn soft_failure(error_code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error_code: Some(error_code),
        }
    }

    pub fn rejected(error_code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error_code: Some(error_code),
        }
    }

    pub fn is_soft_failure(&self) -> bool {
        self.success && self.error_code.is_some()
    }
}

/// A passed validation together with what it resolved.
#[derive(Debug, Clone)]
pub struct Validated<T> {
    pub report: ValidationReport,
    pub value: T,
}

impl<T> Validated<T> {
    pub fn new(report: ValidationReport, value: T) -> Self {
        Self { report, value }
    }

    pub fn requires_second_factor(&self) -> bool {
        self.report.error_code == Some(ErrorCode::TwoFactorEnabled)
    }
}
