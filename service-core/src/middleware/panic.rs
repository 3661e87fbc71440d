use std::any::Any;

use axum::{
    Json,
    response::{IntoResponse, Response},
};

use crate::response::{ApiResponse, ErrorCode};

/// Handler for `tower_http::catch_panic::CatchPanicLayer::custom`.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic payload"
    };
    tracing::error!(panic = %detail, "Handler panicked");

    (
        ErrorCode::ServerError.status(),
        Json(ApiResponse::<()>::failure(
            ErrorCode::ServerError,
            "Internal server error",
        )),
    )
        .into_response()
}
