use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::response::ApiResponse;

use super::ApiResult;
use crate::{
    dtos::{user::BalanceResponse, Envelope},
    AppState,
};

/// Look up an account's credit balance (administrators only)
#[utoipa::path(
    get,
    path = "/user/{id}/balance",
    params(("id" = String, Path, description = "Account id")),
    responses(
        (status = 200, description = "Balance", body = Envelope),
        (status = 401, description = "Missing or invalid session", body = Envelope),
        (status = 403, description = "Caller is not an administrator", body = Envelope),
        (status = 404, description = "Unknown account", body = Envelope),
    ),
    security(("bearer_auth" = [])),
    tag = "Balance"
)]
pub async fn get_balance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<BalanceResponse> {
    let validated = state.validation.validate_balance(&id).await?;
    let user = validated.value;

    Ok((
        StatusCode::OK,
        Json(ApiResponse::success(
            BalanceResponse {
                user_id: user.user_id,
                balance: user.balance,
            },
            validated.report.message,
        )),
    ))
}
