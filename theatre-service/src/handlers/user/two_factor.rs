use axum::{extract::State, http::StatusCode, Json};
use service_core::response::ApiResponse;

use super::ApiResult;
use crate::{dtos::Envelope, middleware::AuthUser, AppState};

/// Turn on two-factor authentication for the caller
#[utoipa::path(
    post,
    path = "/user/enable2fa",
    responses(
        (status = 200, description = "Enabled", body = Envelope),
        (status = 401, description = "Missing or invalid session", body = Envelope),
        (status = 404, description = "Account no longer exists", body = Envelope),
        (status = 409, description = "Already enabled", body = Envelope),
    ),
    security(("bearer_auth" = [])),
    tag = "Two-Factor"
)]
pub async fn enable_two_factor(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> ApiResult<()> {
    let validated = state
        .validation
        .validate_for_two_factor_activation(&claims.email)
        .await?;

    state
        .users
        .activate_two_factor_authentication(&validated.value)
        .await?;

    Ok((
        StatusCode::OK,
        Json(ApiResponse::message("Two-factor authentication enabled")),
    ))
}

/// Turn off two-factor authentication for the caller
#[utoipa::path(
    post,
    path = "/user/disable2fa",
    responses(
        (status = 200, description = "Disabled", body = Envelope),
        (status = 401, description = "Missing or invalid session", body = Envelope),
        (status = 404, description = "Account no longer exists", body = Envelope),
        (status = 409, description = "Already disabled", body = Envelope),
    ),
    security(("bearer_auth" = [])),
    tag = "Two-Factor"
)]
pub async fn disable_two_factor(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> ApiResult<()> {
    let validated = state
        .validation
        .validate_for_two_factor_deactivation(&claims.email)
        .await?;

    state
        .users
        .deactivate_two_factor_authentication(&validated.value)
        .await?;

    Ok((
        StatusCode::OK,
        Json(ApiResponse::message("Two-factor authentication disabled")),
    ))
}
