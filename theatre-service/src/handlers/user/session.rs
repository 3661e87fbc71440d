use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use service_core::response::{ApiResponse, ErrorCode};

use super::ApiResult;
use crate::{
    dtos::{
        user::{LoginRequest, TwoFactorLoginRequest},
        Envelope,
    },
    services::{
        metrics::{record_auth_event, AuthEvent},
        TokenResponse,
    },
    utils::ValidatedJson,
    AppState,
};

/// Log in with email and password
///
/// With two-factor authentication enabled no token is returned: a code is
/// mailed and the response is a `_2FaEnabled` conflict.
#[utoipa::path(
    post,
    path = "/user/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued", body = Envelope),
        (status = 401, description = "Account not activated", body = Envelope),
        (status = 404, description = "Invalid email or password", body = Envelope),
        (status = 409, description = "Already logged in, or second factor required", body = Envelope),
        (status = 429, description = "Too many attempts", body = Envelope),
    ),
    tag = "Session"
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> ApiResult<TokenResponse> {
    state.validation.validate_authorization_header(&headers)?;

    let validated = state
        .validation
        .validate_for_login(&req.email, &req.password)
        .await?;
    let user = &validated.value;

    if validated.requires_second_factor() {
        state.users.issue_two_factor_code(user).await?;
        return Ok((
            StatusCode::CONFLICT,
            Json(ApiResponse::failure(
                ErrorCode::TwoFactorEnabled,
                validated.report.message.clone(),
            )),
        ));
    }

    let token = state.users.generate_token(user)?;
    tracing::info!(user_id = %user.user_id, "User logged in");
    record_auth_event(AuthEvent::Login);

    Ok((
        StatusCode::OK,
        Json(ApiResponse::success(token, validated.report.message)),
    ))
}

/// Complete a two-factor login with the mailed code
#[utoipa::path(
    post,
    path = "/user/login/2fa/{code}",
    params(("code" = String, Path, description = "One-time code from the email")),
    request_body = TwoFactorLoginRequest,
    responses(
        (status = 200, description = "Session issued", body = Envelope),
        (status = 401, description = "Invalid, expired or used code", body = Envelope),
        (status = 409, description = "Already logged in", body = Envelope),
        (status = 429, description = "Too many attempts", body = Envelope),
    ),
    tag = "Session"
)]
pub async fn login_two_factor(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<TwoFactorLoginRequest>,
) -> ApiResult<TokenResponse> {
    state.validation.validate_authorization_header(&headers)?;

    let validated = state.validation.verify_otp(&req.email, &code).await?;
    let token = state.users.generate_token(&validated.value)?;

    tracing::info!(user_id = %validated.value.user_id, "User logged in with second factor");
    record_auth_event(AuthEvent::LoginSecondFactor);

    Ok((
        StatusCode::OK,
        Json(ApiResponse::success(token, "Login successful")),
    ))
}
