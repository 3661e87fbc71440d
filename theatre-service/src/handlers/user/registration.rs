use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use service_core::{
    error::AppError,
    response::{ApiResponse, ErrorCode},
};

use super::ApiResult;
use crate::{
    dtos::{
        user::{RegisterRequest, UserSummary, VerifyQuery},
        Envelope,
    },
    utils::ValidatedJson,
    AppState,
};

/// Register a new account
///
/// The account starts disabled; a verification link is mailed to the
/// address.
#[utoipa::path(
    post,
    path = "/user/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = Envelope),
        (status = 400, description = "Invalid email or body", body = Envelope),
        (status = 403, description = "Role cannot be self-registered", body = Envelope),
        (status = 409, description = "Email already registered", body = Envelope),
        (status = 429, description = "Too many attempts", body = Envelope),
    ),
    tag = "Registration"
)]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> ApiResult<UserSummary> {
    state
        .validation
        .validate_for_register(&req.email, req.role)
        .await?;

    let user = state
        .users
        .register(&req.email, &req.password, req.role)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            UserSummary::from(&user),
            "Registration successful. Check your email to verify your account",
        )),
    ))
}

/// Verify an email address
#[utoipa::path(
    get,
    path = "/user/verify",
    params(VerifyQuery),
    responses(
        (status = 200, description = "Account enabled", body = Envelope),
        (status = 404, description = "Unknown token", body = Envelope),
        (status = 409, description = "Already verified", body = Envelope),
    ),
    tag = "Registration"
)]
pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> ApiResult<()> {
    let validated = state.validation.verify_email_token(&query.token).await?;

    if !state.users.enable_account(&validated.value).await? {
        return Err(AppError::rejected(
            ErrorCode::AlreadyVerified,
            "Email already verified",
        ));
    }

    Ok((
        StatusCode::OK,
        Json(ApiResponse::message("Email verified. You can now log in")),
    ))
}
