use axum::{extract::State, http::StatusCode, Json};
use service_core::{
    error::AppError,
    response::{ApiResponse, ErrorCode},
};

use super::ApiResult;
use crate::{
    dtos::{user::UserSummary, Envelope},
    middleware::AuthUser,
    AppState,
};

/// The caller's own profile, including linked social accounts
#[utoipa::path(
    get,
    path = "/user/@",
    responses(
        (status = 200, description = "Profile", body = Envelope),
        (status = 401, description = "Missing or invalid session", body = Envelope),
        (status = 404, description = "Account no longer exists", body = Envelope),
    ),
    security(("bearer_auth" = [])),
    tag = "Social"
)]
pub async fn current_user(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> ApiResult<UserSummary> {
    let not_found = || AppError::rejected(ErrorCode::NotFound, "User not found");

    let user_id = claims.user_id().ok_or_else(not_found)?;
    let user = state
        .store
        .find_user_by_id(user_id)
        .await?
        .ok_or_else(not_found)?;

    Ok((
        StatusCode::OK,
        Json(ApiResponse::success(UserSummary::from(&user), "Profile retrieved")),
    ))
}
