use axum::{
    extract::{Path, State},
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
        user::{SocialLinkRequest, UserSummary},
        Envelope,
    },
    middleware::AuthUser,
    models::SocialPlatform,
    utils::ValidatedJson,
    AppState,
};

fn platform_from_path(platform: &str) -> Result<SocialPlatform, AppError> {
    platform
        .parse()
        .map_err(|_| AppError::rejected(ErrorCode::NotFound, "Unknown social platform"))
}

/// Link or replace a social profile
#[utoipa::path(
    put,
    path = "/user/@/{platform}",
    params(("platform" = String, Path, description = "facebook, youtube or instagram")),
    request_body = SocialLinkRequest,
    responses(
        (status = 200, description = "Profile updated", body = Envelope),
        (status = 400, description = "Link does not belong to the platform", body = Envelope),
        (status = 401, description = "Missing or invalid session", body = Envelope),
        (status = 404, description = "Unknown platform or account", body = Envelope),
    ),
    security(("bearer_auth" = [])),
    tag = "Social"
)]
pub async fn link_social_account(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(platform): Path<String>,
    ValidatedJson(req): ValidatedJson<SocialLinkRequest>,
) -> ApiResult<UserSummary> {
    let platform = platform_from_path(&platform)?;
    let validated = state
        .validation
        .validate_social_media_link(&claims.email, platform, &req.link)
        .await?;
    let (user, link) = &validated.value;

    let updated = match platform {
        SocialPlatform::Facebook => state.users.update_facebook(user, link).await?,
        SocialPlatform::Youtube => state.users.update_youtube(user, link).await?,
        SocialPlatform::Instagram => state.users.update_instagram(user, link).await?,
    };

    Ok((
        StatusCode::OK,
        Json(ApiResponse::success(
            UserSummary::from(&updated),
            format!("{} link saved", platform),
        )),
    ))
}

/// Remove a linked social profile
#[utoipa::path(
    delete,
    path = "/user/@/{platform}",
    params(("platform" = String, Path, description = "facebook, youtube or instagram")),
    responses(
        (status = 200, description = "Profile updated", body = Envelope),
        (status = 401, description = "Missing or invalid session", body = Envelope),
        (status = 404, description = "Unknown platform, account or no link", body = Envelope),
    ),
    security(("bearer_auth" = [])),
    tag = "Social"
)]
pub async fn unlink_social_account(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(platform): Path<String>,
) -> ApiResult<UserSummary> {
    let platform = platform_from_path(&platform)?;
    let validated = state
        .validation
        .validate_social_media_for_delete(&claims.email, platform)
        .await?;

    let updated = state
        .users
        .remove_social_media(&validated.value, platform)
        .await?;

    Ok((
        StatusCode::OK,
        Json(ApiResponse::success(
            UserSummary::from(&updated),
            format!("{} link removed", platform),
        )),
    ))
}
