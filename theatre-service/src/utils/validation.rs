use axum::{
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use service_core::error::AppError;
use service_core::response::ErrorCode;
use url::Url;
use validator::{Validate, ValidateEmail};

use crate::models::SocialPlatform;

/// JSON body that has passed its `validator` rules. Rejections are
/// rendered as `BadRequest` envelopes.
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Json parse error: {}", e.body_text())))?;

        value.validate()?;

        Ok(ValidatedJson(value))
    }
}

/// Emails are compared case-insensitively and stored lowercase.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    !email.is_empty() && email.validate_email()
}

fn allowed_hosts(platform: SocialPlatform) -> &'static [&'static str] {
    match platform {
        SocialPlatform::Facebook => &["facebook.com", "www.facebook.com", "m.facebook.com", "fb.com", "www.fb.com"],
        SocialPlatform::Youtube => &["youtube.com", "www.youtube.com", "m.youtube.com", "youtu.be"],
        SocialPlatform::Instagram => &["instagram.com", "www.instagram.com"],
    }
}

pub fn invalid_link_code(platform: SocialPlatform) -> ErrorCode {
    match platform {
        SocialPlatform::Facebook => ErrorCode::InvalidFacebookLink,
        SocialPlatform::Youtube => ErrorCode::InvalidYoutubeLink,
        SocialPlatform::Instagram => ErrorCode::InvalidInstagramLink,
    }
}

/// Checks that `link` is an http(s) URL on the platform's host that points
/// at a profile path, and returns its normalized form.
pub fn parse_social_link(platform: SocialPlatform, link: &str) -> Option<String> {
    let url = Url::parse(link.trim()).ok()?;

    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let host = url.host_str()?.to_lowercase();
    if !allowed_hosts(platform).contains(&host.as_str()) {
        return None;
    }

    if url.path().trim_matches('/').is_empty() {
        return None;
    }

    Some(url.to_string())
}
