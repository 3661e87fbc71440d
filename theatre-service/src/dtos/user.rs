use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::models::{Role, User};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "a@x.com")]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "p")]
    pub password: String,

    /// `1 = Admin`, `2 = User`
    #[schema(value_type = i16, example = 2)]
    pub role: Role,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    #[schema(example = "a@x.com")]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "p")]
    pub password: String,
}

/// Account the second factor is presented for.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TwoFactorLoginRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    #[schema(example = "a@x.com")]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SocialLinkRequest {
    #[validate(length(min = 1, message = "Link is required"))]
    #[schema(example = "https://www.youtube.com/@globetheatre")]
    pub link: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VerifyQuery {
    #[serde(default)]
    #[param(example = "4f9c0e...")]
    pub token: String,
}

/// Public view of an account. Credentials and pending codes never leave
/// the service.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    #[schema(example = "a@x.com")]
    pub email: String,
    pub enabled: bool,
    #[schema(value_type = Vec<i16>, example = json!([2]))]
    pub roles: Vec<Role>,
    pub two_factor_enabled: bool,
    pub facebook: Option<String>,
    pub youtube: Option<String>,
    pub instagram: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.user_id,
            email: user.email.clone(),
            enabled: user.enabled,
            roles: user.roles.clone(),
            two_factor_enabled: user.two_factor.enabled,
            facebook: user.linked_accounts.facebook.clone(),
            youtube: user.linked_accounts.youtube.clone(),
            instagram: user.linked_accounts.instagram.clone(),
            created_utc: user.created_utc,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub user_id: Uuid,
    #[schema(example = 120)]
    pub balance: i64,
}
