//! User aggregate: identity record plus credential, two-factor and
//! linked-account value objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Role ids are stable on the wire: `1 = Admin`, `2 = User`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn id(self) -> i16 {
        match self {
            Role::Admin => 1,
            Role::User => 2,
        }
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::User),
            _ => None,
        }
    }
}

impl TryFrom<i16> for Role {
    type Error = String;

    fn try_from(id: i16) -> Result<Self, Self::Error> {
        Role::from_id(id).ok_or_else(|| format!("Unknown role id: {}", id))
    }
}

impl From<Role> for i16 {
    fn from(role: Role) -> Self {
        role.id()
    }
}

/// Social networks a user can link to their profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocialPlatform {
    Facebook,
    Youtube,
    Instagram,
}

impl SocialPlatform {
    pub fn as_str(self) -> &'static str {
        match self {
            SocialPlatform::Facebook => "facebook",
            SocialPlatform::Youtube => "youtube",
            SocialPlatform::Instagram => "instagram",
        }
    }

    /// Column holding the link in the `users` table.
    pub fn column(self) -> &'static str {
        match self {
            SocialPlatform::Facebook => "facebook_url",
            SocialPlatform::Youtube => "youtube_url",
            SocialPlatform::Instagram => "instagram_url",
        }
    }
}

impl fmt::Display for SocialPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SocialPlatform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "facebook" => Ok(SocialPlatform::Facebook),
            "youtube" => Ok(SocialPlatform::Youtube),
            "instagram" => Ok(SocialPlatform::Instagram),
            _ => Err(format!("Unknown social platform: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub password_hash: String,
    pub verification_token: String,
}

/// A pending one-time code. Only the SHA-256 digest is kept.
#[derive(Debug, Clone)]
pub struct PendingCode {
    pub code_hash: String,
    pub expires_utc: DateTime<Utc>,
    pub attempts: i32,
}

impl PendingCode {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_utc <= now
    }
}

#[derive(Debug, Clone, Default)]
pub struct TwoFactorState {
    pub enabled: bool,
    pub pending: Option<PendingCode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkedAccounts {
    pub facebook: Option<String>,
    pub youtube: Option<String>,
    pub instagram: Option<String>,
}

impl LinkedAccounts {
    pub fn get(&self, platform: SocialPlatform) -> Option<&str> {
        match platform {
            SocialPlatform::Facebook => self.facebook.as_deref(),
            SocialPlatform::Youtube => self.youtube.as_deref(),
            SocialPlatform::Instagram => self.instagram.as_deref(),
        }
    }

    pub fn set(&mut self, platform: SocialPlatform, link: Option<String>) {
        match platform {
            SocialPlatform::Facebook => self.facebook = link,
            SocialPlatform::Youtube => self.youtube = link,
            SocialPlatform::Instagram => self.instagram = link,
        }
    }
}

/// User entity.
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub enabled: bool,
    pub roles: Vec<Role>,
    pub balance: i64,
    pub credentials: Credentials,
    pub two_factor: TwoFactorState,
    pub linked_accounts: LinkedAccounts,
    pub created_utc: DateTime<Utc>,
}

impl User {
    /// Create a new, not yet verified user.
    pub fn new(email: String, password_hash: String, role: Role, verification_token: String) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            email,
            enabled: false,
            roles: vec![role],
            balance: 0,
            credentials: Credentials {
                password_hash,
                verification_token,
            },
            two_factor: TwoFactorState::default(),
            linked_accounts: LinkedAccounts::default(),
            created_utc: Utc::now(),
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// Flat row shape of `users` joined with its aggregated `user_roles`.
#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub user_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub enabled: bool,
    pub verification_token: String,
    pub two_factor_enabled: bool,
    pub two_factor_code_hash: Option<String>,
    pub two_factor_expires_utc: Option<DateTime<Utc>>,
    pub two_factor_attempts: i32,
    pub facebook_url: Option<String>,
    pub youtube_url: Option<String>,
    pub instagram_url: Option<String>,
    pub balance_credits: i64,
    pub created_utc: DateTime<Utc>,
    pub role_ids: Vec<i16>,
}

impl From<UserRecord> for User {
    fn from(r: UserRecord) -> Self {
        let pending = match (r.two_factor_code_hash, r.two_factor_expires_utc) {
            (Some(code_hash), Some(expires_utc)) => Some(PendingCode {
                code_hash,
                expires_utc,
                attempts: r.two_factor_attempts,
            }),
            _ => None,
        };

        let roles = r
            .role_ids
            .into_iter()
            .filter_map(|id| {
                let role = Role::from_id(id);
                if role.is_none() {
                    tracing::warn!(user_id = %r.user_id, role_id = id, "Ignoring unknown role id");
                }
                role
            })
            .collect();

        Self {
            user_id: r.user_id,
            email: r.email,
            enabled: r.enabled,
            roles,
            balance: r.balance_credits,
            credentials: Credentials {
                password_hash: r.password_hash,
                verification_token: r.verification_token,
            },
            two_factor: TwoFactorState {
                enabled: r.two_factor_enabled,
                pending,
            },
            linked_accounts: LinkedAccounts {
                facebook: r.facebook_url,
                youtube: r.youtube_url,
                instagram: r.instagram_url,
            },
            created_utc: r.created_utc,
        }
    }
}
