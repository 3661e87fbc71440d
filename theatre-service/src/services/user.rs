//! Account mutations. Callers validate first; nothing here re-checks rules.

use chrono::{Duration, Utc};
use service_core::response::ErrorCode;
use std::sync::Arc;

use crate::config::TwoFactorConfig;
use crate::models::{PendingCode, Role, SocialPlatform, User};
use crate::services::metrics::{record_auth_event, AuthEvent};
use crate::services::{EmailProvider, JwtService, ServiceError, TokenResponse, UserStore};
use crate::utils::{
    generate_otp, generate_verification_token, hash_otp, hash_password, normalize_email, Password,
};

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    email: Arc<dyn EmailProvider>,
    jwt: JwtService,
    two_factor: TwoFactorConfig,
    public_base_url: String,
}

impl UserService {
    pub fn new(
        store: Arc<dyn UserStore>,
        email: Arc<dyn EmailProvider>,
        jwt: JwtService,
        two_factor: TwoFactorConfig,
        public_base_url: String,
    ) -> Self {
        Self {
            store,
            email,
            jwt,
            two_factor,
            public_base_url,
        }
    }

    /// Persists a disabled account and mails its verification link. A mail
    /// failure is logged; the account stays registered.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<User, ServiceError> {
        let password_hash = hash_password(&Password::new(password.to_string()))?;
        let user = User::new(
            normalize_email(email),
            password_hash.into_string(),
            role,
            generate_verification_token(),
        );

        match self.store.insert_user(&user).await {
            Ok(()) => {}
            Err(ServiceError::EmailAlreadyRegistered) => {
                return Err(ServiceError::rejected(
                    ErrorCode::AlreadyExists,
                    "User already exists",
                ));
            }
            Err(e) => return Err(e),
        }

        tracing::info!(user_id = %user.user_id, role = ?role, "User registered");
        record_auth_event(AuthEvent::Registered);

        if let Err(e) = self
            .email
            .send_verification_email(
                &user.email,
                &user.credentials.verification_token,
                &self.public_base_url,
            )
            .await
        {
            tracing::error!(user_id = %user.user_id, error = %e, "Failed to send verification email");
        }

        Ok(user)
    }

    /// Returns `false` if a concurrent request enabled the account first.
    pub async fn enable_account(&self, user: &User) -> Result<bool, ServiceError> {
        let changed = self.store.enable_user(user.user_id).await?;
        if changed {
            tracing::info!(user_id = %user.user_id, "Email verified, account enabled");
            record_auth_event(AuthEvent::Verified);
        }
        Ok(changed)
    }

    pub fn generate_otp(&self) -> String {
        generate_otp(self.two_factor.code_length)
    }

    pub async fn save_two_factor_code(&self, user: &User, code: &str) -> Result<(), ServiceError> {
        let expires_utc = Duration::try_seconds(self.two_factor.code_ttl_seconds)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| ServiceError::Internal(anyhow::anyhow!("Code lifetime out of range")))?;
        let pending = PendingCode {
            code_hash: hash_otp(code),
            expires_utc,
            attempts: 0,
        };
        self.store.store_two_factor_code(user.user_id, &pending).await
    }

    /// Generates, stores and mails a fresh login code.
    pub async fn issue_two_factor_code(&self, user: &User) -> Result<(), ServiceError> {
        let code = self.generate_otp();
        self.save_two_factor_code(user, &code).await?;

        let valid_for_minutes = (self.two_factor.code_ttl_seconds + 59) / 60;
        self.email
            .send_two_factor_code(&user.email, &code, valid_for_minutes)
            .await?;

        tracing::info!(user_id = %user.user_id, "Two-factor code issued");
        record_auth_event(AuthEvent::LoginChallenge);
        Ok(())
    }

    pub async fn activate_two_factor_authentication(&self, user: &User) -> Result<(), ServiceError> {
        self.store.set_two_factor_enabled(user.user_id, true).await?;
        tracing::info!(user_id = %user.user_id, "Two-factor authentication enabled");
        record_auth_event(AuthEvent::TwoFactorEnabled);
        Ok(())
    }

    pub async fn deactivate_two_factor_authentication(
        &self,
        user: &User,
    ) -> Result<(), ServiceError> {
        self.store.set_two_factor_enabled(user.user_id, false).await?;
        tracing::info!(user_id = %user.user_id, "Two-factor authentication disabled");
        record_auth_event(AuthEvent::TwoFactorDisabled);
        Ok(())
    }

    pub fn generate_token(&self, user: &User) -> Result<TokenResponse, ServiceError> {
        Ok(self.jwt.generate_token(user)?)
    }

    pub async fn update_facebook(&self, user: &User, link: &str) -> Result<User, ServiceError> {
        self.link_social_media(user, SocialPlatform::Facebook, link).await
    }

    pub async fn update_youtube(&self, user: &User, link: &str) -> Result<User, ServiceError> {
        self.link_social_media(user, SocialPlatform::Youtube, link).await
    }

    pub async fn update_instagram(&self, user: &User, link: &str) -> Result<User, ServiceError> {
        self.link_social_media(user, SocialPlatform::Instagram, link).await
    }

    pub async fn link_social_media(
        &self,
        user: &User,
        platform: SocialPlatform,
        link: &str,
    ) -> Result<User, ServiceError> {
        self.store
            .set_social_link(user.user_id, platform, Some(link))
            .await?;
        tracing::info!(user_id = %user.user_id, platform = %platform, "Social link updated");

        let mut updated = user.clone();
        updated.linked_accounts.set(platform, Some(link.to_string()));
        Ok(updated)
    }

    pub async fn remove_social_media(
        &self,
        user: &User,
        platform: SocialPlatform,
    ) -> Result<User, ServiceError> {
        self.store.set_social_link(user.user_id, platform, None).await?;
        tracing::info!(user_id = %user.user_id, platform = %platform, "Social link removed");

        let mut updated = user.clone();
        updated.linked_accounts.set(platform, None);
        Ok(updated)
    }
}
