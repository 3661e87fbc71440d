//! Request validation rules. Each check reads the store, decides, and either
//! resolves what the caller needs or rejects with a coded report.

use axum::http::{header, HeaderMap};
use chrono::Utc;
use service_core::response::ErrorCode;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

use crate::config::TwoFactorConfig;
use crate::models::{Role, SocialPlatform, User, Validated, ValidationReport};
use crate::services::metrics::{record_auth_event, AuthEvent};
use crate::services::{CodeCheck, JwtService, ServiceError, UserStore};
use crate::utils::{
    generate_verification_token, hash_otp, hash_password, is_valid_email, normalize_email,
    parse_social_link, validation::invalid_link_code, verify_password, Password,
    PasswordHashString,
};

/// Argon2 hash checked against when the email is unknown.
static ABSENT_USER_HASH: OnceLock<Option<PasswordHashString>> = OnceLock::new();

fn absent_user_hash() -> Option<&'static PasswordHashString> {
    ABSENT_USER_HASH
        .get_or_init(|| hash_password(&Password::new(generate_verification_token())).ok())
        .as_ref()
}

#[derive(Clone)]
pub struct UserValidationService {
    store: Arc<dyn UserStore>,
    jwt: JwtService,
    two_factor: TwoFactorConfig,
    allow_admin_registration: bool,
}

fn reject<T>(code: ErrorCode, message: impl Into<String>) -> Result<T, ServiceError> {
    Err(ServiceError::rejected(code, message))
}

/// Value of a `Bearer` authorization header, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl UserValidationService {
    pub fn new(
        store: Arc<dyn UserStore>,
        jwt: JwtService,
        two_factor: TwoFactorConfig,
        allow_admin_registration: bool,
    ) -> Self {
        Self {
            store,
            jwt,
            two_factor,
            allow_admin_registration,
        }
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        self.store.find_user_by_email(&normalize_email(email)).await
    }

    pub async fn validate_for_register(
        &self,
        email: &str,
        role: Role,
    ) -> Result<ValidationReport, ServiceError> {
        if !is_valid_email(email) {
            return reject(ErrorCode::InvalidEmail, "Invalid email address");
        }

        if role == Role::Admin && !self.allow_admin_registration {
            return reject(
                ErrorCode::Forbidden,
                "Administrator accounts cannot be self-registered",
            );
        }

        if self.user_by_email(email).await?.is_some() {
            return reject(ErrorCode::AlreadyExists, "User already exists");
        }

        Ok(ValidationReport::passed("Registration accepted"))
    }

    /// An unknown email and a wrong password are indistinguishable: both
    /// return the same rejection after one Argon2 verification.
    pub async fn validate_for_login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Validated<User>, ServiceError> {
        let password = Password::new(password.to_string());

        let Some(user) = self.user_by_email(email).await? else {
            if let Some(hash) = absent_user_hash() {
                let _ = verify_password(&password, hash);
            }
            return reject(ErrorCode::NotFound, "Invalid email or password");
        };

        let matches = verify_password(
            &password,
            &PasswordHashString::new(user.credentials.password_hash.clone()),
        )?;
        if !matches {
            return reject(ErrorCode::NotFound, "Invalid email or password");
        }

        if !user.enabled {
            return reject(
                ErrorCode::Unauthorized,
                "Account is not activated. Verify your email first",
            );
        }

        if user.two_factor.enabled {
            return Ok(Validated::new(
                ValidationReport::soft_failure(
                    ErrorCode::TwoFactorEnabled,
                    "Two-factor authentication required. A code was sent to your email",
                ),
                user,
            ));
        }

        Ok(Validated::new(ValidationReport::passed("Login successful"), user))
    }

    pub async fn verify_email_token(&self, token: &str) -> Result<Validated<User>, ServiceError> {
        let token = token.trim();
        if token.is_empty() {
            return reject(ErrorCode::NotFound, "Verification token not found");
        }

        let Some(user) = self.store.find_user_by_verification_token(token).await? else {
            return reject(ErrorCode::NotFound, "Verification token not found");
        };

        if user.enabled {
            return reject(ErrorCode::AlreadyVerified, "Email already verified");
        }

        Ok(Validated::new(ValidationReport::passed("Email verified"), user))
    }

    /// Checks the code and consumes it on success. Every failure is
    /// `Unauthorized` so callers cannot probe which step failed.
    pub async fn verify_otp(&self, email: &str, code: &str) -> Result<Validated<User>, ServiceError> {
        const MESSAGE: &str = "Invalid or expired two-factor code";

        let Some(user) = self.user_by_email(email).await? else {
            return reject(ErrorCode::Unauthorized, MESSAGE);
        };

        let outcome = self
            .store
            .consume_two_factor_code(
                user.user_id,
                &hash_otp(code),
                Utc::now(),
                self.two_factor.max_attempts,
            )
            .await?;

        match outcome {
            CodeCheck::Accepted => Ok(Validated::new(
                ValidationReport::passed("Two-factor code accepted"),
                user,
            )),
            CodeCheck::Rejected {
                attempts,
                exhausted,
            } => {
                tracing::warn!(user_id = %user.user_id, attempts, exhausted, "Rejected two-factor code");
                record_auth_event(AuthEvent::OtpRejected);
                reject(ErrorCode::Unauthorized, MESSAGE)
            }
            CodeCheck::Unavailable => reject(ErrorCode::Unauthorized, MESSAGE),
        }
    }

    pub async fn validate_for_two_factor_activation(
        &self,
        email: &str,
    ) -> Result<Validated<User>, ServiceError> {
        let user = self.existing_account(email).await?;

        if user.two_factor.enabled {
            return reject(
                ErrorCode::TwoFactorEnabled,
                "Two-factor authentication is already enabled",
            );
        }

        Ok(Validated::new(ValidationReport::passed("Two-factor authentication can be enabled"), user))
    }

    pub async fn validate_for_two_factor_deactivation(
        &self,
        email: &str,
    ) -> Result<Validated<User>, ServiceError> {
        let user = self.existing_account(email).await?;

        if !user.two_factor.enabled {
            return reject(
                ErrorCode::TwoFactorDisabled,
                "Two-factor authentication is already disabled",
            );
        }

        Ok(Validated::new(ValidationReport::passed("Two-factor authentication can be disabled"), user))
    }

    async fn existing_account(&self, email: &str) -> Result<User, ServiceError> {
        if !is_valid_email(email) {
            return reject(ErrorCode::InvalidEmail, "Invalid email address");
        }

        match self.user_by_email(email).await? {
            Some(user) => Ok(user),
            None => reject(ErrorCode::NotFound, "User not found"),
        }
    }

    /// Malformed ids are treated the same as unknown ones.
    pub async fn validate_balance(&self, user_id: &str) -> Result<Validated<User>, ServiceError> {
        let Ok(user_id) = Uuid::parse_str(user_id.trim()) else {
            return reject(ErrorCode::NotFound, "User not found");
        };

        match self.store.find_user_by_id(user_id).await? {
            Some(user) => Ok(Validated::new(
                ValidationReport::passed("Balance retrieved"),
                user,
            )),
            None => reject(ErrorCode::NotFound, "User not found"),
        }
    }

    /// Resolves the user and the normalized link.
    pub async fn validate_social_media_link(
        &self,
        email: &str,
        platform: SocialPlatform,
        link: &str,
    ) -> Result<Validated<(User, String)>, ServiceError> {
        let Some(user) = self.user_by_email(email).await? else {
            return reject(ErrorCode::NotFound, "User not found");
        };

        let Some(link) = parse_social_link(platform, link) else {
            return reject(
                invalid_link_code(platform),
                format!("Invalid {} link", platform),
            );
        };

        Ok(Validated::new(
            ValidationReport::passed(format!("{} link is valid", platform)),
            (user, link),
        ))
    }

    pub async fn validate_social_media_for_delete(
        &self,
        email: &str,
        platform: SocialPlatform,
    ) -> Result<Validated<User>, ServiceError> {
        let Some(user) = self.user_by_email(email).await? else {
            return reject(ErrorCode::NotFound, "User not found");
        };

        if user.linked_accounts.get(platform).is_none() {
            return reject(
                ErrorCode::NotFound,
                format!("No {} account is linked", platform),
            );
        }

        Ok(Validated::new(
            ValidationReport::passed(format!("{} link can be removed", platform)),
            user,
        ))
    }

    /// Rejects a login attempt made while already holding a valid session.
    /// Absent, malformed or expired tokens pass.
    pub fn validate_authorization_header(
        &self,
        headers: &HeaderMap,
    ) -> Result<ValidationReport, ServiceError> {
        if let Some(token) = bearer_token(headers) {
            if self.jwt.verify_token(token).is_some() {
                return reject(ErrorCode::AlreadyLoggedIn, "Already logged in");
            }
        }
        Ok(ValidationReport::passed("No active session"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::models::PendingCode;
    use crate::services::InMemoryUserStore;
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use chrono::{DateTime, Duration};
    use std::time::Instant;

    struct Fixture {
        store: Arc<InMemoryUserStore>,
        jwt: JwtService,
        validation: UserValidationService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryUserStore::new());
        fixture_with_store(store.clone(), store)
    }

    fn fixture_with_store(store: Arc<InMemoryUserStore>, backend: Arc<dyn UserStore>) -> Fixture {
        let jwt = JwtService::new(&JwtConfig {
            secret: "0123456789abcdef0123456789abcdef".into(),
            issuer: "theatre-service".into(),
            token_expiry_minutes: 60,
        })
        .unwrap();
        let validation = UserValidationService::new(
            backend,
            jwt.clone(),
            TwoFactorConfig {
                code_length: 6,
                code_ttl_seconds: 300,
                max_attempts: 3,
            },
            false,
        );
        Fixture {
            store,
            jwt,
            validation,
        }
    }

    async fn seed(store: &InMemoryUserStore, email: &str, password: &str, enabled: bool) -> User {
        let hash = hash_password(&Password::new(password.into())).unwrap();
        let mut user = User::new(email.into(), hash.into_string(), Role::User, format!("tok-{email}"));
        user.enabled = enabled;
        store.insert_user(&user).await.unwrap();
        user
    }

    fn code_of(err: ServiceError) -> ErrorCode {
        err.error_code()
    }

    #[tokio::test]
    async fn test_register_rules() {
        let f = fixture();
        seed(&f.store, "a@x.com", "p", false).await;

        let err = f.validation.validate_for_register("nope", Role::User).await.unwrap_err();
        assert_eq!(code_of(err), ErrorCode::InvalidEmail);

        let err = f.validation.validate_for_register("b@x.com", Role::Admin).await.unwrap_err();
        assert_eq!(code_of(err), ErrorCode::Forbidden);

        let err = f.validation.validate_for_register("A@x.com", Role::User).await.unwrap_err();
        assert_eq!(code_of(err), ErrorCode::AlreadyExists);

        assert!(f.validation.validate_for_register("b@x.com", Role::User).await.is_ok());
    }

    #[tokio::test]
    async fn test_login_rules() {
        let f = fixture();
        seed(&f.store, "off@x.com", "p", false).await;
        let on = seed(&f.store, "on@x.com", "p", true).await;

        let err = f.validation.validate_for_login("ghost@x.com", "p").await.unwrap_err();
        assert_eq!(code_of(err), ErrorCode::NotFound);

        let err = f.validation.validate_for_login("on@x.com", "wrong").await.unwrap_err();
        assert_eq!(code_of(err), ErrorCode::NotFound);

        let err = f.validation.validate_for_login("off@x.com", "p").await.unwrap_err();
        assert_eq!(code_of(err), ErrorCode::Unauthorized);

        let ok = f.validation.validate_for_login("on@x.com", "p").await.unwrap();
        assert!(!ok.requires_second_factor());

        f.store.set_two_factor_enabled(on.user_id, true).await.unwrap();
        let soft = f.validation.validate_for_login("on@x.com", "p").await.unwrap();
        assert!(soft.requires_second_factor());
        assert!(soft.report.is_soft_failure());
    }

    #[tokio::test]
    async fn test_verify_email_token_rules() {
        let f = fixture();
        let user = seed(&f.store, "a@x.com", "p", false).await;

        let err = f.validation.verify_email_token("unknown").await.unwrap_err();
        assert_eq!(code_of(err), ErrorCode::NotFound);

        assert!(f.validation.verify_email_token("tok-a@x.com").await.is_ok());

        f.store.enable_user(user.user_id).await.unwrap();
        let err = f.validation.verify_email_token("tok-a@x.com").await.unwrap_err();
        assert_eq!(code_of(err), ErrorCode::AlreadyVerified);
    }

    #[tokio::test]
    async fn test_verify_otp_limits_attempts() {
        let f = fixture();
        let user = seed(&f.store, "a@x.com", "p", true).await;
        f.store
            .store_two_factor_code(
                user.user_id,
                &PendingCode {
                    code_hash: hash_otp("111111"),
                    expires_utc: Utc::now() + Duration::minutes(5),
                    attempts: 0,
                },
            )
            .await
            .unwrap();

        for _ in 0..3 {
            let err = f.validation.verify_otp("a@x.com", "999999").await.unwrap_err();
            assert_eq!(code_of(err), ErrorCode::Unauthorized);
        }

        // The right code no longer works once attempts are exhausted.
        let err = f.validation.verify_otp("a@x.com", "111111").await.unwrap_err();
        assert_eq!(code_of(err), ErrorCode::Unauthorized);
    }

    #[tokio::test]
    async fn test_verify_otp_clears_expired_code() {
        let f = fixture();
        let user = seed(&f.store, "a@x.com", "p", true).await;
        f.store
            .store_two_factor_code(
                user.user_id,
                &PendingCode {
                    code_hash: hash_otp("111111"),
                    expires_utc: Utc::now() - Duration::seconds(1),
                    attempts: 0,
                },
            )
            .await
            .unwrap();

        assert!(f.validation.verify_otp("a@x.com", "111111").await.is_err());
        let stored = f.store.find_user_by_id(user.user_id).await.unwrap().unwrap();
        assert!(stored.two_factor.pending.is_none());
    }

    /// Delays email lookups so concurrent guesses all resolve the user
    /// before any of them reaches the code.
    struct SlowLookupStore(Arc<InMemoryUserStore>);

    #[async_trait]
    impl UserStore for SlowLookupStore {
        async fn health_check(&self) -> Result<(), ServiceError> {
            self.0.health_check().await
        }
        async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
            self.0.find_user_by_id(user_id).await
        }
        async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.0.find_user_by_email(email).await
        }
        async fn find_user_by_verification_token(
            &self,
            token: &str,
        ) -> Result<Option<User>, ServiceError> {
            self.0.find_user_by_verification_token(token).await
        }
        async fn insert_user(&self, user: &User) -> Result<(), ServiceError> {
            self.0.insert_user(user).await
        }
        async fn enable_user(&self, user_id: Uuid) -> Result<bool, ServiceError> {
            self.0.enable_user(user_id).await
        }
        async fn store_two_factor_code(
            &self,
            user_id: Uuid,
            code: &PendingCode,
        ) -> Result<(), ServiceError> {
            self.0.store_two_factor_code(user_id, code).await
        }
        async fn consume_two_factor_code(
            &self,
            user_id: Uuid,
            code_hash: &str,
            now: DateTime<Utc>,
            max_attempts: i32,
        ) -> Result<CodeCheck, ServiceError> {
            self.0
                .consume_two_factor_code(user_id, code_hash, now, max_attempts)
                .await
        }
        async fn set_two_factor_enabled(
            &self,
            user_id: Uuid,
            enabled: bool,
        ) -> Result<(), ServiceError> {
            self.0.set_two_factor_enabled(user_id, enabled).await
        }
        async fn set_social_link(
            &self,
            user_id: Uuid,
            platform: SocialPlatform,
            link: Option<&str>,
        ) -> Result<(), ServiceError> {
            self.0.set_social_link(user_id, platform, link).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_guesses_cannot_outrun_attempt_limit() {
        let store = Arc::new(InMemoryUserStore::new());
        let f = fixture_with_store(store.clone(), Arc::new(SlowLookupStore(store)));
        let user = seed(&f.store, "a@x.com", "p", true).await;
        f.store
            .store_two_factor_code(
                user.user_id,
                &PendingCode {
                    code_hash: hash_otp("111111"),
                    expires_utc: Utc::now() + Duration::minutes(5),
                    attempts: 0,
                },
            )
            .await
            .unwrap();

        let mut wrong = Vec::new();
        for guess in 0..19 {
            let validation = f.validation.clone();
            wrong.push(tokio::spawn(async move {
                validation
                    .verify_otp("a@x.com", &format!("{:06}", 200000 + guess))
                    .await
            }));
        }
        let validation = f.validation.clone();
        let right = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            validation.verify_otp("a@x.com", "111111").await
        });

        for handle in wrong {
            assert!(handle.await.unwrap().is_err());
        }
        let err = right.await.unwrap().unwrap_err();
        assert_eq!(code_of(err), ErrorCode::Unauthorized);

        let stored = f.store.find_user_by_id(user.user_id).await.unwrap().unwrap();
        assert!(stored.two_factor.pending.is_none());
    }

    #[tokio::test]
    async fn test_unknown_email_costs_a_password_verification() {
        let f = fixture();
        seed(&f.store, "a@x.com", "p", true).await;

        // Warm up the stand-in hash so the timing below covers verification only.
        let _ = f.validation.validate_for_login("ghost@x.com", "p").await;
        assert!(ABSENT_USER_HASH.get().is_some_and(Option::is_some));

        let started = Instant::now();
        let unknown = f.validation.validate_for_login("ghost@x.com", "p").await.unwrap_err();
        let unknown_elapsed = started.elapsed();

        let started = Instant::now();
        let wrong = f.validation.validate_for_login("a@x.com", "wrong").await.unwrap_err();
        let wrong_elapsed = started.elapsed();

        assert_eq!(code_of(unknown), code_of(wrong));
        assert!(
            unknown_elapsed * 10 >= wrong_elapsed,
            "unknown email took {:?}, wrong password took {:?}",
            unknown_elapsed,
            wrong_elapsed
        );
    }

    #[tokio::test]
    async fn test_two_factor_toggle_conflicts() {
        let f = fixture();
        let user = seed(&f.store, "a@x.com", "p", true).await;

        let err = f
            .validation
            .validate_for_two_factor_deactivation("a@x.com")
            .await
            .unwrap_err();
        assert_eq!(code_of(err), ErrorCode::TwoFactorDisabled);

        f.store.set_two_factor_enabled(user.user_id, true).await.unwrap();
        let err = f
            .validation
            .validate_for_two_factor_activation("a@x.com")
            .await
            .unwrap_err();
        assert_eq!(code_of(err), ErrorCode::TwoFactorEnabled);

        let err = f
            .validation
            .validate_for_two_factor_activation("not-an-email")
            .await
            .unwrap_err();
        assert_eq!(code_of(err), ErrorCode::InvalidEmail);
    }

    #[tokio::test]
    async fn test_balance_and_social_rules() {
        let f = fixture();
        let user = seed(&f.store, "a@x.com", "p", true).await;
        f.store.set_balance(user.user_id, 120);

        let balance = f.validation.validate_balance(&user.user_id.to_string()).await.unwrap();
        assert_eq!(balance.value.balance, 120);

        let err = f.validation.validate_balance("not-a-uuid").await.unwrap_err();
        assert_eq!(code_of(err), ErrorCode::NotFound);

        let err = f
            .validation
            .validate_social_media_link("a@x.com", SocialPlatform::Instagram, "https://facebook.com/x")
            .await
            .unwrap_err();
        assert_eq!(code_of(err), ErrorCode::InvalidInstagramLink);

        let err = f
            .validation
            .validate_social_media_for_delete("a@x.com", SocialPlatform::Facebook)
            .await
            .unwrap_err();
        assert_eq!(code_of(err), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_authorization_header() {
        let f = fixture();
        let user = seed(&f.store, "a@x.com", "p", true).await;
        let token = f.jwt.generate_token(&user).unwrap();

        let mut headers = HeaderMap::new();
        assert!(f.validation.validate_authorization_header(&headers).is_ok());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer garbage"));
        assert!(f.validation.validate_authorization_header(&headers).is_ok());

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token.access_token)).unwrap(),
        );
        let err = f.validation.validate_authorization_header(&headers).unwrap_err();
        assert_eq!(code_of(err), ErrorCode::AlreadyLoggedIn);
    }
}
