use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{PendingCode, SocialPlatform, User};
use crate::services::ServiceError;
use crate::utils::code_hash_matches;

/// Outcome of presenting a second-factor code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeCheck {
    /// The code matched and has been cleared.
    Accepted,
    /// Wrong code. The guess was counted; `exhausted` means the code is gone.
    Rejected { attempts: i32, exhausted: bool },
    /// No live code: none issued, expired, or out of attempts.
    Unavailable,
}

/// Durable user records. Every method is a single atomic step.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn health_check(&self) -> Result<(), ServiceError>;

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError>;

    /// Case-insensitive lookup.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError>;

    async fn find_user_by_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<User>, ServiceError>;

    /// Fails with `EmailAlreadyRegistered` if the email is taken.
    async fn insert_user(&self, user: &User) -> Result<(), ServiceError>;

    /// Returns `false` if the account was already enabled.
    async fn enable_user(&self, user_id: Uuid) -> Result<bool, ServiceError>;

    /// Replaces any pending code and resets the attempt counter.
    async fn store_two_factor_code(
        &self,
        user_id: Uuid,
        code: &PendingCode,
    ) -> Result<(), ServiceError>;

    /// Checks a guess and records its outcome in one atomic step. A match
    /// clears the code for at most one caller; a miss counts against
    /// `max_attempts` and clears the code when the limit is reached. Codes
    /// that are expired or already at the limit are cleared without being
    /// compared.
    async fn consume_two_factor_code(
        &self,
        user_id: Uuid,
        code_hash: &str,
        now: DateTime<Utc>,
        max_attempts: i32,
    ) -> Result<CodeCheck, ServiceError>;

    /// Disabling also clears any pending code.
    async fn set_two_factor_enabled(&self, user_id: Uuid, enabled: bool)
        -> Result<(), ServiceError>;

    async fn set_social_link(
        &self,
        user_id: Uuid,
        platform: SocialPlatform,
        link: Option<&str>,
    ) -> Result<(), ServiceError>;
}

/// `UserStore` backed by concurrent maps, for tests and local runs.
#[derive(Clone, Default)]
pub struct InMemoryUserStore {
    users: Arc<DashMap<Uuid, User>>,
    emails: Arc<DashMap<String, Uuid>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Adjusts a user's credit balance; balances have no HTTP write path.
    pub fn set_balance(&self, user_id: Uuid, balance: i64) -> bool {
        match self.users.get_mut(&user_id) {
            Some(mut user) => {
                user.balance = balance;
                true
            }
            None => false,
        }
    }

    fn update<F>(&self, user_id: Uuid, f: F)
    where
        F: FnOnce(&mut User),
    {
        if let Some(mut user) = self.users.get_mut(&user_id) {
            f(user.value_mut());
        }
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        Ok(self.users.get(&user_id).map(|u| u.value().clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        let user_id = self.emails.get(&email.to_lowercase()).map(|id| *id);
        Ok(user_id.and_then(|id| self.users.get(&id).map(|u| u.value().clone())))
    }

    async fn find_user_by_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<User>, ServiceError> {
        Ok(self
            .users
            .iter()
            .find(|u| u.credentials.verification_token == token)
            .map(|u| u.value().clone()))
    }

    async fn insert_user(&self, user: &User) -> Result<(), ServiceError> {
        match self.emails.entry(user.email.to_lowercase()) {
            Entry::Occupied(_) => Err(ServiceError::EmailAlreadyRegistered),
            Entry::Vacant(slot) => {
                self.users.insert(user.user_id, user.clone());
                slot.insert(user.user_id);
                Ok(())
            }
        }
    }

    async fn enable_user(&self, user_id: Uuid) -> Result<bool, ServiceError> {
        Ok(match self.users.get_mut(&user_id) {
            Some(mut user) if !user.enabled => {
                user.enabled = true;
                true
            }
            _ => false,
        })
    }

    async fn store_two_factor_code(
        &self,
        user_id: Uuid,
        code: &PendingCode,
    ) -> Result<(), ServiceError> {
        self.update(user_id, |user| {
            user.two_factor.pending = Some(PendingCode {
                attempts: 0,
                ..code.clone()
            });
        });
        Ok(())
    }

    async fn consume_two_factor_code(
        &self,
        user_id: Uuid,
        code_hash: &str,
        now: DateTime<Utc>,
        max_attempts: i32,
    ) -> Result<CodeCheck, ServiceError> {
        // The entry guard is held until the outcome is written back.
        let Some(mut user) = self.users.get_mut(&user_id) else {
            return Ok(CodeCheck::Unavailable);
        };
        let two_factor = &mut user.two_factor;

        let Some(pending) = two_factor.pending.as_mut() else {
            return Ok(CodeCheck::Unavailable);
        };
        if pending.is_expired_at(now) || pending.attempts >= max_attempts {
            two_factor.pending = None;
            return Ok(CodeCheck::Unavailable);
        }

        if code_hash_matches(&pending.code_hash, code_hash) {
            two_factor.pending = None;
            return Ok(CodeCheck::Accepted);
        }

        pending.attempts += 1;
        let attempts = pending.attempts;
        let exhausted = attempts >= max_attempts;
        if exhausted {
            two_factor.pending = None;
        }
        Ok(CodeCheck::Rejected {
            attempts,
            exhausted,
        })
    }

    async fn set_two_factor_enabled(
        &self,
        user_id: Uuid,
        enabled: bool,
    ) -> Result<(), ServiceError> {
        self.update(user_id, |user| {
            user.two_factor.enabled = enabled;
            if !enabled {
                user.two_factor.pending = None;
            }
        });
        Ok(())
    }

    async fn set_social_link(
        &self,
        user_id: Uuid,
        platform: SocialPlatform,
        link: Option<&str>,
    ) -> Result<(), ServiceError> {
        self.update(user_id, |user| {
            user.linked_accounts.set(platform, link.map(str::to_string));
        });
        Ok(())
    }
}
