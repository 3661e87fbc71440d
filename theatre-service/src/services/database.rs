//! PostgreSQL implementation of the user store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::models::{PendingCode, SocialPlatform, User, UserRecord};
use crate::services::{CodeCheck, ServiceError, UserStore};

const USER_SELECT: &str = r#"
    SELECT u.user_id, u.email, u.password_hash, u.enabled, u.verification_token,
           u.two_factor_enabled, u.two_factor_code_hash, u.two_factor_expires_utc,
           u.two_factor_attempts, u.facebook_url, u.youtube_url, u.instagram_url,
           u.balance_credits, u.created_utc,
           COALESCE(ARRAY_AGG(r.role_id) FILTER (WHERE r.role_id IS NOT NULL), '{}') AS role_ids
    FROM users u
    LEFT JOIN user_roles r ON r.user_id = u.user_id
"#;

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_one_user(
        &self,
        filter: &str,
        bind: impl ToString,
    ) -> Result<Option<User>, ServiceError> {
        let sql = format!("{USER_SELECT} WHERE {filter} GROUP BY u.user_id");
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(bind.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(record.map(User::from))
    }
}

fn map_insert_error(err: sqlx::Error) -> ServiceError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            ServiceError::EmailAlreadyRegistered
        }
        _ => ServiceError::Database(err),
    }
}

#[async_trait]
impl UserStore for Database {
    async fn health_check(&self) -> Result<(), ServiceError> {
        crate::db::ping(&self.pool).await.map_err(|e| {
            tracing::error!("Database health check failed: {}", e);
            ServiceError::Database(e)
        })
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        self.fetch_one_user("u.user_id = $1::uuid", user_id).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        self.fetch_one_user("LOWER(u.email) = LOWER($1)", email).await
    }

    async fn find_user_by_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<User>, ServiceError> {
        self.fetch_one_user("u.verification_token = $1", token).await
    }

    async fn insert_user(&self, user: &User) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (user_id, email, password_hash, enabled, verification_token,
                               two_factor_enabled, balance_credits, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            "#,
        )
        .bind(user.user_id)
        .bind(&user.email)
        .bind(&user.credentials.password_hash)
        .bind(user.enabled)
        .bind(&user.credentials.verification_token)
        .bind(user.two_factor.enabled)
        .bind(user.balance)
        .bind(user.created_utc)
        .execute(&mut *tx)
        .await
        .map_err(map_insert_error)?;

        for role in &user.roles {
            sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)")
                .bind(user.user_id)
                .bind(role.id())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn enable_user(&self, user_id: Uuid) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            "UPDATE users SET enabled = TRUE, updated_utc = NOW() WHERE user_id = $1 AND enabled = FALSE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn store_two_factor_code(
        &self,
        user_id: Uuid,
        code: &PendingCode,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            UPDATE users
            SET two_factor_code_hash = $2, two_factor_expires_utc = $3,
                two_factor_attempts = 0, updated_utc = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(&code.code_hash)
        .bind(code.expires_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume_two_factor_code(
        &self,
        user_id: Uuid,
        code_hash: &str,
        now: DateTime<Utc>,
        max_attempts: i32,
    ) -> Result<CodeCheck, ServiceError> {
        // SET expressions all read the pre-update row; RETURNING sees the new one.
        // A match leaves the counter at zero, a miss leaves it at one or more.
        let row: Option<(i32, bool)> = sqlx::query_as(
            r#"
            UPDATE users
            SET two_factor_attempts = CASE WHEN two_factor_code_hash = $2
                                           THEN 0 ELSE two_factor_attempts + 1 END,
                two_factor_code_hash = CASE WHEN two_factor_code_hash = $2
                                              OR two_factor_attempts + 1 >= $4
                                            THEN NULL ELSE two_factor_code_hash END,
                two_factor_expires_utc = CASE WHEN two_factor_code_hash = $2
                                                OR two_factor_attempts + 1 >= $4
                                              THEN NULL ELSE two_factor_expires_utc END,
                updated_utc = NOW()
            WHERE user_id = $1
              AND two_factor_code_hash IS NOT NULL
              AND two_factor_expires_utc > $3
              AND two_factor_attempts < $4
            RETURNING two_factor_attempts, two_factor_code_hash IS NULL
            "#,
        )
        .bind(user_id)
        .bind(code_hash)
        .bind(now)
        .bind(max_attempts)
        .fetch_optional(&self.pool)
        .await?;

        if row.is_none() {
            // Only a code that is still stale is dropped, never a fresh one.
            sqlx::query(
                r#"
                UPDATE users
                SET two_factor_code_hash = NULL, two_factor_expires_utc = NULL,
                    two_factor_attempts = 0, updated_utc = NOW()
                WHERE user_id = $1
                  AND two_factor_code_hash IS NOT NULL
                  AND (two_factor_expires_utc <= $2 OR two_factor_attempts >= $3)
                "#,
            )
            .bind(user_id)
            .bind(now)
            .bind(max_attempts)
            .execute(&self.pool)
            .await?;
        }

        Ok(match row {
            None => CodeCheck::Unavailable,
            Some((0, _)) => CodeCheck::Accepted,
            Some((attempts, exhausted)) => CodeCheck::Rejected {
                attempts,
                exhausted,
            },
        })
    }

    async fn set_two_factor_enabled(
        &self,
        user_id: Uuid,
        enabled: bool,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            UPDATE users
            SET two_factor_enabled = $2,
                two_factor_code_hash = CASE WHEN $2 THEN two_factor_code_hash END,
                two_factor_expires_utc = CASE WHEN $2 THEN two_factor_expires_utc END,
                updated_utc = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(enabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_social_link(
        &self,
        user_id: Uuid,
        platform: SocialPlatform,
        link: Option<&str>,
    ) -> Result<(), ServiceError> {
        let sql = format!(
            "UPDATE users SET {} = $2, updated_utc = NOW() WHERE user_id = $1",
            platform.column()
        );
        sqlx::query(&sql)
            .bind(user_id)
            .bind(link)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::models::Role;

    async fn connect() -> Database {
        let config = DatabaseConfig {
            url: std::env::var("TEST_DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/theatre_test".to_string()),
            max_connections: 2,
            min_connections: 1,
        };
        let pool = crate::db::create_pool(&config).await.unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        Database::new(pool)
    }

    #[tokio::test]
    #[ignore] // Requires running PostgreSQL
    async fn test_insert_and_find_round_trip() {
        let db = connect().await;
        let email = format!("{}@theatre.example", Uuid::new_v4());
        let user = User::new(email.clone(), "hash".into(), Role::User, Uuid::new_v4().to_string());

        db.insert_user(&user).await.unwrap();

        let found = db.find_user_by_email(&email.to_uppercase()).await.unwrap().unwrap();
        assert_eq!(found.user_id, user.user_id);
        assert_eq!(found.roles, vec![Role::User]);
        assert!(!found.enabled);

        let duplicate = User::new(email, "hash".into(), Role::User, Uuid::new_v4().to_string());
        assert!(matches!(
            db.insert_user(&duplicate).await,
            Err(ServiceError::EmailAlreadyRegistered)
        ));
    }

    #[tokio::test]
    #[ignore] // Requires running PostgreSQL
    async fn test_code_check_counts_misses_in_place() {
        let db = connect().await;
        let email = format!("{}@theatre.example", Uuid::new_v4());
        let user = User::new(email, "hash".into(), Role::User, Uuid::new_v4().to_string());
        db.insert_user(&user).await.unwrap();
        db.store_two_factor_code(
            user.user_id,
            &PendingCode {
                code_hash: "right".into(),
                expires_utc: Utc::now() + chrono::Duration::minutes(5),
                attempts: 0,
            },
        )
        .await
        .unwrap();

        let miss = db
            .consume_two_factor_code(user.user_id, "wrong", Utc::now(), 2)
            .await
            .unwrap();
        assert_eq!(
            miss,
            CodeCheck::Rejected {
                attempts: 1,
                exhausted: false
            }
        );

        let last = db
            .consume_two_factor_code(user.user_id, "wrong", Utc::now(), 2)
            .await
            .unwrap();
        assert_eq!(
            last,
            CodeCheck::Rejected {
                attempts: 2,
                exhausted: true
            }
        );

        let after = db
            .consume_two_factor_code(user.user_id, "right", Utc::now(), 2)
            .await
            .unwrap();
        assert_eq!(after, CodeCheck::Unavailable);
    }
}
