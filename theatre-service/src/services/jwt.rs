use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::{Role, User};

/// Signs and verifies HS256 session tokens.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    token_expiry_minutes: i64,
}

/// Claims carried by a session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user ID)
    pub sub: String,
    pub email: String,
    pub roles: Vec<Role>,
    pub iss: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    pub jti: String,
}

impl SessionClaims {
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}

/// Token response returned to client
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Lifetime in seconds
    pub expires_in: i64,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        if config.secret.is_empty() {
            return Err(anyhow::anyhow!("JWT secret must not be empty"));
        }

        tracing::info!(issuer = %config.issuer, "JWT service initialized with HS256 secret");

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            token_expiry_minutes: config.token_expiry_minutes,
        })
    }

    pub fn token_expiry_seconds(&self) -> i64 {
        self.token_expiry_minutes.saturating_mul(60)
    }

    /// Issue a session token embedding the user's identity and roles.
    pub fn generate_token(&self, user: &User) -> Result<TokenResponse, anyhow::Error> {
        let now = Utc::now();
        let exp = Duration::try_minutes(self.token_expiry_minutes)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| anyhow::anyhow!("Token lifetime out of range"))?;

        let claims = SessionClaims {
            sub: user.user_id.to_string(),
            email: user.email.clone(),
            roles: user.roles.clone(),
            iss: self.issuer.clone(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let access_token = self.encode_claims(&claims)?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.token_expiry_seconds(),
        })
    }

    fn encode_claims(&self, claims: &SessionClaims) -> Result<String, anyhow::Error> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode session token: {}", e))
    }

    /// Decode and check signature, issuer and expiry. `None` means there is
    /// no authenticated principal.
    pub fn verify_token(&self, token: &str) -> Option<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);

        match decode::<SessionClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                tracing::debug!(error = %e, "Session token rejected");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(secret: &str) -> JwtService {
        JwtService::new(&JwtConfig {
            secret: secret.to_string(),
            issuer: "theatre-service".to_string(),
            token_expiry_minutes: 60,
        })
        .unwrap()
    }

    fn user() -> User {
        let mut user = User::new(
            "director@theatre.example".into(),
            "hash".into(),
            Role::Admin,
            "token".into(),
        );
        user.enabled = true;
        user
    }

    #[test]
    fn test_round_trip_carries_identity_and_roles() {
        let jwt = service("0123456789abcdef0123456789abcdef");
        let user = user();

        let token = jwt.generate_token(&user).unwrap();
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(token.expires_in, 3600);

        let claims = jwt.verify_token(&token.access_token).unwrap();
        assert_eq!(claims.user_id(), Some(user.user_id));
        assert_eq!(claims.email, "director@theatre.example");
        assert_eq!(claims.roles, vec![Role::Admin]);
    }

    #[test]
    fn test_out_of_range_lifetime_is_an_error() {
        let jwt = JwtService::new(&JwtConfig {
            secret: "0123456789abcdef0123456789abcdef".to_string(),
            issuer: "theatre-service".to_string(),
            token_expiry_minutes: i64::MAX,
        })
        .unwrap();

        assert!(jwt.generate_token(&user()).is_err());
    }

    #[test]
    fn test_rejects_foreign_signature() {
        let token = service("0123456789abcdef0123456789abcdef")
            .generate_token(&user())
            .unwrap();

        assert!(service("another-secret-another-secret-000")
            .verify_token(&token.access_token)
            .is_none());
    }

    #[test]
    fn test_rejects_expired_token() {
        let jwt = service("0123456789abcdef0123456789abcdef");
        let now = Utc::now();
        let claims = SessionClaims {
            sub: Uuid::new_v4().to_string(),
            email: "a@x.com".into(),
            roles: vec![Role::User],
            iss: "theatre-service".into(),
            exp: (now - Duration::minutes(1)).timestamp(),
            iat: (now - Duration::minutes(61)).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let token = jwt.encode_claims(&claims).unwrap();

        assert!(jwt.verify_token(&token).is_none());
    }

    #[test]
    fn test_rejects_garbage() {
        let jwt = service("0123456789abcdef0123456789abcdef");
        assert!(jwt.verify_token("not.a.jwt").is_none());
        assert!(jwt.verify_token("").is_none());
    }
}
