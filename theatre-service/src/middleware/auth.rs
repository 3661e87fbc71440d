//! Bearer-token authentication plus role authorization, applied per route
//! group with `from_fn_with_state(RoleGuard::new(..), authorize)`.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use std::fmt;
use std::sync::Arc;

use crate::models::Role;
use crate::services::{validation::bearer_token, JwtService, SessionClaims};

type RolePredicate = dyn Fn(&[Role]) -> bool + Send + Sync;

/// Named predicate over the caller's roles.
#[derive(Clone)]
pub struct RolePolicy {
    name: &'static str,
    predicate: Arc<RolePredicate>,
}

impl RolePolicy {
    /// Any authenticated caller.
    pub fn any_role() -> Self {
        Self::custom("authenticated", |_| true)
    }

    pub fn require(role: Role) -> Self {
        let name = match role {
            Role::Admin => "admin",
            Role::User => "user",
        };
        Self::custom(name, move |roles| roles.contains(&role))
    }

    pub fn custom<F>(name: &'static str, predicate: F) -> Self
    where
        F: Fn(&[Role]) -> bool + Send + Sync + 'static,
    {
        Self {
            name,
            predicate: Arc::new(predicate),
        }
    }

    pub fn permits(&self, roles: &[Role]) -> bool {
        (self.predicate)(roles)
    }
}

impl fmt::Debug for RolePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RolePolicy").field("name", &self.name).finish()
    }
}

/// Middleware state: token verifier plus the policy for this route group.
#[derive(Clone)]
pub struct RoleGuard {
    jwt: JwtService,
    policy: RolePolicy,
}

impl RoleGuard {
    pub fn new(jwt: JwtService, policy: RolePolicy) -> Self {
        Self { jwt, policy }
    }
}

/// Rejects missing or invalid tokens with `Unauthorized` and insufficient
/// roles with `Forbidden`; otherwise stores the claims for `AuthUser`.
pub async fn authorize(
    State(guard): State<RoleGuard>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = bearer_token(req.headers())
        .and_then(|token| guard.jwt.verify_token(token))
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing or invalid session token")))?;

    if !guard.policy.permits(&claims.roles) {
        tracing::warn!(
            user_id = %claims.sub,
            policy = guard.policy.name,
            roles = ?claims.roles,
            path = %req.uri().path(),
            "Insufficient role"
        );
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Insufficient role for this operation"
        )));
    }

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Claims of the authenticated caller.
pub struct AuthUser(pub SessionClaims);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts.extensions.get::<SessionClaims>().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Session claims missing from request extensions"
            ))
        })?;

        Ok(AuthUser(claims.clone()))
    }
}
