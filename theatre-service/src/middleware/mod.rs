pub mod auth;
pub mod metrics;

pub use auth::{authorize, AuthUser, RoleGuard, RolePolicy};
pub use metrics::track_metrics;
