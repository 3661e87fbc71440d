//! HTTP handlers for theatre-service.

pub mod metrics;
pub mod user;
