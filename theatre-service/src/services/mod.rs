//! Business logic: persistence, tokens, mail, validation and account
//! mutations.

mod database;
mod email;
pub mod error;
mod jwt;
pub mod metrics;
pub mod store;
pub mod user;
pub mod validation;

pub use database::Database;
pub use email::{EmailProvider, EmailService, MockEmailService, SentEmail};
pub use error::ServiceError;
pub use jwt::{JwtService, SessionClaims, TokenResponse};
pub use store::{CodeCheck, InMemoryUserStore, UserStore};
pub use user::UserService;
pub use validation::UserValidationService;
