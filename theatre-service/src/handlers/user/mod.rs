pub mod balance;
pub mod profile;
pub mod registration;
pub mod session;
pub mod social;
pub mod two_factor;

pub use balance::get_balance;
pub use profile::current_user;
pub use registration::{register, verify_email};
pub use session::{login, login_two_factor};
pub use social::{link_social_account, unlink_social_account};
pub use two_factor::{disable_two_factor, enable_two_factor};

use axum::{http::StatusCode, Json};
use service_core::{error::AppError, response::ApiResponse};

/// Status plus envelope, or an error rendered as an envelope.
pub type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), AppError>;
