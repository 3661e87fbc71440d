pub mod otp;
pub mod password;
pub mod validation;

pub use otp::{code_hash_matches, generate_otp, generate_verification_token, hash_otp};
pub use password::{hash_password, verify_password, Password, PasswordHashString};
pub use validation::{is_valid_email, normalize_email, parse_social_link, ValidatedJson};
