pub mod report;
pub mod user;

pub use report::{Validated, ValidationReport};
pub use user::{
    Credentials, LinkedAccounts, PendingCode, Role, SocialPlatform, TwoFactorState, User,
    UserRecord,
};
