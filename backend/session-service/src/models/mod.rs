/// Data models for authentication
pub mod session;
pub mod user;

pub use session::{AuthenticatedSession, RejectReason, SessionState};
pub use user::{LoginRequest, ResetPasswordRequest, User};
