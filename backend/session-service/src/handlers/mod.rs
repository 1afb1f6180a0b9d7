/// HTTP request handlers
pub mod auth;
pub mod health;

pub use auth::{is_authenticated, login, logout, reset_password};
pub use health::health_check;
