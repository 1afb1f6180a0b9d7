// Session Service Library

pub mod config;
pub mod db;
pub mod error;
pub mod fixtures;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod routes;
pub mod security;
pub mod services;
pub mod validators;

pub use error::{AuthError, Result};

// Re-export commonly used types
pub use models::{AuthenticatedSession, RejectReason, SessionState, User};
pub use services::{AuthService, LogoutOutcome};

use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub fn new(auth: Arc<AuthService>) -> Self {
        Self { auth }
    }
}
