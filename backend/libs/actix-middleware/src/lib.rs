//! # Actix Middleware Library
//!
//! Middleware components shared by the session Actix services
//!
//! ## Modules
//! - `session`: resolves the request token into a session before dispatch
//! - `logging`: structured request/response logging
//! - `metrics`: Prometheus request metrics

pub mod logging;
pub mod metrics;
pub mod session;

pub use logging::Logging;
pub use metrics::MetricsMiddleware;
pub use session::{extract_token, SessionMiddleware, SessionResolver};
