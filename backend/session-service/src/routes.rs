use actix_web::{error, web, HttpRequest};

use crate::error::AuthError;
use crate::handlers;
use crate::metrics::metrics_handler;

/// Register every route of the service.
///
/// `/auth/register` is not routed and answers 404.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .app_data(form_config())
        .route("/health", web::get().to(handlers::health_check))
        .route("/metrics", web::get().to(metrics_handler))
        .service(
            web::scope("/auth")
                .route("/login", web::post().to(handlers::login))
                .route("/logout", web::get().to(handlers::logout))
                .route("/is-authenticated", web::get().to(handlers::is_authenticated))
                .route("/reset-password", web::post().to(handlers::reset_password)),
        );
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err: error::JsonPayloadError, _req: &HttpRequest| {
        AuthError::Validation(err.to_string()).into()
    })
}

fn form_config() -> web::FormConfig {
    web::FormConfig::default().error_handler(|err: error::UrlencodedError, _req: &HttpRequest| {
        AuthError::Validation(err.to_string()).into()
    })
}
