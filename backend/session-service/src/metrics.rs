use actix_web::{HttpResponse, Responder};
use prometheus::{Encoder, IntCounter, IntCounterVec, TextEncoder};

lazy_static::lazy_static! {
    /// Login attempts by outcome: `success`, `invalid_credentials`, `validation_error`, `error`
    pub static ref LOGIN_ATTEMPTS_TOTAL: IntCounterVec = prometheus::register_int_counter_vec!(
        "session_login_attempts_total",
        "Login attempts by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref TOKENS_ISSUED_TOTAL: IntCounter = prometheus::register_int_counter!(
        "session_tokens_issued_total",
        "Access tokens issued"
    ).unwrap();

    pub static ref TOKENS_REVOKED_TOTAL: IntCounter = prometheus::register_int_counter!(
        "session_tokens_revoked_total",
        "Access tokens revoked on logout"
    ).unwrap();

    /// Introspection results by state: `guest`, `authenticated`, `invalid`, `expired`, `revoked`, `unavailable`
    pub static ref SESSION_RESOLUTIONS_TOTAL: IntCounterVec = prometheus::register_int_counter_vec!(
        "session_resolutions_total",
        "Session introspection results",
        &["state"]
    ).unwrap();

    pub static ref PASSWORD_RESETS_TOTAL: IntCounter = prometheus::register_int_counter!(
        "session_password_resets_total",
        "Completed password resets"
    ).unwrap();

    pub static ref REVOCATIONS_PRUNED_TOTAL: IntCounter = prometheus::register_int_counter!(
        "session_revocations_pruned_total",
        "Expired revocation entries pruned"
    ).unwrap();
}

pub fn record_login(outcome: &str) {
    LOGIN_ATTEMPTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_resolution(state: &str) {
    SESSION_RESOLUTIONS_TOTAL.with_label_values(&[state]).inc();
}

/// Handler that serialises Prometheus metrics in text format.
pub async fn metrics_handler() -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => HttpResponse::Ok()
            .content_type(encoder.format_type())
            .body(buffer),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}
