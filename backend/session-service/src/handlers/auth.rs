/// Authentication handlers
use actix_web::{http::header::LOCATION, web, HttpResponse};
use crypto_core::IssuedToken;
use serde::{Deserialize, Serialize};

use crate::{
    error::AuthError,
    models::{LoginRequest, ResetPasswordRequest, SessionState},
    services::LogoutOutcome,
    AppState,
};

/// Body accepted as JSON or as an urlencoded form
type JsonOrForm<T> = web::Either<web::Json<T>, web::Form<T>>;

fn into_inner<T>(payload: JsonOrForm<T>) -> T {
    match payload {
        web::Either::Left(json) => json.into_inner(),
        web::Either::Right(form) => form.into_inner(),
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Reset outcome; carries a replacement token when outstanding sessions
/// were revoked
#[derive(Debug, Serialize, Deserialize)]
pub struct ResetPasswordResponse {
    pub message: String,
    #[serde(flatten)]
    pub token: Option<IssuedToken>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthenticatedResponse {
    pub authenticated: bool,
}

/// POST /auth/login
pub async fn login(
    state: web::Data<AppState>,
    payload: JsonOrForm<LoginRequest>,
) -> Result<HttpResponse, AuthError> {
    let request = into_inner(payload);
    let issued = state.auth.login(&request).await?;
    Ok(HttpResponse::Ok().json(issued))
}

/// GET /auth/logout
///
/// Revokes the presented token. Guests are redirected instead.
pub async fn logout(
    state: web::Data<AppState>,
    session: SessionState,
) -> Result<HttpResponse, AuthError> {
    match state.auth.logout(&session).await? {
        LogoutOutcome::Revoked | LogoutOutcome::AlreadyRevoked => {
            Ok(HttpResponse::Ok().json(MessageResponse {
                message: "Successfully logged out".to_string(),
            }))
        }
        LogoutOutcome::Guest => Ok(HttpResponse::Found()
            .insert_header((LOCATION, state.auth.policy().guest_logout_redirect.as_str()))
            .finish()),
    }
}

/// GET /auth/is-authenticated
pub async fn is_authenticated(session: SessionState) -> HttpResponse {
    HttpResponse::Ok().json(AuthenticatedResponse {
        authenticated: session.is_authenticated(),
    })
}

/// POST /auth/reset-password
///
/// The session is checked before the body, so guests get 401 even with a
/// malformed payload.
pub async fn reset_password(
    state: web::Data<AppState>,
    session: SessionState,
    payload: Result<JsonOrForm<ResetPasswordRequest>, actix_web::Error>,
) -> actix_web::Result<HttpResponse> {
    session.require()?;
    let request = into_inner(payload?);

    let token = state.auth.reset_password(&session, &request).await?;

    Ok(HttpResponse::Ok().json(ResetPasswordResponse {
        message: "Password has been reset".to_string(),
        token,
    }))
}
