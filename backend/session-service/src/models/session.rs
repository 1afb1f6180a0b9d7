/// Per-request authentication state
use actix_web::{dev::Payload, FromRequest, HttpMessage, HttpRequest};
use chrono::{DateTime, Utc};
use std::future::{ready, Ready};
use uuid::Uuid;

use crate::error::AuthError;

/// Why a presented token did not yield an authenticated session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Bad signature, malformed token, foreign issuer
    Invalid,
    /// Signature fine, `exp` in the past
    Expired,
    /// Signature fine, explicitly revoked before expiry
    Revoked,
    /// Revocation store could not be consulted
    Unavailable,
}

/// Identity bound to a valid, unrevoked token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedSession {
    pub user_id: Uuid,
    pub email: String,
    pub jti: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Guest,
    Authenticated(AuthenticatedSession),
    Rejected(RejectReason),
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }

    /// Authenticated session, or the error a protected action must fail with
    pub fn require(&self) -> Result<&AuthenticatedSession, AuthError> {
        match self {
            SessionState::Authenticated(session) => Ok(session),
            SessionState::Guest | SessionState::Rejected(RejectReason::Invalid) => {
                Err(AuthError::Unauthenticated)
            }
            SessionState::Rejected(RejectReason::Expired) => Err(AuthError::TokenExpired),
            SessionState::Rejected(RejectReason::Revoked) => Err(AuthError::TokenRevoked),
            SessionState::Rejected(RejectReason::Unavailable) => Err(AuthError::Internal(
                "session could not be verified".to_string(),
            )),
        }
    }
}

/// Reads the state placed by `SessionMiddleware`
impl FromRequest for SessionState {
    type Error = AuthError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        match req.extensions().get::<SessionState>() {
            Some(state) => ready(Ok(state.clone())),
            None => {
                tracing::error!(path = %req.path(), "SessionMiddleware is not mounted");
                ready(Err(AuthError::Internal(
                    "session middleware not installed".to_string(),
                )))
            }
        }
    }
}
