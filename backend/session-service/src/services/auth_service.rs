/// Session lifecycle: credential checks, issuance, introspection, logout and
/// password reset.
use actix_middleware::SessionResolver;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use crypto_core::{Claims, IssuedToken, JwtError, TokenSigner};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use validator::Validate;

use crate::config::PolicySettings;
use crate::db::UserRepository;
use crate::error::{AuthError, Result};
use crate::metrics;
use crate::models::{
    AuthenticatedSession, LoginRequest, RejectReason, ResetPasswordRequest, SessionState, User,
};
use crate::security::{hash_password, verify_password_timing_safe, RevocationStore};
use crate::validators::{normalize_email, validate_email, validate_new_password};

/// Earliest instant whose second is not covered by `marker`
fn past_marker(marker: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    marker.map_or(now, |at| now.max(at + ChronoDuration::seconds(1)))
}

/// What a logout request did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutOutcome {
    /// The presented token is now revoked
    Revoked,
    /// The token had already been revoked; nothing changed
    AlreadyRevoked,
    /// No usable session; nothing to revoke
    Guest,
}

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    revocations: Arc<dyn RevocationStore>,
    signer: Arc<TokenSigner>,
    policy: PolicySettings,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        revocations: Arc<dyn RevocationStore>,
        signer: Arc<TokenSigner>,
        policy: PolicySettings,
    ) -> Self {
        Self {
            users,
            revocations,
            signer,
            policy,
        }
    }

    pub fn policy(&self) -> &PolicySettings {
        &self.policy
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Create an identity with a freshly hashed password.
    ///
    /// Not reachable over HTTP; used for seeding and fixtures.
    pub async fn create_user(&self, email: &str, password: &str) -> Result<User> {
        let email = normalize_email(email);
        if !validate_email(&email) {
            return Err(AuthError::Validation("invalid email".to_string()));
        }
        if password.is_empty() {
            return Err(AuthError::Validation("password is required".to_string()));
        }

        let password_hash = hash_password(password)?;
        let user = self.users.create(&User::new(email, password_hash)).await?;

        tracing::info!(user_id = %user.id, "User created");
        Ok(user)
    }

    /// Check an (email, password) pair against stored credentials.
    ///
    /// Unknown email and wrong password are indistinguishable to the caller.
    pub async fn verify_credentials(&self, email: &str, password: &str) -> Result<User> {
        if password.is_empty() {
            return Err(AuthError::Validation("password is required".to_string()));
        }

        let email = normalize_email(email);
        let user = self.users.find_by_email(&email).await?;

        let verified = verify_password_timing_safe(
            password,
            user.as_ref().map(|u| u.password_hash.as_str()),
        )?;

        match user {
            Some(user) if verified => Ok(user),
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    /// Issue a token for `user`.
    ///
    /// When user-wide revocation is enabled, the token is dated after the
    /// user's latest marker so it is not caught by it.
    pub async fn issue_token(&self, user: &User) -> Result<IssuedToken> {
        let marker = if self.policy.revoke_sessions_on_password_reset {
            self.revocations.user_revoked_at(user.id).await?
        } else {
            None
        };
        self.mint(user.id, &user.email, marker)
    }

    fn mint(
        &self,
        user_id: Uuid,
        email: &str,
        marker: Option<DateTime<Utc>>,
    ) -> Result<IssuedToken> {
        let issued = self
            .signer
            .issue_at(user_id, email, past_marker(marker))?;
        metrics::TOKENS_ISSUED_TOTAL.inc();
        Ok(issued)
    }

    /// Verify credentials and issue a token
    pub async fn login(&self, request: &LoginRequest) -> Result<IssuedToken> {
        let result = async {
            request.validate()?;
            let user = self
                .verify_credentials(&request.email, &request.password)
                .await?;
            let issued = self.issue_token(&user).await?;
            Ok::<_, AuthError>((user, issued))
        }
        .await;

        match result {
            Ok((user, issued)) => {
                metrics::record_login("success");
                tracing::info!(user_id = %user.id, jti = %issued.jti, "Login succeeded");
                Ok(issued)
            }
            Err(err) => {
                let outcome = match &err {
                    AuthError::InvalidCredentials => "invalid_credentials",
                    AuthError::Validation(_) => "validation_error",
                    _ => "error",
                };
                metrics::record_login(outcome);
                tracing::warn!(outcome, "Login failed");
                Err(err)
            }
        }
    }

    /// Resolve a presented token into a session state.
    ///
    /// Never fails: a revocation store error yields `Rejected(Unavailable)`.
    pub async fn introspect(&self, token: Option<&str>) -> SessionState {
        let state = self.resolve_state(token).await;

        let label = match &state {
            SessionState::Guest => "guest",
            SessionState::Authenticated(_) => "authenticated",
            SessionState::Rejected(RejectReason::Invalid) => "invalid",
            SessionState::Rejected(RejectReason::Expired) => "expired",
            SessionState::Rejected(RejectReason::Revoked) => "revoked",
            SessionState::Rejected(RejectReason::Unavailable) => "unavailable",
        };
        metrics::record_resolution(label);

        state
    }

    async fn resolve_state(&self, token: Option<&str>) -> SessionState {
        let Some(token) = token else {
            return SessionState::Guest;
        };

        let claims = match self.signer.validate(token) {
            Ok(data) => data.claims,
            Err(JwtError::Expired) => return SessionState::Rejected(RejectReason::Expired),
            Err(e) => {
                tracing::debug!(error = %e, "Rejected token");
                return SessionState::Rejected(RejectReason::Invalid);
            }
        };

        let Ok(user_id) = claims.user_id() else {
            tracing::debug!("Rejected token with malformed subject");
            return SessionState::Rejected(RejectReason::Invalid);
        };

        match self.is_revoked(&claims, user_id).await {
            Ok(true) => SessionState::Rejected(RejectReason::Revoked),
            Ok(false) => SessionState::Authenticated(AuthenticatedSession {
                user_id,
                email: claims.email.clone(),
                issued_at: claims.issued_at(),
                expires_at: claims.expires_at(),
                jti: claims.jti,
            }),
            Err(e) => {
                tracing::error!(error = %e, jti = %claims.jti, "Revocation store unavailable");
                SessionState::Rejected(RejectReason::Unavailable)
            }
        }
    }

    async fn is_revoked(&self, claims: &Claims, user_id: Uuid) -> Result<bool> {
        if self.revocations.is_revoked(&claims.jti).await? {
            return Ok(true);
        }

        Ok(self
            .revocations
            .user_revoked_at(user_id)
            .await?
            .is_some_and(|at| claims.iat <= at.timestamp()))
    }

    /// Revoke the token behind `state`.
    ///
    /// Idempotent: an already revoked token reports `AlreadyRevoked`.
    pub async fn logout(&self, state: &SessionState) -> Result<LogoutOutcome> {
        match state {
            SessionState::Authenticated(session) => {
                let created = self
                    .revocations
                    .revoke(&session.jti, session.expires_at)
                    .await?;

                if created {
                    metrics::TOKENS_REVOKED_TOTAL.inc();
                    tracing::info!(user_id = %session.user_id, jti = %session.jti, "Token revoked");
                    Ok(LogoutOutcome::Revoked)
                } else {
                    Ok(LogoutOutcome::AlreadyRevoked)
                }
            }
            SessionState::Rejected(RejectReason::Revoked) => Ok(LogoutOutcome::AlreadyRevoked),
            SessionState::Rejected(RejectReason::Unavailable) => Err(AuthError::Internal(
                "revocation store unavailable".to_string(),
            )),
            SessionState::Guest
            | SessionState::Rejected(RejectReason::Invalid)
            | SessionState::Rejected(RejectReason::Expired) => Ok(LogoutOutcome::Guest),
        }
    }

    /// Replace the password of the authenticated identity.
    ///
    /// Outstanding tokens stay valid unless the policy enables user-wide
    /// revocation on reset. In that case the revocation is written before the
    /// credential, and a replacement token for the caller is returned.
    pub async fn reset_password(
        &self,
        state: &SessionState,
        request: &ResetPasswordRequest,
    ) -> Result<Option<IssuedToken>> {
        let session = state.require()?;

        validate_new_password(
            &request.password,
            &request.password_confirmation,
            self.policy.min_password_length,
        )?;

        let password_hash = hash_password(&request.password)?;

        let marker = if self.policy.revoke_sessions_on_password_reset {
            let previous = self.revocations.user_revoked_at(session.user_id).await?;
            let at = past_marker(previous);
            self.revocations
                .revoke_all_for_user(session.user_id, at)
                .await?;
            Some(at)
        } else {
            None
        };

        self.users
            .update_password_hash(session.user_id, &password_hash)
            .await?;

        metrics::PASSWORD_RESETS_TOTAL.inc();
        tracing::info!(user_id = %session.user_id, "Password reset");

        marker
            .map(|at| self.mint(session.user_id, &session.email, Some(at)))
            .transpose()
    }

    pub async fn prune_revocations(&self) -> Result<usize> {
        let removed = self.revocations.prune_expired().await?;
        if removed > 0 {
            metrics::REVOCATIONS_PRUNED_TOTAL.inc_by(removed as u64);
            tracing::debug!(removed, "Pruned expired revocations");
        }
        Ok(removed)
    }
}

#[async_trait(?Send)]
impl SessionResolver for AuthService {
    type Session = SessionState;

    async fn resolve(&self, token: Option<&str>) -> SessionState {
        self.introspect(token).await
    }
}

/// Periodically drop revocation entries whose tokens have expired
pub fn spawn_revocation_pruner(service: Arc<AuthService>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = service.prune_revocations().await {
                tracing::warn!(error = %e, "Revocation pruning failed");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryUserRepository;
    use crate::security::InMemoryRevocationStore;
    use chrono::{DateTime, Duration as ChronoDuration};
    use mockall::mock;

    const SECRET: &str = "unit-test-secret-with-at-least-32-bytes";
    const PASSWORD: &str = "correct-horse";

    fn signer() -> Arc<TokenSigner> {
        Arc::new(TokenSigner::new(SECRET, "session-service", 3600).unwrap())
    }

    fn service_with(policy: PolicySettings) -> AuthService {
        AuthService::new(
            Arc::new(InMemoryUserRepository::new()),
            Arc::new(InMemoryRevocationStore::new(3600)),
            signer(),
            policy,
        )
    }

    fn service() -> AuthService {
        service_with(PolicySettings::default())
    }

    fn login_request(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    fn reset_request(password: &str) -> ResetPasswordRequest {
        ResetPasswordRequest {
            password: password.to_string(),
            password_confirmation: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_login_then_introspect() {
        let svc = service();
        let user = svc.create_user("a@example.com", PASSWORD).await.unwrap();

        let issued = svc
            .login(&login_request("a@example.com", PASSWORD))
            .await
            .unwrap();

        match svc.introspect(Some(&issued.access_token)).await {
            SessionState::Authenticated(session) => {
                assert_eq!(session.user_id, user.id);
                assert_eq!(session.email, "a@example.com");
                assert_eq!(session.jti, issued.jti);
            }
            other => panic!("expected authenticated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_login_normalizes_email() {
        let svc = service();
        svc.create_user("a@example.com", PASSWORD).await.unwrap();
        assert!(svc
            .login(&login_request("  A@Example.com ", PASSWORD))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user_look_the_same() {
        let svc = service();
        svc.create_user("a@example.com", PASSWORD).await.unwrap();

        let wrong = svc
            .login(&login_request("a@example.com", "wrong-password"))
            .await
            .unwrap_err();
        let unknown = svc
            .login(&login_request("nobody@example.com", PASSWORD))
            .await
            .unwrap_err();

        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert!(matches!(unknown, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_empty_password_is_validation_error() {
        let svc = service();
        let err = svc
            .login(&login_request("a@example.com", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[tokio::test]
    async fn test_introspect_without_token_is_guest() {
        assert_eq!(service().introspect(None).await, SessionState::Guest);
    }

    #[tokio::test]
    async fn test_introspect_garbage_is_invalid() {
        assert_eq!(
            service().introspect(Some("not.a.token")).await,
            SessionState::Rejected(RejectReason::Invalid)
        );
    }

    #[tokio::test]
    async fn test_introspect_expired() {
        let svc = service();
        let issued = svc
            .signer()
            .issue_at(
                Uuid::new_v4(),
                "a@example.com",
                Utc::now() - ChronoDuration::hours(2),
            )
            .unwrap();

        assert_eq!(
            svc.introspect(Some(&issued.access_token)).await,
            SessionState::Rejected(RejectReason::Expired)
        );
    }

    #[tokio::test]
    async fn test_logout_revokes_and_is_idempotent() {
        let svc = service();
        let user = svc.create_user("a@example.com", PASSWORD).await.unwrap();
        let issued = svc.issue_token(&user).await.unwrap();

        let state = svc.introspect(Some(&issued.access_token)).await;
        assert_eq!(svc.logout(&state).await.unwrap(), LogoutOutcome::Revoked);

        let after = svc.introspect(Some(&issued.access_token)).await;
        assert_eq!(after, SessionState::Rejected(RejectReason::Revoked));

        assert_eq!(
            svc.logout(&after).await.unwrap(),
            LogoutOutcome::AlreadyRevoked
        );
        assert_eq!(
            svc.logout(&state).await.unwrap(),
            LogoutOutcome::AlreadyRevoked
        );
    }

    #[tokio::test]
    async fn test_logout_leaves_other_tokens_alone() {
        let svc = service();
        let user = svc.create_user("a@example.com", PASSWORD).await.unwrap();
        let first = svc.issue_token(&user).await.unwrap();
        let second = svc.issue_token(&user).await.unwrap();

        let state = svc.introspect(Some(&first.access_token)).await;
        svc.logout(&state).await.unwrap();

        assert!(svc
            .introspect(Some(&second.access_token))
            .await
            .is_authenticated());
    }

    #[tokio::test]
    async fn test_guest_logout_is_noop() {
        let svc = service();
        assert_eq!(
            svc.logout(&SessionState::Guest).await.unwrap(),
            LogoutOutcome::Guest
        );
        assert_eq!(
            svc.logout(&SessionState::Rejected(RejectReason::Expired))
                .await
                .unwrap(),
            LogoutOutcome::Guest
        );
    }

    #[tokio::test]
    async fn test_reset_password_swaps_credentials() {
        let svc = service();
        let user = svc.create_user("a@example.com", PASSWORD).await.unwrap();
        let issued = svc.issue_token(&user).await.unwrap();
        let state = svc.introspect(Some(&issued.access_token)).await;

        svc.reset_password(&state, &reset_request("brand-new-secret"))
            .await
            .unwrap();

        assert!(matches!(
            svc.verify_credentials("a@example.com", PASSWORD).await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(svc
            .verify_credentials("a@example.com", "brand-new-secret")
            .await
            .is_ok());

        // Outstanding tokens survive by default
        assert!(svc
            .introspect(Some(&issued.access_token))
            .await
            .is_authenticated());
    }

    #[tokio::test]
    async fn test_reset_password_can_revoke_outstanding_tokens() {
        let svc = service_with(PolicySettings {
            revoke_sessions_on_password_reset: true,
            ..PolicySettings::default()
        });
        let user = svc.create_user("a@example.com", PASSWORD).await.unwrap();
        let issued = svc
            .signer()
            .issue_at(user.id, &user.email, Utc::now() - ChronoDuration::seconds(5))
            .unwrap();
        let state = svc.introspect(Some(&issued.access_token)).await;

        svc.reset_password(&state, &reset_request("brand-new-secret"))
            .await
            .unwrap();

        assert_eq!(
            svc.introspect(Some(&issued.access_token)).await,
            SessionState::Rejected(RejectReason::Revoked)
        );
    }

    #[tokio::test]
    async fn test_reset_revokes_tokens_from_the_same_second() {
        let svc = service_with(PolicySettings {
            revoke_sessions_on_password_reset: true,
            ..PolicySettings::default()
        });
        let user = svc.create_user("a@example.com", PASSWORD).await.unwrap();
        let issued = svc.issue_token(&user).await.unwrap();
        let other = svc.issue_token(&user).await.unwrap();
        let state = svc.introspect(Some(&issued.access_token)).await;

        let replacement = svc
            .reset_password(&state, &reset_request("brand-new-secret"))
            .await
            .unwrap()
            .expect("replacement token");

        assert_eq!(
            svc.introspect(Some(&other.access_token)).await,
            SessionState::Rejected(RejectReason::Revoked)
        );
        assert_eq!(
            svc.introspect(Some(&issued.access_token)).await,
            SessionState::Rejected(RejectReason::Revoked)
        );
        assert!(svc
            .introspect(Some(&replacement.access_token))
            .await
            .is_authenticated());

        // A login right after the reset is dated past the marker
        let fresh = svc
            .login(&login_request("a@example.com", "brand-new-secret"))
            .await
            .unwrap();
        assert!(svc
            .introspect(Some(&fresh.access_token))
            .await
            .is_authenticated());
    }

    #[tokio::test]
    async fn test_second_reset_revokes_first_replacement() {
        let svc = service_with(PolicySettings {
            revoke_sessions_on_password_reset: true,
            ..PolicySettings::default()
        });
        let user = svc.create_user("a@example.com", PASSWORD).await.unwrap();
        let issued = svc.issue_token(&user).await.unwrap();
        let state = svc.introspect(Some(&issued.access_token)).await;

        let first = svc
            .reset_password(&state, &reset_request("brand-new-secret"))
            .await
            .unwrap()
            .expect("replacement token");
        let state = svc.introspect(Some(&first.access_token)).await;
        let second = svc
            .reset_password(&state, &reset_request("another-secret"))
            .await
            .unwrap()
            .expect("replacement token");

        assert_eq!(
            svc.introspect(Some(&first.access_token)).await,
            SessionState::Rejected(RejectReason::Revoked)
        );
        assert!(svc
            .introspect(Some(&second.access_token))
            .await
            .is_authenticated());
    }

    #[tokio::test]
    async fn test_reset_without_revocation_returns_no_token() {
        let svc = service();
        let user = svc.create_user("a@example.com", PASSWORD).await.unwrap();
        let issued = svc.issue_token(&user).await.unwrap();
        let state = svc.introspect(Some(&issued.access_token)).await;

        let replacement = svc
            .reset_password(&state, &reset_request("brand-new-secret"))
            .await
            .unwrap();
        assert!(replacement.is_none());
    }

    #[tokio::test]
    async fn test_reset_password_requires_session() {
        let svc = service();
        let err = svc
            .reset_password(&SessionState::Guest, &reset_request("brand-new-secret"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_reset_password_rejects_mismatch() {
        let svc = service();
        let user = svc.create_user("a@example.com", PASSWORD).await.unwrap();
        let issued = svc.issue_token(&user).await.unwrap();
        let state = svc.introspect(Some(&issued.access_token)).await;

        let request = ResetPasswordRequest {
            password: "brand-new-secret".into(),
            password_confirmation: "brand-new-secreT".into(),
        };
        let err = svc.reset_password(&state, &request).await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));

        assert!(svc.verify_credentials("a@example.com", PASSWORD).await.is_ok());
    }

    mock! {
        pub Store {}

        #[async_trait]
        impl RevocationStore for Store {
            async fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<bool>;
            async fn is_revoked(&self, jti: &str) -> Result<bool>;
            async fn revoke_all_for_user(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()>;
            async fn user_revoked_at(&self, user_id: Uuid) -> Result<Option<DateTime<Utc>>>;
            async fn prune_expired(&self) -> Result<usize>;
        }
    }

    #[tokio::test]
    async fn test_store_failure_fails_closed() {
        let mut store = MockStore::new();
        store
            .expect_is_revoked()
            .returning(|_| Err(AuthError::Redis("connection refused".into())));
        store.expect_revoke().never();

        let svc = AuthService::new(
            Arc::new(InMemoryUserRepository::new()),
            Arc::new(store),
            signer(),
            PolicySettings::default(),
        );
        let issued = svc
            .signer()
            .issue(Uuid::new_v4(), "a@example.com")
            .unwrap();

        let state = svc.introspect(Some(&issued.access_token)).await;
        assert_eq!(state, SessionState::Rejected(RejectReason::Unavailable));
        assert!(matches!(
            svc.logout(&state).await,
            Err(AuthError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn test_reset_keeps_password_when_revocation_fails() {
        let mut store = MockStore::new();
        store.expect_user_revoked_at().returning(|_| Ok(None));
        store
            .expect_revoke_all_for_user()
            .times(1)
            .returning(|_, _| Err(AuthError::Redis("connection refused".into())));

        let svc = AuthService::new(
            Arc::new(InMemoryUserRepository::new()),
            Arc::new(store),
            signer(),
            PolicySettings {
                revoke_sessions_on_password_reset: true,
                ..PolicySettings::default()
            },
        );
        let user = svc.create_user("a@example.com", PASSWORD).await.unwrap();
        let now = Utc::now();
        let state = SessionState::Authenticated(AuthenticatedSession {
            user_id: user.id,
            email: user.email.clone(),
            jti: Uuid::new_v4().to_string(),
            issued_at: now,
            expires_at: now + ChronoDuration::hours(1),
        });

        let err = svc
            .reset_password(&state, &reset_request("brand-new-secret"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Redis(_)));

        assert!(svc.verify_credentials("a@example.com", PASSWORD).await.is_ok());
        assert!(matches!(
            svc.verify_credentials("a@example.com", "brand-new-secret")
                .await,
            Err(AuthError::InvalidCredentials)
        ));
    }
}
