//! Shared setup for HTTP integration tests
#![allow(dead_code)]

use chrono::Utc;
use session_service::{
    config::PolicySettings,
    db::InMemoryUserRepository,
    fixtures::{CreatedUser, UserFixture},
    security::{InMemoryRevocationStore, RevocationStore},
    AuthService,
};
use crypto_core::TokenSigner;
use std::sync::Arc;
use uuid::Uuid;

pub const SECRET: &str = "integration-test-secret-at-least-32-bytes-long";
pub const ISSUER: &str = "session-service";

pub struct TestContext {
    pub auth: Arc<AuthService>,
    pub users: Arc<InMemoryUserRepository>,
    pub revocations: Arc<InMemoryRevocationStore>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_policy(PolicySettings::default())
    }

    pub fn with_policy(policy: PolicySettings) -> Self {
        let users = Arc::new(InMemoryUserRepository::new());
        let revocations = Arc::new(InMemoryRevocationStore::new(3600));
        Self::with_store(policy, users, revocations.clone(), revocations)
    }

    pub fn with_store(
        policy: PolicySettings,
        users: Arc<InMemoryUserRepository>,
        revocations: Arc<InMemoryRevocationStore>,
        store: Arc<dyn RevocationStore>,
    ) -> Self {
        let signer = Arc::new(TokenSigner::new(SECRET, ISSUER, 3600).expect("signer"));
        let auth = Arc::new(AuthService::new(users.clone(), store, signer, policy));
        Self {
            auth,
            users,
            revocations,
        }
    }

    pub async fn user(&self) -> CreatedUser {
        UserFixture::new()
            .create(&self.auth)
            .await
            .expect("create fixture user")
    }

    /// Token for `user` minted `age_secs` seconds in the past
    pub fn token_aged(&self, user_id: Uuid, email: &str, age_secs: i64) -> String {
        self.auth
            .signer()
            .issue_at(user_id, email, Utc::now() - chrono::Duration::seconds(age_secs))
            .expect("issue token")
            .access_token
    }
}

/// Build the service under test wired like the binary
macro_rules! test_app {
    ($auth:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .wrap(actix_middleware::SessionMiddleware::new($auth.clone()))
                .app_data(actix_web::web::Data::new(session_service::AppState::new(
                    $auth.clone(),
                )))
                .configure(session_service::routes::configure),
        )
        .await
    };
}

pub(crate) use test_app;
