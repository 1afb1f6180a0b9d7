/// User storage
///
/// `UserRepository` is the only way the service touches stored identities.
/// Postgres backs production; the in-memory variant serves local runs and tests.
pub mod memory;
pub mod users;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::User;

pub use memory::InMemoryUserRepository;
pub use users::PgUserRepository;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Overwrite the stored credential. `UserNotFound` if the user is gone.
    async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<()>;

    /// Insert a user. `EmailAlreadyExists` on a duplicate email.
    async fn create(&self, user: &User) -> Result<User>;
}
