/// Identity fixtures for tests and local seeding
///
/// Built explicitly; nothing here is reachable over HTTP.
use crate::error::Result;
use crate::models::User;
use crate::services::AuthService;

pub const TEST_EMAIL: &str = "test@example.com";
pub const TEST_PASSWORD: &str = "SecurePass123!";

/// Builder for a stored identity with a known password
#[derive(Debug, Clone)]
pub struct UserFixture {
    email: String,
    password: String,
}

impl Default for UserFixture {
    fn default() -> Self {
        Self {
            email: TEST_EMAIL.to_string(),
            password: TEST_PASSWORD.to_string(),
        }
    }
}

impl UserFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Persist the identity and return it with its plaintext password
    pub async fn create(self, auth: &AuthService) -> Result<CreatedUser> {
        let user = auth.create_user(&self.email, &self.password).await?;
        Ok(CreatedUser {
            user,
            password: self.password,
        })
    }
}

/// A stored identity together with the password it was created with
#[derive(Debug, Clone)]
pub struct CreatedUser {
    pub user: User,
    pub password: String,
}
