/// In-memory user repository
use async_trait::async_trait;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use uuid::Uuid;

use super::UserRepository;
use crate::error::{AuthError, Result};
use crate::models::User;

#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    users: DashMap<Uuid, User>,
    by_email: DashMap<String, Uuid>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let Some(id) = self.by_email.get(email).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        let mut user = self.users.get_mut(&user_id).ok_or(AuthError::UserNotFound)?;
        user.password_hash = password_hash.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn create(&self, user: &User) -> Result<User> {
        match self.by_email.entry(user.email.clone()) {
            Entry::Occupied(_) => Err(AuthError::EmailAlreadyExists),
            Entry::Vacant(slot) => {
                self.users.insert(user.id, user.clone());
                slot.insert(user.id);
                Ok(user.clone())
            }
        }
    }
}
