//! User persistence.
//!
//! The data store is an external collaborator; [`InMemoryUserRepository`] stands
//! in for it in tests and local runs.

use std::collections::HashMap;
use std::sync::RwLock;

use userstream_core::UserId;

use crate::user::User;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("user {0} not found")]
    NotFound(UserId),

    #[error("email `{0}` is already taken")]
    DuplicateEmail(String),

    #[error("user {0} already exists")]
    DuplicateId(UserId),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub trait UserRepository: Send + Sync {
    fn create(&self, user: &User) -> Result<(), RepositoryError>;

    fn get(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;

    /// Overwrite an existing user.
    fn update(&self, user: &User) -> Result<(), RepositoryError>;

    fn delete(&self, id: UserId) -> Result<(), RepositoryError>;

    /// Users ordered by creation time, then id.
    fn list(&self, limit: usize, offset: usize) -> Result<Vec<User>, RepositoryError>;

    fn count(&self) -> Result<usize, RepositoryError>;
}

#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<UserId, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> RepositoryError {
    RepositoryError::Unavailable("lock poisoned".into())
}

fn email_taken(users: &HashMap<UserId, User>, email: &str, except: UserId) -> bool {
    users
        .values()
        .any(|u| u.id != except && u.email.eq_ignore_ascii_case(email))
}

impl UserRepository for InMemoryUserRepository {
    fn create(&self, user: &User) -> Result<(), RepositoryError> {
        let mut users = self.users.write().map_err(poisoned)?;
        if users.contains_key(&user.id) {
            return Err(RepositoryError::DuplicateId(user.id));
        }
        if email_taken(&users, &user.email, user.id) {
            return Err(RepositoryError::DuplicateEmail(user.email.clone()));
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    fn get(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.read().map_err(poisoned)?.get(&id).cloned())
    }

    fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .users
            .read()
            .map_err(poisoned)?
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    fn update(&self, user: &User) -> Result<(), RepositoryError> {
        let mut users = self.users.write().map_err(poisoned)?;
        if !users.contains_key(&user.id) {
            return Err(RepositoryError::NotFound(user.id));
        }
        if email_taken(&users, &user.email, user.id) {
            return Err(RepositoryError::DuplicateEmail(user.email.clone()));
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    fn delete(&self, id: UserId) -> Result<(), RepositoryError> {
        self.users
            .write()
            .map_err(poisoned)?
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound(id))
    }

    fn list(&self, limit: usize, offset: usize) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().map_err(poisoned)?;
        let mut all: Vec<&User> = users.values().collect();
        all.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.as_uuid().cmp(b.id.as_uuid()))
        });
        Ok(all.into_iter().skip(offset).take(limit).cloned().collect())
    }

    fn count(&self) -> Result<usize, RepositoryError> {
        Ok(self.users.read().map_err(poisoned)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn user(email: &str) -> User {
        User::new(UserId::new(), email, "Someone", Utc::now()).unwrap()
    }

    #[test]
    fn create_get_delete() {
        let repo = InMemoryUserRepository::new();
        let u = user("a@example.com");

        repo.create(&u).unwrap();
        assert_eq!(repo.get(u.id).unwrap(), Some(u.clone()));
        assert_eq!(repo.count().unwrap(), 1);

        repo.delete(u.id).unwrap();
        assert_eq!(repo.get(u.id).unwrap(), None);
        assert_eq!(repo.delete(u.id), Err(RepositoryError::NotFound(u.id)));
    }

    #[test]
    fn emails_are_unique_case_insensitively() {
        let repo = InMemoryUserRepository::new();
        repo.create(&user("a@example.com")).unwrap();

        let err = repo.create(&user("A@Example.com")).unwrap_err();
        assert!(matches!(err, RepositoryError::DuplicateEmail(_)));
        assert!(repo.find_by_email("A@EXAMPLE.COM").unwrap().is_some());
    }

    #[test]
    fn update_requires_existing_user() {
        let repo = InMemoryUserRepository::new();
        let u = user("a@example.com");
        assert_eq!(repo.update(&u), Err(RepositoryError::NotFound(u.id)));
    }

    #[test]
    fn update_may_keep_own_email() {
        let repo = InMemoryUserRepository::new();
        let mut u = user("a@example.com");
        repo.create(&u).unwrap();

        u.name = "Renamed".into();
        repo.update(&u).unwrap();
        assert_eq!(repo.get(u.id).unwrap().unwrap().name, "Renamed");
    }

    #[test]
    fn list_pages_in_creation_order() {
        let repo = InMemoryUserRepository::new();
        let start = Utc::now();
        let ids: Vec<UserId> = (0..5)
            .map(|i| {
                let u = User::new(
                    UserId::new(),
                    format!("u{i}@example.com"),
                    "User",
                    start + Duration::seconds(i),
                )
                .unwrap();
                repo.create(&u).unwrap();
                u.id
            })
            .collect();

        let page: Vec<UserId> = repo.list(2, 1).unwrap().into_iter().map(|u| u.id).collect();
        assert_eq!(page, ids[1..3].to_vec());
    }
}
