//! The user entity managed by the CRUD service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use userstream_core::{DomainError, DomainResult, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Build a validated user. Email and name are trimmed.
    pub fn new(
        id: UserId,
        email: impl Into<String>,
        name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let (email, name) = validate(email.into(), name.into())?;
        Ok(Self {
            id,
            email,
            name,
            created_at: now,
            updated_at: now,
        })
    }

    /// Replace email and name; `created_at` is kept.
    pub fn rename(
        &mut self,
        email: impl Into<String>,
        name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        let (email, name) = validate(email.into(), name.into())?;
        self.email = email;
        self.name = name;
        self.updated_at = now;
        Ok(())
    }
}

fn validate(email: String, name: String) -> DomainResult<(String, String)> {
    let email = email.trim().to_string();
    let name = name.trim().to_string();

    if email.is_empty() || !email.contains('@') {
        return Err(DomainError::validation("invalid email"));
    }
    if name.is_empty() {
        return Err(DomainError::validation("name must not be empty"));
    }
    Ok((email, name))
}
