//! User domain events.
//!
//! One struct per wire-level type tag; [`UserEvent`] closes over them. Payloads
//! are flat JSON objects of the struct fields.

use serde::{Deserialize, Serialize};

use userstream_core::UserId;
use userstream_events::Event;
use userstream_events::codec::{CodecError, from_json, to_json};

pub const USER_CREATED: &str = "user.created";
pub const USER_UPDATED: &str = "user.updated";
pub const USER_DELETED: &str = "user.deleted";

/// Every tag this crate produces.
pub const USER_EVENT_TYPES: [&str; 3] = [USER_CREATED, USER_UPDATED, USER_DELETED];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreated {
    pub user_id: UserId,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdated {
    pub user_id: UserId,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDeleted {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserEvent {
    Created(UserCreated),
    Updated(UserUpdated),
    Deleted(UserDeleted),
}

impl UserEvent {
    pub fn user_id(&self) -> UserId {
        match self {
            UserEvent::Created(e) => e.user_id,
            UserEvent::Updated(e) => e.user_id,
            UserEvent::Deleted(e) => e.user_id,
        }
    }
}

impl Event for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::Created(_) => USER_CREATED,
            UserEvent::Updated(_) => USER_UPDATED,
            UserEvent::Deleted(_) => USER_DELETED,
        }
    }

    fn entity_key(&self) -> Option<String> {
        Some(self.user_id().to_string())
    }

    fn encode_payload(&self) -> Result<Vec<u8>, CodecError> {
        match self {
            UserEvent::Created(e) => to_json(e),
            UserEvent::Updated(e) => to_json(e),
            UserEvent::Deleted(e) => to_json(e),
        }
    }

    fn decode_payload(event_type: &str, payload: &[u8]) -> Result<Self, CodecError> {
        match event_type {
            USER_CREATED => from_json(payload).map(UserEvent::Created),
            USER_UPDATED => from_json(payload).map(UserEvent::Updated),
            USER_DELETED => from_json(payload).map(UserEvent::Deleted),
            other => Err(CodecError::UnknownEventType(other.to_string())),
        }
    }
}

impl From<UserCreated> for UserEvent {
    fn from(value: UserCreated) -> Self {
        UserEvent::Created(value)
    }
}

impl From<UserUpdated> for UserEvent {
    fn from(value: UserUpdated) -> Self {
        UserEvent::Updated(value)
    }
}

impl From<UserDeleted> for UserEvent {
    fn from(value: UserDeleted) -> Self {
        UserEvent::Deleted(value)
    }
}
