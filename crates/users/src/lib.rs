//! `userstream-users`: the user domain on both sides of the stream.
//!
//! - write path: [`UserService`] persists through a [`UserRepository`] and then
//!   publishes a [`UserEvent`]
//! - read path: [`UserEventHandlers`] react to those events in the consumer

pub mod events;
pub mod handlers;
pub mod repository;
pub mod service;
pub mod user;

pub use events::{UserCreated, UserDeleted, UserEvent, UserUpdated};
pub use handlers::{HandlerCounts, UserEventHandlers};
pub use repository::{InMemoryUserRepository, RepositoryError, UserRepository};
pub use service::{ServiceError, UserService};
pub use user::User;
