//! User write path.
//!
//! Every mutation commits to the repository first and publishes afterwards. If
//! the publish fails the mutation stays committed and the caller gets
//! [`ServiceError::Publish`]; there is no compensation or outbox.

use chrono::Utc;

use userstream_core::{DomainError, UserId};
use userstream_events::{Event, EventPublisher, PublishReceipt};

use crate::events::{UserCreated, UserDeleted, UserEvent, UserUpdated};
use crate::repository::{RepositoryError, UserRepository};
use crate::user::User;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("user {0} not found")]
    NotFound(UserId),

    #[error("repository error: {0}")]
    Repository(RepositoryError),

    /// The mutation was committed but its event was not accepted by the broker.
    #[error("`{event_type}` was committed but could not be published: {source}")]
    Publish {
        event_type: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => ServiceError::NotFound(id),
            RepositoryError::DuplicateEmail(email) => {
                ServiceError::Domain(DomainError::conflict(format!("email `{email}` is already taken")))
            }
            other => ServiceError::Repository(other),
        }
    }
}

pub struct UserService<R, P> {
    repository: R,
    publisher: P,
}

impl<R, P> UserService<R, P>
where
    R: UserRepository,
    P: EventPublisher<UserEvent>,
{
    pub fn new(repository: R, publisher: P) -> Self {
        Self {
            repository,
            publisher,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn create_user(&self, email: &str, name: &str) -> Result<User, ServiceError> {
        let user = User::new(UserId::new(), email, name, Utc::now())?;
        self.repository.create(&user)?;

        self.publish(UserEvent::Created(UserCreated {
            user_id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
        }))?;
        Ok(user)
    }

    pub fn get_user(&self, id: UserId) -> Result<User, ServiceError> {
        self.repository.get(id)?.ok_or(ServiceError::NotFound(id))
    }

    pub fn list_users(&self, limit: usize, offset: usize) -> Result<Vec<User>, ServiceError> {
        Ok(self.repository.list(limit, offset)?)
    }

    pub fn update_user(&self, id: UserId, email: &str, name: &str) -> Result<User, ServiceError> {
        let mut user = self.get_user(id)?;
        user.rename(email, name, Utc::now())?;
        self.repository.update(&user)?;

        self.publish(UserEvent::Updated(UserUpdated {
            user_id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
        }))?;
        Ok(user)
    }

    pub fn delete_user(&self, id: UserId) -> Result<(), ServiceError> {
        self.repository.delete(id)?;
        self.publish(UserEvent::Deleted(UserDeleted { user_id: id }))?;
        Ok(())
    }

    fn publish(&self, event: UserEvent) -> Result<PublishReceipt, ServiceError> {
        self.publisher
            .publish(&event)
            .map_err(|e| {
                let event_type = event.event_type();
                tracing::error!(
                    user_id = %event.user_id(),
                    event_type,
                    error = %e,
                    "mutation committed but event was not published"
                );
                ServiceError::Publish {
                    event_type,
                    source: Box::new(e),
                }
            })
    }
}
