//! Consumer-side reactions to user events.
//!
//! The reactions themselves are placeholders (structured logs); they fix the
//! shape of what a real side effect receives.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use userstream_events::{
    Event, HandlerContext, HandlerError, HandlerRegistryBuilder, Headers, RegistryError,
};

use crate::events::{UserCreated, UserDeleted, UserEvent, UserUpdated};

/// How many events of each type were handled successfully.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerCounts {
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
}

impl HandlerCounts {
    pub fn total(&self) -> u64 {
        self.created + self.updated + self.deleted
    }
}

#[derive(Debug, Default)]
pub struct UserEventHandlers {
    created: AtomicU64,
    updated: AtomicU64,
    deleted: AtomicU64,
}

impl UserEventHandlers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn processed(&self) -> HandlerCounts {
        HandlerCounts {
            created: self.created.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
        }
    }

    /// Register a handler for every user event tag.
    pub fn register(
        self: &Arc<Self>,
        mut builder: HandlerRegistryBuilder,
    ) -> Result<HandlerRegistryBuilder, RegistryError> {
        for tag in crate::events::USER_EVENT_TYPES {
            let this = Arc::clone(self);
            builder = builder.register(
                tag,
                move |ctx: &HandlerContext, event_type: &str, headers: &Headers, payload: &[u8]| {
                    this.dispatch(ctx, event_type, headers, payload)
                },
            )?;
        }
        Ok(builder)
    }

    /// Decode a payload by its tag and run the matching reaction.
    pub fn dispatch(
        &self,
        ctx: &HandlerContext,
        event_type: &str,
        headers: &Headers,
        payload: &[u8],
    ) -> Result<(), HandlerError> {
        let event = UserEvent::decode_payload(event_type, payload)?;
        tracing::debug!(
            event_id = %ctx.event_id,
            event_type = event.event_type(),
            headers = headers.len(),
            "dispatching user event"
        );

        match &event {
            UserEvent::Created(e) => self.on_created(ctx, e),
            UserEvent::Updated(e) => self.on_updated(ctx, e),
            UserEvent::Deleted(e) => self.on_deleted(ctx, e),
        }
    }

    fn on_created(&self, ctx: &HandlerContext, event: &UserCreated) -> Result<(), HandlerError> {
        tracing::info!(
            event_id = %ctx.event_id,
            user_id = %event.user_id,
            email = %event.email,
            name = %event.name,
            "user created"
        );
        self.created.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn on_updated(&self, ctx: &HandlerContext, event: &UserUpdated) -> Result<(), HandlerError> {
        tracing::info!(
            event_id = %ctx.event_id,
            user_id = %event.user_id,
            email = %event.email,
            name = %event.name,
            "user updated"
        );
        self.updated.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn on_deleted(&self, ctx: &HandlerContext, event: &UserDeleted) -> Result<(), HandlerError> {
        tracing::info!(
            event_id = %ctx.event_id,
            user_id = %event.user_id,
            "user deleted"
        );
        self.deleted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
