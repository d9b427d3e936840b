use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use userstream_core::EventId;

use crate::codec::CodecError;
use crate::envelope::Headers;

/// Where a dispatched event came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerContext {
    pub event_id: EventId,
    pub timestamp: DateTime<Utc>,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("payload could not be decoded: {0}")]
    Decode(#[from] CodecError),

    #[error("{0}")]
    Failed(String),

    #[error("handler took {elapsed:?}, limit is {limit:?}")]
    TimedOut { limit: Duration, elapsed: Duration },

    #[error("handler panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Reaction to one event type.
///
/// Invoked synchronously by the consumer loop, one event at a time. A returned
/// error is logged and counted; it is not retried and does not hold back the
/// committed offset.
pub trait EventHandler: Send + Sync {
    fn handle(
        &self,
        ctx: &HandlerContext,
        event_type: &str,
        headers: &Headers,
        payload: &[u8],
    ) -> Result<(), HandlerError>;
}

impl<F> EventHandler for F
where
    F: Fn(&HandlerContext, &str, &Headers, &[u8]) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(
        &self,
        ctx: &HandlerContext,
        event_type: &str,
        headers: &Headers,
        payload: &[u8],
    ) -> Result<(), HandlerError> {
        self(ctx, event_type, headers, payload)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("event type must not be empty")]
    EmptyType,
}

/// Outcome of a registry lookup.
pub enum Route<'a> {
    Registered(&'a dyn EventHandler),
    Fallback(&'a dyn EventHandler),
    Unhandled,
}

impl core::fmt::Debug for Route<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Route::Registered(_) => "Registered",
            Route::Fallback(_) => "Fallback",
            Route::Unhandled => "Unhandled",
        })
    }
}

/// Immutable type-tag → handler map, built once before the loop starts.
///
/// Lookup is by exact tag; there is no wildcard or prefix matching.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
    fallback: Option<Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    pub fn route(&self, event_type: &str) -> Route<'_> {
        if let Some(handler) = self.handlers.get(event_type) {
            return Route::Registered(handler.as_ref());
        }
        match &self.fallback {
            Some(handler) => Route::Fallback(handler.as_ref()),
            None => Route::Unhandled,
        }
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }

    /// Registered tags, sorted.
    pub fn event_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl core::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("event_types", &self.event_types())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
    fallback: Option<Arc<dyn EventHandler>>,
}

impl HandlerRegistryBuilder {
    /// Register `handler` for `event_type`, replacing any earlier registration.
    pub fn register<H>(mut self, event_type: impl Into<String>, handler: H) -> Result<Self, RegistryError>
    where
        H: EventHandler + 'static,
    {
        let event_type = event_type.into();
        if event_type.trim().is_empty() {
            return Err(RegistryError::EmptyType);
        }
        if self
            .handlers
            .insert(event_type.clone(), Arc::new(handler))
            .is_some()
        {
            tracing::warn!(event_type = %event_type, "replacing previously registered handler");
        }
        Ok(self)
    }

    /// Handler for tags with no registration. Without one, such events are dropped.
    pub fn fallback<H>(mut self, handler: H) -> Self
    where
        H: EventHandler + 'static,
    {
        self.fallback = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
            fallback: self.fallback,
        }
    }
}
