//! Broker transport abstraction (mechanics only).
//!
//! This module defines the seams between the pipeline and a concrete broker:
//!
//! - [`RecordSink`]: writes one record to a topic and blocks until the broker
//!   acknowledges it (or the send fails).
//! - [`RecordSource`]: reads records from a subscribed topic one at a time.
//! - [`TopicAdmin`]: creates topics.
//! - [`EventPublisher`]: what an upstream write path depends on to publish a
//!   typed domain event.
//!
//! ## Delivery Semantics
//!
//! Transports are expected to provide **at-least-once** delivery with per-partition
//! ordering. The consumer loop in `userstream-infra` commits offsets on a timer,
//! independently of handler outcomes, so from the application's point of view a
//! failed handler is **not** redelivered.
//!
//! ## Ownership
//!
//! A sink may be shared between threads (`Send + Sync`); concurrent sends are
//! independent. A source is owned by exactly one consumer loop (`Send` only) and
//! must be closed when that loop exits.

use std::sync::Arc;
use std::time::Duration;

use userstream_core::EventId;

use crate::envelope::Headers;

/// A record as written to / read from a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Routing key; records with the same key land on the same partition.
    pub key: Option<Vec<u8>>,
    pub headers: Headers,
    pub value: Vec<u8>,
}

impl Record {
    pub fn new(value: Vec<u8>) -> Self {
        Self {
            key: None,
            headers: Headers::new(),
            value,
        }
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// The key as UTF-8, if present and valid.
    pub fn key_str(&self) -> Option<&str> {
        self.key
            .as_deref()
            .and_then(|k| core::str::from_utf8(k).ok())
    }
}

/// A record read from a topic, with its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub record: Record,
}

/// Where the broker stored an acknowledged record.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub partition: i32,
    pub offset: i64,
}

/// Result of a successful publish.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub event_id: EventId,
    pub partition: i32,
    pub offset: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("could not connect: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("read failed: {0}")]
    Read(String),

    #[error("commit failed: {0}")]
    Commit(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// Whether the operation may succeed if simply tried again.
    pub fn is_retriable(&self) -> bool {
        !matches!(self, TransportError::Closed)
    }
}

/// Write side of a broker.
pub trait RecordSink: Send + Sync {
    /// Write `record` to `topic`, blocking until the configured acknowledgment
    /// level is reached.
    fn send(&self, topic: &str, record: Record) -> Result<Delivery, TransportError>;

    /// Wait for any in-flight sends to finish.
    fn flush(&self, _timeout: Duration) -> Result<(), TransportError> {
        Ok(())
    }
}

impl<S> RecordSink for Arc<S>
where
    S: RecordSink + ?Sized,
{
    fn send(&self, topic: &str, record: Record) -> Result<Delivery, TransportError> {
        (**self).send(topic, record)
    }

    fn flush(&self, timeout: Duration) -> Result<(), TransportError> {
        (**self).flush(timeout)
    }
}

/// Read side of a broker, bound to one topic and consumer group.
pub trait RecordSource: Send {
    /// Block for up to `timeout` waiting for the next record.
    ///
    /// `Ok(None)` means nothing arrived in time. `Err(TransportError::Closed)`
    /// means the source will never produce again.
    fn poll(&mut self, timeout: Duration) -> Result<Option<ReceivedRecord>, TransportError>;

    /// Persist the positions of every record returned by `poll` so far.
    fn commit(&mut self) -> Result<(), TransportError>;

    /// Release the underlying connection. Further polls return `Closed`.
    fn close(&mut self) -> Result<(), TransportError>;
}

impl<S> RecordSource for Box<S>
where
    S: RecordSource + ?Sized,
{
    fn poll(&mut self, timeout: Duration) -> Result<Option<ReceivedRecord>, TransportError> {
        (**self).poll(timeout)
    }

    fn commit(&mut self) -> Result<(), TransportError> {
        (**self).commit()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }
}

/// Declared shape of a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    pub name: String,
    /// Bounds consumer parallelism within one group.
    pub partitions: i32,
    pub replication_factor: i32,
}

impl TopicSpec {
    pub fn new(name: impl Into<String>, partitions: i32, replication_factor: i32) -> Self {
        Self {
            name: name.into(),
            partitions,
            replication_factor,
        }
    }

    pub fn validate(&self) -> Result<(), AdminError> {
        if self.name.trim().is_empty() {
            return Err(AdminError::InvalidSpec("topic name must not be empty".into()));
        }
        if self.partitions < 1 {
            return Err(AdminError::InvalidSpec(format!(
                "topic `{}`: partition count must be at least 1 (got {})",
                self.name, self.partitions
            )));
        }
        if self.replication_factor < 1 {
            return Err(AdminError::InvalidSpec(format!(
                "topic `{}`: replication factor must be at least 1 (got {})",
                self.name, self.replication_factor
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdminError {
    #[error("topic `{0}` already exists")]
    AlreadyExists(String),

    #[error("invalid topic spec: {0}")]
    InvalidSpec(String),

    #[error("broker unreachable: {0}")]
    Unreachable(String),

    #[error("broker refused to create topic `{topic}`: {reason}")]
    Refused { topic: String, reason: String },
}

/// Topic administration.
pub trait TopicAdmin: Send + Sync {
    /// Create a topic. An existing topic is reported as [`AdminError::AlreadyExists`].
    fn create_topic(&self, spec: &TopicSpec) -> Result<(), AdminError>;
}

impl<A> TopicAdmin for Arc<A>
where
    A: TopicAdmin + ?Sized,
{
    fn create_topic(&self, spec: &TopicSpec) -> Result<(), AdminError> {
        (**self).create_topic(spec)
    }
}

/// Publishes typed domain events.
///
/// This is the only thing an upstream write path needs to know about the
/// pipeline: it is called after the data-store mutation commits, and a returned
/// error means the broker did not accept the event.
pub trait EventPublisher<E>: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn publish(&self, event: &E) -> Result<PublishReceipt, Self::Error>;
}

impl<E, P> EventPublisher<E> for Arc<P>
where
    P: EventPublisher<E> + ?Sized,
{
    type Error = P::Error;

    fn publish(&self, event: &E) -> Result<PublishReceipt, Self::Error> {
        (**self).publish(event)
    }
}
