//! Producer: typed event → envelope → record → broker.

use core::str::FromStr;
use std::time::Duration;

use tracing::{error, info, instrument};

use userstream_events::{
    CodecError, EncodingScheme, Event, EventEnvelope, EventPublisher, PublishReceipt, RecordSink,
    TransportError, encode_envelope,
};

use crate::config::StreamConfig;

/// What the record key is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoutingKey {
    /// The event's entity id, so one entity's events stay on one partition.
    /// Events without an entity fall back to their event id.
    #[default]
    Entity,
    /// A fresh key per event; no ordering across events of the same entity.
    Event,
}

impl FromStr for RoutingKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entity" => Ok(RoutingKey::Entity),
            "event" => Ok(RoutingKey::Event),
            other => Err(format!("expected entity|event, got `{other}`")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("could not encode event: {0}")]
    Codec(#[from] CodecError),

    #[error("broker did not accept event: {0}")]
    Transport(#[from] TransportError),
}

/// Publishes typed events to one topic.
///
/// `publish` blocks until the sink reports the broker's acknowledgment. Shared
/// use from several threads is fine when the sink is.
pub struct EventProducer<S> {
    sink: S,
    topic: String,
    encoding: EncodingScheme,
    routing_key: RoutingKey,
    flush_timeout: Duration,
}

impl<S> EventProducer<S>
where
    S: RecordSink,
{
    pub fn new(sink: S, topic: impl Into<String>) -> Self {
        Self {
            sink,
            topic: topic.into(),
            encoding: EncodingScheme::default(),
            routing_key: RoutingKey::default(),
            flush_timeout: Duration::from_secs(5),
        }
    }

    /// Producer for the user-events topic with the configured encoding and keying.
    pub fn from_config(sink: S, config: &StreamConfig) -> Self {
        Self::new(sink, config.user_events_topic.clone())
            .with_encoding(config.encoding)
            .with_routing_key(config.routing_key)
            .with_flush_timeout(config.publish_timeout)
    }

    pub fn with_encoding(mut self, encoding: EncodingScheme) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_routing_key(mut self, routing_key: RoutingKey) -> Self {
        self.routing_key = routing_key;
        self
    }

    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    #[instrument(skip_all, fields(topic = %self.topic, event_type = event.event_type()))]
    pub fn publish<E: Event>(&self, event: &E) -> Result<PublishReceipt, PublishError> {
        let envelope = EventEnvelope::from_event(event, self.encoding)?;
        let key = match self.routing_key {
            RoutingKey::Entity => event
                .entity_key()
                .unwrap_or_else(|| envelope.id().to_string()),
            RoutingKey::Event => envelope.id().to_string(),
        };
        let record = encode_envelope(&envelope, Some(key.into_bytes()), self.encoding)?;

        match self.sink.send(&self.topic, record) {
            Ok(delivery) => {
                info!(
                    event_id = %envelope.id(),
                    partition = delivery.partition,
                    offset = delivery.offset,
                    "event published"
                );
                Ok(PublishReceipt {
                    event_id: envelope.id(),
                    partition: delivery.partition,
                    offset: delivery.offset,
                })
            }
            Err(err) => {
                error!(event_id = %envelope.id(), error = %err, "failed to publish event");
                Err(err.into())
            }
        }
    }

    /// Flush in-flight sends and release the sink.
    pub fn close(self) -> Result<(), PublishError> {
        self.sink.flush(self.flush_timeout)?;
        Ok(())
    }
}

impl<E, S> EventPublisher<E> for EventProducer<S>
where
    E: Event,
    S: RecordSink,
{
    type Error = PublishError;

    fn publish(&self, event: &E) -> Result<PublishReceipt, PublishError> {
        EventProducer::publish(self, event)
    }
}
