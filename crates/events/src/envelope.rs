use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use userstream_core::EventId;

use crate::codec::{CodecError, EncodingScheme};
use crate::event::Event;

/// Header carrying the envelope id.
pub const EVENT_ID_HEADER: &str = "event_id";
/// Header carrying the producer-side creation time (Unix seconds).
pub const TIMESTAMP_HEADER: &str = "timestamp";
/// Header carrying the event type tag used for dispatch.
pub const EVENT_TYPE_HEADER: &str = "event_type";
/// Header describing how the record value is encoded.
pub const CONTENT_TYPE_HEADER: &str = "content_type";

/// Ordered string-to-string metadata attached to a record.
///
/// Insertion order is preserved; inserting an existing key replaces its value
/// in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

/// The unit exchanged over the broker.
///
/// An envelope is built once at publish time, is immutable in transit and is
/// decoded once on the consumer side. The `event_type` tag is mirrored into the
/// `event_type` header so consumers can route before touching the payload.
///
/// `timestamp` is a producer-side ordering hint only; it is kept at whole-second
/// precision because the header form is Unix seconds. Broker offset order is
/// authoritative within a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEnvelope {
    id: EventId,
    event_type: String,
    timestamp: DateTime<Utc>,
    headers: Headers,
    payload: Vec<u8>,
}

impl EventEnvelope {
    /// Build an envelope from its parts and attach the standard headers.
    pub fn new(
        id: EventId,
        event_type: impl Into<String>,
        timestamp: DateTime<Utc>,
        content_type: &str,
        payload: Vec<u8>,
    ) -> Result<Self, CodecError> {
        let event_type = event_type.into();
        if event_type.trim().is_empty() {
            return Err(CodecError::EmptyEventType);
        }
        let timestamp = timestamp.trunc_subsecs(0);

        let headers = Headers::new()
            .with(EVENT_ID_HEADER, id.to_string())
            .with(TIMESTAMP_HEADER, timestamp.timestamp().to_string())
            .with(EVENT_TYPE_HEADER, event_type.clone())
            .with(CONTENT_TYPE_HEADER, content_type);

        Ok(Self {
            id,
            event_type,
            timestamp,
            headers,
            payload,
        })
    }

    /// Wrap a domain event with a freshly generated id and the current time.
    ///
    /// The `content_type` header is taken from the encoding scheme the envelope
    /// will be written with.
    pub fn from_event<E: Event>(event: &E, scheme: EncodingScheme) -> Result<Self, CodecError> {
        let payload = event.encode_payload()?;
        Self::new(
            EventId::new(),
            event.event_type(),
            Utc::now(),
            scheme.content_type(),
            payload,
        )
    }

    /// Reassemble an envelope read off the wire, keeping the headers as received.
    pub(crate) fn from_wire(
        id: EventId,
        event_type: String,
        timestamp: DateTime<Utc>,
        headers: Headers,
        payload: Vec<u8>,
    ) -> Result<Self, CodecError> {
        if event_type.trim().is_empty() {
            return Err(CodecError::EmptyEventType);
        }
        Ok(Self {
            id,
            event_type,
            timestamp,
            headers,
            payload,
        })
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Decode the payload into a typed event, selected by this envelope's tag.
    pub fn decode<E: Event>(&self) -> Result<E, CodecError> {
        E::decode_payload(&self.event_type, &self.payload)
    }
}
