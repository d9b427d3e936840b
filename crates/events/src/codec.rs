//! Envelope codec: envelope ⇄ `(key, headers, value)` record.
//!
//! Two wire shapes are supported and a deployment picks one for its producers:
//!
//! - [`EncodingScheme::HeaderTagged`]: the value is the typed payload alone and
//!   the type tag travels in the `event_type` header, so consumers can route
//!   without parsing the body.
//! - [`EncodingScheme::Structured`]: the value is a self-contained JSON object
//!   `{ "id", "type", "timestamp", "data" }`.
//!
//! Both shapes attach the same four headers. Decoding tells them apart by the
//! `content_type` header, so a consumer reads either shape without being told
//! which one the producer used.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use userstream_core::EventId;

use crate::bus::Record;
use crate::envelope::{
    CONTENT_TYPE_HEADER, EVENT_ID_HEADER, EVENT_TYPE_HEADER, EventEnvelope, Headers,
    TIMESTAMP_HEADER,
};

/// Content type of a header-tagged record value (the bare JSON payload).
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Content type of a structured record value (the whole envelope as JSON).
pub const ENVELOPE_CONTENT_TYPE: &str = "application/vnd.userstream.envelope+json";

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("serialization failed: {0}")]
    Serialize(String),

    #[error("missing header `{0}`")]
    MissingHeader(&'static str),

    #[error("invalid header `{name}`: {reason}")]
    InvalidHeader { name: &'static str, reason: String },

    #[error("event type must not be empty")]
    EmptyEventType,

    #[error("unknown event type `{0}`")]
    UnknownEventType(String),

    #[error("malformed body: {0}")]
    MalformedBody(String),

    #[error("unknown encoding scheme `{0}`")]
    UnknownScheme(String),
}

impl CodecError {
    pub fn serialize(err: impl core::fmt::Display) -> Self {
        Self::Serialize(err.to_string())
    }

    pub fn malformed(err: impl core::fmt::Display) -> Self {
        Self::MalformedBody(err.to_string())
    }
}

/// How an envelope is laid out in a record value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodingScheme {
    #[default]
    HeaderTagged,
    Structured,
}

impl EncodingScheme {
    pub fn content_type(self) -> &'static str {
        match self {
            EncodingScheme::HeaderTagged => JSON_CONTENT_TYPE,
            EncodingScheme::Structured => ENVELOPE_CONTENT_TYPE,
        }
    }
}

impl FromStr for EncodingScheme {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "header" | "header-tagged" => Ok(EncodingScheme::HeaderTagged),
            "structured" | "envelope" => Ok(EncodingScheme::Structured),
            other => Err(CodecError::UnknownScheme(other.to_string())),
        }
    }
}

#[derive(Serialize)]
struct StructuredOut<'a> {
    id: EventId,
    #[serde(rename = "type")]
    event_type: &'a str,
    timestamp: DateTime<Utc>,
    data: &'a RawValue,
}

#[derive(Deserialize)]
struct StructuredIn {
    id: EventId,
    #[serde(rename = "type")]
    event_type: String,
    timestamp: DateTime<Utc>,
    data: Box<RawValue>,
}

/// Lay an envelope out as a record using `scheme`.
pub fn encode_envelope(
    envelope: &EventEnvelope,
    key: Option<Vec<u8>>,
    scheme: EncodingScheme,
) -> Result<Record, CodecError> {
    let mut headers = envelope.headers().clone();
    headers.insert(CONTENT_TYPE_HEADER, scheme.content_type());

    let value = match scheme {
        EncodingScheme::HeaderTagged => envelope.payload().to_vec(),
        EncodingScheme::Structured => {
            let text = core::str::from_utf8(envelope.payload()).map_err(CodecError::serialize)?;
            let data: &RawValue =
                serde_json::from_str(text).map_err(CodecError::serialize)?;
            serde_json::to_vec(&StructuredOut {
                id: envelope.id(),
                event_type: envelope.event_type(),
                timestamp: envelope.timestamp(),
                data,
            })
            .map_err(CodecError::serialize)?
        }
    };

    Ok(Record {
        key,
        headers,
        value,
    })
}

/// The routing tag of a record, read from its headers only.
///
/// Returns `None` when the tag is only available inside a structured body.
pub fn peek_event_type(record: &Record) -> Option<&str> {
    record
        .headers
        .get(EVENT_TYPE_HEADER)
        .filter(|tag| !tag.trim().is_empty())
}

/// Whether the record value is a structured envelope body.
///
/// Decided by `content_type`; without one, a record carrying an `event_type`
/// header is taken as header-tagged.
pub fn is_structured(record: &Record) -> bool {
    match record.headers.get(CONTENT_TYPE_HEADER) {
        Some(ENVELOPE_CONTENT_TYPE) => true,
        Some(_) => false,
        None => !record.headers.contains(EVENT_TYPE_HEADER),
    }
}

/// Rebuild the envelope carried by a record.
pub fn decode_record(record: &Record) -> Result<EventEnvelope, CodecError> {
    if is_structured(record) {
        decode_structured(record)
    } else {
        decode_header_tagged(record)
    }
}

fn decode_header_tagged(record: &Record) -> Result<EventEnvelope, CodecError> {
    let headers = &record.headers;

    let event_type = headers
        .get(EVENT_TYPE_HEADER)
        .ok_or(CodecError::MissingHeader(EVENT_TYPE_HEADER))?;

    let id = headers
        .get(EVENT_ID_HEADER)
        .ok_or(CodecError::MissingHeader(EVENT_ID_HEADER))?
        .parse::<EventId>()
        .map_err(|e| CodecError::InvalidHeader {
            name: EVENT_ID_HEADER,
            reason: e.to_string(),
        })?;

    let timestamp = parse_unix_seconds(
        headers
            .get(TIMESTAMP_HEADER)
            .ok_or(CodecError::MissingHeader(TIMESTAMP_HEADER))?,
    )?;

    EventEnvelope::from_wire(
        id,
        event_type.to_string(),
        timestamp,
        headers.clone(),
        record.value.clone(),
    )
}

fn decode_structured(record: &Record) -> Result<EventEnvelope, CodecError> {
    let body: StructuredIn =
        serde_json::from_slice(&record.value).map_err(CodecError::malformed)?;

    if let Some(tag) = record.headers.get(EVENT_TYPE_HEADER) {
        if tag != body.event_type {
            return Err(CodecError::InvalidHeader {
                name: EVENT_TYPE_HEADER,
                reason: format!("header says `{tag}`, body says `{}`", body.event_type),
            });
        }
    }

    // Headerless structured records still expose the standard headers downstream.
    let headers = if record.headers.is_empty() {
        Headers::new()
            .with(EVENT_ID_HEADER, body.id.to_string())
            .with(TIMESTAMP_HEADER, body.timestamp.timestamp().to_string())
            .with(EVENT_TYPE_HEADER, body.event_type.clone())
            .with(CONTENT_TYPE_HEADER, ENVELOPE_CONTENT_TYPE)
    } else {
        record.headers.clone()
    };

    EventEnvelope::from_wire(
        body.id,
        body.event_type,
        body.timestamp,
        headers,
        body.data.get().as_bytes().to_vec(),
    )
}

fn parse_unix_seconds(raw: &str) -> Result<DateTime<Utc>, CodecError> {
    let secs = raw.trim().parse::<i64>().map_err(|e| CodecError::InvalidHeader {
        name: TIMESTAMP_HEADER,
        reason: e.to_string(),
    })?;
    DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| CodecError::InvalidHeader {
        name: TIMESTAMP_HEADER,
        reason: format!("{secs} is out of range"),
    })
}

/// Serialize a payload struct as JSON.
pub fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(value).map_err(CodecError::serialize)
}

/// Parse a JSON payload into `T`.
pub fn from_json<T: serde::de::DeserializeOwned>(payload: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(payload).map_err(CodecError::malformed)
}
