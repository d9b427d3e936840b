//! `userstream-events`: event envelope, codec, transport and dispatch mechanics.
//!
//! Everything here is domain-agnostic and performs no network IO: concrete
//! broker clients live in `userstream-infra`, domain events live in their own
//! crates and plug in through the [`Event`] trait.

pub mod bus;
pub mod codec;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{
    AdminError, Delivery, EventPublisher, PublishReceipt, ReceivedRecord, Record, RecordSink,
    RecordSource, TopicAdmin, TopicSpec, TransportError,
};
pub use codec::{
    CodecError, EncodingScheme, decode_record, encode_envelope, is_structured, peek_event_type,
};
pub use envelope::{EventEnvelope, Headers};
pub use event::Event;
pub use handler::{
    EventHandler, HandlerContext, HandlerError, HandlerRegistry, HandlerRegistryBuilder,
    RegistryError, Route,
};
pub use in_memory_bus::{InMemoryBroker, InMemoryConsumer};
