//! Broker-backed transports.
//!
//! The transport traits live in `userstream-events` as pure mechanics, along
//! with the in-memory broker used in tests. This module provides the Kafka
//! implementation.

#[cfg(feature = "kafka")]
pub mod kafka;

#[cfg(feature = "kafka")]
pub use kafka::{KafkaRecordSink, KafkaRecordSource, KafkaTopicAdmin};
