//! Infrastructure layer: configuration, provisioning, producer, consumer loop
//! and the Kafka transport.

pub mod config;
pub mod event_bus;
pub mod provisioning;
pub mod publisher;
pub mod workers;


pub use config::{Acks, ConfigError, StreamConfig};
pub use provisioning::{ProvisionError, ProvisionReport, ensure_topics};
pub use publisher::{EventProducer, PublishError, RoutingKey};
pub use workers::{
    ConsumerOptions, ConsumerReport, ConsumerStats, ConsumerWorker, ShutdownSignal, StopReason,
    WorkerHandle,
};
