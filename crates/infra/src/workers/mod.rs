//! Background workers.

pub mod consumer_worker;

pub use consumer_worker::{
    ConsumerOptions, ConsumerReport, ConsumerStats, ConsumerWorker, ShutdownSignal, StopReason,
    WorkerHandle, WorkerPanicked,
};
