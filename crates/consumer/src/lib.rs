//! Process wiring for the user-events consumer.
//!
//! The binaries only pick the Kafka transport; everything else lives here so
//! it can run against the in-memory broker.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use userstream_events::{HandlerRegistry, RecordSource, TopicAdmin};
use userstream_infra::{
    ConsumerReport, ConsumerStats, ConsumerWorker, ProvisionReport, StreamConfig, WorkerHandle,
    ensure_topics,
};
use userstream_users::{HandlerCounts, UserEventHandlers};

/// Ensure the configured topics exist. Any failure is fatal to startup.
pub fn provision<A: TopicAdmin>(config: &StreamConfig, admin: &A) -> anyhow::Result<ProvisionReport> {
    let report = ensure_topics(config, admin)
        .with_context(|| format!("provisioning topic `{}`", config.user_events_topic))?;
    info!(created = ?report.created, existing = ?report.existing, "topics ready");
    Ok(report)
}

pub fn build_registry(handlers: &Arc<UserEventHandlers>) -> anyhow::Result<HandlerRegistry> {
    let registry = handlers
        .register(HandlerRegistry::builder())
        .context("registering user event handlers")?
        .build();
    info!(event_types = ?registry.event_types(), "handler registry built");
    Ok(registry)
}

/// A consumer loop running on its own thread, plus the handlers it feeds.
#[derive(Debug)]
pub struct RunningConsumer {
    worker: WorkerHandle,
    handlers: Arc<UserEventHandlers>,
}

impl RunningConsumer {
    pub fn processed(&self) -> HandlerCounts {
        self.handlers.processed()
    }

    pub fn stats(&self) -> ConsumerStats {
        self.worker.stats()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Signal the loop, wait for it to commit and close, then log the report.
    pub fn stop(self) -> anyhow::Result<ConsumerReport> {
        let report = self.worker.shutdown().context("stopping consumer")?;
        info!(
            reason = ?report.reason,
            received = report.stats.received,
            handled = report.stats.handled,
            handler_failures = report.stats.handler_failures,
            commits = report.stats.commits,
            "consumer stopped"
        );
        Ok(report)
    }
}

/// Provision, build the registry, and spawn the loop over `source`.
pub fn start<A, S>(config: &StreamConfig, admin: &A, source: S) -> anyhow::Result<RunningConsumer>
where
    A: TopicAdmin,
    S: RecordSource + 'static,
{
    provision(config, admin)?;

    let handlers = UserEventHandlers::new();
    let registry = Arc::new(build_registry(&handlers)?);
    let worker = ConsumerWorker::spawn(source, registry, config.consumer_options())
        .context("spawning consumer thread")?;

    info!(
        topic = %config.user_events_topic,
        group = %config.consumer_group,
        "consumer started"
    );
    Ok(RunningConsumer { worker, handlers })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use userstream_events::InMemoryBroker;
    use userstream_infra::{EventProducer, StopReason};
    use userstream_users::{InMemoryUserRepository, UserService};

    fn config() -> StreamConfig {
        StreamConfig::default()
            .with_poll_timeout(Duration::from_millis(10))
            .with_commit_interval(Duration::from_millis(20))
    }

    #[test]
    fn provisioning_twice_reports_existing_topic() {
        let broker = InMemoryBroker::new();
        let config = config();

        let first = provision(&config, &broker).unwrap();
        let second = provision(&config, &broker).unwrap();
        assert_eq!(first.created, vec!["user-events".to_string()]);
        assert_eq!(second.existing, vec!["user-events".to_string()]);
    }

    #[test]
    fn unreachable_broker_aborts_startup() {
        let broker = InMemoryBroker::new();
        broker.close();
        let config = config();

        let err = start(&config, &broker, broker.consumer("g", "user-events")).unwrap_err();
        assert!(format!("{err:#}").contains("provisioning topic `user-events`"));
    }

    #[test]
    fn registry_covers_every_user_event() {
        let registry = build_registry(&UserEventHandlers::new()).unwrap();
        assert_eq!(
            registry.event_types(),
            vec!["user.created", "user.deleted", "user.updated"]
        );
    }

    #[test]
    fn started_consumer_handles_service_writes() {
        let broker = InMemoryBroker::new();
        let config = config();
        let consumer = start(
            &config,
            &broker,
            broker.consumer(&config.consumer_group, &config.user_events_topic),
        )
        .unwrap();

        let producer = EventProducer::from_config(broker.clone(), &config);
        let service = UserService::new(InMemoryUserRepository::new(), producer);
        let user = service.create_user("a@example.com", "Ada").unwrap();
        service.delete_user(user.id).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while consumer.processed().total() < 2 {
            assert!(Instant::now() < deadline, "events not handled in time");
            std::thread::sleep(Duration::from_millis(5));
        }

        let report = consumer.stop().unwrap();
        assert_eq!(report.reason, StopReason::Cancelled);
        assert_eq!(report.stats.handled, 2);
    }
}
