//! Kafka transport (librdkafka).
//!
//! - [`KafkaRecordSink`]: threaded producer; `send` blocks on the delivery report
//! - [`KafkaRecordSource`]: group consumer with manual offset commits
//! - [`KafkaTopicAdmin`]: admin client; the client locates the controller itself
//!
//! Everything here is blocking. The admin client's futures are driven by a
//! private current-thread tokio runtime.

use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::time::Duration;

use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage, Header, Headers as _, Message, OwnedHeaders};
use rdkafka::producer::{BaseRecord, DeliveryResult, Producer, ProducerContext, ThreadedProducer};
use rdkafka::ClientContext;
use tracing::{debug, info};

use userstream_events::{
    AdminError, Delivery, Headers, ReceivedRecord, Record, RecordSink, RecordSource, TopicAdmin,
    TopicSpec, TransportError,
};

use crate::config::StreamConfig;

type DeliverySender = SyncSender<Result<Delivery, TransportError>>;

/// Routes each delivery report back to the thread waiting in `send`.
struct DeliveryContext;

impl ClientContext for DeliveryContext {}

impl ProducerContext for DeliveryContext {
    type DeliveryOpaque = Box<DeliverySender>;

    fn delivery(&self, result: &DeliveryResult<'_>, reply: Self::DeliveryOpaque) {
        let outcome = match result {
            Ok(message) => Ok(Delivery {
                partition: message.partition(),
                offset: message.offset(),
            }),
            Err((err, _)) => Err(TransportError::Send(err.to_string())),
        };
        // The sender may have timed out and gone away.
        let _ = reply.send(outcome);
    }
}

pub struct KafkaRecordSink {
    producer: ThreadedProducer<DeliveryContext>,
    delivery_timeout: Duration,
}

impl KafkaRecordSink {
    pub fn new(config: &StreamConfig) -> Result<Self, TransportError> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", config.bootstrap_servers())
            .set("acks", config.acks.as_kafka_value())
            .set("message.timeout.ms", config.publish_timeout.as_millis().to_string())
            .create_with_context(DeliveryContext)
            .map_err(connect_error)?;

        info!(brokers = %config.bootstrap_servers(), acks = config.acks.as_kafka_value(), "kafka producer created");
        Ok(Self {
            producer,
            // Every message is reported within `message.timeout.ms`, plus polling slack.
            delivery_timeout: config.publish_timeout + Duration::from_secs(1),
        })
    }
}

impl RecordSink for KafkaRecordSink {
    fn send(&self, topic: &str, record: Record) -> Result<Delivery, TransportError> {
        let (reply, delivered) = mpsc::sync_channel(1);

        let headers = record
            .headers
            .iter()
            .fold(OwnedHeaders::new_with_capacity(record.headers.len()), |acc, (key, value)| {
                acc.insert(Header {
                    key,
                    value: Some(value),
                })
            });

        let mut base: BaseRecord<'_, [u8], [u8], Box<DeliverySender>> =
            BaseRecord::with_opaque_to(topic, Box::new(reply))
                .payload(record.value.as_slice())
                .headers(headers);
        if let Some(key) = record.key.as_deref() {
            base = base.key(key);
        }

        self.producer
            .send(base)
            .map_err(|(err, _)| TransportError::Send(err.to_string()))?;

        match delivered.recv_timeout(self.delivery_timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => Err(TransportError::Timeout(self.delivery_timeout)),
            Err(RecvTimeoutError::Disconnected) => {
                Err(TransportError::Send("delivery report was dropped".into()))
            }
        }
    }

    fn flush(&self, timeout: Duration) -> Result<(), TransportError> {
        self.producer.flush(timeout).map_err(|err| match err {
            KafkaError::Flush(RDKafkaErrorCode::OperationTimedOut) => TransportError::Timeout(timeout),
            other => TransportError::Send(other.to_string()),
        })
    }
}

/// Group consumer for one topic. Offsets are only committed through
/// [`RecordSource::commit`].
pub struct KafkaRecordSource {
    consumer: BaseConsumer,
    closed: bool,
}

impl KafkaRecordSource {
    pub fn new(config: &StreamConfig) -> Result<Self, TransportError> {
        let consumer: BaseConsumer = ClientConfig::new()
            .set("bootstrap.servers", config.bootstrap_servers())
            .set("group.id", &config.consumer_group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(connect_error)?;

        consumer
            .subscribe(&[config.user_events_topic.as_str()])
            .map_err(connect_error)?;

        info!(
            brokers = %config.bootstrap_servers(),
            group = %config.consumer_group,
            topic = %config.user_events_topic,
            "kafka consumer subscribed"
        );
        Ok(Self {
            consumer,
            closed: false,
        })
    }
}

fn to_received(message: &BorrowedMessage<'_>) -> ReceivedRecord {
    let headers: Headers = message
        .headers()
        .map(|headers| {
            headers
                .iter()
                .map(|h| {
                    let value = h.value.map(String::from_utf8_lossy).unwrap_or_default();
                    (h.key.to_string(), value.into_owned())
                })
                .collect()
        })
        .unwrap_or_default();

    ReceivedRecord {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        record: Record {
            key: message.key().map(<[u8]>::to_vec),
            headers,
            value: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        },
    }
}

impl RecordSource for KafkaRecordSource {
    fn poll(&mut self, timeout: Duration) -> Result<Option<ReceivedRecord>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        match self.consumer.poll(timeout) {
            None => Ok(None),
            Some(Ok(message)) => Ok(Some(to_received(&message))),
            Some(Err(err)) => Err(TransportError::Read(err.to_string())),
        }
    }

    fn commit(&mut self) -> Result<(), TransportError> {
        match self.consumer.commit_consumer_state(CommitMode::Sync) {
            Ok(()) => Ok(()),
            // Nothing consumed since the last commit.
            Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => Ok(()),
            Err(err) => Err(TransportError::Commit(err.to_string())),
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if !self.closed {
            self.consumer.unsubscribe();
            self.closed = true;
            debug!("kafka consumer unsubscribed");
        }
        Ok(())
    }
}

pub struct KafkaTopicAdmin {
    client: AdminClient<DefaultClientContext>,
    runtime: tokio::runtime::Runtime,
    operation_timeout: Duration,
}

impl KafkaTopicAdmin {
    pub fn new(config: &StreamConfig) -> Result<Self, AdminError> {
        let client = ClientConfig::new()
            .set("bootstrap.servers", config.bootstrap_servers())
            .create()
            .map_err(|e| AdminError::Unreachable(e.to_string()))?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| AdminError::Unreachable(e.to_string()))?;

        Ok(Self {
            client,
            runtime,
            operation_timeout: config.publish_timeout,
        })
    }
}

impl TopicAdmin for KafkaTopicAdmin {
    fn create_topic(&self, spec: &TopicSpec) -> Result<(), AdminError> {
        let topic = NewTopic::new(
            &spec.name,
            spec.partitions,
            TopicReplication::Fixed(spec.replication_factor),
        );
        let options = AdminOptions::new().operation_timeout(Some(self.operation_timeout));

        let results = self
            .runtime
            .block_on(self.client.create_topics([&topic], &options))
            .map_err(|e| AdminError::Unreachable(e.to_string()))?;

        for result in results {
            match result {
                Ok(_) => {}
                Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    return Err(AdminError::AlreadyExists(name));
                }
                Err((name, code)) => {
                    return Err(AdminError::Refused {
                        topic: name,
                        reason: code.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn connect_error(err: KafkaError) -> TransportError {
    TransportError::Connect(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use userstream_events::HandlerRegistry;
    use userstream_users::{InMemoryUserRepository, UserEventHandlers, UserService};

    use crate::provisioning::ensure_topics;
    use crate::publisher::EventProducer;
    use crate::workers::ConsumerWorker;

    fn kafka_config() -> StreamConfig {
        StreamConfig::from_env()
            .unwrap()
            .with_topic(format!("user-events-it-{}", userstream_core::EventId::new()))
            .with_consumer_group(format!("it-{}", userstream_core::EventId::new()))
            .with_poll_timeout(Duration::from_millis(100))
    }

    #[test]
    #[ignore = "requires a Kafka broker at KAFKA_BROKERS"]
    fn provisioning_is_idempotent_against_kafka() {
        let config = kafka_config();
        let admin = KafkaTopicAdmin::new(&config).unwrap();

        let first = ensure_topics(&config, &admin).unwrap();
        let second = ensure_topics(&config, &admin).unwrap();
        assert_eq!(first.created, vec![config.user_events_topic.clone()]);
        assert_eq!(second.existing, vec![config.user_events_topic.clone()]);
    }

    #[test]
    #[ignore = "requires a Kafka broker at KAFKA_BROKERS"]
    fn user_write_reaches_handler_through_kafka() {
        let config = kafka_config();
        ensure_topics(&config, &KafkaTopicAdmin::new(&config).unwrap()).unwrap();

        let handlers = UserEventHandlers::new();
        let registry = Arc::new(handlers.register(HandlerRegistry::builder()).unwrap().build());
        let source = KafkaRecordSource::new(&config).unwrap();
        let worker = ConsumerWorker::spawn(source, registry, config.consumer_options()).unwrap();

        let producer = EventProducer::from_config(KafkaRecordSink::new(&config).unwrap(), &config);
        let service = UserService::new(InMemoryUserRepository::new(), producer);
        let user = service.create_user("a@example.com", "Ada").unwrap();
        service.delete_user(user.id).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(30);
        while handlers.processed().total() < 2 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(100));
        }

        let report = worker.shutdown().unwrap();
        assert_eq!(handlers.processed().created, 1);
        assert_eq!(handlers.processed().deleted, 1);
        assert!(report.stats.commits >= 1);
    }
}
