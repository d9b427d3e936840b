//! In-memory partitioned broker for tests/dev.
//!
//! - No network IO
//! - Topics are split into partitions; a keyed record always lands on the same
//!   partition, unkeyed records are spread round-robin
//! - Consumer groups share committed offsets per partition; a new consumer in a
//!   group resumes from the last commit (or the first offset)
//! - `poll` blocks on a condition variable until a record arrives or the timeout
//!   elapses
//! - Reads and sends can be failed on demand to exercise error paths

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::bus::{
    AdminError, Delivery, ReceivedRecord, Record, RecordSink, RecordSource, TopicAdmin, TopicSpec,
    TransportError,
};

#[derive(Debug, Default)]
struct TopicLog {
    partitions: Vec<Vec<Record>>,
    next_unkeyed: usize,
}

#[derive(Debug, Default)]
struct BrokerState {
    topics: HashMap<String, TopicLog>,
    committed: HashMap<(String, String), Vec<i64>>,
    failing_reads: u32,
    failing_sends: u32,
    closed: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<BrokerState>,
    arrived: Condvar,
}

/// In-memory broker. Cloning yields another handle to the same broker.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        // Test double: a panicking holder must not wedge every other handle.
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a consumer for `topic` within consumer group `group`.
    pub fn consumer(&self, group: impl Into<String>, topic: impl Into<String>) -> InMemoryConsumer {
        InMemoryConsumer {
            broker: self.clone(),
            group: group.into(),
            topic: topic.into(),
            positions: Vec::new(),
            next_partition: 0,
            closed: false,
        }
    }

    /// Make the next `n` polls (across all consumers) fail with a read error.
    pub fn fail_next_reads(&self, n: u32) {
        self.lock().failing_reads = n;
    }

    /// Make the next `n` sends fail with a send error.
    pub fn fail_next_sends(&self, n: u32) {
        self.lock().failing_sends = n;
    }

    /// Shut the broker down; every consumer's next poll returns `Closed`.
    pub fn close(&self) {
        self.lock().closed = true;
        self.shared.arrived.notify_all();
    }

    pub fn topic_exists(&self, topic: &str) -> bool {
        self.lock().topics.contains_key(topic)
    }

    pub fn partition_count(&self, topic: &str) -> Option<usize> {
        self.lock().topics.get(topic).map(|t| t.partitions.len())
    }

    /// Snapshot of every record in `topic`, partition by partition.
    pub fn records(&self, topic: &str) -> Vec<ReceivedRecord> {
        let state = self.lock();
        let Some(log) = state.topics.get(topic) else {
            return Vec::new();
        };
        log.partitions
            .iter()
            .enumerate()
            .flat_map(|(p, records)| {
                records.iter().enumerate().map(move |(o, r)| ReceivedRecord {
                    topic: topic.to_string(),
                    partition: p as i32,
                    offset: o as i64,
                    record: r.clone(),
                })
            })
            .collect()
    }

    /// Committed next-offsets per partition for a group, if it ever committed.
    pub fn committed_offsets(&self, group: &str, topic: &str) -> Option<Vec<i64>> {
        self.lock()
            .committed
            .get(&(group.to_string(), topic.to_string()))
            .cloned()
    }
}

impl TopicAdmin for InMemoryBroker {
    fn create_topic(&self, spec: &TopicSpec) -> Result<(), AdminError> {
        spec.validate()?;
        let mut state = self.lock();
        if state.closed {
            return Err(AdminError::Unreachable("broker is closed".into()));
        }
        if state.topics.contains_key(&spec.name) {
            return Err(AdminError::AlreadyExists(spec.name.clone()));
        }
        state.topics.insert(
            spec.name.clone(),
            TopicLog {
                partitions: vec![Vec::new(); spec.partitions as usize],
                next_unkeyed: 0,
            },
        );
        Ok(())
    }
}

impl RecordSink for InMemoryBroker {
    fn send(&self, topic: &str, record: Record) -> Result<Delivery, TransportError> {
        let mut state = self.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        if state.failing_sends > 0 {
            state.failing_sends -= 1;
            return Err(TransportError::Send("injected send failure".into()));
        }

        let log = state
            .topics
            .get_mut(topic)
            .ok_or_else(|| TransportError::Send(format!("unknown topic `{topic}`")))?;

        let count = log.partitions.len();
        let partition = match record.key.as_deref() {
            Some(key) => (fnv1a(key) % count as u64) as usize,
            None => {
                let p = log.next_unkeyed % count;
                log.next_unkeyed = log.next_unkeyed.wrapping_add(1);
                p
            }
        };

        let records = &mut log.partitions[partition];
        let offset = records.len() as i64;
        records.push(record);
        drop(state);

        self.shared.arrived.notify_all();
        Ok(Delivery {
            partition: partition as i32,
            offset,
        })
    }
}

/// Stable across processes, unlike `DefaultHasher`.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325u64, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

/// A consumer-group member reading one topic from an [`InMemoryBroker`].
///
/// Partitions are visited round-robin; within a partition records come back in
/// offset order.
#[derive(Debug)]
pub struct InMemoryConsumer {
    broker: InMemoryBroker,
    group: String,
    topic: String,
    positions: Vec<i64>,
    next_partition: usize,
    closed: bool,
}

impl InMemoryConsumer {
    fn take_next(&mut self, state: &BrokerState) -> Option<ReceivedRecord> {
        let log = state.topics.get(&self.topic)?;
        let count = log.partitions.len();

        if self.positions.len() < count {
            let committed = state
                .committed
                .get(&(self.group.clone(), self.topic.clone()));
            for p in self.positions.len()..count {
                let start = committed.and_then(|c| c.get(p).copied()).unwrap_or(0);
                self.positions.push(start);
            }
        }

        for step in 0..count {
            let p = (self.next_partition + step) % count;
            let position = self.positions[p];
            if let Some(record) = log.partitions[p].get(position as usize) {
                self.positions[p] = position + 1;
                self.next_partition = (p + 1) % count;
                return Some(ReceivedRecord {
                    topic: self.topic.clone(),
                    partition: p as i32,
                    offset: position,
                    record: record.clone(),
                });
            }
        }
        None
    }
}

impl RecordSource for InMemoryConsumer {
    fn poll(&mut self, timeout: Duration) -> Result<Option<ReceivedRecord>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        let deadline = Instant::now() + timeout;
        let shared = Arc::clone(&self.broker.shared);
        let mut state = shared.state.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            if state.closed {
                return Err(TransportError::Closed);
            }
            if state.failing_reads > 0 {
                state.failing_reads -= 1;
                return Err(TransportError::Read("injected read failure".into()));
            }
            if let Some(record) = self.take_next(&state) {
                return Ok(Some(record));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let (guard, _) = shared
                .arrived
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    fn commit(&mut self) -> Result<(), TransportError> {
        if self.positions.is_empty() {
            return Ok(());
        }
        let shared = Arc::clone(&self.broker.shared);
        let mut state = shared.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.committed.insert(
            (self.group.clone(), self.topic.clone()),
            self.positions.clone(),
        );
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker_with_topic(partitions: i32) -> InMemoryBroker {
        let broker = InMemoryBroker::new();
        broker
            .create_topic(&TopicSpec::new("t", partitions, 1))
            .unwrap();
        broker
    }

    #[test]
    fn creating_an_existing_topic_reports_already_exists() {
        let broker = broker_with_topic(3);
        assert_eq!(
            broker.create_topic(&TopicSpec::new("t", 3, 1)),
            Err(AdminError::AlreadyExists("t".into()))
        );
        assert_eq!(broker.partition_count("t"), Some(3));
    }

    #[test]
    fn same_key_lands_on_same_partition_in_order() {
        let broker = broker_with_topic(4);
        let deliveries: Vec<Delivery> = (0..5)
            .map(|i| {
                broker
                    .send("t", Record::new(vec![i]).with_key("user-1"))
                    .unwrap()
            })
            .collect();

        assert!(deliveries.iter().all(|d| d.partition == deliveries[0].partition));
        let offsets: Vec<i64> = deliveries.iter().map(|d| d.offset).collect();
        assert_eq!(offsets, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn send_to_unknown_topic_fails() {
        let broker = InMemoryBroker::new();
        assert!(matches!(
            broker.send("missing", Record::new(vec![])),
            Err(TransportError::Send(_))
        ));
    }

    #[test]
    fn poll_times_out_with_none() {
        let broker = broker_with_topic(1);
        let mut consumer = broker.consumer("g", "t");
        let started = Instant::now();
        assert_eq!(consumer.poll(Duration::from_millis(30)).unwrap(), None);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn poll_wakes_when_a_record_arrives() {
        let broker = broker_with_topic(1);
        let mut consumer = broker.consumer("g", "t");

        let producer = broker.clone();
        let writer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer.send("t", Record::new(b"hi".to_vec())).unwrap();
        });

        let got = consumer.poll(Duration::from_secs(2)).unwrap().unwrap();
        assert_eq!(got.record.value, b"hi");
        writer.join().unwrap();
    }

    #[test]
    fn group_resumes_from_committed_offsets() {
        let broker = broker_with_topic(1);
        for i in 0..3u8 {
            broker.send("t", Record::new(vec![i])).unwrap();
        }

        let mut first = broker.consumer("g", "t");
        assert_eq!(first.poll(Duration::ZERO).unwrap().unwrap().offset, 0);
        assert_eq!(first.poll(Duration::ZERO).unwrap().unwrap().offset, 1);
        first.commit().unwrap();
        first.close().unwrap();
        assert_eq!(broker.committed_offsets("g", "t"), Some(vec![2]));

        let mut second = broker.consumer("g", "t");
        assert_eq!(second.poll(Duration::ZERO).unwrap().unwrap().offset, 2);

        // A different group starts from the beginning.
        let mut other = broker.consumer("other", "t");
        assert_eq!(other.poll(Duration::ZERO).unwrap().unwrap().offset, 0);
    }

    #[test]
    fn injected_read_failures_then_recovery() {
        let broker = broker_with_topic(1);
        broker.send("t", Record::new(b"x".to_vec())).unwrap();
        broker.fail_next_reads(2);

        let mut consumer = broker.consumer("g", "t");
        assert!(matches!(consumer.poll(Duration::ZERO), Err(TransportError::Read(_))));
        assert!(matches!(consumer.poll(Duration::ZERO), Err(TransportError::Read(_))));
        assert!(consumer.poll(Duration::ZERO).unwrap().is_some());
    }

    #[test]
    fn close_ends_consumers() {
        let broker = broker_with_topic(1);
        let mut consumer = broker.consumer("g", "t");
        broker.close();
        assert_eq!(consumer.poll(Duration::from_secs(1)), Err(TransportError::Closed));
    }
}
