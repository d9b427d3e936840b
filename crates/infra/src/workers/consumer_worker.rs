use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument, warn};

use userstream_events::{
    EventHandler, EventEnvelope, HandlerContext, HandlerError, HandlerRegistry, ReceivedRecord,
    RecordSource, Route, decode_record, is_structured, peek_event_type,
};

/// Consumer loop tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerOptions {
    /// Thread name and log label.
    pub name: String,
    /// Upper bound on one blocking poll; also bounds shutdown latency while idle.
    pub poll_timeout: Duration,
    /// Minimum time between offset commits.
    pub commit_interval: Duration,
    /// Pause after a failed read.
    pub read_backoff: Duration,
    /// A handler running longer than this is counted as failed once it returns.
    pub handler_timeout: Option<Duration>,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            name: "event-consumer".to_string(),
            poll_timeout: Duration::from_millis(250),
            commit_interval: Duration::from_secs(1),
            read_backoff: Duration::from_secs(1),
            handler_timeout: None,
        }
    }
}

impl ConsumerOptions {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_commit_interval(mut self, interval: Duration) -> Self {
        self.commit_interval = interval;
        self
    }

    pub fn with_read_backoff(mut self, backoff: Duration) -> Self {
        self.read_backoff = backoff;
        self
    }

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Default)]
struct SignalState {
    triggered: Mutex<bool>,
    changed: Condvar,
}

/// Single-shot cooperative cancellation.
///
/// Clones share state. Once triggered it stays triggered.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    state: Arc<SignalState>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        *self
            .state
            .triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = true;
        self.state.changed.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self
            .state
            .triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for up to `timeout`, waking early on trigger. Returns whether it fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self
            .state
            .triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .state
            .changed
            .wait_timeout_while(guard, timeout, |triggered| !*triggered)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The shutdown signal fired.
    Cancelled,
    /// The source reported it will never produce again.
    SourceClosed,
}

/// Consumer loop counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ConsumerStats {
    pub received: u64,
    pub handled: u64,
    pub unhandled: u64,
    pub decode_failures: u64,
    pub handler_failures: u64,
    pub read_failures: u64,
    pub commits: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerReport {
    pub reason: StopReason,
    pub stats: ConsumerStats,
}

impl ConsumerReport {
    pub fn was_cancelled(&self) -> bool {
        self.reason == StopReason::Cancelled
    }
}

#[derive(Debug, thiserror::Error)]
#[error("consumer thread `{0}` panicked")]
pub struct WorkerPanicked(pub String);

/// Handle to a consumer loop running on its own thread.
///
/// Dropping the handle shuts the loop down and waits for it.
#[derive(Debug)]
pub struct WorkerHandle {
    name: String,
    signal: ShutdownSignal,
    stats: Arc<Mutex<ConsumerStats>>,
    join: Option<thread::JoinHandle<ConsumerReport>>,
}

impl WorkerHandle {
    /// A signal that stops this worker when triggered.
    pub fn signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }

    /// Counters as of the last processed record.
    pub fn stats(&self) -> ConsumerStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(|j| j.is_finished())
    }

    /// Request shutdown and wait for the loop to finish its in-flight record.
    pub fn shutdown(mut self) -> Result<ConsumerReport, WorkerPanicked> {
        self.signal.trigger();
        self.wait()
    }

    /// Wait for the loop to stop on its own (source closed or signal fired elsewhere).
    pub fn join(mut self) -> Result<ConsumerReport, WorkerPanicked> {
        self.wait()
    }

    fn wait(&mut self) -> Result<ConsumerReport, WorkerPanicked> {
        match self.join.take() {
            Some(join) => join.join().map_err(|_| WorkerPanicked(self.name.clone())),
            None => Err(WorkerPanicked(self.name.clone())),
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            self.signal.trigger();
            let _ = join.join();
        }
    }
}

/// The broker-read dispatch loop.
///
/// One record at a time, strictly sequential: poll → decode → route → invoke.
/// Offsets are committed on a timer regardless of handler outcome, so a failed
/// handler is not redelivered (at-most-once for side effects).
#[derive(Debug)]
pub struct ConsumerWorker;

impl ConsumerWorker {
    /// Run the loop on the calling thread until `shutdown` fires or the source closes.
    ///
    /// The source is committed and closed before returning.
    pub fn run<S>(
        source: S,
        registry: &HandlerRegistry,
        options: &ConsumerOptions,
        shutdown: &ShutdownSignal,
    ) -> ConsumerReport
    where
        S: RecordSource,
    {
        let stats = Mutex::new(ConsumerStats::default());
        consume(source, registry, options, shutdown, &stats)
    }

    /// Run the loop on a dedicated named thread.
    pub fn spawn<S>(
        source: S,
        registry: Arc<HandlerRegistry>,
        options: ConsumerOptions,
    ) -> std::io::Result<WorkerHandle>
    where
        S: RecordSource + 'static,
    {
        let signal = ShutdownSignal::new();
        let stats = Arc::new(Mutex::new(ConsumerStats::default()));

        let thread_signal = signal.clone();
        let thread_stats = Arc::clone(&stats);
        let name = options.name.clone();
        let join = thread::Builder::new().name(name.clone()).spawn(move || {
            consume(source, &registry, &options, &thread_signal, &thread_stats)
        })?;

        Ok(WorkerHandle {
            name,
            signal,
            stats,
            join: Some(join),
        })
    }
}

fn consume<S>(
    mut source: S,
    registry: &HandlerRegistry,
    options: &ConsumerOptions,
    shutdown: &ShutdownSignal,
    live: &Mutex<ConsumerStats>,
) -> ConsumerReport
where
    S: RecordSource,
{
    info!(
        consumer = %options.name,
        event_types = ?registry.event_types(),
        "consumer started"
    );

    let mut stats = ConsumerStats::default();
    let mut uncommitted = false;
    let mut last_commit = Instant::now();

    let reason = loop {
        if shutdown.is_triggered() {
            break StopReason::Cancelled;
        }

        match source.poll(options.poll_timeout) {
            Ok(Some(received)) => {
                stats.received += 1;
                uncommitted = true;
                process(&received, registry, options, &mut stats);
            }
            Ok(None) => {}
            Err(err) if !err.is_retriable() => break StopReason::SourceClosed,
            Err(err) => {
                stats.read_failures += 1;
                error!(consumer = %options.name, error = %err, "error reading record");
                publish_stats(live, &stats);
                if shutdown.wait_timeout(options.read_backoff) {
                    break StopReason::Cancelled;
                }
                continue;
            }
        }

        if uncommitted && last_commit.elapsed() >= options.commit_interval {
            if commit(&mut source, options, &mut stats) {
                uncommitted = false;
            }
            last_commit = Instant::now();
        }
        publish_stats(live, &stats);
    };

    if uncommitted {
        commit(&mut source, options, &mut stats);
    }
    if let Err(err) = source.close() {
        warn!(consumer = %options.name, error = %err, "failed to close record source");
    }
    publish_stats(live, &stats);

    info!(consumer = %options.name, reason = ?reason, stats = ?stats, "consumer stopped");
    ConsumerReport { reason, stats }
}

fn publish_stats(live: &Mutex<ConsumerStats>, stats: &ConsumerStats) {
    *live.lock().unwrap_or_else(PoisonError::into_inner) = *stats;
}

fn commit<S: RecordSource>(source: &mut S, options: &ConsumerOptions, stats: &mut ConsumerStats) -> bool {
    match source.commit() {
        Ok(()) => {
            stats.commits += 1;
            true
        }
        Err(err) => {
            warn!(consumer = %options.name, error = %err, "offset commit failed");
            false
        }
    }
}

#[instrument(
    skip_all,
    fields(topic = %received.topic, partition = received.partition, offset = received.offset)
)]
fn process(
    received: &ReceivedRecord,
    registry: &HandlerRegistry,
    options: &ConsumerOptions,
    stats: &mut ConsumerStats,
) {
    debug!(key = received.record.key_str(), "received record");

    // Header-tagged records can be dropped without touching the body.
    match peek_event_type(&received.record) {
        Some(tag) if matches!(registry.route(tag), Route::Unhandled) => {
            stats.unhandled += 1;
            warn!(event_type = tag, "no handler registered for event type");
            return;
        }
        None if !is_structured(&received.record) => {
            stats.unhandled += 1;
            warn!(headers = ?received.record.headers, "record carries no event type");
            return;
        }
        _ => {}
    }

    let envelope = match decode_record(&received.record) {
        Ok(envelope) => envelope,
        Err(err) => {
            stats.decode_failures += 1;
            error!(error = %err, "failed to decode record");
            return;
        }
    };

    let handler = match registry.route(envelope.event_type()) {
        Route::Registered(handler) | Route::Fallback(handler) => handler,
        Route::Unhandled => {
            stats.unhandled += 1;
            warn!(event_type = envelope.event_type(), "no handler registered for event type");
            return;
        }
    };

    let ctx = HandlerContext {
        event_id: envelope.id(),
        timestamp: envelope.timestamp(),
        topic: received.topic.clone(),
        partition: received.partition,
        offset: received.offset,
    };

    match invoke(handler, &ctx, &envelope, options.handler_timeout) {
        Ok(()) => {
            stats.handled += 1;
            debug!(
                event_id = %envelope.id(),
                event_type = envelope.event_type(),
                "event handled"
            );
        }
        Err(HandlerError::Decode(err)) => {
            stats.decode_failures += 1;
            error!(
                event_id = %envelope.id(),
                event_type = envelope.event_type(),
                error = %err,
                "failed to decode event payload"
            );
        }
        Err(err) => {
            stats.handler_failures += 1;
            error!(
                event_id = %envelope.id(),
                event_type = envelope.event_type(),
                headers = ?envelope.headers(),
                error = %err,
                "handler failed"
            );
        }
    }
}

fn invoke(
    handler: &dyn EventHandler,
    ctx: &HandlerContext,
    envelope: &EventEnvelope,
    timeout: Option<Duration>,
) -> Result<(), HandlerError> {
    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        handler.handle(ctx, envelope.event_type(), envelope.headers(), envelope.payload())
    }))
    .unwrap_or_else(|payload| Err(HandlerError::Panicked(panic_message(payload.as_ref()))));

    let elapsed = started.elapsed();
    match (outcome, timeout) {
        (Ok(()), Some(limit)) if elapsed > limit => Err(HandlerError::TimedOut { limit, elapsed }),
        (outcome, _) => outcome,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use chrono::Utc;
    use userstream_core::EventId;
    use userstream_events::codec::JSON_CONTENT_TYPE;
    use userstream_events::envelope::{
        CONTENT_TYPE_HEADER, EVENT_ID_HEADER, EVENT_TYPE_HEADER, TIMESTAMP_HEADER,
    };
    use userstream_events::{EncodingScheme, Headers, Record, TransportError, encode_envelope};

    type Poll = Result<Option<ReceivedRecord>, TransportError>;

    /// Replays a fixed poll script, then reports `Closed`.
    #[derive(Default)]
    struct Scripted {
        polls: VecDeque<Poll>,
        commits: Arc<AtomicUsize>,
        closed: Arc<AtomicBool>,
        fail_commits: bool,
    }

    impl RecordSource for Scripted {
        fn poll(&mut self, _timeout: Duration) -> Poll {
            self.polls.pop_front().unwrap_or(Err(TransportError::Closed))
        }

        fn commit(&mut self) -> Result<(), TransportError> {
            if self.fail_commits {
                return Err(TransportError::Commit("rebalancing".into()));
            }
            self.commits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn close(&mut self) -> Result<(), TransportError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn record(event_type: &str, offset: i64) -> Poll {
        let envelope = EventEnvelope::new(
            EventId::new(),
            event_type,
            Utc::now(),
            JSON_CONTENT_TYPE,
            b"{}".to_vec(),
        )
        .unwrap();
        Ok(Some(ReceivedRecord {
            topic: "user-events".into(),
            partition: 0,
            offset,
            record: encode_envelope(&envelope, None, EncodingScheme::HeaderTagged).unwrap(),
        }))
    }

    fn counting(counter: &Arc<AtomicUsize>) -> impl EventHandler + 'static {
        let counter = Arc::clone(counter);
        move |_: &HandlerContext, _: &str, _: &Headers, _: &[u8]| -> Result<(), HandlerError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fast() -> ConsumerOptions {
        ConsumerOptions::default()
            .with_poll_timeout(Duration::from_millis(5))
            .with_read_backoff(Duration::from_millis(5))
            .with_commit_interval(Duration::from_secs(60))
    }

    #[test]
    fn closed_source_stops_loop_and_commits_on_exit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = HandlerRegistry::builder()
            .register("user.created", counting(&calls))
            .unwrap()
            .build();
        let source = Scripted {
            polls: VecDeque::from(vec![record("user.created", 0), Ok(None), record("user.created", 1)]),
            ..Default::default()
        };
        let commits = Arc::clone(&source.commits);
        let closed = Arc::clone(&source.closed);

        let report = ConsumerWorker::run(source, &registry, &fast(), &ShutdownSignal::new());

        assert_eq!(report.reason, StopReason::SourceClosed);
        assert_eq!(report.stats.received, 2);
        assert_eq!(report.stats.handled, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // Interval never elapsed; the only commit is the one on exit.
        assert_eq!(commits.load(Ordering::SeqCst), 1);
        assert_eq!(report.stats.commits, 1);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn commits_on_interval_independent_of_handler_outcome() {
        let registry = HandlerRegistry::builder()
            .register("user.updated", |_: &HandlerContext, _: &str, _: &Headers, _: &[u8]| -> Result<(), HandlerError> {
                Err(HandlerError::failed("always"))
            })
            .unwrap()
            .build();
        let source = Scripted {
            polls: (0..3).map(|o| record("user.updated", o)).collect(),
            ..Default::default()
        };
        let commits = Arc::clone(&source.commits);

        let options = fast().with_commit_interval(Duration::ZERO);
        let report = ConsumerWorker::run(source, &registry, &options, &ShutdownSignal::new());

        assert_eq!(report.stats.handler_failures, 3);
        assert_eq!(commits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn already_triggered_signal_cancels_before_polling() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        let source = Scripted {
            polls: VecDeque::from(vec![record("user.created", 0)]),
            ..Default::default()
        };
        let closed = Arc::clone(&source.closed);

        let report = ConsumerWorker::run(source, &HandlerRegistry::default(), &fast(), &signal);

        assert!(report.was_cancelled());
        assert_eq!(report.stats, ConsumerStats::default());
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn read_errors_back_off_and_continue() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = HandlerRegistry::builder()
            .register("user.deleted", counting(&calls))
            .unwrap()
            .build();
        let source = Scripted {
            polls: VecDeque::from(vec![
                Err(TransportError::Read("leader not available".into())),
                Err(TransportError::Read("leader not available".into())),
                record("user.deleted", 0),
            ]),
            ..Default::default()
        };

        let options = fast().with_read_backoff(Duration::from_millis(20));
        let started = Instant::now();
        let report = ConsumerWorker::run(source, &registry, &options, &ShutdownSignal::new());

        assert!(started.elapsed() >= Duration::from_millis(40));
        assert_eq!(report.stats.read_failures, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregistered_and_undecodable_records_are_skipped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = HandlerRegistry::builder()
            .register("user.created", counting(&calls))
            .unwrap()
            .build();
        let garbage = Ok(Some(ReceivedRecord {
            topic: "user-events".into(),
            partition: 0,
            offset: 1,
            record: Record::new(b"not json".to_vec()),
        }));
        let source = Scripted {
            polls: VecDeque::from(vec![record("user.renamed", 0), garbage, record("user.created", 2)]),
            ..Default::default()
        };

        let report = ConsumerWorker::run(source, &registry, &fast(), &ShutdownSignal::new());

        assert_eq!(report.stats.unhandled, 1);
        assert_eq!(report.stats.decode_failures, 1);
        assert_eq!(report.stats.handled, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn record_without_event_type_is_a_no_op() {
        let headers = Headers::new()
            .with(EVENT_ID_HEADER, EventId::new().to_string())
            .with(TIMESTAMP_HEADER, "0")
            .with(CONTENT_TYPE_HEADER, JSON_CONTENT_TYPE);
        let untagged = |offset: i64, headers: Headers| -> Poll {
            Ok(Some(ReceivedRecord {
                topic: "user-events".into(),
                partition: 0,
                offset,
                record: Record::new(b"{}".to_vec()).with_headers(headers),
            }))
        };
        let blank = headers.clone().with(EVENT_TYPE_HEADER, "  ");
        let source = Scripted {
            polls: VecDeque::from(vec![untagged(0, headers), untagged(1, blank)]),
            ..Default::default()
        };

        let report = ConsumerWorker::run(source, &HandlerRegistry::default(), &fast(), &ShutdownSignal::new());

        assert_eq!(report.stats.received, 2);
        assert_eq!(report.stats.unhandled, 2);
        assert_eq!(report.stats.decode_failures, 0);
    }

    #[test]
    fn headerless_structured_record_with_unregistered_type_is_skipped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = HandlerRegistry::builder()
            .register("user.created", counting(&calls))
            .unwrap()
            .build();
        let envelope = EventEnvelope::new(
            EventId::new(),
            "user.renamed",
            Utc::now(),
            EncodingScheme::Structured.content_type(),
            b"{}".to_vec(),
        )
        .unwrap();
        let mut record = encode_envelope(&envelope, None, EncodingScheme::Structured).unwrap();
        record.headers = Headers::new();
        let source = Scripted {
            polls: VecDeque::from(vec![Ok(Some(ReceivedRecord {
                topic: "user-events".into(),
                partition: 0,
                offset: 0,
                record,
            }))]),
            ..Default::default()
        };

        let report = ConsumerWorker::run(source, &registry, &fast(), &ShutdownSignal::new());

        assert_eq!(report.stats.unhandled, 1);
        assert_eq!(report.stats.decode_failures, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn payload_decode_errors_count_as_decode_failures() {
        let registry = HandlerRegistry::builder()
            .register("user.created", |_: &HandlerContext, _: &str, _: &Headers, payload: &[u8]| -> Result<(), HandlerError> {
                let _: u64 = userstream_events::codec::from_json(payload)?;
                Ok(())
            })
            .unwrap()
            .build();
        let source = Scripted {
            polls: VecDeque::from(vec![record("user.created", 0)]),
            ..Default::default()
        };

        let report = ConsumerWorker::run(source, &registry, &fast(), &ShutdownSignal::new());

        assert_eq!(report.stats.decode_failures, 1);
        assert_eq!(report.stats.handler_failures, 0);
        assert_eq!(report.stats.handled, 0);
    }

    #[test]
    fn fallback_receives_unregistered_types() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = HandlerRegistry::builder().fallback(counting(&calls)).build();
        let source = Scripted {
            polls: VecDeque::from(vec![record("user.renamed", 0)]),
            ..Default::default()
        };

        let report = ConsumerWorker::run(source, &registry, &fast(), &ShutdownSignal::new());

        assert_eq!(report.stats.unhandled, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_handler_is_isolated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = HandlerRegistry::builder()
            .register("user.updated", |_: &HandlerContext, _: &str, _: &Headers, _: &[u8]| -> Result<(), HandlerError> {
                panic!("boom")
            })
            .unwrap()
            .register("user.deleted", counting(&calls))
            .unwrap()
            .build();
        let source = Scripted {
            polls: VecDeque::from(vec![record("user.updated", 0), record("user.deleted", 1)]),
            ..Default::default()
        };

        let report = ConsumerWorker::run(source, &registry, &fast(), &ShutdownSignal::new());

        assert_eq!(report.stats.handler_failures, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn slow_handler_counts_as_failed() {
        let registry = HandlerRegistry::builder()
            .register("user.created", |_: &HandlerContext, _: &str, _: &Headers, _: &[u8]| -> Result<(), HandlerError> {
                thread::sleep(Duration::from_millis(30));
                Ok(())
            })
            .unwrap()
            .build();
        let source = Scripted {
            polls: VecDeque::from(vec![record("user.created", 0)]),
            ..Default::default()
        };

        let options = fast().with_handler_timeout(Duration::from_millis(5));
        let report = ConsumerWorker::run(source, &registry, &options, &ShutdownSignal::new());

        assert_eq!(report.stats.handled, 0);
        assert_eq!(report.stats.handler_failures, 1);
    }

    #[test]
    fn failed_commit_is_not_counted() {
        let source = Scripted {
            polls: VecDeque::from(vec![record("user.created", 0)]),
            fail_commits: true,
            ..Default::default()
        };
        let report = ConsumerWorker::run(source, &HandlerRegistry::default(), &fast(), &ShutdownSignal::new());
        assert_eq!(report.stats.commits, 0);
        assert_eq!(report.reason, StopReason::SourceClosed);
    }

    #[test]
    fn signal_wait_wakes_on_trigger() {
        let signal = ShutdownSignal::new();
        let remote = signal.clone();
        let trigger = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.trigger();
        });

        let started = Instant::now();
        assert!(signal.wait_timeout(Duration::from_secs(10)));
        assert!(started.elapsed() < Duration::from_secs(5));
        trigger.join().unwrap();

        assert!(!ShutdownSignal::new().wait_timeout(Duration::from_millis(5)));
    }

    #[test]
    fn panic_message_extracts_strings() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u8), "non-string panic payload");
    }
}
