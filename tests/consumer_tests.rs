// tests/consumer_tests.rs

//! End-to-end consumer scenarios against the in-process tracing facility.
//!
//! Each test builds its own `TraceHub`, so sessions never leak between tests
//! and they can run in parallel.

use std::{
    path::Path,
    sync::{Arc, mpsc},
    thread,
    time::Duration,
};

use uuid::Uuid;

use trace_consumer::{
    Collector, Consumer, ConsumerState, Privilege, RawRecord, TraceController, TraceError,
    TraceHub, TraceLevel, TraceProvider,
};

const SESSION: &str = "TestLogSession";
const PROVIDER: Uuid = Uuid::from_u128(0x036b8f65_8df3_46e4_abfc_6985c43d59ba);
const EVENT: Uuid = Uuid::from_u128(0x57e47923_a549_476f_86ca_503d57f59e62);
const WARM_UP: Uuid = Uuid::from_u128(0x1d1f4b0e_0000_4000_8000_000000000001);
const BUFFER_SIZE: usize = 1024 * 1024;
const DEADLINE: Duration = Duration::from_secs(5);

/// Elevated hub with one running real-time session and a registered provider.
struct LiveFixture {
    hub: TraceHub,
    controller: TraceController,
    provider: TraceProvider,
}

impl LiveFixture {
    fn start(name: &str) -> Self {
        let hub = TraceHub::new();
        let mut controller = TraceController::new(&hub);
        controller.start_realtime_session(name, BUFFER_SIZE).unwrap();
        controller.enable_provider(PROVIDER, TraceLevel::Verbose, 0).unwrap();
        let mut provider = TraceProvider::new(&hub, PROVIDER);
        provider.register().unwrap();
        Self { hub, controller, provider }
    }

    fn log(&self, event: Uuid, opcode: u8, payload: &[u8]) {
        self.provider
            .log(&RawRecord::new(event, opcode, TraceLevel::Information).with_payload(payload))
            .unwrap();
    }
}

/// Run `consume()` on its own thread; the result arrives on the returned channel.
fn spawn_consume(consumer: &Arc<Consumer>) -> mpsc::Receiver<Result<(), TraceError>> {
    let (tx, rx) = mpsc::channel();
    let consumer = Arc::clone(consumer);
    thread::spawn(move || {
        let _ = tx.send(consumer.consume());
    });
    rx
}

/// Log a marker record and wait until the consumer has dispatched it, which
/// proves the consuming thread is attached. The marker is then discarded.
fn wait_until_attached(fixture: &LiveFixture, collector: &Collector) {
    fixture.log(WARM_UP, 0, b"warm-up");
    assert!(collector.sank().wait_timeout(DEADLINE), "consumer never attached");
    let warm = collector.drain();
    assert_eq!(warm.len(), 1);
    assert_eq!(warm[0].event_type, WARM_UP);
}

#[test]
fn open_realtime_without_session_fails_on_consume() {
    let hub = TraceHub::new();
    let collector = Collector::new();
    let consumer = Consumer::new(collector.clone());

    consumer.open_realtime_session(&hub, SESSION).unwrap();
    assert!(consumer.is_open());

    let err = consumer.consume().unwrap_err();
    assert!(matches!(err, TraceError::NotFound(_)), "got {err:?}");
    assert_eq!(consumer.state(), ConsumerState::Idle);
    assert!(collector.is_empty());
}

#[test]
fn failed_consume_can_be_retried_after_reopen() {
    let hub = TraceHub::new();
    let collector = Collector::new();
    let consumer = Arc::new(Consumer::new(collector.clone()));

    consumer.open_realtime_session(&hub, SESSION).unwrap();
    assert!(consumer.consume().is_err());
    assert!(!consumer.is_open());

    let mut controller = TraceController::new(&hub);
    controller.start_realtime_session(SESSION, BUFFER_SIZE).unwrap();
    controller.enable_provider(PROVIDER, TraceLevel::Verbose, 0).unwrap();
    let mut provider = TraceProvider::new(&hub, PROVIDER);
    provider.register().unwrap();
    // Buffered by the session until a consumer attaches.
    provider
        .log(&RawRecord::new(EVENT, 7, TraceLevel::Error).with_payload(b"late"))
        .unwrap();

    consumer.open_realtime_session(&hub, SESSION).unwrap();
    let done = spawn_consume(&consumer);
    assert!(collector.sank().wait_timeout(DEADLINE));
    controller.stop().unwrap();
    assert_eq!(done.recv_timeout(DEADLINE).unwrap(), Ok(()));

    let records = collector.drain();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].opcode, 7);
    assert_eq!(records[0].payload, b"late");
}

#[test]
fn consumer_returns_when_session_is_stopped() {
    let mut fixture = LiveFixture::start(SESSION);
    let collector = Collector::new();
    let consumer = Arc::new(Consumer::new(collector.clone()));
    consumer.open_realtime_session(&fixture.hub, SESSION).unwrap();

    let done = spawn_consume(&consumer);
    wait_until_attached(&fixture, &collector);

    // No traffic: consume must still be blocked.
    assert!(done.recv_timeout(Duration::from_millis(50)).is_err());
    assert_eq!(consumer.state(), ConsumerState::Consuming);

    fixture.controller.stop().unwrap();
    assert_eq!(done.recv_timeout(DEADLINE).unwrap(), Ok(()));
    assert_eq!(consumer.state(), ConsumerState::Idle);
    assert!(!consumer.is_open());
    assert!(collector.is_empty());
}

#[test]
fn consume_event_delivers_payload() {
    let mut fixture = LiveFixture::start(SESSION);
    let collector = Collector::new();
    let consumer = Arc::new(Consumer::new(collector.clone()));
    consumer.open_realtime_session(&fixture.hub, SESSION).unwrap();

    let done = spawn_consume(&consumer);
    wait_until_attached(&fixture, &collector);

    fixture.log(EVENT, 1, b"This is but test data\0");
    assert!(collector.sank().wait_timeout(DEADLINE));

    fixture.controller.stop().unwrap();
    assert_eq!(done.recv_timeout(DEADLINE).unwrap(), Ok(()));

    let records = collector.drain();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].provider_id, PROVIDER);
    assert_eq!(records[0].event_type, EVENT);
    assert_eq!(records[0].payload, b"This is but test data\0");
}

#[test]
fn records_arrive_in_production_order() {
    for n in [0usize, 1, 2, 17, 250] {
        let mut fixture = LiveFixture::start(SESSION);
        let collector = Collector::new();
        let consumer = Arc::new(Consumer::new(collector.clone()));
        consumer.open_realtime_session(&fixture.hub, SESSION).unwrap();

        let done = spawn_consume(&consumer);
        wait_until_attached(&fixture, &collector);

        let expected: Vec<Vec<u8>> = (0..n).map(|i| (i as u32).to_le_bytes().to_vec()).collect();
        for (i, payload) in expected.iter().enumerate() {
            fixture.log(EVENT, (i % 256) as u8, payload);
        }
        let props = fixture.controller.stop().unwrap();
        assert_eq!(done.recv_timeout(DEADLINE).unwrap(), Ok(()), "n = {n}");

        let got: Vec<Vec<u8>> = collector.drain().into_iter().map(|r| r.payload).collect();
        assert_eq!(got, expected, "n = {n}");
        assert_eq!(props.records_lost, 0);
    }
}

#[test]
fn file_session_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("TestLogSession.etl");
    let payload: &[u8] = b"This is but test data\0";

    record_to_file(&path, payload);

    let collector = Collector::new();
    let consumer = Consumer::new(collector.clone());
    consumer.open_file_session(&path).unwrap();
    consumer.consume().unwrap();
    consumer.close();

    let records = collector.drain();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].payload_len(), payload.len());
    assert_eq!(records[0].payload, payload);
    assert_eq!(records[0].provider_id, PROVIDER);
    assert_eq!(consumer.state(), ConsumerState::Closed);
}

fn record_to_file(path: &Path, payload: &[u8]) {
    let hub = TraceHub::new();
    let mut controller = TraceController::new(&hub);
    controller.start_file_session(SESSION, path).unwrap();
    controller.enable_provider(PROVIDER, TraceLevel::Verbose, 0).unwrap();

    let mut provider = TraceProvider::new(&hub, PROVIDER);
    provider.register().unwrap();
    provider
        .log(&RawRecord::new(EVENT, 1, TraceLevel::Information).with_payload(payload))
        .unwrap();
    provider.unregister().unwrap();

    let props = controller.stop().unwrap();
    assert_eq!(props.records_written, 1);
}

#[test]
fn missing_or_damaged_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let consumer = Consumer::new(Collector::new());

    let missing = dir.path().join("absent.etl");
    assert!(matches!(consumer.open_file_session(&missing), Err(TraceError::NotFound(_))));

    let damaged = dir.path().join("damaged.etl");
    record_to_file(&damaged, b"payload that gets cut short");
    let len = std::fs::metadata(&damaged).unwrap().len();
    let file = std::fs::OpenOptions::new().write(true).open(&damaged).unwrap();
    file.set_len(len - 3).unwrap();

    consumer.open_file_session(&damaged).unwrap();
    assert!(matches!(consumer.consume(), Err(TraceError::Corrupt(_))));
    assert_eq!(consumer.state(), ConsumerState::Idle);
}

#[test]
fn unprivileged_start_is_denied_and_holds_nothing() {
    let hub = TraceHub::with_privilege(Privilege::Standard);
    let mut controller = TraceController::new(&hub);

    let err = controller.start_realtime_session(SESSION, BUFFER_SIZE).unwrap_err();
    assert!(err.is_access_denied());
    assert_eq!(hub.session_count(), 0);
    assert!(controller.session_name().is_none());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("denied.etl");
    assert!(controller.start_file_session(SESSION, &path).unwrap_err().is_access_denied());
    assert!(!path.exists());
}

#[test]
fn unprivileged_consumer_is_denied() {
    let fixture = LiveFixture::start(SESSION);
    let standard = fixture.hub.as_privilege(Privilege::Standard);

    let consumer = Consumer::new(Collector::new());
    consumer.open_realtime_session(&standard, SESSION).unwrap();
    assert!(consumer.consume().unwrap_err().is_access_denied());
}

#[test]
fn second_consumer_on_same_session_is_rejected() {
    let mut fixture = LiveFixture::start(SESSION);
    let collector = Collector::new();
    let first = Arc::new(Consumer::new(collector.clone()));
    first.open_realtime_session(&fixture.hub, SESSION).unwrap();
    let done = spawn_consume(&first);
    wait_until_attached(&fixture, &collector);

    let second = Consumer::new(Collector::new());
    second.open_realtime_session(&fixture.hub, SESSION).unwrap();
    assert!(matches!(second.consume(), Err(TraceError::AlreadyOpen(_))));

    fixture.controller.stop().unwrap();
    assert_eq!(done.recv_timeout(DEADLINE).unwrap(), Ok(()));
}

#[test]
fn close_twice_is_harmless() {
    let hub = TraceHub::new();
    let consumer = Consumer::new(Collector::new());
    consumer.open_realtime_session(&hub, SESSION).unwrap();

    consumer.close();
    assert_eq!(consumer.state(), ConsumerState::Closed);
    consumer.close();
    assert_eq!(consumer.state(), ConsumerState::Closed);
    assert!(matches!(
        consumer.open_realtime_session(&hub, SESSION),
        Err(TraceError::InvalidState(_))
    ));
}

#[test]
fn close_from_another_thread_ends_consume_gracefully() {
    let fixture = LiveFixture::start(SESSION);
    let collector = Collector::new();
    let consumer = Arc::new(Consumer::new(collector.clone()));
    consumer.open_realtime_session(&fixture.hub, SESSION).unwrap();

    let done = spawn_consume(&consumer);
    wait_until_attached(&fixture, &collector);

    consumer.close();
    assert_eq!(consumer.state(), ConsumerState::Closed);
    assert_eq!(done.recv_timeout(DEADLINE).unwrap(), Ok(()));
    consumer.close();

    // The session itself keeps running; only the consumer went away.
    assert!(fixture.hub.is_running(SESSION));
    let again = Consumer::new(Collector::new());
    again.open_realtime_session(&fixture.hub, SESSION).unwrap();
    assert!(again.is_open());
}

#[test]
fn open_twice_is_already_open() {
    let hub = TraceHub::new();
    let consumer = Consumer::new(Collector::new());
    consumer.open_realtime_session(&hub, SESSION).unwrap();
    assert!(matches!(
        consumer.open_realtime_session(&hub, SESSION),
        Err(TraceError::AlreadyOpen(_))
    ));
}
