//! Integration tests for the receiver monitor.
//!
//! Reports are injected through the mock transport. Background work is
//! held in a `QueuedRunner` so tests decide when it runs.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use proptest::prelude::*;

use rxmon_core::handlers::{EventHandler, EventHandlers, HandlerLock};
use rxmon_core::mock::{MockDeviceMonitor, MockRawDevice, QueuedRunner, RegisterReply};
use rxmon_core::monitor::{MonitorOptions, ReceiverHandler, ReceiverMonitor, SubscriptionKind};
use rxmon_core::pairing::PairState;
use rxmon_core::raw::RawDevice;
use rxmon_core::receiver::{BOLT_PRODUCT_ID, Receiver, ReceiverKind};
use rxmon_core::task::TokioRunner;
use rxmon_core::{Error, Result};
use rxmon_types::{
    ConnectionEvent, DisconnectionEvent, DiscoveryRecord, Passkey, RECEIVER_INDEX, Report,
    ReportType, register, sub_id,
};

// --- Fixtures ---

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Add(ConnectionEvent),
    Remove(DisconnectionEvent),
    PairReady(DiscoveryRecord, Passkey),
}

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<u8>>,
}

impl Recorder {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn fail_device(&self, index: u8) {
        self.failing.lock().unwrap().insert(index);
    }
}

impl ReceiverHandler for Recorder {
    fn add_device(&self, _: &Arc<Receiver>, event: ConnectionEvent) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Add(event));
        if self.failing.lock().unwrap().contains(&event.index) {
            return Err(Error::device(event.index, "feature discovery failed"));
        }
        Ok(())
    }

    fn remove_device(&self, _: &Arc<Receiver>, event: DisconnectionEvent) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Remove(event));
        if self.failing.lock().unwrap().contains(&event.index) {
            return Err(Error::device(event.index, "teardown failed"));
        }
        Ok(())
    }

    fn pair_ready(&self, _: &Arc<Receiver>, record: &DiscoveryRecord, passkey: Passkey) {
        self.calls
            .lock()
            .unwrap()
            .push(Call::PairReady(record.clone(), passkey));
    }
}

struct Harness {
    raw: Arc<MockRawDevice>,
    runner: Arc<QueuedRunner>,
    recorder: Arc<Recorder>,
    monitor: ReceiverMonitor,
}

impl Harness {
    fn new(product_id: u16) -> Self {
        let devices = MockDeviceMonitor::new();
        let raw = devices.insert(MockRawDevice::with_product_id("/dev/hidraw0", product_id));
        let runner = Arc::new(QueuedRunner::new());
        let recorder = Arc::new(Recorder::default());
        let monitor = ReceiverMonitor::new(
            "/dev/hidraw0",
            &devices,
            MonitorOptions::new().timeout(Duration::from_millis(200)),
            recorder.clone(),
            runner.clone(),
        )
        .unwrap();
        monitor.ready().unwrap();
        raw.clear_sent();
        Self {
            raw,
            runner,
            recorder,
            monitor,
        }
    }

    fn unifying() -> Self {
        Self::new(0xC52B)
    }

    fn bolt() -> Self {
        Self::new(BOLT_PRODUCT_ID)
    }

    fn inject(&self, report: &Report) {
        self.raw.inject_report(report);
    }
}

fn connect(index: u8) -> Report {
    Report::from_bytes(&[0x10, index, 0x41, 0x04, 0x02, 0x2a, 0x40]).unwrap()
}

fn disconnect(index: u8) -> Report {
    Report::from_bytes(&[0x10, index, 0x40, 0x00, 0x00, 0x00, 0x00]).unwrap()
}

fn long(sub: u8, address: u8, params: &[u8]) -> Report {
    Report::new(ReportType::Long, RECEIVER_INDEX, sub, address, params).unwrap()
}

fn discovery_info(seq: u16) -> Report {
    let mut params = seq.to_be_bytes().to_vec();
    params.extend_from_slice(&[0x02, 0x34, 0xb0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0x01]);
    long(sub_id::DEVICE_DISCOVERED, 0x00, &params)
}

fn discovery_name(seq: u16) -> Report {
    let mut params = seq.to_be_bytes().to_vec();
    params.push(6);
    params.extend_from_slice(b"MX Any");
    long(sub_id::DEVICE_DISCOVERED, 0x01, &params)
}

fn passkey() -> Report {
    long(sub_id::PASSKEY_REQUEST, 0x00, b"042137")
}

fn short(sub: u8, address: u8) -> Report {
    Report::new(ReportType::Short, RECEIVER_INDEX, sub, address, &[]).unwrap()
}

fn frame_starts_with(frame: &[u8], prefix: &[u8]) -> bool {
    frame.len() >= prefix.len() && &frame[..prefix.len()] == prefix
}

/// Drive a Bolt harness to `FindingPasskey`.
fn finding_passkey() -> Harness {
    let h = Harness::bolt();
    h.monitor.start_pair(30).unwrap();
    h.inject(&discovery_info(9));
    h.inject(&discovery_name(9));
    h.runner.run_pending();
    assert_eq!(h.monitor.pair_state(), PairState::FindingPasskey);
    h.raw.clear_sent();
    h
}

// --- Lifecycle dispatch ---

#[test]
fn test_lifecycle_hooks_never_run_inline() {
    let h = Harness::unifying();

    h.inject(&connect(1));
    assert!(h.recorder.calls().is_empty());
    assert_eq!(h.runner.pending(), 1);

    h.runner.run_pending();
    match h.recorder.calls().as_slice() {
        [Call::Add(event)] => {
            assert_eq!(event.index, 1);
            assert!(event.link_established);
            assert!(!event.from_timeout_check);
        }
        other => panic!("unexpected calls: {other:?}"),
    }
}

#[test]
fn test_disconnection_reaches_remove_hook() {
    let h = Harness::unifying();
    h.inject(&disconnect(3));
    h.runner.run_pending();
    assert_eq!(
        h.recorder.calls(),
        vec![Call::Remove(DisconnectionEvent {
            index: 3,
            unpaired: false
        })]
    );
}

#[test]
fn test_long_lifecycle_reports_accepted() {
    let h = Harness::unifying();
    let report = Report::new(ReportType::Long, 2, sub_id::DEVICE_DISCONNECTION, 0x02, &[]).unwrap();
    h.inject(&report);
    h.runner.run_pending();
    assert_eq!(
        h.recorder.calls(),
        vec![Call::Remove(DisconnectionEvent {
            index: 2,
            unpaired: true
        })]
    );
}

#[test]
fn test_unrelated_reports_ignored_by_lifecycle() {
    let h = Harness::unifying();
    h.raw.inject(&[0x20, 0x01, 0x41, 0x00, 0x00, 0x00, 0x00]);
    h.inject(&short(sub_id::PAIR_STATUS, 0x01));
    assert_eq!(h.runner.pending(), 0);
}

#[test]
fn test_hook_failure_is_not_fatal() {
    let h = Harness::unifying();
    h.recorder.fail_device(1);

    h.inject(&connect(1));
    h.inject(&connect(2));
    h.runner.run_pending();

    let indices: Vec<u8> = h
        .recorder
        .calls()
        .iter()
        .filter_map(|call| match call {
            Call::Add(event) => Some(event.index),
            _ => None,
        })
        .collect();
    assert_eq!(indices, vec![1, 2]);
    assert!(h.monitor.is_subscribed(SubscriptionKind::Lifecycle));
}

/// Collects formatted log output.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn lines(&self, level: &str) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .filter(|line| line.contains(level))
            .map(str::to_owned)
            .collect()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_hook_failure_logs_one_error_line() {
    let h = Harness::unifying();
    h.recorder.fail_device(3);

    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .without_time()
        .finish();
    tracing::subscriber::with_default(subscriber, || {
        h.inject(&connect(3));
        h.runner.run_pending();
    });

    let errors = logs.lines("ERROR");
    assert_eq!(errors.len(), 1, "logs: {:?}", errors);
    assert!(errors[0].contains("Failed to add device 3 to receiver on /dev/hidraw0"));
    assert!(errors[0].contains("feature discovery failed"));

    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .without_time()
        .finish();
    tracing::subscriber::with_default(subscriber, || {
        h.inject(&disconnect(3));
        h.runner.run_pending();
    });

    let errors = logs.lines("ERROR");
    assert_eq!(errors.len(), 1, "logs: {:?}", errors);
    assert!(errors[0].contains("Failed to remove device 3 from receiver on /dev/hidraw0"));
    assert!(errors[0].contains("teardown failed"));
}

#[test]
fn test_tasks_after_drop_do_nothing() {
    let h = Harness::unifying();
    h.inject(&connect(1));
    assert_eq!(h.runner.pending(), 1);

    let Harness {
        runner,
        recorder,
        monitor,
        ..
    } = h;
    drop(monitor);

    assert_eq!(runner.run_pending(), 1);
    assert!(recorder.calls().is_empty());
}

// --- ready() / enumerate() ---

#[test]
fn test_ready_is_idempotent() {
    let h = Harness::unifying();
    let raw_handlers = h.raw.handler_count();
    let decoded_handlers = h.monitor.receiver().event_handler_count();

    h.monitor.ready().unwrap();

    assert_eq!(h.raw.handler_count(), raw_handlers);
    assert_eq!(h.monitor.receiver().event_handler_count(), decoded_handlers);
    for kind in SubscriptionKind::ALL {
        assert!(h.monitor.is_subscribed(kind), "{kind:?} not subscribed");
    }

    h.inject(&connect(4));
    assert_eq!(h.runner.run_pending(), 1);
    assert_eq!(h.recorder.calls().len(), 1);
}

#[test]
fn test_ready_enumerates() {
    let h = Harness::unifying();
    h.monitor.ready().unwrap();
    assert_eq!(
        h.raw.sent(),
        vec![vec![0x10, 0xff, 0x80, register::CONNECTION_STATE, 0x02, 0x00, 0x00]]
    );
}

#[test]
fn test_enumerate_error_is_returned() {
    let h = Harness::unifying();
    h.raw.set_reply(register::CONNECTION_STATE, RegisterReply::Silent);
    assert!(matches!(h.monitor.enumerate(), Err(Error::Timeout { .. })));
}

// --- wait_for_device() ---

#[test]
fn test_wait_for_device_fires_once() {
    let h = Harness::unifying();
    h.monitor.wait_for_device(2);
    assert_eq!(h.monitor.pending_waits(), 1);

    let traffic = Report::from_bytes(&[0x10, 0x02, 0x04, 0x00, 0x00, 0x00, 0x00]).unwrap();
    h.inject(&traffic);
    h.inject(&traffic);
    h.inject(&traffic);
    assert_eq!(h.monitor.pending_waits(), 0);

    h.runner.run_pending();
    assert_eq!(
        h.recorder.calls(),
        vec![Call::Add(ConnectionEvent::synthesized(2))]
    );
}

#[test]
fn test_wait_for_device_ignores_other_indices() {
    let h = Harness::unifying();
    h.monitor.wait_for_device(5);

    h.inject(&connect(1));
    h.runner.run_pending();

    assert_eq!(h.monitor.pending_waits(), 1);
    assert!(
        !h.recorder
            .calls()
            .iter()
            .any(|call| matches!(call, Call::Add(event) if event.index == 5))
    );
}

#[test]
fn test_wait_for_device_synthesized_event() {
    let h = Harness::unifying();
    h.monitor.wait_for_device(6);
    h.raw.inject(&[0x11, 0x06, 0x0e, 0x10, 0x00, 0x00, 0x00]);
    h.runner.run_pending();

    match h.recorder.calls().as_slice() {
        [Call::Add(event)] => {
            assert_eq!(event.index, 6);
            assert!(event.link_established);
            assert!(!event.with_payload);
            assert!(event.from_timeout_check);
        }
        other => panic!("unexpected calls: {other:?}"),
    }
}

// --- Pairing ---

#[test]
fn test_start_pair_bolt_discovers() {
    let h = Harness::bolt();
    h.monitor.start_pair(30).unwrap();

    assert_eq!(h.monitor.pair_state(), PairState::Discovering);
    let sent = h.raw.sent();
    assert_eq!(sent.len(), 1);
    assert!(frame_starts_with(&sent[0], &[0x11, 0xff, 0x82, 0xc0, 30, 0x01]));
}

#[test]
fn test_start_pair_legacy_opens_lock() {
    let h = Harness::unifying();
    h.monitor.start_pair(45).unwrap();

    assert_eq!(h.monitor.pair_state(), PairState::Pairing);
    assert_eq!(h.raw.sent(), vec![vec![0x10, 0xff, 0x80, 0xb2, 0x01, 0x53, 45]]);
}

#[test]
fn test_start_pair_twice() {
    let h = Harness::unifying();
    h.monitor.start_pair(30).unwrap();
    assert!(matches!(
        h.monitor.start_pair(30),
        Err(Error::PairingInProgress)
    ));
    assert_eq!(h.raw.sent().len(), 1);
}

#[test]
fn test_start_pair_retry_after_stop() {
    let h = Harness::unifying();
    h.monitor.start_pair(30).unwrap();
    h.monitor.stop_pair().unwrap();

    h.monitor.start_pair(30).unwrap();
    assert_eq!(h.monitor.pair_state(), PairState::Pairing);
}

#[test]
fn test_start_pair_failure_reverts() {
    let h = Harness::unifying();
    h.raw.set_reply(register::DEVICE_PAIRING, RegisterReply::Error(0x07));

    assert!(matches!(h.monitor.start_pair(30), Err(Error::Protocol { .. })));
    assert_eq!(h.monitor.pair_state(), PairState::NotPairing);
}

#[test]
fn test_incomplete_discovery_stays_discovering() {
    let h = Harness::bolt();
    h.monitor.start_pair(30).unwrap();
    h.raw.clear_sent();

    h.inject(&discovery_info(1));

    assert_eq!(h.monitor.pair_state(), PairState::Discovering);
    assert_eq!(h.runner.pending(), 0);
    assert!(h.raw.sent().is_empty());
}

#[test]
fn test_complete_discovery_starts_bolt_pairing() {
    let h = Harness::bolt();
    h.monitor.start_pair(30).unwrap();
    h.raw.clear_sent();

    h.inject(&discovery_info(1));
    h.inject(&discovery_name(1));
    assert_eq!(h.monitor.pair_state(), PairState::FindingPasskey);
    // Issued from a background task, not inline.
    assert!(h.raw.sent().is_empty());

    h.runner.run_pending();
    let sent = h.raw.sent();
    assert_eq!(sent.len(), 1);
    assert!(frame_starts_with(
        &sent[0],
        &[0x11, 0xff, 0x82, 0xc1, 0x01, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0x01, 0x14]
    ));

    // A repeated name part changes nothing once the record is complete.
    h.inject(&discovery_name(1));
    assert_eq!(h.runner.run_pending(), 0);
}

#[test]
fn test_bolt_pairing_failure_is_logged_not_fatal() {
    let h = Harness::bolt();
    h.monitor.start_pair(30).unwrap();
    h.raw.set_reply(register::BOLT_PAIRING, RegisterReply::Error(0x04));

    h.inject(&discovery_info(1));
    h.inject(&discovery_name(1));
    h.runner.run_pending();

    assert_eq!(h.monitor.pair_state(), PairState::FindingPasskey);
}

#[test]
fn test_passkey_in_finding_passkey() {
    let h = finding_passkey();

    h.inject(&passkey());
    assert_eq!(h.monitor.pair_state(), PairState::Pairing);

    let ready: Vec<_> = h
        .recorder
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::PairReady(record, passkey) => Some((record, passkey)),
            _ => None,
        })
        .collect();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].0.name, "MX Any");
    assert_eq!(ready[0].0.address, [0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6]);
    assert_eq!(ready[0].1, Passkey(42137));

    // Duplicate request: already pairing.
    h.inject(&passkey());
    assert_eq!(h.recorder.calls().len(), 1);
}

#[test]
fn test_passkey_out_of_state_ignored() {
    let h = Harness::bolt();
    h.inject(&passkey());
    assert_eq!(h.monitor.pair_state(), PairState::NotPairing);

    h.monitor.start_pair(30).unwrap();
    h.inject(&passkey());
    assert_eq!(h.monitor.pair_state(), PairState::Discovering);
    assert!(h.recorder.calls().is_empty());
}

#[test]
fn test_short_passkey_report_ignored() {
    let h = finding_passkey();
    h.inject(&short(sub_id::PASSKEY_REQUEST, 0x00));
    assert_eq!(h.monitor.pair_state(), PairState::FindingPasskey);
    assert!(h.recorder.calls().is_empty());
}

#[test]
fn test_discovery_status_ends_discovery() {
    let h = Harness::bolt();
    h.monitor.start_pair(30).unwrap();

    h.inject(&short(sub_id::DISCOVERY_STATUS, 0x01));
    assert_eq!(h.monitor.pair_state(), PairState::Discovering);

    h.inject(&short(sub_id::DISCOVERY_STATUS, 0x00));
    assert_eq!(h.monitor.pair_state(), PairState::NotPairing);
}

#[test]
fn test_pair_status_closed_while_pairing() {
    let h = Harness::unifying();
    h.monitor.start_pair(30).unwrap();
    h.raw.clear_sent();

    h.inject(&short(sub_id::PAIR_STATUS, 0x00));

    assert_eq!(h.monitor.pair_state(), PairState::NotPairing);
    assert!(h.raw.sent().is_empty());
    assert_eq!(h.runner.pending(), 0);
    assert!(h.recorder.calls().is_empty());
}

#[test]
fn test_bolt_pair_status_closed_while_finding_passkey() {
    let h = finding_passkey();
    h.inject(&long(sub_id::BOLT_PAIR_STATUS, 0x00, &[0x00]));
    assert_eq!(h.monitor.pair_state(), PairState::NotPairing);
    assert!(h.raw.sent().is_empty());
}

#[test]
fn test_stale_status_ignored() {
    let h = Harness::bolt();
    h.inject(&short(sub_id::PAIR_STATUS, 0x00));
    h.inject(&short(sub_id::DISCOVERY_STATUS, 0x00));
    assert_eq!(h.monitor.pair_state(), PairState::NotPairing);

    h.monitor.start_pair(30).unwrap();
    // Pair status while discovering is not a transition.
    h.inject(&long(sub_id::BOLT_PAIR_STATUS, 0x00, &[0x00]));
    assert_eq!(h.monitor.pair_state(), PairState::Discovering);
}

#[test]
fn test_stop_pair_while_discovering() {
    let h = Harness::bolt();
    h.monitor.start_pair(30).unwrap();
    h.raw.clear_sent();

    h.monitor.stop_pair().unwrap();

    assert_eq!(h.monitor.pair_state(), PairState::NotPairing);
    let sent = h.raw.sent();
    assert_eq!(sent.len(), 1);
    assert!(frame_starts_with(&sent[0], &[0x11, 0xff, 0x82, 0xc0, 0x00, 0x02]));
}

#[test]
fn test_stop_pair_while_finding_passkey() {
    let h = finding_passkey();
    h.monitor.stop_pair().unwrap();

    assert_eq!(h.monitor.pair_state(), PairState::NotPairing);
    let sent = h.raw.sent();
    assert_eq!(sent.len(), 1);
    assert!(frame_starts_with(&sent[0], &[0x11, 0xff, 0x82, 0xc1, 0x02]));
}

#[test]
fn test_stop_pair_while_pairing_legacy() {
    let h = Harness::unifying();
    h.monitor.start_pair(30).unwrap();
    h.raw.clear_sent();

    h.monitor.stop_pair().unwrap();

    assert_eq!(h.monitor.pair_state(), PairState::NotPairing);
    assert_eq!(h.raw.sent(), vec![vec![0x10, 0xff, 0x80, 0xb2, 0x02, 0x00, 0x00]]);
}

#[test]
fn test_stop_pair_while_idle() {
    let h = Harness::bolt();
    h.monitor.stop_pair().unwrap();
    assert_eq!(h.monitor.pair_state(), PairState::NotPairing);
    assert!(h.raw.sent().is_empty());
}

#[test]
fn test_stop_pair_error_still_stops() {
    let h = Harness::unifying();
    h.monitor.start_pair(30).unwrap();
    h.raw.set_reply(register::DEVICE_PAIRING, RegisterReply::Silent);

    assert!(matches!(h.monitor.stop_pair(), Err(Error::Timeout { .. })));
    assert_eq!(h.monitor.pair_state(), PairState::NotPairing);
}

#[test]
fn test_new_pairing_after_stop_resets_record() {
    let h = Harness::bolt();
    h.monitor.start_pair(30).unwrap();
    h.inject(&discovery_info(1));
    h.monitor.stop_pair().unwrap();

    h.monitor.start_pair(30).unwrap();
    // The earlier info part must not combine with this name part.
    h.inject(&discovery_name(1));
    assert_eq!(h.monitor.pair_state(), PairState::Discovering);
}

// --- Threaded transport ---

/// Delivers every inbound frame on its own I/O thread, like a hidraw reader.
struct ThreadedDevice {
    handlers: Arc<EventHandlers<[u8]>>,
    inbound: crossbeam_channel::Sender<Vec<u8>>,
}

impl ThreadedDevice {
    fn spawn() -> Arc<Self> {
        let handlers = Arc::new(EventHandlers::<[u8]>::new());
        let (inbound, frames) = crossbeam_channel::unbounded::<Vec<u8>>();
        let io_handlers = Arc::clone(&handlers);
        std::thread::spawn(move || {
            for frame in frames {
                io_handlers.dispatch(&frame[..]);
            }
        });
        Arc::new(Self { handlers, inbound })
    }

    fn deliver(&self, frame: &[u8]) {
        self.inbound.send(frame.to_vec()).unwrap();
    }
}

impl RawDevice for ThreadedDevice {
    fn path(&self) -> &str {
        "/dev/hidraw-threaded"
    }

    fn product_id(&self) -> u16 {
        0xC52B
    }

    fn send_report(&self, report: &[u8]) -> Result<()> {
        if report[2] & 0xf0 == 0x80 {
            self.deliver(report);
        }
        Ok(())
    }

    fn add_event_handler(&self, handler: EventHandler<[u8]>) -> HandlerLock {
        self.handlers.add(handler)
    }
}

/// Queries the receiver from inside `add_device`.
struct QueryingHandler {
    results: crossbeam_channel::Sender<Result<()>>,
}

impl ReceiverHandler for QueryingHandler {
    fn add_device(&self, receiver: &Arc<Receiver>, _: ConnectionEvent) -> Result<()> {
        let result = receiver.get_register(register::CONNECTION_STATE, &[], false);
        let _ = self.results.send(result.map(|_| ()));
        Ok(())
    }

    fn remove_device(&self, _: &Arc<Receiver>, _: DisconnectionEvent) -> Result<()> {
        Ok(())
    }

    fn pair_ready(&self, _: &Arc<Receiver>, _: &DiscoveryRecord, _: Passkey) {}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_hook_register_exchange_does_not_deadlock() {
    let device = ThreadedDevice::spawn();
    let receiver = Arc::new(Receiver::new(
        device.clone(),
        ReceiverKind::Unifying,
        Duration::from_secs(2),
    ));
    let (results, outcomes) = crossbeam_channel::unbounded();
    let runner = Arc::new(TokioRunner::current().unwrap());

    let monitor = tokio::task::block_in_place(|| {
        let monitor = ReceiverMonitor::with_receiver(
            receiver,
            Arc::new(QueryingHandler { results }),
            runner.clone(),
        )?;
        monitor.ready()?;
        Ok::<_, Error>(monitor)
    })
    .unwrap();

    device.deliver(connect(1).as_bytes());
    device.deliver(connect(2).as_bytes());

    tokio::time::timeout(Duration::from_secs(5), async {
        // Wait until both lifecycle tasks have been submitted and finished.
        while outcomes.len() < 2 {
            runner.idle().await;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("hooks did not complete");

    for outcome in outcomes.try_iter() {
        assert!(outcome.is_ok(), "register exchange failed: {outcome:?}");
    }
    drop(monitor);
}

// --- Property tests ---

proptest! {
    /// Every accepted lifecycle report yields exactly one hook call.
    #[test]
    fn prop_one_hook_per_lifecycle_report(
        reports in proptest::collection::vec((any::<bool>(), 1u8..=6), 0..40)
    ) {
        let h = Harness::unifying();
        for (is_connect, index) in &reports {
            let report = if *is_connect { connect(*index) } else { disconnect(*index) };
            h.inject(&report);
        }
        h.runner.run_pending();

        let calls = h.recorder.calls();
        prop_assert_eq!(calls.len(), reports.len());
        for ((is_connect, index), call) in reports.iter().zip(&calls) {
            match call {
                Call::Add(event) => {
                    prop_assert!(*is_connect);
                    prop_assert_eq!(event.index, *index);
                }
                Call::Remove(event) => {
                    prop_assert!(!*is_connect);
                    prop_assert_eq!(event.index, *index);
                }
                Call::PairReady(..) => prop_assert!(false, "unexpected pair_ready"),
            }
        }
    }

    /// Arbitrary inbound frames never panic the monitor and never move it
    /// out of `NotPairing` without a pairing attempt.
    #[test]
    fn prop_arbitrary_frames_are_safe(
        frames in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..24), 0..32)
    ) {
        let h = Harness::bolt();
        for frame in &frames {
            h.raw.inject(frame);
        }
        h.runner.run_pending();
        prop_assert_eq!(h.monitor.pair_state(), PairState::NotPairing);
    }
}
