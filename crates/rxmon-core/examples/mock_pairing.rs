//! Example: Pairing a Device on a Simulated Bolt Receiver
//!
//! This example drives a `ReceiverMonitor` over the mock transport: it
//! starts pairing, feeds the discovery and passkey reports a Bolt receiver
//! would send, and prints what a handler sees along the way.
//!
//! Run with: `cargo run --example mock_pairing`

use std::sync::Arc;

use rxmon_core::receiver::BOLT_PRODUCT_ID;
use rxmon_core::{
    ConnectionEvent, DisconnectionEvent, DiscoveryRecord, MockDeviceMonitor, MockRawDevice,
    MonitorOptions, Passkey, Receiver, ReceiverHandler, ReceiverMonitor, TokioRunner,
};

const PATH: &str = "/dev/hidraw-bolt";

struct PrintingHandler;

impl ReceiverHandler for PrintingHandler {
    fn add_device(&self, receiver: &Arc<Receiver>, event: ConnectionEvent) -> rxmon_core::Result<()> {
        println!(
            "[{}] device {} added: {} (pid 0x{:04x})",
            receiver.path(),
            event.index,
            event.device_type,
            event.pid
        );
        Ok(())
    }

    fn remove_device(
        &self,
        receiver: &Arc<Receiver>,
        event: DisconnectionEvent,
    ) -> rxmon_core::Result<()> {
        println!("[{}] device {} removed", receiver.path(), event.index);
        Ok(())
    }

    fn pair_ready(&self, receiver: &Arc<Receiver>, record: &DiscoveryRecord, passkey: Passkey) {
        println!(
            "[{}] type {} on \"{}\" ({}) and press enter",
            receiver.path(),
            passkey,
            record.name,
            record.address_string()
        );
    }
}

fn long_frame(sub_id: u8, address: u8, params: &[u8]) -> Vec<u8> {
    let mut frame = vec![0x11, 0xff, sub_id, address];
    frame.extend_from_slice(params);
    frame.resize(20, 0);
    frame
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let devices = MockDeviceMonitor::new();
    let raw = devices.insert(MockRawDevice::with_product_id(PATH, BOLT_PRODUCT_ID));
    let runner = Arc::new(TokioRunner::current()?);

    let monitor = ReceiverMonitor::new(
        PATH,
        &devices,
        MonitorOptions::from_secs_f64(1.0)?,
        Arc::new(PrintingHandler),
        runner.clone(),
    )?;
    monitor.ready()?;

    println!("Starting pairing...");
    monitor.start_pair(30)?;

    // Device info: sequence 1, mouse, pid 0xb034, address AA:BB:CC:DD:EE:FF.
    raw.inject(&long_frame(
        0x4f,
        0x00,
        &[0x00, 0x01, 0x02, 0x34, 0xb0, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, 0x01],
    ));
    // Device name for the same sequence.
    raw.inject(&long_frame(0x4f, 0x01, &[0x00, 0x01, 0x07, b'M', b'X', b' ', b'M', b'a', b's', b't']));
    runner.idle().await;
    println!("State after discovery: {}", monitor.pair_state());

    raw.inject(&long_frame(0x4d, 0x00, b"482915"));

    // The device links once the passkey is accepted.
    raw.inject(&[0x10, 0x01, 0x41, 0x04, 0x02, 0x34, 0xb0]);
    raw.inject(&long_frame(0x54, 0x00, &[]));
    runner.idle().await;

    println!("State after pairing: {}", monitor.pair_state());
    Ok(())
}
