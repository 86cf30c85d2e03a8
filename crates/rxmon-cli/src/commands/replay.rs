//! Replay command implementation.
//!
//! A trace is a text file with one item per line:
//!
//! ```text
//! # Mouse connects on slot 1
//! 10 01 41 04 02 2a 40
//! !settle
//! !start-pair 30
//! ```
//!
//! Hex lines are delivered as inbound frames. Lines starting with `!` are
//! directives acting on the monitor. Blank lines and `#` comments are
//! skipped.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{debug, info, warn};

use rxmon_core::receiver::BOLT_PRODUCT_ID;
use rxmon_core::{
    BroadcastHandler, DeviceIndex, EventDispatcher, EventReceiver, MockDeviceMonitor,
    MockRawDevice, MonitorOptions, NotificationFlags, ReceiverEvent, ReceiverKind,
    ReceiverMonitor, TokioRunner,
};
use rxmon_types::report::parse_hex;

use crate::cli::OutputFormat;
use crate::format::{format_event_json, format_event_text, format_sent_json, format_sent_text};
use crate::util::write_output;

/// Product id reported by the replayed receiver when it is not a Bolt.
const UNIFYING_PRODUCT_ID: u16 = 0xC52B;

/// Broadcast capacity; events are only drained at settle points.
const EVENT_CAPACITY: usize = 1024;

/// One parsed trace line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceLine {
    /// Inbound frame.
    Frame(Vec<u8>),
    /// `!start-pair <secs>`
    StartPair(u8),
    /// `!stop-pair`
    StopPair,
    /// `!wait-for <index>`
    WaitFor(DeviceIndex),
    /// `!settle`
    Settle,
}

/// Parse a trace, returning each item with its 1-based line number.
pub fn parse_trace(content: &str) -> Result<Vec<(usize, TraceLine)>> {
    let mut lines = Vec::new();
    for (i, raw) in content.lines().enumerate() {
        let number = i + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let item = parse_line(line).with_context(|| format!("Trace line {}", number))?;
        lines.push((number, item));
    }
    Ok(lines)
}

fn parse_line(line: &str) -> Result<TraceLine> {
    let Some(directive) = line.strip_prefix('!') else {
        return Ok(TraceLine::Frame(parse_hex(line)?));
    };

    let mut parts = directive.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next();
    if parts.next().is_some() {
        bail!("too many arguments to !{}", name);
    }

    let item = match (name, arg) {
        ("start-pair", Some(secs)) => TraceLine::StartPair(
            secs.parse()
                .with_context(|| format!("invalid pairing timeout '{}'", secs))?,
        ),
        ("wait-for", Some(index)) => TraceLine::WaitFor(parse_index(index)?),
        ("stop-pair", None) => TraceLine::StopPair,
        ("settle", None) => TraceLine::Settle,
        ("start-pair" | "wait-for", None) => bail!("!{} needs an argument", name),
        ("stop-pair" | "settle", Some(_)) => bail!("!{} takes no argument", name),
        _ => bail!("unknown directive !{}", name),
    };
    Ok(item)
}

fn parse_index(text: &str) -> Result<DeviceIndex> {
    let parsed = match text.strip_prefix("0x") {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.with_context(|| format!("invalid device index '{}'", text))
}

/// Arguments for the replay command.
#[derive(Debug, Clone)]
pub struct ReplayArgs {
    pub trace: PathBuf,
    pub kind: ReceiverKind,
    pub timeout: f64,
    pub format: OutputFormat,
    pub notifications: NotificationFlags,
    pub show_sent: bool,
}

struct Replay {
    raw: Arc<MockRawDevice>,
    monitor: ReceiverMonitor,
    runner: Arc<TokioRunner>,
    events: EventReceiver,
    format: OutputFormat,
    show_sent: bool,
    out: String,
}

impl Replay {
    /// Wait for background tasks, then collect what they produced.
    async fn settle(&mut self) -> Result<()> {
        self.runner.idle().await;
        self.drain()
    }

    fn drain(&mut self) -> Result<()> {
        if self.show_sent {
            for frame in self.raw.sent_reports() {
                let line = match self.format {
                    OutputFormat::Text => format_sent_text(&frame),
                    OutputFormat::Json => format_sent_json(&frame)?,
                };
                self.out.push_str(&line);
            }
        }
        self.raw.clear_sent();

        loop {
            match self.events.try_recv() {
                Ok(event) => self.push_event(&event)?,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("Dropped {} events; add more !settle lines", skipped)
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        Ok(())
    }

    fn push_event(&mut self, event: &ReceiverEvent) -> Result<()> {
        let line = match self.format {
            OutputFormat::Text => format_event_text(event),
            OutputFormat::Json => format_event_json(event)?,
        };
        self.out.push_str(&line);
        Ok(())
    }

    fn step(&mut self, number: usize, item: TraceLine) -> Result<()> {
        debug!("Trace line {}: {:?}", number, item);
        match item {
            TraceLine::Frame(frame) => self.raw.inject(&frame),
            TraceLine::StartPair(secs) => self
                .monitor
                .start_pair(secs)
                .with_context(|| format!("Trace line {}: failed to start pairing", number))?,
            TraceLine::StopPair => self
                .monitor
                .stop_pair()
                .with_context(|| format!("Trace line {}: failed to stop pairing", number))?,
            TraceLine::WaitFor(index) => self.monitor.wait_for_device(index),
            TraceLine::Settle => {}
        }
        Ok(())
    }
}

/// Replay a trace through a monitor on a mock receiver and return the
/// formatted output.
pub async fn run_replay(args: &ReplayArgs) -> Result<String> {
    let content = std::fs::read_to_string(&args.trace)
        .with_context(|| format!("Failed to read trace: {}", args.trace.display()))?;
    let lines = parse_trace(&content)?;

    let path = args.trace.display().to_string();
    let product_id = match args.kind {
        ReceiverKind::Bolt => BOLT_PRODUCT_ID,
        _ => UNIFYING_PRODUCT_ID,
    };
    let devices = MockDeviceMonitor::new();
    let raw = devices.insert(MockRawDevice::with_product_id(&path, product_id));

    let dispatcher = EventDispatcher::new(EVENT_CAPACITY);
    let events = dispatcher.subscribe();
    let runner = Arc::new(TokioRunner::current()?);

    let options = MonitorOptions::from_secs_f64(args.timeout)?
        .kind(args.kind)
        .notifications(args.notifications);
    let monitor = ReceiverMonitor::new(
        &path,
        &devices,
        options,
        Arc::new(BroadcastHandler::new(dispatcher)),
        runner.clone(),
    )
    .with_context(|| format!("Failed to open receiver for {}", path))?;
    monitor.ready().context("Failed to start monitoring")?;

    let mut replay = Replay {
        raw,
        monitor,
        runner,
        events,
        format: args.format,
        show_sent: args.show_sent,
        out: String::new(),
    };

    let total = lines.len();
    for (number, item) in lines {
        let settle = item == TraceLine::Settle;
        replay.step(number, item)?;
        if settle {
            replay.settle().await?;
        }
    }
    replay.settle().await?;

    info!("Replayed {} trace lines (pairing state {})", total, replay.monitor.pair_state());
    Ok(replay.out)
}

pub async fn cmd_replay(args: ReplayArgs, output: Option<&PathBuf>) -> Result<()> {
    let out = run_replay(&args).await?;
    write_output(output, &out)
}
