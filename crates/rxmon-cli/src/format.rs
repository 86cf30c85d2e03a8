//! Output formatting utilities for text and JSON output.
//!
//! Every formatter returns complete lines, newline included, so replay
//! output can be concatenated and written once.

use anyhow::Result;
use serde::Serialize;

use rxmon_core::{ReceiverEvent, Report};

use crate::commands::{DecodedEvent, DecodedReport};

/// Format a receiver event as one line of text.
pub fn format_event_text(event: &ReceiverEvent) -> String {
    let body = match event {
        ReceiverEvent::DeviceAdded { event, .. } => {
            let mut line = format!("device {} added", event.index);
            if event.from_timeout_check {
                line.push_str(" (seen in traffic)");
            } else {
                line.push_str(&format!(" ({}, pid 0x{:04x}", event.device_type, event.pid));
                if !event.link_established {
                    line.push_str(", no link");
                }
                line.push(')');
            }
            line
        }
        ReceiverEvent::DeviceRemoved { event, .. } => {
            if event.unpaired {
                format!("device {} removed (unpaired)", event.index)
            } else {
                format!("device {} removed", event.index)
            }
        }
        ReceiverEvent::PairReady {
            device, passkey, ..
        } => format!(
            "enter passkey {} on {} ({}, pid 0x{:04x})",
            passkey,
            device.name,
            device.address_string(),
            device.pid
        ),
        other => format!("{:?}", other),
    };
    format!("{}: {}\n", event.receiver(), body)
}

/// Format a receiver event as one line of JSON.
pub fn format_event_json(event: &ReceiverEvent) -> Result<String> {
    json_line(event)
}

#[derive(Serialize)]
struct SentFrame {
    #[serde(rename = "type")]
    kind: &'static str,
    frame: String,
}

/// Format a frame written to the receiver.
pub fn format_sent_text(report: &Report) -> String {
    format!("> {}\n", report)
}

/// Format a frame written to the receiver as JSON.
pub fn format_sent_json(report: &Report) -> Result<String> {
    json_line(&SentFrame {
        kind: "sent",
        frame: report.to_string(),
    })
}

fn json_line<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    Ok(line)
}

/// Format a decoded report as text.
pub fn format_decoded_text(decoded: &DecodedReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("Type:     {:?}\n", decoded.report_type));
    out.push_str(&format!("Index:    0x{:02x}\n", decoded.device_index));
    out.push_str(&format!("Sub-id:   0x{:02x} ({})\n", decoded.sub_id, decoded.name));
    out.push_str(&format!("Address:  0x{:02x}\n", decoded.address));
    out.push_str(&format!("Params:   {}\n", hex(&decoded.params)));
    if let Some(event) = &decoded.event {
        out.push_str(&format!("Event:    {}\n", describe(event)));
    }
    if let Some(problem) = &decoded.problem {
        out.push_str(&format!("Problem:  {}\n", problem));
    }
    out
}

/// Format a decoded report as pretty JSON.
pub fn format_decoded_json(decoded: &DecodedReport) -> Result<String> {
    let mut out = serde_json::to_string_pretty(decoded)?;
    out.push('\n');
    Ok(out)
}

fn describe(event: &DecodedEvent) -> String {
    match event {
        DecodedEvent::Connection(e) => format!(
            "device {} connected ({}, pid 0x{:04x}, {}{})",
            e.index,
            e.device_type,
            e.pid,
            if e.unifying { "unifying" } else { "non-unifying" },
            if e.link_established { "" } else { ", no link" }
        ),
        DecodedEvent::Disconnection(e) => format!(
            "device {} disconnected{}",
            e.index,
            if e.unpaired { " (unpaired)" } else { "" }
        ),
        DecodedEvent::DiscoveryStatus(s) => format!(
            "discovery {} (error 0x{:02x})",
            if s.discovering { "started" } else { "stopped" },
            s.error
        ),
        DecodedEvent::PairStatus(s) => format!(
            "pairing {} (error 0x{:02x})",
            if s.pairing { "opened" } else { "closed" },
            s.error
        ),
        DecodedEvent::Passkey(passkey) => format!("passkey {}", passkey),
        DecodedEvent::Discovered { part, record } => match *part {
            "info" => format!(
                "discovered device {} (pid 0x{:04x}, kind 0x{:02x}), seq {:?}",
                record.address_string(),
                record.pid,
                record.device_kind,
                record.seq
            ),
            _ => format!("discovered device named {:?}, seq {:?}", record.name, record.seq),
        },
        DecodedEvent::RegisterError {
            failed_sub_id,
            register,
            code,
        } => format!(
            "register 0x{:02x} request (sub-id 0x{:02x}) failed: {}",
            register, failed_sub_id, code
        ),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
