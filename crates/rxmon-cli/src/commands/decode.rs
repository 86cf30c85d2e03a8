//! Decode command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;

use rxmon_types::report::parse_hex;
use rxmon_types::{
    ConnectionEvent, DeviceIndex, DisconnectionEvent, DiscoveryRecord, DiscoveryStatus, ErrorCode,
    PairStatus, Passkey, Report, ReportType, sub_id,
};

use crate::cli::OutputFormat;
use crate::format::{format_decoded_json, format_decoded_text};
use crate::util::write_output;

/// Human readable name of a receiver sub-identifier.
pub fn sub_id_name(sub: u8) -> &'static str {
    match sub {
        sub_id::DEVICE_DISCONNECTION => "device disconnection",
        sub_id::DEVICE_CONNECTION => "device connection",
        sub_id::PAIR_STATUS => "pair status",
        sub_id::PASSKEY_REQUEST => "passkey request",
        sub_id::DEVICE_DISCOVERED => "device discovered",
        sub_id::DISCOVERY_STATUS => "discovery status",
        sub_id::BOLT_PAIR_STATUS => "bolt pair status",
        sub_id::SET_REGISTER_SHORT => "set register (short)",
        sub_id::GET_REGISTER_SHORT => "get register (short)",
        sub_id::SET_REGISTER_LONG => "set register (long)",
        sub_id::GET_REGISTER_LONG => "get register (long)",
        sub_id::ERROR_MESSAGE => "error message",
        _ => "unknown",
    }
}

/// Typed content of a recognised report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum DecodedEvent {
    Connection(ConnectionEvent),
    Disconnection(DisconnectionEvent),
    DiscoveryStatus(DiscoveryStatus),
    PairStatus(PairStatus),
    Passkey(Passkey),
    /// One part of a discovery record; the other part's fields stay empty.
    Discovered {
        part: &'static str,
        record: DiscoveryRecord,
    },
    RegisterError {
        failed_sub_id: u8,
        register: u8,
        code: ErrorCode,
    },
}

/// A report broken down into header fields and typed content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedReport {
    pub report_type: ReportType,
    pub device_index: DeviceIndex,
    pub sub_id: u8,
    pub name: &'static str,
    pub address: u8,
    pub params: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<DecodedEvent>,
    /// Why a recognised sub-id could not be decoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,
}

/// Decode a report.
pub fn decode_report(report: &Report) -> DecodedReport {
    let (event, problem) = match decode_event(report) {
        Ok(event) => (event, None),
        Err(e) => (None, Some(e.to_string())),
    };
    DecodedReport {
        report_type: report.report_type(),
        device_index: report.device_index(),
        sub_id: report.sub_id(),
        name: sub_id_name(report.sub_id()),
        address: report.address(),
        params: report.params().to_vec(),
        event,
        problem,
    }
}

fn decode_event(report: &Report) -> rxmon_types::ParseResult<Option<DecodedEvent>> {
    let event = match report.sub_id() {
        sub_id::DEVICE_CONNECTION => DecodedEvent::Connection(ConnectionEvent::try_from(report)?),
        sub_id::DEVICE_DISCONNECTION => {
            DecodedEvent::Disconnection(DisconnectionEvent::try_from(report)?)
        }
        sub_id::DISCOVERY_STATUS => {
            DecodedEvent::DiscoveryStatus(DiscoveryStatus::try_from(report)?)
        }
        sub_id::PAIR_STATUS | sub_id::BOLT_PAIR_STATUS => {
            DecodedEvent::PairStatus(PairStatus::try_from(report)?)
        }
        sub_id::PASSKEY_REQUEST => DecodedEvent::Passkey(Passkey::try_from(report)?),
        sub_id::DEVICE_DISCOVERED => {
            let mut record = DiscoveryRecord::default();
            record.fill(report)?;
            let part = if report.address() == 0 { "info" } else { "name" };
            DecodedEvent::Discovered { part, record }
        }
        sub_id::ERROR_MESSAGE => DecodedEvent::RegisterError {
            failed_sub_id: report.address(),
            register: report.params()[0],
            code: ErrorCode::from(report.params()[1]),
        },
        _ => return Ok(None),
    };
    Ok(Some(event))
}

pub fn cmd_decode(hex: &str, format: OutputFormat, output: Option<&PathBuf>) -> Result<()> {
    let bytes = parse_hex(hex).context("Invalid hex input")?;
    let report = Report::from_bytes(&bytes).context("Not a HID++ report")?;
    let decoded = decode_report(&report);

    let content = match format {
        OutputFormat::Text => format_decoded_text(&decoded),
        OutputFormat::Json => format_decoded_json(&decoded)?,
    };
    write_output(output, &content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(hex: &str) -> DecodedReport {
        decode_report(&Report::from_bytes(&parse_hex(hex).unwrap()).unwrap())
    }

    #[test]
    fn test_decode_connection() {
        let decoded = decode("10 01 41 04 02 2a 40");
        assert_eq!(decoded.name, "device connection");
        match decoded.event {
            Some(DecodedEvent::Connection(event)) => {
                assert_eq!(event.index, 1);
                assert!(event.unifying);
                assert_eq!(event.pid, 0x402a);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_decode_error_message() {
        let decoded = decode("10 ff 8f 80 b2 07 00");
        assert_eq!(
            decoded.event,
            Some(DecodedEvent::RegisterError {
                failed_sub_id: 0x80,
                register: 0xb2,
                code: ErrorCode::Busy,
            })
        );
    }

    #[test]
    fn test_decode_discovery_name_part() {
        let decoded = decode("11 ff 4f 01 00 05 04 4b 38 35 35 00 00 00 00 00 00 00 00 00");
        match decoded.event {
            Some(DecodedEvent::Discovered { part, record }) => {
                assert_eq!(part, "name");
                assert_eq!(record.seq, Some(5));
                assert_eq!(record.name, "K855");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_decode_short_passkey_is_a_problem() {
        let decoded = decode("10 ff 4d 00 31 32 33");
        assert!(decoded.event.is_none());
        assert!(decoded.problem.is_some());
    }

    #[test]
    fn test_decode_unknown_sub_id() {
        let decoded = decode("10 02 0f 00 00 00 00");
        assert_eq!(decoded.name, "unknown");
        assert!(decoded.event.is_none());
        assert!(decoded.problem.is_none());
    }

    #[test]
    fn test_cmd_decode_rejects_bad_input() {
        assert!(cmd_decode("zz", OutputFormat::Text, None).is_err());
        assert!(cmd_decode("20 01 41", OutputFormat::Text, None).is_err());
    }
}
