//! Command-line tools for HID++ wireless receivers.
//!
//! The `rxmon` binary drives a [`rxmon_core::ReceiverMonitor`] from recorded
//! report traces and decodes individual reports, which makes it possible to
//! check how the monitor reacts to a receiver without the hardware.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `replay` | Feed a trace through a monitor and print its events |
//! | `decode` | Decode one report |
//! | `config` | Manage the configuration file |
//! | `completions` | Generate shell completions |
//!
//! # Traces
//!
//! One item per line. Hex lines are inbound frames; `#` starts a comment.
//! Directives act on the monitor:
//!
//! | Directive | Effect |
//! |-----------|--------|
//! | `!start-pair <secs>` | Start pairing (discovery on Bolt receivers) |
//! | `!stop-pair` | Stop pairing |
//! | `!wait-for <index>` | Add the device once any report from it is seen |
//! | `!settle` | Wait for background tasks and print what they produced |
//!
//! # Output Formats
//!
//! - **Text** (default): one line per event
//! - **JSON**: one JSON object per line for `replay`, a pretty object for `decode`
//!
//! # Configuration
//!
//! The CLI reads `~/.config/rxmon/config.toml` (or platform equivalent), or
//! the file named by `--config` / `RXMON_CONFIG`:
//!
//! ```toml
//! timeout = 2.0
//! receiver = "bolt"
//! format = "json"
//!
//! [notifications]
//! device_battery_status = false
//! ```
//!
//! # Examples
//!
//! Replay a Bolt pairing session:
//! ```bash
//! rxmon replay --receiver bolt pairing.trace
//! ```
//!
//! Decode a connection notification:
//! ```bash
//! rxmon decode "10 01 41 04 02 2a 40"
//! ```

// The binary's modules live in main.rs; this target only re-exports the
// libraries it is built on.
pub use rxmon_core;
pub use rxmon_types;
