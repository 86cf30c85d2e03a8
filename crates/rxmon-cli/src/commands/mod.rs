//! Command implementations for the CLI.

mod config;
mod decode;
mod replay;

pub use config::cmd_config;
pub use decode::{DecodedEvent, DecodedReport, cmd_decode};
pub use replay::{ReplayArgs, cmd_replay};
