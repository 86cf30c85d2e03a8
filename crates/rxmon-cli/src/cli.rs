//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use rxmon_core::ReceiverKind;

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Receiver protocol family
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReceiverArg {
    /// Unifying and other legacy receivers
    Unifying,
    /// Bolt receivers
    Bolt,
}

impl From<ReceiverArg> for ReceiverKind {
    fn from(arg: ReceiverArg) -> Self {
        match arg {
            ReceiverArg::Unifying => ReceiverKind::Unifying,
            ReceiverArg::Bolt => ReceiverKind::Bolt,
        }
    }
}

#[derive(Parser)]
#[command(name = "rxmon")]
#[command(author, version, about = "Monitor for HID++ wireless receivers", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, env = "RXMON_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay a report trace through a receiver monitor
    Replay {
        /// Trace file: one hex frame or directive per line
        trace: PathBuf,

        /// Receiver protocol family (default: from config, else unifying)
        #[arg(short, long, value_enum)]
        receiver: Option<ReceiverArg>,

        /// Output format (default: from config, else text)
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,

        /// Register exchange timeout in seconds
        #[arg(short = 'T', long)]
        timeout: Option<f64>,

        /// Also print the frames sent to the receiver
        #[arg(long)]
        show_sent: bool,
    },

    /// Decode a single HID++ report
    Decode {
        /// Report bytes in hex, e.g. "10 01 41 04 02 2a 40"
        hex: String,

        /// Output format (default: from config, else text)
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Config subcommands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
