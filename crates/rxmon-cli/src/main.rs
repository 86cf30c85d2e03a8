use std::io;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use rxmon_core::ReceiverKind;

mod cli;
mod commands;
mod config;
mod format;
mod util;

use cli::{Cli, Commands};
use commands::{ReplayArgs, cmd_config, cmd_decode, cmd_replay};
use config::{Config, resolve_format, resolve_receiver, resolve_timeout};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle completions command early (before tracing init)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "rxmon", &mut io::stdout());
        return Ok(());
    }

    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(Config::path);
    let config = Config::load_from(&config_path);
    let output = cli.output.as_ref();

    match cli.command {
        Commands::Replay {
            trace,
            receiver,
            format,
            timeout,
            show_sent,
        } => {
            let args = ReplayArgs {
                trace,
                kind: resolve_receiver(receiver, &config)?.unwrap_or(ReceiverKind::Unifying),
                timeout: resolve_timeout(timeout, &config)?,
                format: resolve_format(format, &config),
                notifications: config.notifications,
                show_sent,
            };
            cmd_replay(args, output).await?;
        }
        Commands::Decode { hex, format } => {
            cmd_decode(&hex, resolve_format(format, &config), output)?;
        }
        Commands::Config { action } => {
            cmd_config(action, &config_path, output)?;
        }
        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}
