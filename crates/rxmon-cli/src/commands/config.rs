//! Config command implementation.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

use crate::cli::ConfigAction;
use crate::config::Config;
use crate::util::write_output;

pub fn cmd_config(action: ConfigAction, path: &Path, output: Option<&PathBuf>) -> Result<()> {
    match action {
        ConfigAction::Path => write_output(output, &format!("{}\n", path.display())),
        ConfigAction::Show => {
            let config = Config::load_from(path);
            let content = toml::to_string_pretty(&config)?;
            write_output(output, &content)
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                bail!(
                    "Config file already exists: {} (use --force to overwrite)",
                    path.display()
                );
            }
            Config::default().save_to(path)?;
            eprintln!("Wrote default configuration to {}", path.display());
            Ok(())
        }
    }
}
