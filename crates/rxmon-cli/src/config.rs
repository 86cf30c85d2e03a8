//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::warn;

use rxmon_core::{NotificationFlags, ReceiverKind};

use crate::cli::{OutputFormat, ReceiverArg};

/// Register exchange timeout used when neither flag nor config sets one.
pub const DEFAULT_TIMEOUT_SECS: f64 = 2.0;

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Register exchange timeout in seconds
    #[serde(default)]
    pub timeout: Option<f64>,

    /// Receiver protocol family: "unifying" or "bolt"
    #[serde(default)]
    pub receiver: Option<String>,

    /// Default output format
    #[serde(default)]
    pub format: Option<OutputFormat>,

    /// Notifications to enable on the receiver
    #[serde(default)]
    pub notifications: NotificationFlags,
}

impl Config {
    /// Get the default config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rxmon")
            .join("config.toml")
    }

    /// Load config from `path`, or return default if missing or invalid
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<Config>(&content) {
                    Ok(config) => match config.validate() {
                        Ok(()) => return config,
                        Err(e) => warn!("Ignoring config {}: {:#}", path.display(), e),
                    },
                    Err(e) => warn!("Failed to parse config {}: {}", path.display(), e),
                },
                Err(e) => warn!("Failed to read config {}: {}", path.display(), e),
            }
        }
        Self::default()
    }

    /// Save config to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        if let Some(timeout) = self.timeout {
            check_timeout(timeout)?;
        }
        if let Some(receiver) = &self.receiver {
            receiver.parse::<ReceiverKind>()?;
        }
        Ok(())
    }
}

fn check_timeout(timeout: f64) -> Result<()> {
    if !timeout.is_finite() || timeout <= 0.0 {
        bail!("timeout must be a positive number of seconds, got {}", timeout);
    }
    Ok(())
}

/// Resolve timeout: use flag value, fall back to config, then default
pub fn resolve_timeout(flag: Option<f64>, config: &Config) -> Result<f64> {
    let timeout = flag.or(config.timeout).unwrap_or(DEFAULT_TIMEOUT_SECS);
    check_timeout(timeout)?;
    Ok(timeout)
}

/// Resolve receiver kind: flag overrides config; `None` means detect
pub fn resolve_receiver(flag: Option<ReceiverArg>, config: &Config) -> Result<Option<ReceiverKind>> {
    if let Some(arg) = flag {
        return Ok(Some(arg.into()));
    }
    config
        .receiver
        .as_deref()
        .map(|name| name.parse::<ReceiverKind>().map_err(anyhow::Error::from))
        .transpose()
}

/// Resolve output format: flag overrides config
pub fn resolve_format(flag: Option<OutputFormat>, config: &Config) -> OutputFormat {
    flag.or(config.format).unwrap_or_default()
}
