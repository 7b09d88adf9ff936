//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use bleacon_types::{ScanMode, ScanSettings};
use serde::{Deserialize, Serialize};

use crate::cli::{OutputFormat, ScanArgs};

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "BLEACON_CONFIG";

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Default manufacturer ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<u16>,

    /// Default scan mode
    #[serde(default)]
    pub scan_mode: ScanMode,

    /// Seconds to wait for the Bluetooth scanner (unset waits indefinitely)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquire_timeout: Option<u64>,

    /// Default output format ("text" or "json")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Disable colored output
    #[serde(default)]
    pub no_color: bool,
}

impl Config {
    /// Get the config file path
    pub fn path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bleacon")
            .join("config.toml")
    }

    /// Load config from the default path, or return default if not found
    pub fn load() -> Self {
        let path = Self::path();
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}", e);
                Self::default()
            }
        }
    }

    /// Load config from `path`. A missing file yields the default config.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path())
    }

    /// Save config to `path`, creating parent directories
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

    /// The configured output format, if valid.
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.format.as_deref().and_then(|f| f.parse().ok())
    }
}

/// Resolve the manufacturer ID: explicit flag or env var, then config.
pub fn resolve_manufacturer(arg: Option<u16>, config: &Config) -> Result<u16> {
    match arg.or(config.manufacturer) {
        Some(id) => Ok(id),
        None => bail!(
            "No manufacturer ID specified. Use --manufacturer <ID>, set BLEACON_MANUFACTURER, \
             or add `manufacturer = 0x004C` to {}",
            Config::path().display()
        ),
    }
}

/// Resolve the output format: explicit flag, then config, then text.
pub fn resolve_format(arg: Option<OutputFormat>, config: &Config) -> OutputFormat {
    arg.or_else(|| config.output_format()).unwrap_or_default()
}

/// Resolve scan settings: explicit flags override config.
pub fn resolve_settings(args: &ScanArgs, config: &Config) -> ScanSettings {
    let mode = args.mode.map(ScanMode::from).unwrap_or(config.scan_mode);
    let delay = args.batch.map(Duration::from_millis).unwrap_or_default();
    ScanSettings::new(mode).report_delay(delay)
}

/// Resolve the scanner acquire timeout: explicit flag, then config, then unbounded.
pub fn resolve_acquire_timeout(args: &ScanArgs, config: &Config) -> Option<Duration> {
    args.acquire_timeout
        .or(config.acquire_timeout)
        .map(Duration::from_secs)
}
