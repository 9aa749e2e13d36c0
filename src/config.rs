//! Configuration for area-peek
//!
//! Loads tunables from `~/.config/area/peek.toml`. Every field has a default and
//! a missing file simply means "use the defaults"; the file is only ever read.

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub hot_edge: HotEdgeConfig,
    pub enforcer: EnforcerConfig,
    pub flash: FlashConfig,
    pub panel: PanelConfig,
}

impl Config {
    /// Load configuration from the default location, or use defaults if the
    /// file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config = Self::parse(&content)?;

        info!("Configuration loaded from {:?}", path);
        debug!("Config: {:?}", config);
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Repeating timers need a non-zero period. One-shot delays may be zero.
    fn validate(&self) -> Result<()> {
        ensure!(self.hot_edge.poll_interval_ms > 0, "hot_edge.poll_interval_ms must be greater than 0");
        ensure!(self.enforcer.period_ms > 0, "enforcer.period_ms must be greater than 0");
        Ok(())
    }

    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("area");

        Ok(config_dir.join("peek.toml"))
    }
}

/// Hot edge timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotEdgeConfig {
    /// Leave watcher poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Delay before hiding the panel after the pointer left, in milliseconds
    pub hide_delay_ms: u64,
    /// Distance below the top edge the pointer must pass to leave.
    /// Defaults to the panel height.
    pub leave_offset: Option<i32>,
}

impl Default for HotEdgeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 400,
            hide_delay_ms: 200,
            leave_offset: None,
        }
    }
}

impl HotEdgeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn hide_delay(&self) -> Duration {
        Duration::from_millis(self.hide_delay_ms)
    }
}

/// Fullscreen enforcement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnforcerConfig {
    /// Reconciliation period in milliseconds
    pub period_ms: u64,
    /// Initial value of the enforcement toggle
    pub enforce_on_start: bool,
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            period_ms: 1000,
            enforce_on_start: true,
        }
    }
}

impl EnforcerConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

/// Opacity flash shown when enforcement is toggled
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlashConfig {
    /// Opacity while dimmed (0-255)
    pub dim_opacity: u8,
    /// How long each dim lasts, in milliseconds
    pub dim_ms: u64,
    /// Start-to-start spacing of consecutive flashes, in milliseconds
    pub gap_ms: u64,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            dim_opacity: 80,
            dim_ms: 50,
            gap_ms: 150,
        }
    }
}

/// Panel window selection (X11 host)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Explicit panel window id. When unset the first dock window at the top
    /// of the primary monitor is used.
    pub window: Option<u32>,
}
