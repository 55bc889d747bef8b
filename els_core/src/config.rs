//! TOML configuration for the motion core executable.
//!
//! One file holds everything: shared settings, cycle timing, drive lines,
//! machine geometry, the simulated spindle and the feed table. Loading
//! parses, validates and builds the immutable [`FeedTable`] in one step, so
//! a [`LoadedConfig`] is always ready for runtime use.

use std::path::Path;

use serde::{Deserialize, Serialize};

use els_common::config::{ConfigError, ConfigLoader, SharedConfig};
use els_common::consts::{
    DEFAULT_CYCLE_TIME_US, DEFAULT_MAX_BUFFERED_STEPS, DEFAULT_STATUS_INTERVAL_MS, MAX_FEEDS,
};
use els_common::feed::{FeedEntryConfig, FeedTable, MachineGeometry};
use els_common::io::DriveLinesConfig;

// ─── Sections ───────────────────────────────────────────────────────

/// `[cycle]`: periodic routine timing and RT placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CycleConfig {
    /// Timer period [µs]. The maximum step rate is half the frequency.
    pub cycle_time_us: u32,
    /// CPU core the periodic thread is pinned to (`rt` builds).
    pub cpu_core: usize,
    /// SCHED_FIFO priority (`rt` builds).
    pub rt_priority: i32,
    /// Foreground status log interval [ms].
    pub status_interval_ms: u32,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            cycle_time_us: DEFAULT_CYCLE_TIME_US,
            cpu_core: 0,
            rt_priority: 80,
            status_interval_ms: DEFAULT_STATUS_INTERVAL_MS,
        }
    }
}

/// `[drive]`: stepper driver behaviour and line polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriveConfig {
    /// Outstanding steps tolerated before the drive faults.
    pub max_buffered_steps: u32,
    pub lines: DriveLinesConfig,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            max_buffered_steps: DEFAULT_MAX_BUFFERED_STEPS,
            lines: DriveLinesConfig::default(),
        }
    }
}

/// `[simulation]`: the simulated spindle used without hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Spindle speed at startup.
    pub spindle_rpm: u32,
    /// Ramp the spindle to this speed while running.
    pub ramp_to_rpm: Option<u32>,
    /// Duration of that ramp [s].
    pub ramp_secs: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            spindle_rpm: 300,
            ramp_to_rpm: None,
            ramp_secs: 0,
        }
    }
}

/// The whole configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElsConfig {
    pub shared: SharedConfig,
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub drive: DriveConfig,
    #[serde(default)]
    pub machine: MachineGeometry,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub feeds: Vec<FeedEntryConfig>,
}

impl ElsConfig {
    /// Check every bound that does not need the feed table built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if self.cycle.cycle_time_us == 0 {
            return Err(invalid("cycle.cycle_time_us must be > 0"));
        }
        if self.cycle.status_interval_ms == 0 {
            return Err(invalid("cycle.status_interval_ms must be > 0"));
        }
        if self.drive.max_buffered_steps == 0 {
            return Err(invalid("drive.max_buffered_steps must be > 0"));
        }
        if self.feeds.is_empty() {
            return Err(invalid("at least one [[feeds]] entry is required"));
        }
        if self.feeds.len() > MAX_FEEDS {
            return Err(invalid(format!(
                "{} feeds configured, at most {MAX_FEEDS} supported",
                self.feeds.len()
            )));
        }
        if self.feeds.iter().any(|f| f.pitch_um.is_some()) {
            self.machine
                .validate()
                .map_err(|e| invalid(format!("machine: {e}")))?;
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(msg.into())
}

// ─── Loaded Config Bundle ───────────────────────────────────────────

/// Validated configuration plus the feed table built from it.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ElsConfig,
    pub feed_table: FeedTable,
}

impl LoadedConfig {
    fn build(config: ElsConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let feed_table = FeedTable::from_config(&config.feeds, &config.machine)
            .map_err(|e| invalid(e.to_string()))?;
        Ok(Self { config, feed_table })
    }
}

/// Load, validate and build the feed table from a TOML file.
pub fn load_config(path: &Path) -> Result<LoadedConfig, ConfigError> {
    LoadedConfig::build(ElsConfig::load(path)?)
}

/// Same as [`load_config`], from an in-memory document.
pub fn load_config_from_str(content: &str) -> Result<LoadedConfig, ConfigError> {
    LoadedConfig::build(ElsConfig::from_toml_str(content)?)
}

// ─── Tests ──────────────────────────────────────────────────────────
