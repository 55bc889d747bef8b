//! Stepper driver line configuration.
//!
//! The motion core works with logical line states ("step asserted",
//! "drive enabled"). How a logical state maps to a physical level is a wiring
//! concern described here and applied by the line layer in `els_core::hal`.
//!
//! ```toml
//! [drive.lines.enable]
//! polarity = "active_low"
//!
//! [drive.lines.alarm]
//! enabled = true
//! polarity = "active_low"
//! ```

use serde::{Deserialize, Serialize};

/// Electrical sense of a digital line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Asserted = high level.
    #[default]
    ActiveHigh,
    /// Asserted = low level.
    ActiveLow,
}

impl Polarity {
    /// Physical level for a logical state.
    #[inline]
    pub const fn level(self, asserted: bool) -> bool {
        match self {
            Self::ActiveHigh => asserted,
            Self::ActiveLow => !asserted,
        }
    }

    /// Logical state for a physical level.
    #[inline]
    pub const fn is_asserted(self, level: bool) -> bool {
        self.level(level)
    }
}

/// Output line (step, direction, enable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputLineConfig {
    #[serde(default)]
    pub polarity: Polarity,
}

/// Drive alarm input. Disabled inputs always read "no alarm".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlarmLineConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_alarm_polarity")]
    pub polarity: Polarity,
}

fn default_alarm_polarity() -> Polarity {
    // Most drivers pull the alarm output low on fault.
    Polarity::ActiveLow
}

impl Default for AlarmLineConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            polarity: default_alarm_polarity(),
        }
    }
}

/// The four stepper driver signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriveLinesConfig {
    #[serde(default)]
    pub step: OutputLineConfig,
    #[serde(default)]
    pub direction: OutputLineConfig,
    #[serde(default)]
    pub enable: OutputLineConfig,
    #[serde(default)]
    pub alarm: AlarmLineConfig,
}
