//! System-wide constants for the ELS workspace.
//!
//! Single source of truth for numeric limits and default paths.

use static_assertions::const_assert;

/// Maximum number of entries in a feed table.
pub const MAX_FEEDS: usize = 64;

/// Maximum length of a feed name, in bytes.
pub const MAX_FEED_NAME_LEN: usize = 16;

/// Magnitude below which a floating-point feed ratio counts as "no feed".
/// Non-null table entries must be at least this coarse.
pub const FLOAT_NULL_EPSILON: f64 = 1e-5;

/// Default outstanding step limit before the drive is faulted.
pub const DEFAULT_MAX_BUFFERED_STEPS: u32 = 100;

/// Default periodic routine period in microseconds (20 kHz).
pub const DEFAULT_CYCLE_TIME_US: u32 = 50;

/// Default foreground status reporting interval in milliseconds.
pub const DEFAULT_STATUS_INTERVAL_MS: u32 = 500;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config/els.toml";

// Feed ids are published through an `AtomicU8` with 0xFF reserved as "none".
const_assert!(MAX_FEEDS < u8::MAX as usize);
const_assert!(DEFAULT_MAX_BUFFERED_STEPS > 0);
