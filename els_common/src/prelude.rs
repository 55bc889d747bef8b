//! Prelude module for common re-exports.
//!
//! ```rust
//! use els_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{DEFAULT_CYCLE_TIME_US, DEFAULT_MAX_BUFFERED_STEPS, MAX_FEEDS};

// ─── Feeds ──────────────────────────────────────────────────────────
pub use crate::feed::{
    FeedDirection, FeedEntry, FeedEntryConfig, FeedId, FeedSpec, FeedTable, MachineGeometry,
    SpindlePosition, StepPosition,
};

// ─── Drive ──────────────────────────────────────────────────────────
pub use crate::error::DriveFault;
pub use crate::io::{DriveLinesConfig, Polarity};

