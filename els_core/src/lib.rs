//! # ELS Motion Core
//!
//! Keeps a stepper-driven carriage locked to a rotating spindle at a
//! selectable ratio. A periodic routine reads the spindle encoder, turns the
//! absolute position into a desired step count, and walks a 4-state
//! step/direction machine one line edge at a time toward it. The foreground
//! selects feeds, direction and power through lock-free publish cells.
//!
//! ## Data Flow
//!
//! ```text
//! PositionEncoder ─► FeedRatio ─► Core::tick ─► StepPulseGenerator ─► lines
//!                                     ▲
//!        ControlHandle ─► SharedControls (feed id, reverse, power)
//! ```
//!
//! ## Zero-Allocation Tick
//!
//! Everything the tick touches is built at startup: the ratio table is a
//! fixed-capacity array indexed by an atomically published [`FeedId`], and
//! faults come back as [`DriveFault`] flags rather than errors.
//!
//! [`FeedId`]: els_common::feed::FeedId
//! [`DriveFault`]: els_common::error::DriveFault

pub mod config;
pub mod cycle;
pub mod encoder;
pub mod feed;
pub mod hal;
pub mod shared;
pub mod stepper;
pub mod sync;

pub use encoder::PositionEncoder;
pub use feed::{ActiveFeed, FeedRatio, FloatFeed, RationalFeed};
pub use shared::SharedControls;
pub use stepper::{PulseEdge, PulseState, StepPulseGenerator};
pub use sync::{ControlHandle, Core, DriveSnapshot, SyncError, TickReport};
