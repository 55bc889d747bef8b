//! ELS Common Library
//!
//! Shared value types and configuration plumbing for the electronic
//! leadscrew workspace.
//!
//! # Module Structure
//!
//! - [`feed`] - Feed specifications, direction and the immutable feed table
//! - [`io`] - Stepper driver line polarity configuration
//! - [`error`] - Drive fault bitflags
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - System-wide limits and defaults
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use els_common::prelude::*;
//!
//! let spec = FeedSpec::new(3, 4).unwrap();
//! assert_eq!(spec.numerator(), 3);
//! ```

pub mod config;
pub mod consts;
pub mod error;
pub mod feed;
pub mod io;
pub mod prelude;
