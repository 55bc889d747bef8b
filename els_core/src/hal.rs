//! Hardware abstraction for the motion core.
//!
//! The core touches exactly two kinds of hardware: a free-running quadrature
//! counter on the spindle, and the four stepper driver lines. Both are
//! reached through the small traits below so the same core runs against
//! real peripherals or the [`sim`] backend.
//!
//! # Timing Contracts
//!
//! | Operation | Context | RT Constraint |
//! |-----------|---------|---------------|
//! | `QuadratureCounter::count()` | periodic | **HARD**, never blocks |
//! | `DigitalOutput::set_level()` | periodic | **HARD** |
//! | `DigitalInput::is_high()` | either | **HARD** |

pub mod lines;
pub mod sim;

pub use lines::{AlarmLine, DriveLines, OutputLine};

/// Free-running spindle tick counter.
///
/// Shared between the periodic context (position reads) and the foreground
/// (RPM bookkeeping), hence `Sync`.
pub trait QuadratureCounter: Send + Sync {
    /// Current absolute tick count. Wraps at the counter width.
    fn count(&self) -> u64;
}

/// A digital output pin, driven in physical levels.
pub trait DigitalOutput: Send {
    fn set_level(&mut self, high: bool);
}

/// A digital input pin, read in physical levels.
pub trait DigitalInput: Send {
    fn is_high(&self) -> bool;
}

impl<C: QuadratureCounter + ?Sized> QuadratureCounter for std::sync::Arc<C> {
    #[inline]
    fn count(&self) -> u64 {
        (**self).count()
    }
}
