//! Spindle position encoder.
//!
//! Wraps a [`QuadratureCounter`] and carries the last RPM reported by an
//! external measurement process. No RPM is computed here.

use std::sync::atomic::{AtomicU16, Ordering};

use els_common::feed::SpindlePosition;

use crate::hal::QuadratureCounter;

/// Absolute spindle position source, shared by both execution contexts.
#[derive(Debug)]
pub struct PositionEncoder<C> {
    counter: C,
    rpm: AtomicU16,
}

impl<C: QuadratureCounter> PositionEncoder<C> {
    pub fn new(counter: C) -> Self {
        Self {
            counter,
            rpm: AtomicU16::new(0),
        }
    }

    /// Current absolute tick count. No side effects, never blocks.
    #[inline]
    pub fn position(&self) -> SpindlePosition {
        self.counter.count()
    }

    #[inline]
    pub fn rpm(&self) -> u16 {
        self.rpm.load(Ordering::Relaxed)
    }

    /// Store a measured RPM; saturates at `u16::MAX`.
    #[inline]
    pub fn set_rpm(&self, rpm: u32) {
        self.rpm
            .store(rpm.min(u16::MAX as u32) as u16, Ordering::Relaxed);
    }

    pub fn counter(&self) -> &C {
        &self.counter
    }
}
