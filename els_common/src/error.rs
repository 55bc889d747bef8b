//! Drive fault bitflags.
//!
//! Faults are reported from the periodic routine as flags, never as
//! `Result`s: the real-time path has no unwinding and no allocation.

use bitflags::bitflags;

bitflags! {
    /// Stepper drive fault flags.
    ///
    /// CRITICAL flags stop motion: BACKLOG_OVERFLOW.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DriveFault: u8 {
        /// Desired and current step positions drifted apart by more than the
        /// configured backlog. **CRITICAL → drive disabled**.
        const BACKLOG_OVERFLOW = 0x01;
        /// External driver alarm input asserted (observational only).
        const ALARM            = 0x02;
    }
}

impl DriveFault {
    /// Mask of all CRITICAL flags.
    pub const CRITICAL_MASK: Self = Self::from_bits_truncate(Self::BACKLOG_OVERFLOW.bits());

    /// Returns true if any CRITICAL flag is set.
    #[inline]
    pub const fn has_critical(&self) -> bool {
        self.intersects(Self::CRITICAL_MASK)
    }
}

impl Default for DriveFault {
    fn default() -> Self {
        Self::empty()
    }
}
