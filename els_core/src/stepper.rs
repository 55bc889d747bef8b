//! Step/direction pulse generator.
//!
//! A 4-state machine that moves the current step position toward the
//! desired one. Each [`service`](StepPulseGenerator::service) call performs
//! at most one transition and therefore changes at most one line, so pulse
//! width and maximum step rate are set entirely by the calling period.
//!
//! ```text
//!          desired > current: dir ↑
//!   DirLow ───────────────────────────► DirHigh
//!   (0,0)  ◄─────────────────────────── (0,1)
//!     │  ▲     desired < current: dir ↓    │  ▲
//!     │  │                                 │  │
//!  step ↑  step ↓, current -= 1   step ↑  step ↓, current += 1
//!     ▼  │                                 ▼  │
//!   StepDirLow (1,0)                StepDirHigh (1,1)
//! ```
//!
//! The direction line only changes while the step line is low, so it is
//! stable across every step edge. A step costs two calls; a reversal costs
//! one more.

use els_common::feed::StepPosition;

use crate::hal::{DigitalInput, DigitalOutput, DriveLines};

/// Pending line levels, encoded as `bit0 = direction`, `bit1 = step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum PulseState {
    /// Step low, direction low.
    #[default]
    DirLow = 0,
    /// Step low, direction high.
    DirHigh = 1,
    /// Step high, direction low.
    StepDirLow = 2,
    /// Step high, direction high.
    StepDirHigh = 3,
}

impl PulseState {
    #[inline]
    pub const fn step_level(self) -> bool {
        matches!(self, Self::StepDirLow | Self::StepDirHigh)
    }

    #[inline]
    pub const fn direction_level(self) -> bool {
        matches!(self, Self::DirHigh | Self::StepDirHigh)
    }
}

/// The single line change made by one service call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PulseEdge {
    /// No line changed.
    #[default]
    None,
    /// Direction line asserted (forward).
    DirectionSet,
    /// Direction line released (reverse).
    DirectionCleared,
    /// Step line asserted.
    StepAsserted,
    /// Step line released; the step is now counted.
    StepReleased,
    /// Drive disabled: current position tracked desired without pulses.
    Tracked,
}

/// Running totals of emitted pulses. O(1) per call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PulseCounters {
    pub forward_steps: u64,
    pub reverse_steps: u64,
    pub direction_changes: u64,
}

impl PulseCounters {
    /// Net signed distance travelled through emitted steps.
    #[inline]
    pub fn net_steps(&self) -> i64 {
        self.forward_steps as i64 - self.reverse_steps as i64
    }

    #[inline]
    pub fn total_steps(&self) -> u64 {
        self.forward_steps + self.reverse_steps
    }
}

/// Stepper drive state machine and its lines.
///
/// Starts zeroed: both positions 0, state [`PulseState::DirLow`], disabled.
#[derive(Debug)]
pub struct StepPulseGenerator<O, I> {
    current: StepPosition,
    desired: StepPosition,
    state: PulseState,
    enabled: bool,
    max_buffered_steps: u32,
    counters: PulseCounters,
    lines: DriveLines<O, I>,
}

impl<O: DigitalOutput, I: DigitalInput> StepPulseGenerator<O, I> {
    pub fn new(lines: DriveLines<O, I>, max_buffered_steps: u32) -> Self {
        let mut drive = Self {
            current: 0,
            desired: 0,
            state: PulseState::DirLow,
            enabled: false,
            max_buffered_steps,
            counters: PulseCounters::default(),
            lines,
        };
        drive.lines.step.release();
        drive.lines.direction.release();
        drive.lines.enable.release();
        drive
    }

    #[inline]
    pub fn set_desired_position(&mut self, steps: StepPosition) {
        self.desired = steps;
    }

    /// Force the current position without emitting pulses. Discards
    /// position history; see [`resync_position`](Self::resync_position) for
    /// the variant that respects a pulse in flight.
    #[inline]
    pub fn set_current_position(&mut self, steps: StepPosition) {
        self.current = steps;
    }

    /// Resynchronise to `steps` so that current equals it once the pulse in
    /// flight, if any, has been released.
    ///
    /// In a step-high state the next `service` call unconditionally counts
    /// one step, so current is offset by one against its direction.
    pub fn resync_position(&mut self, steps: StepPosition) {
        self.current = match self.state {
            PulseState::StepDirHigh => steps - 1,
            PulseState::StepDirLow => steps + 1,
            PulseState::DirLow | PulseState::DirHigh => steps,
        };
    }

    #[inline]
    pub fn current_position(&self) -> StepPosition {
        self.current
    }

    #[inline]
    pub fn desired_position(&self) -> StepPosition {
        self.desired
    }

    /// Outstanding steps, `|desired - current|`.
    #[inline]
    pub fn backlog(&self) -> u64 {
        self.desired.abs_diff(self.current)
    }

    /// Disable the drive and return true if the backlog exceeds the limit.
    pub fn check_step_backlog(&mut self) -> bool {
        if self.backlog() > self.max_buffered_steps as u64 {
            self.set_enabled(false);
            return true;
        }
        false
    }

    /// Drive the enable line. While disabled, `service` keeps current equal
    /// to desired and emits nothing.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.lines.enable.set(enabled);
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// External driver alarm; always false when alarm monitoring is off.
    #[inline]
    pub fn is_alarm(&self) -> bool {
        self.lines.alarm.is_asserted()
    }

    #[inline]
    pub fn state(&self) -> PulseState {
        self.state
    }

    #[inline]
    pub fn counters(&self) -> PulseCounters {
        self.counters
    }

    #[inline]
    pub fn max_buffered_steps(&self) -> u32 {
        self.max_buffered_steps
    }

    pub fn lines(&self) -> &DriveLines<O, I> {
        &self.lines
    }

    /// Perform at most one state transition.
    pub fn service(&mut self) -> PulseEdge {
        if !self.enabled {
            // An unpowered drive ignores the pulse; drop the line so it
            // does not sit high until re-enable.
            match self.state {
                PulseState::StepDirLow => self.state = PulseState::DirLow,
                PulseState::StepDirHigh => self.state = PulseState::DirHigh,
                PulseState::DirLow | PulseState::DirHigh => {}
            }
            if self.lines.step.is_asserted() {
                self.lines.step.release();
            }
            self.current = self.desired;
            return PulseEdge::Tracked;
        }

        match self.state {
            PulseState::DirLow => {
                if self.desired < self.current {
                    self.lines.step.assert();
                    self.state = PulseState::StepDirLow;
                    PulseEdge::StepAsserted
                } else if self.desired > self.current {
                    self.lines.direction.assert();
                    self.state = PulseState::DirHigh;
                    self.counters.direction_changes += 1;
                    PulseEdge::DirectionSet
                } else {
                    PulseEdge::None
                }
            }
            PulseState::DirHigh => {
                if self.desired > self.current {
                    self.lines.step.assert();
                    self.state = PulseState::StepDirHigh;
                    PulseEdge::StepAsserted
                } else if self.desired < self.current {
                    self.lines.direction.release();
                    self.state = PulseState::DirLow;
                    self.counters.direction_changes += 1;
                    PulseEdge::DirectionCleared
                } else {
                    PulseEdge::None
                }
            }
            PulseState::StepDirLow => {
                self.lines.step.release();
                self.current -= 1;
                self.counters.reverse_steps += 1;
                self.state = PulseState::DirLow;
                PulseEdge::StepReleased
            }
            PulseState::StepDirHigh => {
                self.lines.step.release();
                self.current += 1;
                self.counters.forward_steps += 1;
                self.state = PulseState::DirHigh;
                PulseEdge::StepReleased
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
