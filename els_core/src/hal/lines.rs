//! Polarity-aware stepper driver lines.
//!
//! Translates logical "asserted" states into physical levels according to
//! [`DriveLinesConfig`], so the pulse state machine never deals with wiring.

use els_common::io::{AlarmLineConfig, DriveLinesConfig, Polarity};

use super::{DigitalInput, DigitalOutput};

/// An output pin with a configured polarity.
///
/// Remembers the last logical state written so callers can query it without
/// reading the pin back.
#[derive(Debug)]
pub struct OutputLine<P> {
    pin: P,
    polarity: Polarity,
    asserted: bool,
}

impl<P: DigitalOutput> OutputLine<P> {
    /// Wrap a pin and drive it to the released state.
    pub fn new(mut pin: P, polarity: Polarity) -> Self {
        pin.set_level(polarity.level(false));
        Self {
            pin,
            polarity,
            asserted: false,
        }
    }

    #[inline]
    pub fn set(&mut self, asserted: bool) {
        self.pin.set_level(self.polarity.level(asserted));
        self.asserted = asserted;
    }

    #[inline]
    pub fn assert(&mut self) {
        self.set(true);
    }

    #[inline]
    pub fn release(&mut self) {
        self.set(false);
    }

    #[inline]
    pub fn is_asserted(&self) -> bool {
        self.asserted
    }

    pub fn pin(&self) -> &P {
        &self.pin
    }
}

/// Drive alarm input. When disabled the pin is never read.
#[derive(Debug)]
pub struct AlarmLine<P> {
    pin: P,
    config: AlarmLineConfig,
}

impl<P: DigitalInput> AlarmLine<P> {
    pub fn new(pin: P, config: AlarmLineConfig) -> Self {
        Self { pin, config }
    }

    #[inline]
    pub fn is_asserted(&self) -> bool {
        self.config.enabled && self.config.polarity.is_asserted(self.pin.is_high())
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}

/// The four lines of a step/direction driver.
#[derive(Debug)]
pub struct DriveLines<O, I> {
    pub step: OutputLine<O>,
    pub direction: OutputLine<O>,
    pub enable: OutputLine<O>,
    pub alarm: AlarmLine<I>,
}

impl<O: DigitalOutput, I: DigitalInput> DriveLines<O, I> {
    /// Bind pins to their configured polarity. All outputs start released.
    pub fn new(step: O, direction: O, enable: O, alarm: I, config: &DriveLinesConfig) -> Self {
        Self {
            step: OutputLine::new(step, config.step.polarity),
            direction: OutputLine::new(direction, config.direction.polarity),
            enable: OutputLine::new(enable, config.enable.polarity),
            alarm: AlarmLine::new(alarm, config.alarm),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
