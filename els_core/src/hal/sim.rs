//! Simulation backend: in-memory pins and spindle counters.
//!
//! Used by the executable when no hardware backend is available, and by
//! tests and benches to observe every line transition. [`RpmRamp`] lets the
//! executable change spindle speed while the core is running.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::{DigitalInput, DigitalOutput, QuadratureCounter};

// ─── Pins ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct PinState {
    level: AtomicBool,
    rising: AtomicU64,
    falling: AtomicU64,
}

/// Simulated output pin. Clones share state, so a clone acts as a probe.
#[derive(Debug, Clone, Default)]
pub struct SimOutput {
    state: Arc<PinState>,
}

impl SimOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current physical level.
    pub fn level(&self) -> bool {
        self.state.level.load(Ordering::Acquire)
    }

    /// Number of low → high transitions seen.
    pub fn rising_edges(&self) -> u64 {
        self.state.rising.load(Ordering::Acquire)
    }

    /// Number of high → low transitions seen.
    pub fn falling_edges(&self) -> u64 {
        self.state.falling.load(Ordering::Acquire)
    }
}

impl DigitalOutput for SimOutput {
    fn set_level(&mut self, high: bool) {
        let previous = self.state.level.swap(high, Ordering::AcqRel);
        match (previous, high) {
            (false, true) => {
                self.state.rising.fetch_add(1, Ordering::AcqRel);
            }
            (true, false) => {
                self.state.falling.fetch_add(1, Ordering::AcqRel);
            }
            _ => {}
        }
    }
}

/// Simulated input pin with an externally controlled level.
#[derive(Debug, Clone, Default)]
pub struct SimInput {
    level: Arc<AtomicBool>,
}

impl SimInput {
    pub fn new(level: bool) -> Self {
        Self {
            level: Arc::new(AtomicBool::new(level)),
        }
    }

    pub fn set(&self, level: bool) {
        self.level.store(level, Ordering::Release);
    }
}

impl DigitalInput for SimInput {
    fn is_high(&self) -> bool {
        self.level.load(Ordering::Acquire)
    }
}

// ─── Counters ───────────────────────────────────────────────────────

/// Counter advanced explicitly by the caller.
#[derive(Debug, Default)]
pub struct ManualCounter {
    ticks: AtomicU64,
}

impl ManualCounter {
    pub fn new(start: u64) -> Self {
        Self {
            ticks: AtomicU64::new(start),
        }
    }

    pub fn advance(&self, ticks: u64) {
        self.ticks.fetch_add(ticks, Ordering::AcqRel);
    }

    pub fn set(&self, ticks: u64) {
        self.ticks.store(ticks, Ordering::Release);
    }
}

impl QuadratureCounter for ManualCounter {
    #[inline]
    fn count(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }
}

/// Spindle turning at a settable RPM; the count is derived from elapsed time.
///
/// RPM changes rebase the integration point. The base is published with an
/// even/odd version counter so `count()` never sees a half-written rebase.
#[derive(Debug)]
pub struct SimulatedSpindle {
    epoch: Instant,
    ticks_per_rev: u64,
    version: AtomicU64,
    base_ticks: AtomicU64,
    base_nanos: AtomicU64,
    rpm: AtomicU32,
}

impl SimulatedSpindle {
    pub fn new(ticks_per_rev: u32, rpm: u32) -> Self {
        Self {
            epoch: Instant::now(),
            ticks_per_rev: ticks_per_rev as u64,
            version: AtomicU64::new(0),
            base_ticks: AtomicU64::new(0),
            base_nanos: AtomicU64::new(0),
            rpm: AtomicU32::new(rpm),
        }
    }

    /// Spindle speed as a tachometer would report it.
    pub fn rpm(&self) -> u32 {
        self.rpm.load(Ordering::Acquire)
    }

    /// Change spindle speed. Single writer (foreground).
    pub fn set_rpm(&self, rpm: u32) {
        let now = self.elapsed_nanos();
        let ticks = self.count_at(now);

        self.version.fetch_add(1, Ordering::AcqRel);
        self.base_ticks.store(ticks, Ordering::Release);
        self.base_nanos.store(now, Ordering::Release);
        self.rpm.store(rpm, Ordering::Release);
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    fn elapsed_nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    fn count_at(&self, now_nanos: u64) -> u64 {
        loop {
            let before = self.version.load(Ordering::Acquire);
            if before % 2 == 1 {
                std::hint::spin_loop();
                continue;
            }
            let base_ticks = self.base_ticks.load(Ordering::Acquire);
            let base_nanos = self.base_nanos.load(Ordering::Acquire);
            let rpm = self.rpm.load(Ordering::Acquire) as u128;
            if self.version.load(Ordering::Acquire) != before {
                continue;
            }
            let dt = now_nanos.saturating_sub(base_nanos) as u128;
            let advanced = dt * rpm * self.ticks_per_rev as u128 / 60_000_000_000;
            return base_ticks.wrapping_add(advanced as u64);
        }
    }
}

impl QuadratureCounter for SimulatedSpindle {
    fn count(&self) -> u64 {
        self.count_at(self.elapsed_nanos())
    }
}

/// Linear spindle speed change, sampled by the foreground loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpmRamp {
    from: u32,
    to: u32,
    duration: Duration,
}

impl RpmRamp {
    pub fn new(from: u32, to: u32, duration: Duration) -> Self {
        Self { from, to, duration }
    }

    /// Target RPM `elapsed` into the ramp; holds `to` once it has finished.
    pub fn rpm_at(&self, elapsed: Duration) -> u32 {
        if elapsed >= self.duration {
            return self.to;
        }
        let span = self.to as i128 - self.from as i128;
        let progress = span * elapsed.as_nanos() as i128 / self.duration.as_nanos() as i128;
        (self.from as i128 + progress) as u32
    }

    /// Apply the ramp to `spindle`, rebasing only when the speed changes.
    pub fn apply(&self, spindle: &SimulatedSpindle, elapsed: Duration) -> u32 {
        let rpm = self.rpm_at(elapsed);
        if rpm != spindle.rpm() {
            spindle.set_rpm(rpm);
        }
        rpm
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
