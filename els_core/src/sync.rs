//! Spindle synchronisation: the periodic entry point and its foreground
//! control surface.
//!
//! [`Core`] is owned by the periodic context and advanced once per timer
//! period with [`Core::tick`]. [`ControlHandle`] is the foreground side;
//! it only writes publish cells in [`SharedControls`] and never touches the
//! pulse generator.
//!
//! ## Tick Body
//! 1. Sample the alarm input and publish it.
//! 2. Clear a latched backlog fault on a new power request or feed change.
//! 3. Apply power to the enable line (`enabled ⇔ power on ∧ ¬fault`).
//! 4. No feed, or a null feed: stop here.
//! 5. Read the spindle, compute desired, hand it to the pulse generator.
//! 6. Resynchronise when feed or direction changed since the last serviced
//!    tick, or the drive was just re-enabled. A pulse already in flight is
//!    accounted for, so current equals desired once this tick's transition
//!    has run.
//! 7. Check the backlog; overflow latches a fault and disables the drive.
//! 8. One pulse state transition.
//!
//! The tick neither allocates, locks nor logs.

use std::sync::Arc;

use thiserror::Error;

use els_common::error::DriveFault;
use els_common::feed::{FeedDirection, FeedId, FeedTable, StepPosition};

use crate::encoder::PositionEncoder;
use crate::feed::{ActiveFeed, FeedRatio, RatioTable};
use crate::hal::{DigitalInput, DigitalOutput, QuadratureCounter};
use crate::shared::SharedControls;
use crate::stepper::{PulseEdge, StepPulseGenerator};

/// Errors from the foreground control surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("feed id {0} is not in the feed table")]
    UnknownFeed(u8),

    #[error("no feed named '{0}' in the feed table")]
    UnknownFeedName(String),
}

/// Outcome of one periodic invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    /// False when no usable feed was selected and the pulse generator was
    /// left alone.
    pub serviced: bool,
    /// Whether this tick resynchronised current to desired.
    pub resynced: bool,
    /// Line change made by the pulse generator.
    pub edge: PulseEdge,
    /// Faults present at the end of the tick.
    pub fault: DriveFault,
}

/// Foreground view of the drive, assembled from the publish cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveSnapshot {
    pub feed: Option<FeedId>,
    pub direction: FeedDirection,
    pub power_on: bool,
    pub drive_enabled: bool,
    pub alarm: bool,
    pub backlog_fault: bool,
    pub current: StepPosition,
    pub desired: StepPosition,
    pub rpm: u16,
}

// ─── Periodic Side ──────────────────────────────────────────────────

/// The synchronisation core.
///
/// Constructed once at startup; positions start at zero with the drive
/// disabled.
pub struct Core<C, O, I, R = ActiveFeed> {
    encoder: Arc<PositionEncoder<C>>,
    drive: StepPulseGenerator<O, I>,
    ratios: RatioTable<R>,
    controls: Arc<SharedControls>,
    /// Feed and direction used by the last serviced tick.
    previous: Option<(FeedId, FeedDirection)>,
    /// Selection seen on the last tick, serviced or not.
    last_selection: Option<FeedId>,
    seen_epoch: u32,
    faulted: bool,
    resync_pending: bool,
}

impl<C, O, I> Core<C, O, I, ActiveFeed>
where
    C: QuadratureCounter,
    O: DigitalOutput,
    I: DigitalInput,
{
    /// Build a core using the build's feed representation.
    pub fn new(
        encoder: Arc<PositionEncoder<C>>,
        drive: StepPulseGenerator<O, I>,
        table: FeedTable,
        controls: Arc<SharedControls>,
    ) -> (Self, ControlHandle<C>) {
        Self::with_representation(encoder, drive, table, controls)
    }
}

impl<C, O, I, R> Core<C, O, I, R>
where
    C: QuadratureCounter,
    O: DigitalOutput,
    I: DigitalInput,
    R: FeedRatio,
{
    /// Build a core with an explicit feed representation.
    pub fn with_representation(
        encoder: Arc<PositionEncoder<C>>,
        drive: StepPulseGenerator<O, I>,
        table: FeedTable,
        controls: Arc<SharedControls>,
    ) -> (Self, ControlHandle<C>) {
        let ratios = RatioTable::from_table(&table);
        let seen_epoch = controls.power_epoch();
        let handle = ControlHandle {
            controls: Arc::clone(&controls),
            encoder: Arc::clone(&encoder),
            table: Arc::new(table),
        };
        let core = Self {
            encoder,
            drive,
            ratios,
            controls,
            previous: None,
            last_selection: None,
            seen_epoch,
            faulted: false,
            resync_pending: false,
        };
        (core, handle)
    }

    /// One periodic invocation.
    pub fn tick(&mut self) -> TickReport {
        let alarm = self.drive.is_alarm();
        self.controls.publish_alarm(alarm);

        let selection = self.controls.feed();
        let epoch = self.controls.power_epoch();
        if self.faulted && (epoch != self.seen_epoch || selection != self.last_selection) {
            self.faulted = false;
            self.controls.publish_backlog_fault(false);
        }
        self.seen_epoch = epoch;
        self.last_selection = selection;

        self.apply_power();

        let ratio = selection
            .and_then(|id| self.ratios.get(id).map(|ratio| (id, ratio)))
            .filter(|(_, ratio)| !ratio.is_null());
        let Some((id, ratio)) = ratio else {
            self.previous = None;
            return TickReport {
                serviced: false,
                resynced: false,
                edge: PulseEdge::None,
                fault: self.fault_flags(alarm),
            };
        };

        let direction = self.controls.direction();
        let desired = ratio.desired_steps(self.encoder.position(), direction);
        self.drive.set_desired_position(desired);

        let resynced = self.resync_pending || self.previous != Some((id, direction));
        if resynced {
            self.drive.resync_position(desired);
            self.resync_pending = false;
        }
        self.previous = Some((id, direction));

        if self.drive.is_enabled() && self.drive.check_step_backlog() {
            self.faulted = true;
            self.controls.publish_backlog_fault(true);
            self.controls.publish_drive_enabled(false);
        }

        let edge = self.drive.service();
        self.controls
            .publish_positions(self.drive.current_position(), self.drive.desired_position());

        TickReport {
            serviced: true,
            resynced,
            edge,
            fault: self.fault_flags(alarm),
        }
    }

    /// Disable the drive immediately, regardless of the power flag.
    ///
    /// The next tick applies the power flag again; callers that stop
    /// ticking after a shutdown leave the drive off.
    pub fn shutdown(&mut self) {
        self.drive.set_enabled(false);
        // Drops a step line the last tick left high.
        self.drive.service();
        self.controls.publish_drive_enabled(false);
    }

    pub fn drive(&self) -> &StepPulseGenerator<O, I> {
        &self.drive
    }

    pub fn encoder(&self) -> &PositionEncoder<C> {
        &self.encoder
    }

    pub fn controls(&self) -> &SharedControls {
        &self.controls
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    fn apply_power(&mut self) {
        let want = self.controls.is_power_on() && !self.faulted;
        if want == self.drive.is_enabled() {
            return;
        }
        // Enabling from an arbitrary tracked position would otherwise start
        // with whatever gap the disabled period left behind.
        if want {
            self.resync_pending = true;
        }
        self.drive.set_enabled(want);
        self.controls.publish_drive_enabled(want);
    }

    #[inline]
    fn fault_flags(&self, alarm: bool) -> DriveFault {
        let mut fault = DriveFault::empty();
        fault.set(DriveFault::BACKLOG_OVERFLOW, self.faulted);
        fault.set(DriveFault::ALARM, alarm);
        fault
    }
}

// ─── Foreground Side ────────────────────────────────────────────────

/// Foreground control surface. Cheap to clone.
#[derive(Debug)]
pub struct ControlHandle<C> {
    controls: Arc<SharedControls>,
    encoder: Arc<PositionEncoder<C>>,
    table: Arc<FeedTable>,
}

impl<C> Clone for ControlHandle<C> {
    fn clone(&self) -> Self {
        Self {
            controls: Arc::clone(&self.controls),
            encoder: Arc::clone(&self.encoder),
            table: Arc::clone(&self.table),
        }
    }
}

impl<C: QuadratureCounter> ControlHandle<C> {
    /// Select a feed, or disengage with `None`.
    pub fn set_feed(&self, feed: Option<FeedId>) -> Result<(), SyncError> {
        if let Some(id) = feed {
            if !self.table.contains(id) {
                return Err(SyncError::UnknownFeed(id.raw()));
            }
        }
        self.controls.set_feed(feed);
        Ok(())
    }

    /// Select a feed by its table name.
    pub fn set_feed_by_name(&self, name: &str) -> Result<FeedId, SyncError> {
        let id = self
            .table
            .find(name)
            .ok_or_else(|| SyncError::UnknownFeedName(name.to_string()))?;
        self.controls.set_feed(Some(id));
        Ok(id)
    }

    pub fn selected_feed(&self) -> Option<FeedId> {
        self.controls.feed()
    }

    pub fn set_direction(&self, reverse: bool) {
        self.controls.set_reverse(reverse);
    }

    /// Request power on or off. Also acknowledges a latched backlog fault.
    pub fn set_power_on(&self, on: bool) {
        self.controls.set_power_on(on);
    }

    pub fn is_power_on(&self) -> bool {
        self.controls.is_power_on()
    }

    pub fn is_alarm(&self) -> bool {
        self.controls.is_alarm()
    }

    pub fn is_backlog_fault(&self) -> bool {
        self.controls.is_backlog_fault()
    }

    pub fn rpm(&self) -> u16 {
        self.encoder.rpm()
    }

    /// Store a measured spindle speed for display.
    pub fn set_rpm(&self, rpm: u32) {
        self.encoder.set_rpm(rpm);
    }

    pub fn status(&self) -> DriveSnapshot {
        let (current, desired) = self.controls.positions();
        DriveSnapshot {
            feed: self.controls.feed(),
            direction: self.controls.direction(),
            power_on: self.controls.is_power_on(),
            drive_enabled: self.controls.is_drive_enabled(),
            alarm: self.controls.is_alarm(),
            backlog_fault: self.controls.is_backlog_fault(),
            current,
            desired,
            rpm: self.encoder.rpm(),
        }
    }

    pub fn feed_table(&self) -> &FeedTable {
        &self.table
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
