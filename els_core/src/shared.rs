//! Cross-context publish cells.
//!
//! Every field has exactly one writer. Configuration (feed, direction,
//! power) is written by the foreground and read by the periodic routine;
//! status is written by the periodic routine and read by the foreground.
//! Nothing here blocks, so both sides can touch it at any instruction
//! boundary.
//!
//! A rational feed is two numbers. Publishing it as two stores could let
//! the periodic routine read a numerator from one feed and a denominator
//! from another, so the foreground publishes a single byte instead: the
//! [`FeedId`] of an immutable table entry.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, AtomicU32, Ordering};

use static_assertions::const_assert;

use els_common::consts::MAX_FEEDS;
use els_common::feed::{FeedDirection, FeedId, StepPosition};

/// Sentinel stored in a [`SelectionCell`] when no feed is selected.
const NO_FEED: u8 = u8::MAX;

const_assert!(MAX_FEEDS <= NO_FEED as usize);

// ─── Selection ──────────────────────────────────────────────────────

/// Atomic "which feed" selector.
#[derive(Debug)]
pub struct SelectionCell {
    raw: AtomicU8,
}

impl SelectionCell {
    pub const fn new() -> Self {
        Self {
            raw: AtomicU8::new(NO_FEED),
        }
    }

    /// Publish a selection. A single store; readers see the old or the new
    /// id, never a mix.
    #[inline]
    pub fn store(&self, feed: Option<FeedId>) {
        let raw = feed.map_or(NO_FEED, FeedId::raw);
        self.raw.store(raw, Ordering::Release);
    }

    #[inline]
    pub fn load(&self) -> Option<FeedId> {
        match self.raw.load(Ordering::Acquire) {
            NO_FEED => None,
            raw => Some(FeedId::new(raw)),
        }
    }
}

impl Default for SelectionCell {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Controls ───────────────────────────────────────────────────────

/// Shared state between the foreground and the periodic routine.
///
/// Created once at startup and shared through an `Arc`.
#[derive(Debug, Default)]
pub struct SharedControls {
    // Foreground → periodic.
    feed: SelectionCell,
    reverse: AtomicBool,
    power_on: AtomicBool,
    power_epoch: AtomicU32,

    // Periodic → foreground.
    alarm: AtomicBool,
    backlog_fault: AtomicBool,
    drive_enabled: AtomicBool,
    current: AtomicI64,
    desired: AtomicI64,
}

impl SharedControls {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Foreground writers ──

    #[inline]
    pub fn set_feed(&self, feed: Option<FeedId>) {
        self.feed.store(feed);
    }

    #[inline]
    pub fn set_reverse(&self, reverse: bool) {
        self.reverse.store(reverse, Ordering::Release);
    }

    /// Record a power request. Every call bumps the epoch, so a repeated
    /// `true` still counts as a fresh request.
    pub fn set_power_on(&self, on: bool) {
        self.power_on.store(on, Ordering::Release);
        self.power_epoch.fetch_add(1, Ordering::AcqRel);
    }

    // ── Periodic readers ──

    #[inline]
    pub fn feed(&self) -> Option<FeedId> {
        self.feed.load()
    }

    #[inline]
    pub fn direction(&self) -> FeedDirection {
        FeedDirection::from_reverse(self.reverse.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_power_on(&self) -> bool {
        self.power_on.load(Ordering::Acquire)
    }

    #[inline]
    pub fn power_epoch(&self) -> u32 {
        self.power_epoch.load(Ordering::Acquire)
    }

    // ── Periodic writers ──

    #[inline]
    pub(crate) fn publish_alarm(&self, alarm: bool) {
        self.alarm.store(alarm, Ordering::Release);
    }

    #[inline]
    pub(crate) fn publish_backlog_fault(&self, faulted: bool) {
        self.backlog_fault.store(faulted, Ordering::Release);
    }

    #[inline]
    pub(crate) fn publish_drive_enabled(&self, enabled: bool) {
        self.drive_enabled.store(enabled, Ordering::Release);
    }

    #[inline]
    pub(crate) fn publish_positions(&self, current: StepPosition, desired: StepPosition) {
        self.current.store(current, Ordering::Relaxed);
        self.desired.store(desired, Ordering::Relaxed);
    }

    // ── Foreground readers ──

    #[inline]
    pub fn is_alarm(&self) -> bool {
        self.alarm.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_backlog_fault(&self) -> bool {
        self.backlog_fault.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_drive_enabled(&self) -> bool {
        self.drive_enabled.load(Ordering::Acquire)
    }

    /// Last published (current, desired). Diagnostic only; the pair may
    /// straddle one tick.
    #[inline]
    pub fn positions(&self) -> (StepPosition, StepPosition) {
        (
            self.current.load(Ordering::Relaxed),
            self.desired.load(Ordering::Relaxed),
        )
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
