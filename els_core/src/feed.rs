//! Spindle position → desired step position.
//!
//! The desired step count is recomputed from the absolute spindle position on
//! every call. Nothing is accumulated between calls, so the truncation of one
//! evaluation never carries into the next.
//!
//! Two interchangeable representations implement [`FeedRatio`]:
//!
//! - [`RationalFeed`]: `count × numerator / denominator`, multiply first, in
//!   a 128-bit intermediate. Division truncates toward zero.
//! - [`FloatFeed`]: `count × ratio` in `f64`, truncated toward zero. The null
//!   feed is detected against [`FLOAT_NULL_EPSILON`] because a ratio built
//!   from float arithmetic may not be exactly zero.
//!   Feed tables refuse non-null entries below that epsilon, so both
//!   representations agree on which entries are null.
//!
//! The executable uses [`ActiveFeed`], chosen by the `float-feed` feature.

use heapless::Vec as HVec;

use els_common::consts::MAX_FEEDS;
use els_common::feed::{FeedDirection, FeedId, FeedSpec, FeedTable, SpindlePosition, StepPosition};

pub use els_common::consts::FLOAT_NULL_EPSILON;

/// A feed ratio in a form the periodic routine can evaluate.
pub trait FeedRatio: Copy + PartialEq + Send + Sync + core::fmt::Debug + 'static {
    /// Convert a table entry. Called once per entry at startup.
    fn from_spec(spec: &FeedSpec) -> Self;

    /// True for the disengaged feed.
    fn is_null(&self) -> bool;

    /// Desired step position for an absolute spindle count.
    fn desired_steps(&self, count: SpindlePosition, direction: FeedDirection) -> StepPosition;
}

/// Evaluate `count × feed × direction` with the given representation.
#[inline]
pub fn compute_desired<R: FeedRatio>(
    count: SpindlePosition,
    ratio: &R,
    direction: FeedDirection,
) -> StepPosition {
    ratio.desired_steps(count, direction)
}

// The counter is read as two's complement so a spindle turned backwards past
// zero maps to negative positions instead of a huge forward count.
#[inline]
fn signed_count(count: SpindlePosition) -> i64 {
    count as i64
}

// ─── Rational ───────────────────────────────────────────────────────

/// Exact fractional ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RationalFeed {
    numerator: u32,
    denominator: u32,
}

impl FeedRatio for RationalFeed {
    fn from_spec(spec: &FeedSpec) -> Self {
        Self {
            numerator: spec.numerator(),
            denominator: spec.denominator(),
        }
    }

    #[inline]
    fn is_null(&self) -> bool {
        self.numerator == 0
    }

    #[inline]
    fn desired_steps(&self, count: SpindlePosition, direction: FeedDirection) -> StepPosition {
        let wide = signed_count(count) as i128 * self.numerator as i128
            / self.denominator as i128
            * direction.sign() as i128;
        wide.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }
}

// ─── Floating point ─────────────────────────────────────────────────

/// Floating-point ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloatFeed(f64);

impl FloatFeed {
    #[inline]
    pub fn ratio(&self) -> f64 {
        self.0
    }
}

impl FeedRatio for FloatFeed {
    fn from_spec(spec: &FeedSpec) -> Self {
        Self(spec.as_f64())
    }

    #[inline]
    fn is_null(&self) -> bool {
        self.0.abs() < FLOAT_NULL_EPSILON
    }

    #[inline]
    fn desired_steps(&self, count: SpindlePosition, direction: FeedDirection) -> StepPosition {
        // `as` truncates toward zero and saturates.
        (signed_count(count) as f64 * self.0 * direction.sign() as f64) as i64
    }
}

#[cfg(not(feature = "float-feed"))]
pub type ActiveFeed = RationalFeed;

#[cfg(feature = "float-feed")]
pub type ActiveFeed = FloatFeed;

// ─── Ratio table ────────────────────────────────────────────────────

/// A [`FeedTable`] pre-converted into one representation.
///
/// Immutable after construction; the periodic routine only indexes it.
#[derive(Debug, Clone)]
pub struct RatioTable<R> {
    ratios: HVec<R, MAX_FEEDS>,
}

impl<R: FeedRatio> RatioTable<R> {
    pub fn from_table(table: &FeedTable) -> Self {
        let mut ratios = HVec::new();
        for (_, entry) in table.iter() {
            // FeedTable capacity equals ours, so this cannot overflow.
            let _ = ratios.push(R::from_spec(&entry.spec()));
        }
        Self { ratios }
    }

    #[inline]
    pub fn get(&self, id: FeedId) -> Option<R> {
        self.ratios.get(id.index()).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ratios.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ratios.is_empty()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
