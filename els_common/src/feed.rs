//! Feed specifications and the immutable feed table.
//!
//! A feed is a ratio of stepper steps per spindle encoder tick, kept as a
//! whole-number fraction so the motion core can evaluate it exactly. The
//! table is built once at startup; the foreground selects entries by
//! [`FeedId`], which is small enough to publish through a single atomic.

use heapless::{String as HString, Vec as HVec};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::{FLOAT_NULL_EPSILON, MAX_FEED_NAME_LEN, MAX_FEEDS};

/// Absolute spindle encoder count.
pub type SpindlePosition = u64;

/// Signed stepper position, in physical steps.
pub type StepPosition = i64;

/// Errors building a single feed specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FeedSpecError {
    #[error("denominator must be non-zero")]
    ZeroDenominator,
    #[error("machine geometry contains a zero parameter")]
    ZeroGeometry,
    #[error("reduced ratio {numerator}/{denominator} does not fit in 32 bits")]
    Overflow { numerator: u64, denominator: u64 },
}

/// Errors building a [`FeedTable`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedTableError {
    #[error("feed table is empty")]
    Empty,
    #[error("feed table holds at most {MAX_FEEDS} entries, got {0}")]
    TooMany(usize),
    #[error("duplicate feed name {0:?}")]
    DuplicateName(String),
    #[error("feed name {0:?} is empty or longer than {MAX_FEED_NAME_LEN} bytes")]
    InvalidName(String),
    #[error(
        "feed {name:?}: ratio {numerator}/{denominator} is finer than the smallest selectable feed ({FLOAT_NULL_EPSILON})"
    )]
    TooFine {
        name: String,
        numerator: u32,
        denominator: u32,
    },
    #[error("feed {name:?}: {reason}")]
    InvalidEntry { name: String, reason: String },
    #[error("feed {name:?}: {source}")]
    Spec {
        name: String,
        #[source]
        source: FeedSpecError,
    },
}

// ─── FeedSpec ───────────────────────────────────────────────────────

/// Steps per spindle tick as `numerator / denominator`.
///
/// A zero numerator is the null feed: nothing is selected and the carriage
/// must not move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeedSpec {
    numerator: u32,
    denominator: u32,
}

impl FeedSpec {
    /// The disengaged feed.
    pub const NULL: Self = Self {
        numerator: 0,
        denominator: 1,
    };

    pub const fn new(numerator: u32, denominator: u32) -> Result<Self, FeedSpecError> {
        if denominator == 0 {
            return Err(FeedSpecError::ZeroDenominator);
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// Exact ratio for a thread or feed of `pitch_um` micrometres of carriage
    /// travel per spindle revolution.
    pub fn from_pitch(pitch_um: u32, geometry: &MachineGeometry) -> Result<Self, FeedSpecError> {
        geometry.validate()?;
        let numerator = pitch_um as u64
            * geometry.stepper_steps_per_rev as u64
            * geometry.microsteps as u64;
        let denominator = geometry.encoder_resolution as u64 * geometry.leadscrew_pitch_um as u64;

        let divisor = gcd(numerator, denominator);
        let (numerator, denominator) = (numerator / divisor, denominator / divisor);
        if numerator > u32::MAX as u64 || denominator > u32::MAX as u64 {
            return Err(FeedSpecError::Overflow {
                numerator,
                denominator,
            });
        }
        Self::new(numerator as u32, denominator as u32)
    }

    #[inline]
    pub const fn numerator(&self) -> u32 {
        self.numerator
    }

    #[inline]
    pub const fn denominator(&self) -> u32 {
        self.denominator
    }

    #[inline]
    pub const fn is_null(&self) -> bool {
        self.numerator == 0
    }

    /// Non-null, but below the resolution at which a floating-point ratio
    /// is still told apart from the null feed.
    #[inline]
    pub fn is_too_fine(&self) -> bool {
        !self.is_null() && self.as_f64() < FLOAT_NULL_EPSILON
    }

    /// Ratio as a float, for the floating-point representation and display.
    #[inline]
    pub fn as_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.max(1)
}

// ─── FeedDirection ──────────────────────────────────────────────────

/// Carriage direction relative to the spindle, applied multiplicatively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedDirection {
    #[default]
    Forward,
    Reverse,
}

impl FeedDirection {
    #[inline]
    pub const fn from_reverse(reverse: bool) -> Self {
        if reverse { Self::Reverse } else { Self::Forward }
    }

    #[inline]
    pub const fn is_reverse(self) -> bool {
        matches!(self, Self::Reverse)
    }

    /// `+1` or `-1`.
    #[inline]
    pub const fn sign(self) -> i64 {
        match self {
            Self::Forward => 1,
            Self::Reverse => -1,
        }
    }
}

// ─── Machine geometry ───────────────────────────────────────────────

/// Mechanical parameters used to turn thread pitches into step ratios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MachineGeometry {
    /// Spindle encoder ticks per revolution (after quadrature decoding).
    pub encoder_resolution: u32,
    /// Full steps per stepper motor revolution.
    pub stepper_steps_per_rev: u32,
    /// Driver microstep setting.
    pub microsteps: u32,
    /// Carriage travel per leadscrew revolution [µm].
    pub leadscrew_pitch_um: u32,
}

impl Default for MachineGeometry {
    fn default() -> Self {
        Self {
            encoder_resolution: 4096,
            stepper_steps_per_rev: 200,
            microsteps: 8,
            leadscrew_pitch_um: 3000,
        }
    }
}

impl MachineGeometry {
    pub fn validate(&self) -> Result<(), FeedSpecError> {
        if self.encoder_resolution == 0
            || self.stepper_steps_per_rev == 0
            || self.microsteps == 0
            || self.leadscrew_pitch_um == 0
        {
            return Err(FeedSpecError::ZeroGeometry);
        }
        Ok(())
    }
}

// ─── Feed table ─────────────────────────────────────────────────────

/// One `[[feeds]]` entry as written in TOML.
///
/// Either `numerator` + `denominator`, or `pitch_um`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedEntryConfig {
    pub name: String,
    #[serde(default)]
    pub numerator: Option<u32>,
    #[serde(default)]
    pub denominator: Option<u32>,
    #[serde(default)]
    pub pitch_um: Option<u32>,
}

impl FeedEntryConfig {
    fn to_spec(&self, geometry: &MachineGeometry) -> Result<FeedSpec, FeedTableError> {
        let spec_err = |source| FeedTableError::Spec {
            name: self.name.clone(),
            source,
        };
        match (self.numerator, self.denominator, self.pitch_um) {
            (Some(n), Some(d), None) => FeedSpec::new(n, d).map_err(spec_err),
            (None, None, Some(pitch)) => FeedSpec::from_pitch(pitch, geometry).map_err(spec_err),
            _ => Err(FeedTableError::InvalidEntry {
                name: self.name.clone(),
                reason: "expected either numerator + denominator or pitch_um".to_string(),
            }),
        }
    }
}

/// Index of an entry in a [`FeedTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeedId(u8);

impl FeedId {
    #[inline]
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn raw(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A named feed specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    name: HString<MAX_FEED_NAME_LEN>,
    spec: FeedSpec,
}

impl FeedEntry {
    #[inline]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    #[inline]
    pub fn spec(&self) -> FeedSpec {
        self.spec
    }
}

/// Immutable, fixed-capacity table of selectable feeds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedTable {
    entries: HVec<FeedEntry, MAX_FEEDS>,
}

impl FeedTable {
    /// Build a table from `(name, spec)` pairs.
    pub fn new<'a, I>(entries: I) -> Result<Self, FeedTableError>
    where
        I: IntoIterator<Item = (&'a str, FeedSpec)>,
    {
        let mut table = Self::default();
        let mut count = 0usize;
        for (name, spec) in entries {
            count += 1;
            if table.find(name).is_some() {
                return Err(FeedTableError::DuplicateName(name.to_string()));
            }
            if spec.is_too_fine() {
                return Err(FeedTableError::TooFine {
                    name: name.to_string(),
                    numerator: spec.numerator(),
                    denominator: spec.denominator(),
                });
            }
            let entry = FeedEntry {
                name: to_name(name)?,
                spec,
            };
            if table.entries.push(entry).is_err() {
                // Keep counting so the error reports the full size.
                continue;
            }
        }
        if count == 0 {
            return Err(FeedTableError::Empty);
        }
        if count > MAX_FEEDS {
            return Err(FeedTableError::TooMany(count));
        }
        Ok(table)
    }

    /// Build a table from `[[feeds]]` configuration entries.
    pub fn from_config(
        entries: &[FeedEntryConfig],
        geometry: &MachineGeometry,
    ) -> Result<Self, FeedTableError> {
        if entries.len() > MAX_FEEDS {
            return Err(FeedTableError::TooMany(entries.len()));
        }
        let specs = entries
            .iter()
            .map(|e| e.to_spec(geometry).map(|spec| (e.name.as_str(), spec)))
            .collect::<Result<Vec<_>, _>>()?;
        let table = Self::new(specs)?;
        for (id, entry) in table.iter() {
            debug!(
                id = id.raw(),
                name = entry.name(),
                numerator = entry.spec().numerator(),
                denominator = entry.spec().denominator(),
                "Feed table entry"
            );
        }
        Ok(table)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn get(&self, id: FeedId) -> Option<&FeedEntry> {
        self.entries.get(id.index())
    }

    #[inline]
    pub fn contains(&self, id: FeedId) -> bool {
        id.index() < self.entries.len()
    }

    /// Look up a feed by its exact name.
    pub fn find(&self, name: &str) -> Option<FeedId> {
        self.entries
            .iter()
            .position(|e| e.name() == name)
            .map(|i| FeedId::new(i as u8))
    }

    pub fn iter(&self) -> impl Iterator<Item = (FeedId, &FeedEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (FeedId::new(i as u8), e))
    }
}

fn to_name(name: &str) -> Result<HString<MAX_FEED_NAME_LEN>, FeedTableError> {
    if name.is_empty() {
        return Err(FeedTableError::InvalidName(name.to_string()));
    }
    let mut out = HString::new();
    out.push_str(name)
        .map_err(|_| FeedTableError::InvalidName(name.to_string()))?;
    Ok(out)
}

// ─── Tests ──────────────────────────────────────────────────────────
