#![forbid(unsafe_code)]

//! Demand: how many more values a subscriber is willing to receive.
//!
//! # Invariants
//!
//! 1. A bounded demand is never negative (it is a `usize`).
//! 2. `Unbounded + x == Unbounded` for every `x`.
//! 3. Adding two bounded demands saturates at `usize::MAX` instead of
//!    overflowing.
//! 4. Consuming one value from `Bounded(0)` is a no-op; producers must check
//!    [`Demand::is_none`] before delivering.
//!
//! Demand is a plain `Copy` value. Every operation returns a new `Demand`.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign};

/// Outstanding permission to deliver values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Demand {
    /// No limit: every value may be delivered.
    Unbounded,
    /// At most this many further values may be delivered.
    Bounded(usize),
}

impl Demand {
    /// Zero demand. Requesting it is legal and simply keeps the stream paused.
    pub const NONE: Self = Self::Bounded(0);

    /// Unlimited demand.
    pub const UNBOUNDED: Self = Self::Unbounded;

    /// Bounded demand of `n` values.
    #[must_use]
    pub const fn max(n: usize) -> Self {
        Self::Bounded(n)
    }

    /// True when no value may be delivered.
    #[must_use]
    pub const fn is_none(self) -> bool {
        matches!(self, Self::Bounded(0))
    }

    /// True for [`Demand::Unbounded`].
    #[must_use]
    pub const fn is_unbounded(self) -> bool {
        matches!(self, Self::Unbounded)
    }

    /// The finite count, or `None` when unbounded.
    #[must_use]
    pub const fn bounded(self) -> Option<usize> {
        match self {
            Self::Unbounded => None,
            Self::Bounded(n) => Some(n),
        }
    }

    /// Additive accumulation, saturating at `usize::MAX`.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        match (self, other) {
            (Self::Bounded(a), Self::Bounded(b)) => Self::Bounded(a.saturating_add(b)),
            _ => Self::Unbounded,
        }
    }

    /// Remove `n` from a bounded demand, flooring at zero. Unbounded is
    /// unaffected.
    #[must_use]
    pub const fn saturating_sub(self, n: usize) -> Self {
        match self {
            Self::Unbounded => Self::Unbounded,
            Self::Bounded(m) => Self::Bounded(m.saturating_sub(n)),
        }
    }

    /// Demand left after one value has been delivered.
    #[must_use]
    pub const fn decrement(self) -> Self {
        self.saturating_sub(1)
    }

    /// Smallest strictly positive demand in `demands`, or [`Demand::NONE`]
    /// when every entry is zero (or the iterator is empty).
    ///
    /// This is the multicast forwarding rule: never ask upstream for more than
    /// the least hungry (but still hungry) downstream can absorb.
    #[must_use]
    pub fn min_positive<I>(demands: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        let mut best: Option<Self> = None;
        for demand in demands {
            if demand.is_none() {
                continue;
            }
            best = match best {
                Some(current) if current <= demand => Some(current),
                _ => Some(demand),
            };
        }
        best.unwrap_or(Self::NONE)
    }
}

impl Default for Demand {
    fn default() -> Self {
        Self::NONE
    }
}

impl From<usize> for Demand {
    fn from(n: usize) -> Self {
        Self::Bounded(n)
    }
}

impl PartialOrd for Demand {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(match (self, other) {
            (Self::Unbounded, Self::Unbounded) => Ordering::Equal,
            (Self::Unbounded, Self::Bounded(_)) => Ordering::Greater,
            (Self::Bounded(_), Self::Unbounded) => Ordering::Less,
            (Self::Bounded(a), Self::Bounded(b)) => a.cmp(b),
        })
    }
}

impl Add for Demand {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.saturating_add(rhs)
    }
}

impl AddAssign for Demand {
    fn add_assign(&mut self, rhs: Self) {
        *self = self.saturating_add(rhs);
    }
}

impl fmt::Display for Demand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => f.write_str("unbounded"),
            Self::Bounded(n) => write!(f, "max({n})"),
        }
    }
}
