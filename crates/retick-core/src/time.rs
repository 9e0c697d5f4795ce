//! Tick numbering and history retention limits

use serde::{Deserialize, Serialize};
use std::fmt;

/// A discrete tick identifier (logical time unit)
pub type Tick = u64;

/// Tick assigned to the seed record when history is initialized
pub const ORIGIN_TICK: Tick = 1;

/// Maximum number of history records retained
///
/// Bounded limits are always at least 1; smaller requests are coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Limit {
    /// Keep every committed record
    #[default]
    Unbounded,
    /// Keep at most this many records
    Bounded(usize),
}

impl Limit {
    /// Create a bounded limit, coercing anything below 1 to 1
    pub fn bounded(n: usize) -> Self {
        Limit::Bounded(n.max(1))
    }

    /// Re-apply the coercion rule (for values built directly or deserialized)
    pub fn normalized(self) -> Self {
        match self {
            Limit::Unbounded => Limit::Unbounded,
            Limit::Bounded(n) => Limit::bounded(n),
        }
    }

    /// The bound, if any
    pub fn get(&self) -> Option<usize> {
        match self.normalized() {
            Limit::Unbounded => None,
            Limit::Bounded(n) => Some(n),
        }
    }

    /// Check if this limit is unbounded
    pub fn is_unbounded(&self) -> bool {
        matches!(self, Limit::Unbounded)
    }

    /// Check whether `len` records fit within this limit
    pub fn allows(&self, len: usize) -> bool {
        self.get().map_or(true, |max| len <= max)
    }
}

impl From<usize> for Limit {
    fn from(n: usize) -> Self {
        Limit::bounded(n)
    }
}

impl From<i64> for Limit {
    fn from(n: i64) -> Self {
        Limit::bounded(usize::try_from(n).unwrap_or(0))
    }
}

impl From<Option<usize>> for Limit {
    fn from(n: Option<usize>) -> Self {
        n.map_or(Limit::Unbounded, Limit::bounded)
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            None => write!(f, "unbounded"),
            Some(n) => write!(f, "{}", n),
        }
    }
}
