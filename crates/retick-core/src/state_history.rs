//! Read access to retained state history
//!
//! Implemented by `retick-history`'s `History`. Anything that only needs to
//! inspect past records (reporting, recombination, tests) can be written
//! against this trait.

use crate::{Limit, StateRecord, Tick};

/// Trait for reading committed state records by tick.
pub trait StateHistory {
    /// Current tick (tick of the newest record, 0 before initialization)
    fn tick(&self) -> Tick;

    /// Get the record committed at exactly `tick`, if still retained.
    fn record_at(&self, tick: Tick) -> Option<&StateRecord>;

    /// Get the record at or before `tick`.
    ///
    /// Returns `(actual_tick, record)` where `actual_tick <= tick`.
    fn nearest_before(&self, tick: Tick) -> Option<(Tick, &StateRecord)>;

    /// Get the tick range of retained records.
    ///
    /// Returns `Some((oldest_tick, newest_tick))`, or `None` when empty.
    fn tick_range(&self) -> Option<(Tick, Tick)>;

    /// Retention limit
    fn limit(&self) -> Limit;

    /// Number of retained records
    fn len(&self) -> usize;

    /// Check if no records are retained
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
