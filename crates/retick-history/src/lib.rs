//! Retick History - bounded, rewindable history of committed state records
//!
//! This crate provides the history manager behind the retick engine. It owns
//! the committed records, the tick counter and the next-state buffer of the
//! in-flight tick, and implements the commit/rewind/retention protocol.
//!
//! # Features
//!
//! - **Atomic commit**: `advance` turns the whole next-state buffer into a record
//! - **Bounded memory**: an optional limit evicts the oldest records
//! - **Best-effort rewind**: targets outside the retained window clamp to it
//! - **Injection**: a rewind can merge new information into the rewound-to record
//!
//! # Example
//!
//! ```rust
//! use retick_core::{fields, StateRecord, ValueMap};
//! use retick_history::History;
//!
//! let mut history = History::with_limit(StateRecord::new().with("x", 0i64), 3usize);
//! history.initialize(&ValueMap::new());
//!
//! for step in 1..=5i64 {
//!     history.write(None, fields([("x", step)]), |_| false);
//!     history.advance(&ValueMap::new());
//! }
//!
//! assert_eq!(history.tick(), 6);
//! assert_eq!(history.len(), 3);
//!
//! // Tick 1 fell outside the limit, so the rewind lands on the oldest record
//! let landed = history.rewind(1, Some(fields([("note", "retold")])));
//! assert_eq!(landed, 4);
//! assert_eq!(history.current_state().int("x"), Some(3));
//! ```

use retick_core::{
    Limit, NextState, RuleId, StateHistory, StateRecord, Tick, ValueMap, WriteOutcome,
    WriteSet, ORIGIN_TICK,
};
use std::collections::vec_deque;
use std::collections::VecDeque;
use tracing::debug;

/// Committed records plus the next-state buffer of the in-flight tick
///
/// Record positions map to ticks: the newest record is the current tick, the
/// one before it `tick - 1`, and so on back to [`History::oldest_tick`].
#[derive(Debug, Clone)]
pub struct History {
    /// Retained records, oldest first
    records: VecDeque<StateRecord>,
    /// Tick of the newest record (0 until initialized)
    tick: Tick,
    /// Seed supplied by the host
    initial: StateRecord,
    /// Draft of the next record
    next: NextState,
    /// Retention limit
    limit: Limit,
}

impl History {
    /// Create an unbounded history seeded with `initial`
    ///
    /// Nothing is committed until [`History::initialize`] runs.
    pub fn new(initial: StateRecord) -> Self {
        Self::with_limit(initial, Limit::Unbounded)
    }

    /// Create a history with a retention limit
    pub fn with_limit(initial: StateRecord, limit: impl Into<Limit>) -> Self {
        let limit: Limit = limit.into();
        Self {
            records: VecDeque::new(),
            tick: 0,
            next: NextState::seed(&initial),
            initial,
            limit: limit.normalized(),
        }
    }

    /// Check whether the seed record has been committed
    pub fn is_initialized(&self) -> bool {
        !self.records.is_empty()
    }

    /// Commit the seed (initial state with startup inputs folded in) at the origin tick
    ///
    /// Discards any existing records.
    pub fn initialize(&mut self, startup_inputs: &ValueMap) {
        self.records.clear();
        self.records.push_back(self.initial.merged(startup_inputs));
        self.tick = ORIGIN_TICK;
        self.reseed();
        debug!(tick = self.tick, inputs = startup_inputs.len(), "history_initialized");
    }

    /// Current tick
    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// Number of retained records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if no records are retained
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Retained records, oldest to newest
    pub fn records(&self) -> vec_deque::Iter<'_, StateRecord> {
        self.records.iter()
    }

    /// The most recently committed record (the seed before initialization)
    pub fn current_state(&self) -> &StateRecord {
        self.records.back().unwrap_or(&self.initial)
    }

    /// The seed state supplied by the host
    pub fn initial_state(&self) -> &StateRecord {
        &self.initial
    }

    /// Read-only view of the next-state buffer
    pub fn next_state(&self) -> &StateRecord {
        self.next.draft()
    }

    /// Writes buffered during the in-flight tick
    pub fn pending_writes(&self) -> &WriteSet {
        self.next.writes()
    }

    /// Tick of the oldest retained record (0 when empty)
    pub fn oldest_tick(&self) -> Tick {
        if self.records.is_empty() {
            0
        } else {
            self.tick + 1 - self.records.len() as Tick
        }
    }

    /// Retention limit
    pub fn limit(&self) -> Limit {
        self.limit
    }

    /// Change the retention limit, trimming the oldest records immediately
    ///
    /// Bounded limits below 1 are coerced to 1.
    pub fn set_limit(&mut self, limit: impl Into<Limit>) {
        let limit: Limit = limit.into();
        self.limit = limit.normalized();
        let evicted = self.evict();
        debug!(limit = %self.limit, evicted, "history_limit_set");
    }

    /// Buffer one rule's updates, dropping fields `is_protected` rejects
    pub fn write(
        &mut self,
        rule: Option<&RuleId>,
        updates: ValueMap,
        is_protected: impl Fn(&str) -> bool,
    ) -> WriteOutcome {
        self.next.apply(rule, updates, is_protected)
    }

    /// Drop every buffered write, reseeding from the current record
    pub fn discard_pending(&mut self) {
        let discarded = self.next.writes().len();
        self.reseed();
        debug!(tick = self.tick, discarded, "pending_writes_discarded");
    }

    /// Commit the next-state buffer as a new record
    ///
    /// Polled input values are folded into the buffer first. Advances the
    /// tick, evicts beyond the limit, and seeds a fresh buffer from the new
    /// current record. Returns the new tick.
    pub fn advance(&mut self, polled: &ValueMap) -> Tick {
        if !self.is_initialized() {
            self.initialize(&ValueMap::new());
        }

        let mut next = std::mem::take(&mut self.next);
        next.fold_inputs(polled);
        self.records.push_back(next.into_record());
        self.tick += 1;

        let evicted = self.evict();
        if evicted > 0 {
            debug!(tick = self.tick, evicted, "history_evicted");
        }

        self.reseed();
        self.tick
    }

    /// Rewind to `target`, discarding every later record
    ///
    /// Targets before the oldest retained record clamp to it; targets past
    /// the current tick clamp to the current tick. `mutate`, if given, is
    /// merged into the rewound-to record, input fields included. The
    /// next-state buffer is rebuilt from the result. Returns the tick
    /// actually landed on.
    pub fn rewind(&mut self, target: Tick, mutate: Option<ValueMap>) -> Tick {
        if !self.is_initialized() {
            debug!(target, "rewind_before_initialize");
            return self.tick;
        }

        let oldest = self.oldest_tick();
        let landed = target.clamp(oldest, self.tick);
        if landed != target {
            debug!(requested = target, landed, oldest, "rewind_clamped");
        }

        self.records.truncate((landed - oldest + 1) as usize);
        self.tick = landed;

        if let (Some(mutate), Some(current)) = (mutate, self.records.back_mut()) {
            current.merge(&mutate);
        }

        self.reseed();
        landed
    }

    /// Rewind to the oldest retained record
    pub fn clear(&mut self) {
        let oldest = self.oldest_tick();
        self.rewind(oldest, None);
    }

    /// Drop all records and return to the uninitialized origin
    ///
    /// Optionally replaces the seed state.
    pub fn reset(&mut self, initial: Option<StateRecord>) {
        if let Some(initial) = initial {
            self.initial = initial;
        }
        self.records.clear();
        self.tick = 0;
        self.reseed();
    }

    /// Get the record committed at exactly `tick`, if still retained
    pub fn record_at(&self, tick: Tick) -> Option<&StateRecord> {
        let oldest = self.oldest_tick();
        if self.records.is_empty() || tick < oldest || tick > self.tick {
            return None;
        }
        self.records.get((tick - oldest) as usize)
    }

    /// Get statistics about retained history
    pub fn stats(&self) -> HistoryStats {
        HistoryStats {
            limit: self.limit,
            retained: self.records.len(),
            oldest_tick: self.oldest_tick(),
            newest_tick: self.tick,
        }
    }

    fn reseed(&mut self) {
        self.next = NextState::seed(self.current_state());
    }

    fn evict(&mut self) -> usize {
        let mut evicted = 0;
        while !self.limit.allows(self.records.len()) {
            self.records.pop_front();
            evicted += 1;
        }
        evicted
    }
}

impl StateHistory for History {
    fn tick(&self) -> Tick {
        self.tick
    }

    fn record_at(&self, tick: Tick) -> Option<&StateRecord> {
        History::record_at(self, tick)
    }

    fn nearest_before(&self, tick: Tick) -> Option<(Tick, &StateRecord)> {
        if self.records.is_empty() || tick < self.oldest_tick() {
            return None;
        }
        let tick = tick.min(self.tick);
        History::record_at(self, tick).map(|record| (tick, record))
    }

    fn tick_range(&self) -> Option<(Tick, Tick)> {
        if self.records.is_empty() {
            None
        } else {
            Some((self.oldest_tick(), self.tick))
        }
    }

    fn limit(&self) -> Limit {
        self.limit
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

/// Statistics about retained history
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryStats {
    /// Retention limit
    pub limit: Limit,
    /// Current number of retained records
    pub retained: usize,
    /// Oldest retained tick
    pub oldest_tick: Tick,
    /// Newest retained tick
    pub newest_tick: Tick,
}

impl HistoryStats {
    /// Number of ticks between oldest and newest record
    pub fn span(&self) -> Tick {
        if self.retained == 0 {
            0
        } else {
            self.newest_tick - self.oldest_tick
        }
    }

    /// Fill percentage (0.0 to 1.0), `None` when unbounded
    pub fn fill_ratio(&self) -> Option<f32> {
        self.limit
            .get()
            .map(|max| self.retained as f32 / max as f32)
    }
}
