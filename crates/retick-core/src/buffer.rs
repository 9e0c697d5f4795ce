//! Next-state buffer: deferred writes for the in-flight tick
//!
//! Actions never touch committed records. Their updates are collected into a
//! [`NextState`] seeded from the current record, applied strictly in rule
//! evaluation order so the last writer of a field wins, and handed to the
//! history manager as a whole at commit.

use crate::{RuleId, StateRecord, Value, ValueMap};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// A single buffered field write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingWrite {
    /// Field written
    pub field: String,
    /// Value written
    pub value: Value,
    /// Rule that produced the write, if named
    pub rule: Option<RuleId>,
}

/// Ordered log of the writes applied to a buffer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteSet {
    writes: Vec<PendingWrite>,
}

impl WriteSet {
    /// Create a new empty WriteSet
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pending write
    pub fn push(&mut self, write: PendingWrite) {
        self.writes.push(write);
    }

    /// Get the number of pending writes
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Check if the WriteSet is empty
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Iterate over writes in application order
    pub fn iter(&self) -> impl Iterator<Item = &PendingWrite> {
        self.writes.iter()
    }

    /// Get a reference to the underlying writes
    pub fn writes(&self) -> &[PendingWrite] {
        &self.writes
    }

    /// The last value written to `field`, if any
    pub fn last_write(&self, field: &str) -> Option<&PendingWrite> {
        self.writes.iter().rev().find(|w| w.field == field)
    }
}

/// Result of applying one rule's updates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Writes that reached the buffer
    pub applied: usize,
    /// Fields dropped because they are input-mapped
    pub dropped: Vec<String>,
}

/// Mutable draft of the next state
#[derive(Debug, Clone, Default)]
pub struct NextState {
    draft: StateRecord,
    writes: WriteSet,
}

impl NextState {
    /// Seed a fresh buffer from a committed record
    pub fn seed(from: &StateRecord) -> Self {
        Self {
            draft: from.clone(),
            writes: WriteSet::new(),
        }
    }

    /// Current draft, including writes applied so far
    pub fn draft(&self) -> &StateRecord {
        &self.draft
    }

    /// Writes applied so far
    pub fn writes(&self) -> &WriteSet {
        &self.writes
    }

    /// Apply one rule's updates in order, dropping protected fields
    pub fn apply(
        &mut self,
        rule: Option<&RuleId>,
        updates: ValueMap,
        is_protected: impl Fn(&str) -> bool,
    ) -> WriteOutcome {
        let mut outcome = WriteOutcome::default();
        for (field, value) in updates {
            if is_protected(&field) {
                trace!(field = %field, "input_write_dropped");
                outcome.dropped.push(field);
                continue;
            }
            self.draft.set(field.clone(), value.clone());
            self.writes.push(PendingWrite {
                field,
                value,
                rule: rule.cloned(),
            });
            outcome.applied += 1;
        }
        outcome
    }

    /// Fold polled input values into the draft
    ///
    /// Not recorded in the write log: inputs are not rule writes.
    pub fn fold_inputs(&mut self, polled: &ValueMap) {
        self.draft.merge(polled);
    }

    /// Consume the buffer, yielding the record to commit
    pub fn into_record(self) -> StateRecord {
        self.draft
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fields;

    fn unprotected(_: &str) -> bool {
        false
    }

    #[test]
    fn test_seed_copies_record() {
        let record = StateRecord::new().with("x", 1i64);
        let buffer = NextState::seed(&record);
        assert_eq!(buffer.draft(), &record);
        assert!(buffer.writes().is_empty());
    }

    #[test]
    fn test_last_writer_wins() {
        let mut buffer = NextState::seed(&StateRecord::new());
        let first = RuleId::new("first");
        let second = RuleId::new("second");

        buffer.apply(Some(&first), fields([("x", 1i64)]), unprotected);
        buffer.apply(Some(&second), fields([("x", 2i64)]), unprotected);

        assert_eq!(buffer.draft().int("x"), Some(2));
        assert_eq!(buffer.writes().len(), 2);
        assert_eq!(
            buffer.writes().last_write("x").and_then(|w| w.rule.clone()),
            Some(second)
        );
    }

    #[test]
    fn test_protected_fields_dropped() {
        let mut buffer = NextState::seed(&StateRecord::new().with("sensor", 7i64));
        let outcome = buffer.apply(
            None,
            fields([("sensor", 0i64), ("y", 3i64)]),
            |field| field == "sensor",
        );

        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.dropped, vec!["sensor".to_string()]);
        assert_eq!(buffer.draft().int("sensor"), Some(7));
        assert_eq!(buffer.draft().int("y"), Some(3));
    }

    #[test]
    fn test_fold_inputs_not_logged() {
        let mut buffer = NextState::seed(&StateRecord::new());
        buffer.fold_inputs(&fields([("clock", 5i64)]));

        assert!(buffer.writes().is_empty());
        assert_eq!(buffer.into_record().int("clock"), Some(5));
    }

    #[test]
    fn test_write_set_serialization() {
        let mut write_set = WriteSet::new();
        write_set.push(PendingWrite {
            field: "gold".to_string(),
            value: Value::Float(100.0),
            rule: Some(RuleId::new("mine")),
        });

        let serialized = ron::to_string(&write_set).expect("serialize");
        let deserialized: WriteSet = ron::from_str(&serialized).expect("deserialize");

        assert_eq!(deserialized, write_set);
    }
}
