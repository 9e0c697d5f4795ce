//! State records: the field set a rule table operates on

use crate::value::{write_joined, Entry};
use crate::{Value, ValueMap};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Index;

static NULL: Value = Value::Null;

/// A mapping from field name to value, representing global state at one tick
///
/// Records are immutable once committed to history. Drafts are mutated only
/// through the next-state buffer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateRecord {
    fields: ValueMap,
}

impl StateRecord {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field assignment
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Get a field value
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Get a field as an integer
    pub fn int(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_int)
    }

    /// Get a field as a float; integer fields widen
    pub fn float(&self, field: &str) -> Option<f64> {
        match self.get(field)? {
            Value::Float(x) => Some(*x),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get a field as a boolean
    pub fn bool(&self, field: &str) -> Option<bool> {
        match self.get(field)? {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get a field as a list
    pub fn list(&self, field: &str) -> Option<&[Value]> {
        self.get(field).and_then(Value::as_list)
    }

    /// Check whether a field is present
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Set a field
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Merge `updates` over this record, later keys overwriting earlier ones
    pub fn merge(&mut self, updates: &ValueMap) {
        for (field, value) in updates {
            self.fields.insert(field.clone(), value.clone());
        }
    }

    /// Return a copy with `updates` merged over it
    pub fn merged(&self, updates: &ValueMap) -> Self {
        let mut record = self.clone();
        record.merge(updates);
        record
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the record has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over fields in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Borrow the underlying field map
    pub fn fields(&self) -> &ValueMap {
        &self.fields
    }

    /// Consume the record and return the underlying field map
    pub fn into_fields(self) -> ValueMap {
        self.fields
    }
}

/// Missing fields read as `Value::Null`
impl Index<&str> for StateRecord {
    type Output = Value;

    fn index(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&NULL)
    }
}

impl From<ValueMap> for StateRecord {
    fn from(fields: ValueMap) -> Self {
        Self { fields }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for StateRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl fmt::Display for StateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_joined(f, "{", self.fields.iter().map(|(k, v)| Entry(k, v)), "}")
    }
}

/// Build a `ValueMap` from field/value pairs
///
/// Convenience for action updates and rewind mutations.
pub fn fields<K, V, I>(pairs: I) -> ValueMap
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
