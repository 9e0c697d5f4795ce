//! Input subsystem: externally sourced, read-only fields
//!
//! Each [`InputMapping`] ties a field name to an [`InputSource`] and a
//! [`PollPolicy`]. Polled values are folded into state by the history
//! manager; rule actions can never write an input field.

use crate::{StateHistory, StateRecord, Tick, Value, ValueMap};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Supplies the current value of one external field
pub trait InputSource: Send + Sync {
    /// Read the current value
    fn poll(&self) -> Value;
}

impl<F> InputSource for F
where
    F: Fn() -> Value + Send + Sync,
{
    fn poll(&self) -> Value {
        self()
    }
}

/// Context handed to custom poll predicates
#[derive(Clone, Copy)]
pub struct PollContext<'a> {
    /// State about to be committed
    pub state: &'a StateRecord,
    /// Read-only view of the polling engine's history
    pub history: &'a dyn StateHistory,
    /// Tick the polled value will be visible at
    pub tick: Tick,
}

impl fmt::Debug for PollContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollContext")
            .field("state", self.state)
            .field("history_tick", &self.history.tick())
            .field("history_len", &self.history.len())
            .field("tick", &self.tick)
            .finish()
    }
}

/// Custom poll predicate
pub type PollPredicate = Arc<dyn Fn(&PollContext<'_>) -> bool + Send + Sync>;

/// Value transform applied to every freshly polled value
pub type Transform = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// When an input is polled
#[derive(Clone)]
pub enum PollPolicy {
    /// Only when history is initialized
    Once,
    /// Every tick
    Always,
    /// Whenever the predicate accepts; otherwise the previous value carries forward
    When(PollPredicate),
}

impl PollPolicy {
    /// Build a predicate policy
    pub fn when<F>(predicate: F) -> Self
    where
        F: Fn(&PollContext<'_>) -> bool + Send + Sync + 'static,
    {
        PollPolicy::When(Arc::new(predicate))
    }

    fn accepts(&self, ctx: &PollContext<'_>, seeding: bool) -> bool {
        match self {
            PollPolicy::Once => seeding,
            PollPolicy::Always => true,
            PollPolicy::When(predicate) => predicate(ctx),
        }
    }
}

impl fmt::Debug for PollPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollPolicy::Once => write!(f, "Once"),
            PollPolicy::Always => write!(f, "Always"),
            PollPolicy::When(_) => write!(f, "When(<predicate>)"),
        }
    }
}

/// A field sourced from outside the rule set
#[derive(Clone)]
pub struct InputMapping {
    field: String,
    policy: PollPolicy,
    transform: Option<Transform>,
    source: Arc<dyn InputSource>,
}

impl InputMapping {
    /// Create a mapping with an explicit policy
    pub fn new(
        field: impl Into<String>,
        policy: PollPolicy,
        source: impl InputSource + 'static,
    ) -> Self {
        Self {
            field: field.into(),
            policy,
            transform: None,
            source: Arc::new(source),
        }
    }

    /// Poll once, when history is initialized
    pub fn once(field: impl Into<String>, source: impl InputSource + 'static) -> Self {
        Self::new(field, PollPolicy::Once, source)
    }

    /// Poll every tick
    pub fn always(field: impl Into<String>, source: impl InputSource + 'static) -> Self {
        Self::new(field, PollPolicy::Always, source)
    }

    /// Poll whenever `predicate` accepts
    pub fn when<F>(field: impl Into<String>, predicate: F, source: impl InputSource + 'static) -> Self
    where
        F: Fn(&PollContext<'_>) -> bool + Send + Sync + 'static,
    {
        Self::new(field, PollPolicy::when(predicate), source)
    }

    /// Apply `transform` to every freshly polled value
    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    /// Field this mapping feeds
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Poll policy
    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    fn read(&self) -> Value {
        let raw = self.source.poll();
        match &self.transform {
            Some(transform) => transform(raw),
            None => raw,
        }
    }
}

impl fmt::Debug for InputMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputMapping")
            .field("field", &self.field)
            .field("policy", &self.policy)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

/// The set of input mappings for one engine, keyed by field
///
/// A later mapping for a field replaces an earlier one.
#[derive(Debug, Clone, Default)]
pub struct Inputs {
    mappings: IndexMap<String, InputMapping>,
}

impl Inputs {
    /// Create an empty input set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a mapping
    pub fn insert(&mut self, mapping: InputMapping) {
        self.mappings.insert(mapping.field.clone(), mapping);
    }

    /// Number of mapped fields
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Check if no fields are mapped
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Check whether `field` is input-mapped (and therefore not writable by actions)
    pub fn is_input(&self, field: &str) -> bool {
        self.mappings.contains_key(field)
    }

    /// Mapped field names in registration order
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.mappings.keys().map(String::as_str)
    }

    /// Get the mapping for a field
    pub fn get(&self, field: &str) -> Option<&InputMapping> {
        self.mappings.get(field)
    }

    /// Poll for the seed record: every policy except rejected predicates
    pub fn poll_seed(&self, seed: &StateRecord, history: &dyn StateHistory, tick: Tick) -> ValueMap {
        self.collect(seed, history, tick, true)
    }

    /// Poll for a regular commit: `Always` plus accepting predicates
    pub fn poll(&self, state: &StateRecord, history: &dyn StateHistory, tick: Tick) -> ValueMap {
        self.collect(state, history, tick, false)
    }

    fn collect(
        &self,
        state: &StateRecord,
        history: &dyn StateHistory,
        tick: Tick,
        seeding: bool,
    ) -> ValueMap {
        let ctx = PollContext {
            state,
            history,
            tick,
        };
        self.mappings
            .values()
            .filter(|mapping| mapping.policy.accepts(&ctx, seeding))
            .map(|mapping| (mapping.field.clone(), mapping.read()))
            .collect()
    }

    /// Union of two input sets
    ///
    /// On a field collision the mapping from `preferred` wins.
    pub fn union(preferred: &Inputs, other: &Inputs) -> Inputs {
        let mut mappings = other.mappings.clone();
        for (field, mapping) in &preferred.mappings {
            mappings.insert(field.clone(), mapping.clone());
        }
        Inputs { mappings }
    }
}

impl FromIterator<InputMapping> for Inputs {
    fn from_iter<I: IntoIterator<Item = InputMapping>>(iter: I) -> Self {
        let mut inputs = Inputs::new();
        for mapping in iter {
            inputs.insert(mapping);
        }
        inputs
    }
}
