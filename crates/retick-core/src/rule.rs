//! Rule table: conditions, actions, priorities and inhibitors
//!
//! Rules are registered as [`RuleDef`]s and compiled into a [`RuleTable`] in
//! two phases: every named rule is entered into a lookup table, then every
//! inhibitor-by-name is resolved against it. Unresolved or ambiguous names
//! fail the build, so a constructed table never holds a dangling reference.
//!
//! # Example
//!
//! ```rust
//! use retick_core::{Outcome, RuleDef, RuleTable};
//!
//! let table = RuleTable::build(vec![
//!     RuleDef::new(
//!         |ctx| ctx.state["done"].is_truthy(),
//!         |_| Ok(Outcome::exit()),
//!     )
//!     .named("finish")
//!     .priority(10),
//!     RuleDef::new(
//!         |ctx| ctx.state.int("counter").unwrap_or(0) < 10,
//!         |ctx| Ok(Outcome::set("counter", ctx.state.int("counter").unwrap_or(0) + 1)),
//!     )
//!     .inhibited_by("finish"),
//! ])
//! .unwrap();
//!
//! assert_eq!(table.len(), 2);
//! assert_eq!(table.evaluation_order(), &[0, 1]);
//! ```

use crate::error::{Error, Result, RuleFault};
use crate::record::fields;
use crate::{RuleId, StateRecord, Tick, Value, ValueMap};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// View of engine state handed to rule code
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    /// Committed state at the start of the tick, fixed for the whole pass
    pub state: &'a StateRecord,
    /// Next-state buffer as accumulated so far this tick
    pub next: &'a StateRecord,
    /// Tick being evaluated
    pub tick: Tick,
}

/// Pure predicate over rule context
pub type Condition = Arc<dyn Fn(&RuleContext<'_>) -> bool + Send + Sync>;

/// Rule action: computes an outcome from the tick snapshot
pub type Action = Arc<dyn Fn(&RuleContext<'_>) -> ActionResult + Send + Sync>;

/// Result returned by a rule action
pub type ActionResult = std::result::Result<Outcome, RuleFault>;

/// What a firing rule asks the engine to do
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Outcome {
    /// Fired without producing updates
    #[default]
    Idle,
    /// Field updates to buffer for the next state
    Update(ValueMap),
    /// Rewind history to `tick`, optionally merging `mutate` into that record
    ///
    /// Abandons the rest of the current pass.
    Rewind {
        tick: Tick,
        mutate: Option<ValueMap>,
    },
    /// Stop the engine, optionally merging an explicit state over the snapshot
    Exit(Option<ValueMap>),
}

impl Outcome {
    /// Update several fields
    pub fn update<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Outcome::Update(fields(pairs))
    }

    /// Update a single field
    pub fn set(field: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut updates = ValueMap::new();
        updates.insert(field.into(), value.into());
        Outcome::Update(updates)
    }

    /// Rewind to `tick` without mutation
    pub fn rewind(tick: Tick) -> Self {
        Outcome::Rewind { tick, mutate: None }
    }

    /// Rewind to `tick` and merge `mutate` into the rewound-to record
    pub fn rewind_with(tick: Tick, mutate: ValueMap) -> Self {
        Outcome::Rewind {
            tick,
            mutate: Some(mutate),
        }
    }

    /// Exit with the current snapshot
    pub fn exit() -> Self {
        Outcome::Exit(None)
    }

    /// Exit with `state` merged over the current snapshot
    pub fn exit_with(state: ValueMap) -> Self {
        Outcome::Exit(Some(state))
    }
}

/// Blocks a rule from firing while it holds
#[derive(Clone)]
pub enum Inhibitor {
    /// Inline predicate
    When(Condition),
    /// Holds whenever the named rule's condition holds
    Rule(RuleId),
}

impl fmt::Debug for Inhibitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inhibitor::When(_) => write!(f, "When(<predicate>)"),
            Inhibitor::Rule(id) => f.debug_tuple("Rule").field(id).finish(),
        }
    }
}

/// A rule as registered, before inhibitor names are resolved
#[derive(Clone)]
pub struct RuleDef {
    name: Option<RuleId>,
    condition: Condition,
    action: Action,
    priority: i32,
    inhibitors: Vec<Inhibitor>,
}

impl RuleDef {
    /// Create an unnamed rule with priority 0 and no inhibitors
    pub fn new<C, A>(condition: C, action: A) -> Self
    where
        C: Fn(&RuleContext<'_>) -> bool + Send + Sync + 'static,
        A: Fn(&RuleContext<'_>) -> ActionResult + Send + Sync + 'static,
    {
        Self {
            name: None,
            condition: Arc::new(condition),
            action: Arc::new(action),
            priority: 0,
            inhibitors: Vec::new(),
        }
    }

    /// Name the rule so inhibitors can reference it
    pub fn named(mut self, name: impl Into<RuleId>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the priority (higher runs first)
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Inhibit this rule while `predicate` holds
    pub fn inhibited_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&RuleContext<'_>) -> bool + Send + Sync + 'static,
    {
        self.inhibitors.push(Inhibitor::When(Arc::new(predicate)));
        self
    }

    /// Inhibit this rule while the named rule's condition holds
    pub fn inhibited_by(mut self, name: impl Into<RuleId>) -> Self {
        self.inhibitors.push(Inhibitor::Rule(name.into()));
        self
    }

    /// Registered name
    pub fn name(&self) -> Option<&RuleId> {
        self.name.as_ref()
    }

    /// Registered inhibitors
    pub fn inhibitors(&self) -> &[Inhibitor] {
        &self.inhibitors
    }
}

#[derive(Clone)]
enum Gate {
    When(Condition),
    Rule(usize),
}

/// A compiled rule with its inhibitors bound to table positions
#[derive(Clone)]
pub struct Rule {
    name: Option<RuleId>,
    label: String,
    condition: Condition,
    action: Action,
    priority: i32,
    gates: Vec<Gate>,
}

impl Rule {
    /// Registered name, if any
    pub fn name(&self) -> Option<&RuleId> {
        self.name.as_ref()
    }

    /// Name, or `#index` for unnamed rules
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Evaluation priority
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Number of inhibitors attached to this rule
    pub fn inhibitor_count(&self) -> usize {
        self.gates.len()
    }

    /// Evaluate the condition alone
    pub fn condition_holds(&self, ctx: &RuleContext<'_>) -> bool {
        (self.condition)(ctx)
    }

    /// Invoke the action
    pub fn act(&self, ctx: &RuleContext<'_>) -> ActionResult {
        (self.action)(ctx)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("label", &self.label)
            .field("priority", &self.priority)
            .field("inhibitors", &self.gates.len())
            .finish()
    }
}

fn label_for(index: usize, name: Option<&RuleId>) -> String {
    name.map_or_else(|| format!("#{}", index), ToString::to_string)
}

/// Ordered, immutable collection of compiled rules
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<Rule>,
    /// Rule indices by descending priority, ties in registration order
    order: Vec<usize>,
}

impl RuleTable {
    /// Compile rule definitions, resolving inhibitor names
    pub fn build(defs: impl IntoIterator<Item = RuleDef>) -> Result<Self> {
        let defs: Vec<RuleDef> = defs.into_iter().collect();

        let mut names: HashMap<&RuleId, Vec<usize>> = HashMap::new();
        for (index, def) in defs.iter().enumerate() {
            if let Some(name) = &def.name {
                names.entry(name).or_default().push(index);
            }
        }

        let mut gates = Vec::with_capacity(defs.len());
        for (index, def) in defs.iter().enumerate() {
            let mut resolved = Vec::with_capacity(def.inhibitors.len());
            for inhibitor in &def.inhibitors {
                match inhibitor {
                    Inhibitor::When(check) => resolved.push(Gate::When(Arc::clone(check))),
                    Inhibitor::Rule(target) => {
                        let hits = names.get(target).map(Vec::as_slice).unwrap_or(&[]);
                        match hits {
                            [only] => resolved.push(Gate::Rule(*only)),
                            [] => {
                                return Err(Error::UnresolvedInhibitor {
                                    rule: label_for(index, def.name.as_ref()),
                                    target: target.clone(),
                                })
                            }
                            _ => {
                                return Err(Error::AmbiguousInhibitor {
                                    rule: label_for(index, def.name.as_ref()),
                                    target: target.clone(),
                                    count: hits.len(),
                                })
                            }
                        }
                    }
                }
            }
            gates.push(resolved);
        }

        let rules: Vec<Rule> = defs
            .into_iter()
            .zip(gates)
            .enumerate()
            .map(|(index, (def, gates))| Rule {
                label: label_for(index, def.name.as_ref()),
                name: def.name,
                condition: def.condition,
                action: def.action,
                priority: def.priority,
                gates,
            })
            .collect();

        debug!(rules = rules.len(), "rule_table_built");
        Ok(Self::from_rules(rules))
    }

    fn from_rules(rules: Vec<Rule>) -> Self {
        let mut order: Vec<usize> = (0..rules.len()).collect();
        order.sort_by(|&a, &b| rules[b].priority.cmp(&rules[a].priority));
        Self { rules, order }
    }

    /// Concatenate two tables into a new one
    ///
    /// Inhibitor references stay bound to the rules they resolved to in
    /// their own table.
    pub fn concat(&self, other: &RuleTable) -> RuleTable {
        let offset = self.rules.len();
        let mut rules = self.rules.clone();
        rules.extend(other.rules.iter().enumerate().map(|(index, rule)| {
            let mut rule = rule.clone();
            rule.label = label_for(offset + index, rule.name.as_ref());
            for gate in &mut rule.gates {
                if let Gate::Rule(target) = gate {
                    *target += offset;
                }
            }
            rule
        }));
        Self::from_rules(rules)
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Get a rule by registration index
    pub fn get(&self, index: usize) -> Option<&Rule> {
        self.rules.get(index)
    }

    /// Iterate rules in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// Registration indices in evaluation order
    pub fn evaluation_order(&self) -> &[usize] {
        &self.order
    }

    /// Iterate `(index, rule)` in evaluation order
    pub fn ordered(&self) -> impl Iterator<Item = (usize, &Rule)> {
        self.order.iter().map(move |&index| (index, &self.rules[index]))
    }

    /// Registration index of the first rule with this name
    pub fn position(&self, name: &str) -> Option<usize> {
        self.rules
            .iter()
            .position(|rule| rule.name.as_ref().is_some_and(|n| n.as_str() == name))
    }

    /// Check whether any inhibitor of the rule at `index` holds
    ///
    /// False for an index outside the table.
    pub fn is_inhibited(&self, index: usize, ctx: &RuleContext<'_>) -> bool {
        self.rules
            .get(index)
            .is_some_and(|rule| rule.gates.iter().any(|gate| self.gate_holds(gate, ctx)))
    }

    fn gate_holds(&self, gate: &Gate, ctx: &RuleContext<'_>) -> bool {
        match gate {
            Gate::When(check) => check(ctx),
            Gate::Rule(target) => self
                .rules
                .get(*target)
                .is_some_and(|rule| rule.condition_holds(ctx)),
        }
    }

    /// Check whether the rule at `index` fires: condition holds, no inhibitor does
    ///
    /// False for an index outside the table.
    pub fn fires(&self, index: usize, ctx: &RuleContext<'_>) -> bool {
        self.rules
            .get(index)
            .is_some_and(|rule| rule.condition_holds(ctx) && !self.is_inhibited(index, ctx))
    }
}
