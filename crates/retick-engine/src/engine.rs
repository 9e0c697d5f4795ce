//! Engine - evaluates a rule table against history, one pass per tick
//!
//! Each [`Engine::step`] reads the current committed record once, evaluates
//! every rule against that snapshot in descending priority order, buffers
//! the updates of firing rules, and commits the buffer as the next record.
//! A rule can end the pass early by rewinding history or by exiting.

use crate::config::{EngineConfig, RunMode};
use crate::error::{Error, Result};
use crate::report::{EngineStatus, TickEnd, TickReport};
use retick_core::{
    InputMapping, Inputs, Limit, Outcome, RuleContext, RuleDef, RuleTable, StateRecord, Tick,
    ValueMap, ORIGIN_TICK,
};
use retick_history::History;
use tracing::{debug, info, warn};

/// Collects rules, inputs and configuration before building an [`Engine`]
///
/// # Example
///
/// ```
/// use retick_core::{InputMapping, Outcome, RuleDef, StateRecord, Value};
/// use retick_engine::Engine;
///
/// let mut engine = Engine::builder(StateRecord::new().with("n", 0i64))
///     .rule(RuleDef::new(
///         |ctx| ctx.state.int("n").unwrap_or(0) < 3,
///         |ctx| Ok(Outcome::set("n", ctx.state.int("n").unwrap_or(0) + 1)),
///     ))
///     .input(InputMapping::once("mode", || Value::from("batch")))
///     .limit(8usize)
///     .build()
///     .unwrap();
///
/// let last = engine.run().unwrap();
/// assert_eq!(last.int("n"), Some(3));
/// assert_eq!(last["mode"], Value::from("batch"));
/// ```
pub struct EngineBuilder {
    initial: StateRecord,
    rules: Vec<RuleDef>,
    inputs: Vec<InputMapping>,
    config: EngineConfig,
}

impl EngineBuilder {
    /// Register a rule
    pub fn rule(mut self, rule: RuleDef) -> Self {
        self.rules.push(rule);
        self
    }

    /// Register several rules, in order
    pub fn rules(mut self, rules: impl IntoIterator<Item = RuleDef>) -> Self {
        self.rules.extend(rules);
        self
    }

    /// Register an input mapping
    pub fn input(mut self, mapping: InputMapping) -> Self {
        self.inputs.push(mapping);
        self
    }

    /// Register several input mappings
    pub fn inputs(mut self, mappings: impl IntoIterator<Item = InputMapping>) -> Self {
        self.inputs.extend(mappings);
        self
    }

    /// Replace the configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the history retention limit
    pub fn limit(mut self, limit: impl Into<Limit>) -> Self {
        self.config = self.config.with_limit(limit);
        self
    }

    /// Set the engine name used in log fields
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Compile the rule table and build the engine
    ///
    /// Fails if an inhibitor-by-name does not resolve to exactly one rule.
    pub fn build(self) -> Result<Engine> {
        let rules = RuleTable::build(self.rules)?;
        let inputs: Inputs = self.inputs.into_iter().collect();
        Ok(Engine::assemble(rules, inputs, self.initial, self.config))
    }
}

/// A tick-driven rule engine instance
///
/// Owns its rule table, input mappings and history exclusively; nothing is
/// shared between instances, including the product of recombination.
pub struct Engine {
    rules: RuleTable,
    inputs: Inputs,
    history: History,
    config: EngineConfig,
    exit_state: Option<StateRecord>,
    status: EngineStatus,
}

impl Engine {
    /// Start building an engine seeded with `initial`
    pub fn builder(initial: StateRecord) -> EngineBuilder {
        EngineBuilder {
            initial,
            rules: Vec::new(),
            inputs: Vec::new(),
            config: EngineConfig::default(),
        }
    }

    /// Build an engine from rules alone, with default configuration
    pub fn new(initial: StateRecord, rules: impl IntoIterator<Item = RuleDef>) -> Result<Self> {
        Self::builder(initial).rules(rules).build()
    }

    pub(crate) fn assemble(
        rules: RuleTable,
        inputs: Inputs,
        initial: StateRecord,
        config: EngineConfig,
    ) -> Self {
        debug!(
            engine = %config.name,
            rules = rules.len(),
            inputs = inputs.len(),
            limit = %config.limit,
            "engine_built"
        );
        Self {
            history: History::with_limit(initial, config.limit),
            rules,
            inputs,
            config,
            exit_state: None,
            status: EngineStatus::Running,
        }
    }

    /// The compiled rule table
    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// The input mappings
    pub fn inputs(&self) -> &Inputs {
        &self.inputs
    }

    /// Read-only view of history
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Configuration the engine was built with
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Lifecycle status
    pub fn status(&self) -> EngineStatus {
        self.status
    }

    /// State frozen by `exit`, if the engine has exited
    pub fn exit_state(&self) -> Option<&StateRecord> {
        self.exit_state.as_ref()
    }

    /// Current tick
    pub fn tick(&self) -> Tick {
        self.history.tick()
    }

    /// Most recently committed state
    pub fn current_state(&self) -> &StateRecord {
        self.history.current_state()
    }

    fn ensure_initialized(&mut self) {
        if !self.history.is_initialized() {
            let startup = self
                .inputs
                .poll_seed(self.history.initial_state(), &self.history, ORIGIN_TICK);
            self.history.initialize(&startup);
        }
    }

    /// Run one evaluation pass, returning the number of rules that fired
    pub fn step(&mut self) -> Result<usize> {
        self.step_report().map(|report| report.fired)
    }

    /// Run one evaluation pass, returning a full report
    ///
    /// In `Finite` mode a pass where no rule fires leaves the engine
    /// `Halted`; any firing pass returns it to `Running`.
    pub fn step_report(&mut self) -> Result<TickReport> {
        self.evaluate(self.config.mode)
    }

    fn evaluate(&mut self, mode: RunMode) -> Result<TickReport> {
        if self.status == EngineStatus::Exited {
            return Err(Error::Exited);
        }
        self.ensure_initialized();

        let tick = self.history.tick();
        let snapshot = self.history.current_state().clone();
        let mut report = TickReport::new(tick);
        let mut exit_request = None;
        debug!(engine = %self.config.name, tick, "tick_start");

        for (index, rule) in self.rules.ordered() {
            let outcome = {
                let ctx = RuleContext {
                    state: &snapshot,
                    next: self.history.next_state(),
                    tick,
                };
                if !self.rules.fires(index, &ctx) {
                    continue;
                }
                report.fired += 1;
                report.fired_rules.push(rule.label().to_string());
                rule.act(&ctx)
            };

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(fault) => {
                    self.history.discard_pending();
                    warn!(engine = %self.config.name, rule = rule.label(), tick, %fault, "rule_fault");
                    return Err(retick_core::Error::RuleFault {
                        rule: rule.label().to_string(),
                        fault,
                    }
                    .into());
                }
            };

            match outcome {
                Outcome::Idle => {}
                Outcome::Update(updates) => {
                    let inputs = &self.inputs;
                    let written =
                        self.history
                            .write(rule.name(), updates, |field| inputs.is_input(field));
                    report.writes += written.applied;
                    report.dropped.extend(written.dropped);
                }
                Outcome::Rewind {
                    tick: target,
                    mutate,
                } => {
                    let landed = self.history.rewind(target, mutate);
                    info!(
                        engine = %self.config.name,
                        rule = rule.label(),
                        tick,
                        requested = target,
                        landed,
                        "tick_rewound"
                    );
                    report.end = TickEnd::Rewound { to: landed };
                    return Ok(report);
                }
                Outcome::Exit(explicit) => {
                    exit_request = Some(explicit);
                    break;
                }
            }
        }

        if let Some(explicit) = exit_request {
            self.freeze_exit(&snapshot, explicit.as_ref());
        }

        let polled = self
            .inputs
            .poll(self.history.next_state(), &self.history, tick + 1);
        let committed = self.history.advance(&polled);

        report.end = if self.status == EngineStatus::Exited {
            TickEnd::Exited { tick: committed }
        } else {
            if report.fired > 0 {
                self.status = EngineStatus::Running;
            } else if mode == RunMode::Finite {
                self.status = EngineStatus::Halted;
            }
            TickEnd::Committed { tick: committed }
        };

        debug!(
            engine = %self.config.name,
            tick = committed,
            fired = report.fired,
            writes = report.writes,
            dropped = report.dropped.len(),
            "tick_committed"
        );
        Ok(report)
    }

    /// Step until halted or exited, using the configured run mode
    pub fn run(&mut self) -> Result<StateRecord> {
        self.run_with(self.config.mode)
    }

    /// Step until halted or exited
    ///
    /// In `Finite` mode the loop stops at the first tick where no rule fires
    /// (status becomes `Halted`). In `Forever` mode it stops only on exit.
    /// Returns the exit state if the engine exited (including before the
    /// call), else the last committed state.
    pub fn run_with(&mut self, mode: RunMode) -> Result<StateRecord> {
        if let Some(state) = &self.exit_state {
            debug!(engine = %self.config.name, tick = self.tick(), "run_after_exit");
            return Ok(state.clone());
        }

        info!(engine = %self.config.name, ?mode, tick = self.tick(), "run_start");
        loop {
            let fired = self.evaluate(mode)?.fired;

            if let Some(state) = &self.exit_state {
                info!(engine = %self.config.name, tick = self.tick(), "run_complete_exited");
                return Ok(state.clone());
            }

            if mode == RunMode::Finite && fired == 0 {
                info!(engine = %self.config.name, tick = self.tick(), "run_complete_halted");
                return Ok(self.history.current_state().clone());
            }
        }
    }

    /// Exit with the current state, or `explicit` merged over it
    ///
    /// Only the first call has any effect. Before the first step the seed
    /// record is committed first, so startup inputs are part of the state.
    pub fn exit(&mut self, explicit: Option<ValueMap>) {
        self.ensure_initialized();
        let snapshot = self.history.current_state().clone();
        self.freeze_exit(&snapshot, explicit.as_ref());
    }

    fn freeze_exit(&mut self, snapshot: &StateRecord, explicit: Option<&ValueMap>) {
        if self.exit_state.is_some() {
            return;
        }
        let state = match explicit {
            Some(fields) => snapshot.merged(fields),
            None => snapshot.clone(),
        };
        info!(engine = %self.config.name, tick = self.tick(), "engine_exited");
        self.exit_state = Some(state);
        self.status = EngineStatus::Exited;
    }

    /// Clear the exit marker and return history to the origin
    ///
    /// Optionally replaces the seed state. Startup inputs are polled again
    /// on the next step.
    pub fn reset(&mut self, initial: Option<StateRecord>) {
        self.exit_state = None;
        self.status = EngineStatus::Running;
        self.history.reset(initial);
        info!(engine = %self.config.name, "engine_reset");
    }

    /// Rewind history from the host, returning the tick landed on
    pub fn rewind(&mut self, target: Tick, mutate: Option<ValueMap>) -> Tick {
        self.ensure_initialized();
        self.history.rewind(target, mutate)
    }

    /// Rewind history to the oldest retained record
    pub fn clear(&mut self) {
        self.ensure_initialized();
        self.history.clear();
    }

    /// History retention limit
    pub fn limit(&self) -> Limit {
        self.history.limit()
    }

    /// Change the retention limit, trimming immediately
    pub fn set_limit(&mut self, limit: impl Into<Limit>) {
        self.history.set_limit(limit);
        self.config.limit = self.history.limit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retick_core::{fields, RuleFault, Value};
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    fn int(state: &StateRecord, field: &str) -> i64 {
        state.int(field).unwrap_or(0)
    }

    fn counter_below(max: i64) -> RuleDef {
        RuleDef::new(
            move |ctx| int(ctx.state, "counter") < max,
            |ctx| Ok(Outcome::set("counter", int(ctx.state, "counter") + 1)),
        )
        .named("count")
    }

    #[test]
    fn test_first_step_initializes_history() {
        let mut engine = Engine::new(StateRecord::new().with("counter", 0i64), [counter_below(5)])
            .unwrap();
        assert_eq!(engine.tick(), 0);

        assert_eq!(engine.step().unwrap(), 1);
        assert_eq!(engine.tick(), 2);
        assert_eq!(engine.history().len(), 2);
        assert_eq!(int(engine.current_state(), "counter"), 1);
    }

    #[test]
    fn test_snapshot_fixed_during_tick() {
        // Both rules read counter=0 even though the first already wrote 1
        let mut engine = Engine::new(
            StateRecord::new().with("counter", 0i64),
            [
                RuleDef::new(|_| true, |ctx| Ok(Outcome::set("counter", int(ctx.state, "counter") + 1)))
                    .priority(2),
                RuleDef::new(
                    |_| true,
                    |ctx| {
                        assert_eq!(int(ctx.next, "counter"), 1);
                        Ok(Outcome::set("seen", int(ctx.state, "counter")))
                    },
                ),
            ],
        )
        .unwrap();

        engine.step().unwrap();
        assert_eq!(int(engine.current_state(), "counter"), 1);
        assert_eq!(int(engine.current_state(), "seen"), 0);
    }

    #[test]
    fn test_later_rule_wins_write_conflict() {
        let mut engine = Engine::new(
            StateRecord::new(),
            [
                RuleDef::new(|_| true, |_| Ok(Outcome::set("x", "low"))).priority(1),
                RuleDef::new(|_| true, |_| Ok(Outcome::set("x", "high"))).priority(5),
            ],
        )
        .unwrap();

        let report = engine.step_report().unwrap();
        assert_eq!(report.fired_rules, vec!["#1", "#0"]);
        assert_eq!(engine.current_state()["x"], Value::from("low"));
    }

    #[test]
    fn test_inhibited_rule_does_not_fire() {
        let mut engine = Engine::new(
            StateRecord::new().with("locked", true),
            [
                RuleDef::new(|ctx| ctx.state["locked"].is_truthy(), |_| Ok(Outcome::Idle))
                    .named("lock"),
                RuleDef::new(|_| true, |_| Ok(Outcome::set("x", 1i64))).inhibited_by("lock"),
            ],
        )
        .unwrap();

        assert_eq!(engine.step().unwrap(), 1);
        assert!(engine.current_state().get("x").is_none());
    }

    #[test]
    fn test_unresolved_inhibitor_is_registration_error() {
        let err = Engine::new(
            StateRecord::new(),
            [RuleDef::new(|_| true, |_| Ok(Outcome::Idle)).inhibited_by("nobody")],
        )
        .err()
        .unwrap();
        assert!(err.is_registration());
    }

    #[test]
    fn test_input_fields_not_writable() {
        let mut engine = Engine::builder(StateRecord::new())
            .rule(RuleDef::new(
                |_| true,
                |_| Ok(Outcome::update([("sensor", 0i64), ("y", 1i64)])),
            ))
            .input(InputMapping::always("sensor", || Value::Int(42)))
            .build()
            .unwrap();

        let report = engine.step_report().unwrap();
        assert_eq!(report.writes, 1);
        assert_eq!(report.dropped, vec!["sensor".to_string()]);
        assert_eq!(int(engine.current_state(), "sensor"), 42);
        assert_eq!(int(engine.current_state(), "y"), 1);
    }

    #[test]
    fn test_input_policies_across_ticks() {
        let polls = Arc::new(AtomicI64::new(0));
        let once_polls = polls.clone();
        let always = Arc::new(AtomicI64::new(100));
        let always_source = always.clone();

        let mut engine = Engine::builder(StateRecord::new())
            .rule(RuleDef::new(|_| true, |_| Ok(Outcome::Idle)))
            .input(InputMapping::once("boot", move || {
                Value::Int(once_polls.fetch_add(1, Ordering::SeqCst))
            }))
            .input(InputMapping::always("clock", move || {
                Value::Int(always_source.fetch_add(1, Ordering::SeqCst))
            }))
            .input(
                InputMapping::when("sampled", |ctx| ctx.tick % 2 == 0, || Value::Int(7))
                    .with_transform(|v| Value::Int(v.as_int().unwrap_or(0) * 10)),
            )
            .build()
            .unwrap();

        engine.step().unwrap();
        assert_eq!(engine.tick(), 2);
        assert_eq!(int(engine.current_state(), "boot"), 0);
        assert_eq!(int(engine.current_state(), "clock"), 101);
        assert_eq!(int(engine.current_state(), "sampled"), 70);

        engine.step().unwrap();
        assert_eq!(int(engine.current_state(), "boot"), 0);
        assert_eq!(int(engine.current_state(), "clock"), 102);
        assert_eq!(polls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exit_from_rule_freezes_snapshot() {
        let mut engine = Engine::new(
            StateRecord::new().with("counter", 0i64),
            [
                RuleDef::new(
                    |ctx| int(ctx.state, "counter") >= 2,
                    |_| Ok(Outcome::exit()),
                )
                .priority(10),
                RuleDef::new(|_| true, |ctx| Ok(Outcome::set("counter", int(ctx.state, "counter") + 1))),
            ],
        )
        .unwrap();

        let result = engine.run_with(RunMode::Forever).unwrap();
        assert_eq!(int(&result, "counter"), 2);
        assert_eq!(engine.status(), EngineStatus::Exited);
        // Exit stops the pass before the increment, but the buffer still commits
        assert_eq!(int(engine.current_state(), "counter"), 2);
        assert!(matches!(engine.step(), Err(Error::Exited)));
    }

    #[test]
    fn test_exit_is_sticky_and_merges_explicit_state() {
        let mut engine = Engine::new(StateRecord::new().with("a", 1i64), [counter_below(0)]).unwrap();
        engine.exit(Some(fields([("b", 2i64)])));
        engine.exit(Some(fields([("b", 3i64)])));

        let exit = engine.exit_state().unwrap();
        assert_eq!(int(exit, "a"), 1);
        assert_eq!(int(exit, "b"), 2);
    }

    #[test]
    fn test_reset_restarts_from_origin() {
        let mut engine = Engine::new(StateRecord::new().with("counter", 0i64), [counter_below(3)])
            .unwrap();
        engine.run().unwrap();
        engine.exit(None);

        engine.reset(Some(StateRecord::new().with("counter", 1i64)));
        assert_eq!(engine.status(), EngineStatus::Running);
        assert!(engine.exit_state().is_none());
        assert_eq!(engine.tick(), 0);

        let state = engine.run().unwrap();
        assert_eq!(int(&state, "counter"), 3);
        assert_eq!(engine.history().records().next().map(|r| int(r, "counter")), Some(1));
    }

    #[test]
    fn test_finite_run_halts_without_exit() {
        let mut engine = Engine::new(StateRecord::new().with("counter", 0i64), [counter_below(3)])
            .unwrap();
        let state = engine.run().unwrap();

        assert_eq!(int(&state, "counter"), 3);
        assert_eq!(engine.status(), EngineStatus::Halted);
        assert!(engine.exit_state().is_none());
        // Three increments plus the quiet tick
        assert_eq!(engine.tick(), 5);
    }

    #[test]
    fn test_rewind_from_rule_aborts_pass() {
        let mut engine = Engine::new(
            StateRecord::new().with("counter", 0i64).with("rewound", false),
            [
                RuleDef::new(
                    |ctx| int(ctx.state, "counter") == 2 && !ctx.state["rewound"].is_truthy(),
                    |_| Ok(Outcome::rewind_with(2, fields([("rewound", true)]))),
                )
                .priority(5),
                RuleDef::new(|_| true, |_| Ok(Outcome::set("marker", 1i64))).priority(10),
                RuleDef::new(|_| true, |ctx| Ok(Outcome::set("counter", int(ctx.state, "counter") + 1))),
            ],
        )
        .unwrap();

        engine.step().unwrap();
        engine.step().unwrap();
        assert_eq!(engine.tick(), 3);

        let report = engine.step_report().unwrap();
        assert_eq!(report.end, TickEnd::Rewound { to: 2 });
        assert_eq!(report.fired, 2);
        assert_eq!(engine.tick(), 2);
        assert_eq!(int(engine.current_state(), "counter"), 1);
        assert_eq!(engine.current_state()["rewound"], Value::Bool(true));
        assert!(engine.history().pending_writes().is_empty());
        assert!(engine.history().record_at(3).is_none());
    }

    #[test]
    fn test_rule_fault_propagates() {
        let mut engine = Engine::new(
            StateRecord::new(),
            [
                RuleDef::new(|_| true, |_| Ok(Outcome::set("x", 1i64))).priority(1),
                RuleDef::new(|_| true, |_| Err(RuleFault::new("boom"))).named("faulty"),
            ],
        )
        .unwrap();

        let err = engine.step().unwrap_err();
        assert_eq!(err.to_string(), "core error: rule faulty failed: boom");
        assert_eq!(engine.tick(), 1);
        assert!(engine.history().pending_writes().is_empty());
        assert!(engine.history().next_state().get("x").is_none());
    }

    #[test]
    fn test_host_rewind_initializes_first() {
        let mut engine = Engine::new(StateRecord::new().with("counter", 0i64), [counter_below(3)])
            .unwrap();
        let landed = engine.rewind(0, Some(fields([("counter", 2i64)])));

        assert_eq!(landed, ORIGIN_TICK);
        assert_eq!(engine.run().unwrap().int("counter"), Some(3));
    }

    #[test]
    fn test_set_limit_updates_config() {
        let mut engine = Engine::new(StateRecord::new().with("counter", 0i64), [counter_below(10)])
            .unwrap();
        engine.run().unwrap();
        engine.set_limit(0usize);

        assert_eq!(engine.limit(), Limit::Bounded(1));
        assert_eq!(engine.config().limit, Limit::Bounded(1));
        assert_eq!(engine.history().len(), 1);
    }

    #[test]
    fn test_quiet_step_halts_in_finite_mode() {
        let mut engine = Engine::new(StateRecord::new().with("counter", 5i64), [counter_below(5)])
            .unwrap();

        assert_eq!(engine.step().unwrap(), 0);
        assert_eq!(engine.status(), EngineStatus::Halted);
        assert!(engine.exit_state().is_none());

        // Halted still accepts steps; a firing pass resumes
        engine.rewind(engine.tick(), Some(fields([("counter", 0i64)])));
        assert_eq!(engine.step().unwrap(), 1);
        assert_eq!(engine.status(), EngineStatus::Running);
    }

    #[test]
    fn test_quiet_step_keeps_running_in_forever_mode() {
        let mut engine = Engine::builder(StateRecord::new().with("counter", 5i64))
            .rule(counter_below(5))
            .config(EngineConfig::named("spin").with_mode(RunMode::Forever))
            .build()
            .unwrap();

        assert_eq!(engine.step().unwrap(), 0);
        assert_eq!(engine.status(), EngineStatus::Running);
    }

    #[test]
    fn test_run_after_host_exit_returns_exit_state() {
        let mut engine = Engine::new(StateRecord::new().with("a", 1i64), [counter_below(3)])
            .unwrap();
        engine.exit(Some(fields([("b", 2i64)])));

        let state = engine.run().unwrap();
        assert_eq!(int(&state, "a"), 1);
        assert_eq!(int(&state, "b"), 2);
        assert_eq!(engine.run_with(RunMode::Forever).unwrap(), state);
        assert!(matches!(engine.step(), Err(Error::Exited)));
    }

    #[test]
    fn test_exit_before_first_step_includes_startup_inputs() {
        let mut engine = Engine::builder(StateRecord::new().with("a", 1i64))
            .rule(counter_below(3))
            .input(InputMapping::once("boot", || Value::from("ready")))
            .input(InputMapping::always("clock", || Value::Int(9)))
            .build()
            .unwrap();
        engine.exit(None);

        let exit = engine.exit_state().unwrap();
        assert_eq!(exit["boot"], Value::from("ready"));
        assert_eq!(int(exit, "clock"), 9);
        assert_eq!(engine.tick(), ORIGIN_TICK);
    }

    #[test]
    fn test_poll_predicate_reads_history() {
        let mut engine = Engine::builder(StateRecord::new().with("counter", 0i64))
            .rule(counter_below(10))
            .input(InputMapping::when(
                "warm",
                |ctx| ctx.history.len() >= 3,
                || Value::Bool(true),
            ))
            .build()
            .unwrap();

        engine.step().unwrap();
        engine.step().unwrap();
        assert!(engine.current_state().get("warm").is_none());

        engine.step().unwrap();
        assert_eq!(engine.current_state().bool("warm"), Some(true));
    }
}
