//! Retick Engine - deterministic tick-driven rule evaluation
//!
//! An [`Engine`] owns a compiled rule table, a set of input mappings and a
//! bounded, rewindable [`History`](retick_history::History). Each tick:
//!
//! 1. Rules are evaluated against the current committed record, highest
//!    priority first.
//! 2. Firing rules buffer their updates; the last writer of a field wins.
//! 3. Inputs are polled and the buffer is committed as the next record.
//!
//! A rule may instead rewind history (the pass is abandoned) or exit the
//! engine (the remaining rules are skipped, the buffer still commits).
//!
//! # Example
//!
//! ```
//! use retick_core::{Outcome, RuleDef, StateRecord};
//! use retick_engine::{Engine, EngineStatus};
//!
//! let mut engine = Engine::new(
//!     StateRecord::new().with("countdown", 3i64),
//!     [
//!         RuleDef::new(
//!             |ctx| ctx.state.int("countdown") == Some(0),
//!             |_| Ok(Outcome::exit()),
//!         )
//!         .named("liftoff")
//!         .priority(1),
//!         RuleDef::new(
//!             |_| true,
//!             |ctx| Ok(Outcome::set("countdown", ctx.state.int("countdown").unwrap_or(0) - 1)),
//!         )
//!         .inhibited_by("liftoff"),
//!     ],
//! )
//! .unwrap();
//!
//! let last = engine.run().unwrap();
//! assert_eq!(last.int("countdown"), Some(0));
//! assert_eq!(engine.status(), EngineStatus::Exited);
//! ```

mod config;
mod engine;
mod error;
mod recombine;
mod report;

pub use config::{EngineConfig, RunMode};
pub use engine::{Engine, EngineBuilder};
pub use error::{Error, Result};
pub use recombine::{Precedence, Seed, SeedFn};
pub use report::{EngineStatus, TickEnd, TickReport};
