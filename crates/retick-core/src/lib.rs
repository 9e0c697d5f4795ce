//! Retick Core - rule tables, state records and tick primitives
//!
//! This crate provides the building blocks of the retick rule engine:
//! - Dynamic values and state records (`Value`, `ValueMap`, `StateRecord`)
//! - Rule registration and compilation (`RuleDef`, `RuleTable`, `Outcome`)
//! - Externally polled input fields (`InputMapping`, `PollPolicy`, `Inputs`)
//! - The deferred next-state buffer (`NextState`, `WriteSet`)
//! - Tick numbering and retention limits (`Tick`, `Limit`)
//! - The `StateHistory` read trait
//!
//! The history manager lives in `retick-history` and the tick engine in
//! `retick-engine`; this crate knows about neither.

mod buffer;
mod error;
mod identity;
mod input;
mod record;
pub mod rule;
mod state_history;
pub mod time;
mod value;

pub use buffer::{NextState, PendingWrite, WriteOutcome, WriteSet};
pub use error::{Error, Result, RuleFault};
pub use identity::RuleId;
pub use input::{InputMapping, InputSource, Inputs, PollContext, PollPolicy};
pub use record::{fields, StateRecord};
pub use rule::{ActionResult, Inhibitor, Outcome, Rule, RuleContext, RuleDef, RuleTable};
pub use state_history::StateHistory;
pub use time::{Limit, Tick, ORIGIN_TICK};
pub use value::{Value, ValueMap};
