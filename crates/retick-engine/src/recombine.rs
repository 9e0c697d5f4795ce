//! Recombination: building a new engine from two parents
//!
//! The child concatenates the parents' rule tables (this engine's rules
//! first), takes the union of their inputs and starts with fresh history.
//! On field collisions the parent chosen by [`Precedence`] wins, both for
//! input mappings and for the derived seed state. Neither parent is
//! modified.

use crate::engine::Engine;
use retick_core::{Inputs, StateRecord};
use std::fmt;
use tracing::info;

/// Which parent wins field collisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precedence {
    /// The engine `recombine` is called on
    #[default]
    This,
    /// The engine passed as argument
    Other,
}

/// Custom seed function: `(this, other, precedence) -> seed`
pub type SeedFn = Box<dyn FnOnce(&Engine, &Engine, Precedence) -> StateRecord>;

/// How the child's seed state is chosen
#[derive(Default)]
pub enum Seed {
    /// Use this record as is
    Literal(StateRecord),
    /// Compute the seed from both parents
    Combine(SeedFn),
    /// Merge the parents' current states
    Current,
    /// Merge the parents' initial states
    #[default]
    Initial,
}

impl Seed {
    /// Build a `Combine` seed from a closure
    pub fn combine<F>(f: F) -> Self
    where
        F: FnOnce(&Engine, &Engine, Precedence) -> StateRecord + 'static,
    {
        Seed::Combine(Box::new(f))
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seed::Literal(record) => f.debug_tuple("Literal").field(record).finish(),
            Seed::Combine(_) => write!(f, "Combine(<fn>)"),
            Seed::Current => write!(f, "Current"),
            Seed::Initial => write!(f, "Initial"),
        }
    }
}

impl Engine {
    /// Build a new engine from this one and `other`
    ///
    /// The child inherits this engine's configuration and starts
    /// uninitialized, so `Once` inputs are polled again on its first step.
    pub fn recombine(&self, other: &Engine, precedence: Precedence, seed: Seed) -> Engine {
        let (preferred, secondary) = match precedence {
            Precedence::This => (self, other),
            Precedence::Other => (other, self),
        };

        let initial = match seed {
            Seed::Literal(record) => record,
            Seed::Combine(f) => f(self, other, precedence),
            Seed::Current => secondary
                .current_state()
                .merged(preferred.current_state().fields()),
            Seed::Initial => secondary
                .history()
                .initial_state()
                .merged(preferred.history().initial_state().fields()),
        };

        let rules = self.rules().concat(other.rules());
        let inputs = Inputs::union(preferred.inputs(), secondary.inputs());

        info!(
            engine = %self.config().name,
            other = %other.config().name,
            ?precedence,
            rules = rules.len(),
            inputs = inputs.len(),
            "engine_recombined"
        );
        Engine::assemble(rules, inputs, initial, self.config().clone())
    }
}
