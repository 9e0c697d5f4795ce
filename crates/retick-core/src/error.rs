//! Error types for retick-core

use crate::RuleId;
use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// An inhibitor names a rule that is not in the table
    #[error("rule {rule} is inhibited by unknown rule '{target}'")]
    UnresolvedInhibitor { rule: String, target: RuleId },

    /// An inhibitor names a rule that appears more than once
    #[error("rule {rule} is inhibited by '{target}', which names {count} rules")]
    AmbiguousInhibitor {
        rule: String,
        target: RuleId,
        count: usize,
    },

    /// A rule action reported a fault
    #[error("rule {rule} failed: {fault}")]
    RuleFault {
        rule: String,
        #[source]
        fault: RuleFault,
    },
}

/// Failure raised by user rule code
///
/// Returned from an action to abort the current `step()`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct RuleFault(pub String);

impl RuleFault {
    /// Create a fault with a message
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
