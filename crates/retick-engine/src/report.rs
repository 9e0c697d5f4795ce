//! Per-tick reporting and engine status

use retick_core::Tick;
use serde::{Deserialize, Serialize};

/// Where an engine is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EngineStatus {
    /// Accepting steps
    #[default]
    Running,
    /// A finite run stopped because no rule fired
    Halted,
    /// `exit` was invoked; `reset` is required before stepping again
    Exited,
}

/// How a tick ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickEnd {
    /// The buffer was committed as `tick`
    Committed { tick: Tick },
    /// A rule rewound history; nothing was committed
    Rewound { to: Tick },
    /// A rule exited; the buffer was committed as `tick`
    Exited { tick: Tick },
}

/// Summary of one evaluation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    /// Tick whose state the rules were evaluated against
    pub tick: Tick,
    /// Number of rules whose condition held with no inhibitor holding
    pub fired: usize,
    /// Labels of the fired rules, in evaluation order
    pub fired_rules: Vec<String>,
    /// Field writes that reached the next-state buffer
    pub writes: usize,
    /// Input-mapped fields whose writes were dropped
    pub dropped: Vec<String>,
    /// How the pass ended
    pub end: TickEnd,
}

impl TickReport {
    pub(crate) fn new(tick: Tick) -> Self {
        Self {
            tick,
            fired: 0,
            fired_rules: Vec::new(),
            writes: 0,
            dropped: Vec::new(),
            end: TickEnd::Committed { tick: tick + 1 },
        }
    }

    /// Check whether the pass ended in a rewind
    pub fn rewound(&self) -> bool {
        matches!(self.end, TickEnd::Rewound { .. })
    }

    /// Check whether the pass ended in an exit
    pub fn exited(&self) -> bool {
        matches!(self.end, TickEnd::Exited { .. })
    }
}
