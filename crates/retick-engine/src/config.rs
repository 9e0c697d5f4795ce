//! Engine configuration
//!
//! Settings an engine is built with: a name carried in log fields, the
//! history retention limit, and the default run mode. Configurations can be
//! written in RON:
//!
//! ```text
//! (name: "primes", limit: Bounded(16), mode: Finite)
//! ```

use crate::error::Result;
use retick_core::Limit;
use serde::{Deserialize, Serialize};

/// How `Engine::run` decides to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RunMode {
    /// Stop at the first tick where no rule fires, or on exit
    #[default]
    Finite,
    /// Stop only on exit; the host must guarantee one happens
    Forever,
}

/// Configuration for an engine instance
///
/// # Example
///
/// ```
/// use retick_core::Limit;
/// use retick_engine::{EngineConfig, RunMode};
///
/// let config = EngineConfig::from_ron("(limit: Bounded(0), mode: Forever)").unwrap();
/// assert_eq!(config.limit, Limit::Bounded(1));
/// assert_eq!(config.mode, RunMode::Forever);
/// assert_eq!(config.name, "engine");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name carried in log fields
    pub name: String,
    /// History retention limit
    pub limit: Limit,
    /// Mode used by `Engine::run`
    pub mode: RunMode,
}

impl EngineConfig {
    /// Create a default configuration with the given name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the retention limit (bounded limits below 1 become 1)
    pub fn with_limit(mut self, limit: impl Into<Limit>) -> Self {
        let limit: Limit = limit.into();
        self.limit = limit.normalized();
        self
    }

    /// Set the run mode
    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Parse a configuration from RON text
    pub fn from_ron(text: &str) -> Result<Self> {
        let mut config: EngineConfig = ron::from_str(text)?;
        config.limit = config.limit.normalized();
        Ok(config)
    }

    /// Render the configuration as RON text
    pub fn to_ron(&self) -> Result<String> {
        Ok(ron::to_string(self)?)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "engine".to_string(),
            limit: Limit::Unbounded,
            mode: RunMode::Finite,
        }
    }
}
