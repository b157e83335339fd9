//! Engine configuration types
//!
//! Settings shared by every model a scheduler drives. Block parameters live
//! in the deployment descriptors, not here.

use serde::{Deserialize, Serialize};

/// Configuration for the evaluation scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Correlation token stamped on outputs and outbound signals
    #[serde(default)]
    pub correlation_id: String,

    /// Reject input names no block of the model declares (default: ignore them)
    #[serde(default)]
    pub strict_inputs: bool,

    /// How many rounds of receiver-to-receiver signal fan-out are followed
    /// (default: 8)
    #[serde(default = "default_max_signal_depth")]
    pub max_signal_depth: usize,
}

fn default_max_signal_depth() -> usize {
    8
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            correlation_id: String::new(),
            strict_inputs: false,
            max_signal_depth: default_max_signal_depth(),
        }
    }
}

impl EngineConfig {
    /// Create a new engine configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the correlation token
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Builder method: reject undeclared input names
    pub fn with_strict_inputs(mut self, strict: bool) -> Self {
        self.strict_inputs = strict;
        self
    }

    /// Builder method: bound signal fan-out rounds
    pub fn with_max_signal_depth(mut self, depth: usize) -> Self {
        self.max_signal_depth = depth;
        self
    }
}
