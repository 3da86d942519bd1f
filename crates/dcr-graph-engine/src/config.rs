//! Search and minimization configuration.

use serde::{Deserialize, Serialize};

/// Configuration shared by the explorer, the oracle and both minimizers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum number of distinct packed states to visit before the search
    /// is declared inconclusive.
    pub max_states: usize,

    /// Confidence threshold in `[0, 1]`: an edge is active iff its
    /// violation ratio strictly exceeds this value. Captured by value at
    /// compile time so a whole search observes one consistent threshold.
    pub threshold: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_states: 1 << 20,
            threshold: 0.0,
        }
    }
}

impl SearchConfig {
    /// A config for quick checks on small graphs.
    pub fn fast() -> Self {
        Self {
            max_states: 1 << 14,
            ..Default::default()
        }
    }

    /// A config for thorough exploration of larger graphs.
    pub fn thorough() -> Self {
        Self {
            max_states: 1 << 24,
            ..Default::default()
        }
    }

    /// Override the confidence threshold (builder pattern).
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Override the state budget (builder pattern).
    pub fn with_max_states(mut self, max_states: usize) -> Self {
        self.max_states = max_states.max(1);
        self
    }
}
