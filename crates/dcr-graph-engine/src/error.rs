//! Error types for the execution and minimization engine.

use dcr_graph_core::{ActivityId, CoreError};
use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur during execution, exploration or minimization.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Execution was attempted on a graph that has not been sealed.
    #[error("graph {title:?} is not running; seal it before executing")]
    NotRunning { title: String },

    /// An activity referenced by id was not found in the graph.
    #[error("activity not found: {id}")]
    ActivityNotFound { id: ActivityId },

    /// The state-space budget ran out before exploration completed.
    ///
    /// Distinct from both "proved equivalent" and "proved different": the
    /// search is inconclusive and callers must treat it as such.
    #[error("state-space budget exhausted after {states_explored} states (budget {budget})")]
    BudgetExhausted {
        states_explored: usize,
        budget: usize,
    },

    /// A structural error from the core model (malformed ids, duplicate
    /// activities during flattening, sealed-graph mutation).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// State serialization/deserialization error.
    #[error("state serialization error: {0}")]
    StateSerialization(#[from] serde_json::Error),

    /// I/O error (file operations).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
