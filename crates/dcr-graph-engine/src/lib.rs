//! Execution and language-equivalence engine for DCR process graphs.
//!
//! This crate takes the structural model from `dcr-graph-core` and gives it
//! meaning: which activities may fire, what firing does, which runs accept,
//! and which relations are semantically dead weight.
//!
//! ## Core Concepts
//!
//! - **Runnable set**: activities eligible to execute in the current state
//! - **Packed state**: one byte per activity holding the four runtime flags,
//!   the unit of deduplication during search
//! - **Trace language**: every maximal run a graph can produce, enumerated
//!   exhaustively by the explorer
//! - **Equivalence oracle**: proves two graphs produce identical trace
//!   languages, short-circuiting on the first divergence
//! - **Minimizers**: the exhaustive one proves redundancy by re-exploration;
//!   the pattern one recognizes it structurally, faster but incomplete
//!
//! ## The Packed State
//!
//! ```text
//! byte per activity (id order):
//!     bit 0: Pending     bit 2: Executed
//!     bit 1: Included    bit 3: Runnable (cached)
//! ```
//!
//! The state space is finite (at most 2^(4·n) states), which together with
//! the global visited set makes exploration terminate even on
//! Condition/Response cycles.

mod codec;
mod compiled;
pub mod config;
mod error;
mod exhaustive;
mod explorer;
mod oracle;
mod patterns;
mod semantics;
pub mod test_fixtures;

pub use codec::{PackedState, EXECUTED_BIT, INCLUDED_BIT, PENDING_BIT, RUNNABLE_BIT};
pub use compiled::{ActivityUndo, AdjacencyMatrix, CompiledGraph};
pub use config::SearchConfig;
pub use error::{EngineError, EngineResult};
pub use exhaustive::{ExhaustiveMinimizer, Minimization};
pub use explorer::{trace_ids, ExploreOutcome, Explorer, Trace, TraceLanguage};
pub use oracle::{Difference, EquivalenceOracle, Verdict};
pub use patterns::{
    PatternMinimizer, PatternReport, PatternRuleKind, RelationView, RuleEffect,
};
pub use semantics::Semantics;

use dcr_graph_core::DcrGraph;

/// Compute the complete trace language of a graph.
///
/// Convenience entry point: compiles the graph at the config's threshold and
/// runs the explorer. Budget exhaustion is returned as data, never conflated
/// with a completed result.
pub fn compute_trace_language(
    graph: &DcrGraph,
    config: SearchConfig,
) -> EngineResult<ExploreOutcome> {
    let compiled = CompiledGraph::compile(graph, config.threshold)?;
    Ok(Explorer::new(&compiled, config).explore())
}
