//! Exhaustive state-space exploration.
//!
//! Depth-first traversal of every state reachable from a compiled graph's
//! initial configuration, producing the graph's complete trace language. The
//! traversal uses an explicit work-list (never native recursion) and a
//! visited set shared across the whole search, which is what keeps
//! Condition/Response cycles from causing infinite descent: the packed state
//! space is finite, so pruning previously-seen states guarantees
//! termination.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::codec::PackedState;
use crate::compiled::CompiledGraph;
use crate::config::SearchConfig;

/// A single trace: the activity indices fired along one maximal run.
pub type Trace = Vec<u32>;

/// The complete trace language of a graph.
#[derive(Debug, Clone, Default)]
pub struct TraceLanguage {
    /// Traces ending in an accepting configuration.
    pub final_traces: HashSet<Trace>,
    /// Traces that reached a previously explored state via an alternate
    /// route. Observable in their own right: two graphs can be
    /// state-space-similar but trace-set-different.
    pub early_traces: HashSet<Trace>,
    /// Every packed state visited during the search.
    pub visited: HashSet<PackedState>,
}

impl TraceLanguage {
    /// Whether an activity index occurs in any final or early trace.
    pub fn mentions(&self, index: u32) -> bool {
        self.final_traces
            .iter()
            .chain(self.early_traces.iter())
            .any(|trace| trace.contains(&index))
    }

    /// Number of distinct states visited.
    pub fn state_count(&self) -> usize {
        self.visited.len()
    }
}

/// Result of an exploration run.
#[derive(Debug, Clone)]
pub enum ExploreOutcome {
    /// The whole reachable state space was enumerated.
    Complete(TraceLanguage),
    /// The state budget ran out; the partial language is unusable and is
    /// not returned. Never to be confused with a completed result.
    BudgetExceeded {
        /// States visited before giving up.
        states_explored: usize,
    },
}

impl ExploreOutcome {
    /// The language, if exploration completed.
    pub fn language(self) -> Option<TraceLanguage> {
        match self {
            ExploreOutcome::Complete(language) => Some(language),
            ExploreOutcome::BudgetExceeded { .. } => None,
        }
    }
}

/// Depth-first, memoized state-space explorer.
pub struct Explorer<'a> {
    graph: &'a CompiledGraph,
    config: SearchConfig,
}

impl<'a> Explorer<'a> {
    /// Create an explorer over a compiled graph.
    pub fn new(graph: &'a CompiledGraph, config: SearchConfig) -> Self {
        Self { graph, config }
    }

    /// Enumerate the complete trace language from the initial state.
    ///
    /// At every transition the successor is classified: accepting states
    /// record the path as a final trace, unseen states are pushed for
    /// further expansion, and previously-seen states record the path as an
    /// early-termination trace.
    pub fn explore(&self) -> ExploreOutcome {
        let initial = self.graph.initial_state();
        debug!(
            activities = self.graph.activity_count(),
            budget = self.config.max_states,
            "explore_start"
        );

        let mut language = TraceLanguage::default();
        language.visited.insert(initial.clone());

        if initial.is_final() {
            // The empty run is itself a maximal trace when nothing is
            // runnable, and a prefix of every other accepting run
            // otherwise; record it only in the former case.
            if initial.runnable_indices().next().is_none() {
                language.final_traces.insert(Vec::new());
            }
        }

        let mut stack: Vec<(PackedState, Trace)> = vec![(initial, Vec::new())];

        while let Some((state, path)) = stack.pop() {
            for i in state.runnable_indices().collect::<Vec<_>>() {
                let next = self.graph.fire(&state, i);
                let mut next_path = path.clone();
                next_path.push(i as u32);

                if next.is_final() {
                    language.final_traces.insert(next_path.clone());
                }

                if language.visited.contains(&next) {
                    language.early_traces.insert(next_path);
                } else {
                    if language.visited.len() >= self.config.max_states {
                        info!(
                            states_explored = language.visited.len(),
                            "explore_budget_exceeded"
                        );
                        return ExploreOutcome::BudgetExceeded {
                            states_explored: language.visited.len(),
                        };
                    }
                    language.visited.insert(next.clone());
                    stack.push((next, next_path));
                }
            }
        }

        info!(
            states = language.visited.len(),
            final_traces = language.final_traces.len(),
            early_traces = language.early_traces.len(),
            "explore_complete"
        );
        ExploreOutcome::Complete(language)
    }
}

/// Map a trace of activity indices back to ids for display.
pub fn trace_ids(graph: &CompiledGraph, trace: &[u32]) -> Vec<String> {
    trace
        .iter()
        .map(|&i| graph.id(i as usize).to_string())
        .collect()
}
