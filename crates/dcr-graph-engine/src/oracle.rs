//! Trace-language equivalence oracle.
//!
//! Re-explores a candidate graph against a previously computed reference
//! language and aborts on the first trace the reference does not contain.
//! Only traces are compared, never visited-state identity: two structurally
//! different graphs may produce the same language, so state-space shape is
//! not an equivalence criterion.
//!
//! The comparison is two-sided. Candidate traces must all be contained in
//! the reference AND the cardinalities of both trace sets must match, which
//! rules out a candidate accepting a strict subset or superset.

use std::collections::HashSet;

use tracing::debug;

use crate::codec::PackedState;
use crate::compiled::CompiledGraph;
use crate::config::SearchConfig;
use crate::explorer::{Trace, TraceLanguage};

/// How a candidate's language diverged from the reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Difference {
    /// The candidate accepted a trace the reference does not.
    ForeignFinalTrace(Trace),
    /// The candidate reached an already-seen state via a path the reference
    /// never produced.
    ForeignEarlyTrace(Trace),
    /// Final-trace cardinalities differ (candidate is a strict subset).
    FinalTraceCount { reference: usize, candidate: usize },
    /// Early-termination-trace cardinalities differ.
    EarlyTraceCount { reference: usize, candidate: usize },
}

/// Verdict of an equivalence check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The candidate's trace language equals the reference.
    Equivalent,
    /// Proof of inequivalence, with the first divergence found.
    Different(Difference),
    /// The state budget ran out mid-comparison. Must never be treated as
    /// either of the other two verdicts.
    Inconclusive {
        /// States visited before giving up.
        states_explored: usize,
    },
}

impl Verdict {
    /// Whether the verdict proves equivalence.
    pub fn is_equivalent(&self) -> bool {
        matches!(self, Verdict::Equivalent)
    }
}

/// Compares candidate graphs against a fixed reference trace language.
pub struct EquivalenceOracle<'a> {
    reference: &'a TraceLanguage,
    config: SearchConfig,
}

impl<'a> EquivalenceOracle<'a> {
    /// Create an oracle for the given reference language.
    pub fn new(reference: &'a TraceLanguage, config: SearchConfig) -> Self {
        Self { reference, config }
    }

    /// Explore the candidate, short-circuiting on the first divergence.
    pub fn compare(&self, candidate: &CompiledGraph) -> Verdict {
        let initial = candidate.initial_state();

        let mut final_traces: HashSet<Trace> = HashSet::new();
        let mut early_traces: HashSet<Trace> = HashSet::new();
        let mut visited: HashSet<PackedState> = HashSet::new();
        visited.insert(initial.clone());

        if initial.is_final() && initial.runnable_indices().next().is_none() {
            let empty: Trace = Vec::new();
            if !self.reference.final_traces.contains(&empty) {
                return Verdict::Different(Difference::ForeignFinalTrace(empty));
            }
            final_traces.insert(empty);
        }

        let mut stack: Vec<(PackedState, Trace)> = vec![(initial, Vec::new())];

        while let Some((state, path)) = stack.pop() {
            for i in state.runnable_indices().collect::<Vec<_>>() {
                let next = candidate.fire(&state, i);
                let mut next_path = path.clone();
                next_path.push(i as u32);

                if next.is_final() {
                    if !self.reference.final_traces.contains(&next_path) {
                        debug!(len = next_path.len(), "oracle_foreign_final_trace");
                        return Verdict::Different(Difference::ForeignFinalTrace(next_path));
                    }
                    final_traces.insert(next_path.clone());
                }

                if visited.contains(&next) {
                    if !self.reference.early_traces.contains(&next_path) {
                        debug!(len = next_path.len(), "oracle_foreign_early_trace");
                        return Verdict::Different(Difference::ForeignEarlyTrace(next_path));
                    }
                    early_traces.insert(next_path);
                } else {
                    if visited.len() >= self.config.max_states {
                        return Verdict::Inconclusive {
                            states_explored: visited.len(),
                        };
                    }
                    visited.insert(next.clone());
                    stack.push((next, next_path));
                }
            }
        }

        if final_traces.len() != self.reference.final_traces.len() {
            return Verdict::Different(Difference::FinalTraceCount {
                reference: self.reference.final_traces.len(),
                candidate: final_traces.len(),
            });
        }
        if early_traces.len() != self.reference.early_traces.len() {
            return Verdict::Different(Difference::EarlyTraceCount {
                reference: self.reference.early_traces.len(),
                candidate: early_traces.len(),
            });
        }

        Verdict::Equivalent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explorer::{ExploreOutcome, Explorer};
    use dcr_graph_core::{DcrGraph, GraphBuilder, RelationKind};

    fn language_of(graph: &DcrGraph) -> TraceLanguage {
        let compiled = CompiledGraph::compile(graph, 0.0).unwrap();
        match Explorer::new(&compiled, SearchConfig::default()).explore() {
            ExploreOutcome::Complete(language) => language,
            ExploreOutcome::BudgetExceeded { .. } => panic!("budget exceeded"),
        }
    }

    fn chain() -> DcrGraph {
        GraphBuilder::new("chain")
            .activity("A")
            .excluded_activity("B")
            .excluded_activity("C")
            .include("A", "B")
            .include("B", "C")
            .once("A")
            .once("B")
            .once("C")
            .build()
            .unwrap()
    }

    #[test]
    fn test_graph_is_equivalent_to_itself() {
        let graph = chain();
        let reference = language_of(&graph);
        let candidate = CompiledGraph::compile(&graph, 0.0).unwrap();

        let oracle = EquivalenceOracle::new(&reference, SearchConfig::default());
        assert_eq!(oracle.compare(&candidate), Verdict::Equivalent);
    }

    #[test]
    fn test_removing_live_edge_shrinks_language() {
        let graph = chain();
        let reference = language_of(&graph);

        // Without A->B's include, B and C never fire. The lone [A] trace is
        // still in the reference (the chain may stop after A), so this
        // shows up as a cardinality mismatch.
        let mut pruned = graph.clone();
        let a = dcr_graph_core::ActivityId::new("A").unwrap();
        let b = dcr_graph_core::ActivityId::new("B").unwrap();
        pruned.remove_relation(RelationKind::Include, &a, &b).unwrap();

        let candidate = CompiledGraph::compile(&pruned, 0.0).unwrap();
        let oracle = EquivalenceOracle::new(&reference, SearchConfig::default());
        assert_eq!(
            oracle.compare(&candidate),
            Verdict::Different(Difference::FinalTraceCount {
                reference: 3,
                candidate: 1
            })
        );
    }

    #[test]
    fn test_superset_language_aborts_on_foreign_trace() {
        // Reference forbids y-first orders; the unconstrained candidate
        // accepts them, and the first y-first accepting trace aborts the
        // comparison immediately.
        let restricted = GraphBuilder::new("restricted")
            .activity("x")
            .activity("y")
            .once("x")
            .once("y")
            .condition("x", "y")
            .build()
            .unwrap();
        let reference = language_of(&restricted);

        let free = GraphBuilder::new("free")
            .activity("x")
            .activity("y")
            .once("x")
            .once("y")
            .build()
            .unwrap();
        let candidate = CompiledGraph::compile(&free, 0.0).unwrap();

        let oracle = EquivalenceOracle::new(&reference, SearchConfig::default());
        assert!(matches!(
            oracle.compare(&candidate),
            Verdict::Different(Difference::ForeignFinalTrace(_))
        ));
    }

    #[test]
    fn test_subset_language_is_detected() {
        // x and y independent: four accepting traces. A condition x-->*y
        // removes the y-first orders but every remaining trace is still in
        // the reference, so the count comparison must catch it.
        let free = GraphBuilder::new("free")
            .activity("x")
            .activity("y")
            .once("x")
            .once("y")
            .build()
            .unwrap();
        let reference = language_of(&free);

        let restricted = GraphBuilder::new("restricted")
            .activity("x")
            .activity("y")
            .once("x")
            .once("y")
            .condition("x", "y")
            .build()
            .unwrap();
        let candidate = CompiledGraph::compile(&restricted, 0.0).unwrap();

        let oracle = EquivalenceOracle::new(&reference, SearchConfig::default());
        let verdict = oracle.compare(&candidate);
        assert!(
            matches!(
                verdict,
                Verdict::Different(
                    Difference::FinalTraceCount { .. } | Difference::EarlyTraceCount { .. }
                )
            ),
            "got {verdict:?}"
        );
    }

    #[test]
    fn test_redundant_edge_removal_is_equivalent() {
        // B is only ever included after A has executed, so the condition
        // A-->*B can never block anything.
        let graph = GraphBuilder::new("redundant")
            .activity("A")
            .excluded_activity("B")
            .include("A", "B")
            .condition("A", "B")
            .once("A")
            .once("B")
            .build()
            .unwrap();
        let reference = language_of(&graph);

        let mut pruned = graph.clone();
        let a = dcr_graph_core::ActivityId::new("A").unwrap();
        let b = dcr_graph_core::ActivityId::new("B").unwrap();
        pruned
            .remove_relation(RelationKind::Condition, &a, &b)
            .unwrap();

        let candidate = CompiledGraph::compile(&pruned, 0.0).unwrap();
        let oracle = EquivalenceOracle::new(&reference, SearchConfig::default());
        assert_eq!(oracle.compare(&candidate), Verdict::Equivalent);
    }

    #[test]
    fn test_budget_exhaustion_is_inconclusive() {
        let graph = chain();
        let reference = language_of(&graph);
        let candidate = CompiledGraph::compile(&graph, 0.0).unwrap();

        let oracle =
            EquivalenceOracle::new(&reference, SearchConfig::default().with_max_states(1));
        assert!(matches!(
            oracle.compare(&candidate),
            Verdict::Inconclusive { .. }
        ));
    }
}
