//! Exhaustive redundancy minimization.
//!
//! Proves a relation semantically dead by deleting it and re-checking the
//! whole trace language against the original. Deletions accumulate on the
//! working graph, so the procedure is inherently sequential: removing edge A
//! then B can validate differently from B then A.
//!
//! Trials run on the compiled bitset form (a deletion is a bit-clear with an
//! O(1) revert) while accepted removals are mirrored onto a working copy of
//! the model that becomes the result.

use dcr_graph_core::{Activity, ActivityId, DcrGraph, Node, RelationKind};
use tracing::{debug, info, warn};

use crate::compiled::CompiledGraph;
use crate::config::SearchConfig;
use crate::error::{EngineError, EngineResult};
use crate::explorer::{ExploreOutcome, Explorer};
use crate::oracle::{EquivalenceOracle, Verdict};

/// Result of a minimization run: the reduced graph plus removal counters.
#[derive(Debug, Clone)]
pub struct Minimization {
    /// The minimized graph (structurally unsealed).
    pub graph: DcrGraph,
    /// Relations removed, including those dropped with removed activities.
    pub relations_removed: usize,
    /// Activities removed.
    pub activities_removed: usize,
}

/// Language-equivalence-driven minimizer.
///
/// Complete relative to the captured threshold: every relation whose removal
/// provably preserves the trace language is removed. Inconclusive
/// comparisons (budget exhaustion) conservatively keep the relation under
/// test: under-pruning over unsound removal.
pub struct ExhaustiveMinimizer {
    config: SearchConfig,
}

impl ExhaustiveMinimizer {
    /// Create a minimizer with the given search configuration.
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    /// Minimize a graph against its own trace language.
    pub fn minimize(&self, graph: &DcrGraph) -> EngineResult<Minimization> {
        let mut model = graph.flatten()?;

        // Included activities with no relations at all multiply the state
        // space without constraining anyone; set them aside and restore
        // them unchanged at the end.
        let stripped = strip_isolated(&mut model)?;

        let mut working = CompiledGraph::compile(&model, self.config.threshold)?;
        let reference = match Explorer::new(&working, self.config).explore() {
            ExploreOutcome::Complete(language) => language,
            ExploreOutcome::BudgetExceeded { states_explored } => {
                return Err(EngineError::BudgetExhausted {
                    states_explored,
                    budget: self.config.max_states,
                });
            }
        };
        info!(
            activities = working.activity_count(),
            relations = model.relation_count(),
            reference_states = reference.state_count(),
            stripped = stripped.len(),
            "minimize_start"
        );
        let oracle = EquivalenceOracle::new(&reference, self.config);

        let mut relations_removed = 0;
        let mut activities_removed = 0;
        let mut inconclusive = 0;

        // Activities absent from every reference trace. Removal is trialed
        // through the oracle rather than assumed: a never-fired activity
        // can still block acceptance when it is included and pending.
        let candidates: Vec<ActivityId> = working
            .ids()
            .iter()
            .enumerate()
            .filter(|(i, _)| !reference.mentions(*i as u32))
            .map(|(_, id)| id.clone())
            .collect();
        for id in candidates {
            let Some(index) = working.index_of(&id) else {
                continue;
            };
            let undo = working.remove_activity(index);
            match oracle.compare(&working) {
                Verdict::Equivalent => {
                    relations_removed += model.remove_activity(&id)?;
                    activities_removed += 1;
                    debug!(activity = %id, "activity_removed");
                }
                verdict => {
                    if matches!(verdict, Verdict::Inconclusive { .. }) {
                        inconclusive += 1;
                    }
                    working.restore_activity(undo);
                }
            }
        }

        // Relation-table by relation-table; the order matters only for
        // reproducibility, not correctness.
        for kind in RelationKind::ALL {
            let edges: Vec<(ActivityId, ActivityId)> = model
                .table(kind)
                .iter()
                .map(|(s, t, _)| (s.clone(), t.clone()))
                .collect();

            for (source, target) in edges {
                // Self-exclusion is assumed intentional, never spurious.
                if kind == RelationKind::Exclude && source == target {
                    continue;
                }
                let (Some(s), Some(t)) =
                    (working.index_of(&source), working.index_of(&target))
                else {
                    continue;
                };

                if !working.matrix(kind).contains(s, t) {
                    // Inactive at the captured threshold: the compiled
                    // semantics never see this edge, so removal is free.
                    if model.remove_relation(kind, &source, &target)? {
                        relations_removed += 1;
                    }
                    continue;
                }

                working.clear_edge(kind, s, t);
                match oracle.compare(&working) {
                    Verdict::Equivalent => {
                        model.remove_relation(kind, &source, &target)?;
                        relations_removed += 1;
                        debug!(kind = %kind, source = %source, target = %target, "relation_removed");
                    }
                    verdict => {
                        if matches!(verdict, Verdict::Inconclusive { .. }) {
                            inconclusive += 1;
                            warn!(
                                kind = %kind,
                                source = %source,
                                target = %target,
                                "trial_inconclusive_keeping_relation"
                            );
                        }
                        working.restore_edge(kind, s, t);
                    }
                }
            }
        }

        for activity in stripped {
            model.add_activity(activity)?;
        }

        info!(
            relations_removed,
            activities_removed, inconclusive, "minimize_complete"
        );
        Ok(Minimization {
            graph: model,
            relations_removed,
            activities_removed,
        })
    }
}

/// Detach included activities with zero relations of any kind; they are
/// reinstated verbatim after minimization.
fn strip_isolated(model: &mut DcrGraph) -> EngineResult<Vec<Activity>> {
    let isolated: Vec<Activity> = model
        .nodes()
        .filter_map(|node| match node {
            Node::Activity(activity) if activity.included => Some(activity.clone()),
            _ => None,
        })
        .filter(|activity| {
            RelationKind::ALL.iter().all(|kind| {
                let table = model.table(*kind);
                table.targets(&activity.id).next().is_none()
                    && table.sources(&activity.id).next().is_none()
            })
        })
        .collect();

    for activity in &isolated {
        model.remove_activity(&activity.id)?;
    }
    Ok(isolated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explorer::TraceLanguage;
    use dcr_graph_core::GraphBuilder;

    fn id(s: &str) -> ActivityId {
        ActivityId::new(s).unwrap()
    }

    fn language_of(graph: &DcrGraph) -> TraceLanguage {
        let compiled = CompiledGraph::compile(graph, 0.0).unwrap();
        Explorer::new(&compiled, SearchConfig::default())
            .explore()
            .language()
            .expect("complete exploration")
    }

    #[test]
    fn test_redundant_condition_is_removed() {
        // B only becomes included after A executes, so A-->*B never blocks.
        let graph = GraphBuilder::new("redundant")
            .activity("A")
            .excluded_activity("B")
            .include("A", "B")
            .condition("A", "B")
            .once("A")
            .once("B")
            .build()
            .unwrap();

        let result = ExhaustiveMinimizer::new(SearchConfig::default())
            .minimize(&graph)
            .unwrap();

        assert_eq!(result.relations_removed, 1);
        assert_eq!(result.activities_removed, 0);
        assert!(!result
            .graph
            .table(RelationKind::Condition)
            .contains(&id("A"), &id("B")));
        assert!(result
            .graph
            .table(RelationKind::Include)
            .contains(&id("A"), &id("B")));
    }

    #[test]
    fn test_minimized_language_is_preserved() {
        let graph = GraphBuilder::new("mixed")
            .activity("A")
            .excluded_activity("B")
            .excluded_activity("C")
            .include("A", "B")
            .include("B", "C")
            .condition("A", "B")
            .condition("A", "C")
            .once("A")
            .once("B")
            .once("C")
            .build()
            .unwrap();

        let before = language_of(&graph);
        let result = ExhaustiveMinimizer::new(SearchConfig::default())
            .minimize(&graph)
            .unwrap();
        let after = language_of(&result.graph);

        assert_eq!(before.final_traces, after.final_traces);
        assert!(result.graph.relation_count() <= graph.relation_count());
    }

    #[test]
    fn test_self_exclude_is_never_trialed() {
        let graph = GraphBuilder::new("once")
            .activity("solo")
            .once("solo")
            .build()
            .unwrap();

        let result = ExhaustiveMinimizer::new(SearchConfig::default())
            .minimize(&graph)
            .unwrap();
        assert_eq!(result.relations_removed, 0);
        assert!(result
            .graph
            .table(RelationKind::Exclude)
            .contains(&id("solo"), &id("solo")));
    }

    #[test]
    fn test_isolated_activities_are_restored() {
        let graph = GraphBuilder::new("isolated")
            .activity("lonely")
            .activity("a")
            .activity("b")
            .condition("a", "b")
            .build()
            .unwrap();

        let result = ExhaustiveMinimizer::new(SearchConfig::default())
            .minimize(&graph)
            .unwrap();

        assert!(result.graph.activity(&id("lonely")).is_some());
        assert_eq!(result.activities_removed, 0);
    }

    #[test]
    fn test_dead_excluded_activity_is_removed() {
        let graph = GraphBuilder::new("dead")
            .activity("live")
            .excluded_activity("dead")
            .condition("dead", "live")
            .once("live")
            .build()
            .unwrap();

        let result = ExhaustiveMinimizer::new(SearchConfig::default())
            .minimize(&graph)
            .unwrap();

        // "dead" is excluded, has no includers and never fires; its
        // condition on "live" is inert because excluded sources never block.
        assert_eq!(result.activities_removed, 1);
        assert_eq!(result.relations_removed, 1);
        assert!(result.graph.activity(&id("dead")).is_none());
    }

    #[test]
    fn test_inconclusive_budget_keeps_everything() {
        let graph = GraphBuilder::new("tight")
            .activity("A")
            .excluded_activity("B")
            .include("A", "B")
            .condition("A", "B")
            .once("A")
            .once("B")
            .build()
            .unwrap();

        // Enough budget to compute the reference, but the per-trial
        // comparisons share the same bound and stay conclusive here; a
        // budget of 1 cannot even establish the reference.
        let err = ExhaustiveMinimizer::new(SearchConfig::default().with_max_states(1))
            .minimize(&graph);
        assert!(matches!(err, Err(EngineError::BudgetExhausted { .. })));
    }

    #[test]
    fn test_counters_match_structure() {
        let graph = GraphBuilder::new("count")
            .activity("A")
            .excluded_activity("B")
            .include("A", "B")
            .condition("A", "B")
            .once("A")
            .once("B")
            .build()
            .unwrap();

        let before_relations = graph.relation_count();
        let result = ExhaustiveMinimizer::new(SearchConfig::default())
            .minimize(&graph)
            .unwrap();

        assert_eq!(
            result.graph.relation_count(),
            before_relations - result.relations_removed
        );
    }
}
