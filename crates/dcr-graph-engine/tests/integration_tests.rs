//! Integration tests for dcr-graph-engine using isolated test fixtures.

use std::collections::BTreeSet;

use dcr_graph_core::{ActivityId, DcrGraph, RelationKind};
use dcr_graph_engine::test_fixtures::{
    chain_inclusion, dead_activity, linear_chain, mined_graph, nested_review, one_shot_pair,
    redundant_condition, request_response, self_condition_cycle,
};
use dcr_graph_engine::{
    compute_trace_language, trace_ids, CompiledGraph, EquivalenceOracle, ExhaustiveMinimizer,
    ExploreOutcome, Explorer, PatternMinimizer, PatternRuleKind, SearchConfig, Semantics,
    TraceLanguage, Verdict,
};

fn id(s: &str) -> ActivityId {
    ActivityId::new(s).unwrap()
}

fn language_of(graph: &DcrGraph) -> TraceLanguage {
    compute_trace_language(graph, SearchConfig::default())
        .unwrap()
        .language()
        .expect("complete exploration")
}

/// Final traces as id sequences, comparable across graphs whose activity
/// sets (and therefore index spaces) differ.
fn final_trace_ids(graph: &DcrGraph) -> BTreeSet<Vec<String>> {
    let compiled = CompiledGraph::compile(graph, 0.0).unwrap();
    language_of(graph)
        .final_traces
        .iter()
        .map(|t| trace_ids(&compiled, t))
        .collect()
}

// ============================================================================
// Execution semantics scenarios
// ============================================================================

#[test]
fn linear_chain_executes_in_order() {
    let semantics = Semantics::default();
    let mut graph = linear_chain();
    graph.seal().unwrap();

    assert_eq!(
        semantics.runnable_set(&graph).unwrap(),
        BTreeSet::from([id("A")])
    );
    assert!(semantics.execute(&mut graph, &id("A")).unwrap());
    assert_eq!(
        semantics.runnable_set(&graph).unwrap(),
        BTreeSet::from([id("B")])
    );
    assert!(semantics.execute(&mut graph, &id("B")).unwrap());
    assert_eq!(
        semantics.runnable_set(&graph).unwrap(),
        BTreeSet::from([id("C")])
    );
    assert!(semantics.execute(&mut graph, &id("C")).unwrap());
    assert!(semantics.is_final(&graph));
}

#[test]
fn failed_execute_is_pure() {
    let semantics = Semantics::default();
    let mut graph = linear_chain();
    graph.seal().unwrap();

    let before = graph.clone();
    let final_before = semantics.is_final(&graph);

    // B is excluded; firing it must fail without touching the graph.
    assert!(!semantics.execute(&mut graph, &id("B")).unwrap());
    assert_eq!(graph, before);
    assert_eq!(semantics.is_final(&graph), final_before);
}

#[test]
fn milestone_holds_until_answer_arrives() {
    let semantics = Semantics::default();
    let mut graph = request_response();
    graph.seal().unwrap();

    assert!(semantics.execute(&mut graph, &id("ask")).unwrap());
    // An answer is owed: close is milestone-blocked.
    assert!(!semantics.runnable_set(&graph).unwrap().contains(&id("close")));
    assert!(!semantics.is_final(&graph));

    assert!(semantics.execute(&mut graph, &id("answer")).unwrap());
    assert!(semantics.runnable_set(&graph).unwrap().contains(&id("close")));
    assert!(semantics.is_final(&graph));
}

#[test]
fn nested_members_execute_through_the_flat_view() {
    let semantics = Semantics::default();
    let mut graph = nested_review();
    graph.seal().unwrap();

    // publish is conditioned on both members of the review group.
    assert!(!semantics.runnable_set(&graph).unwrap().contains(&id("publish")));
    assert!(semantics.execute(&mut graph, &id("check")).unwrap());
    assert!(semantics.execute(&mut graph, &id("approve")).unwrap());
    assert!(semantics.runnable_set(&graph).unwrap().contains(&id("publish")));

    // The group node itself is never executable.
    assert!(!semantics.execute(&mut graph, &id("review")).unwrap());
}

// ============================================================================
// Packed-state round trip
// ============================================================================

#[test]
fn packed_runnable_matches_live_runnable() {
    for graph in [
        linear_chain(),
        dead_activity(),
        chain_inclusion(),
        self_condition_cycle(),
        request_response(),
        redundant_condition(),
    ] {
        let semantics = Semantics::default();
        let live: BTreeSet<ActivityId> = semantics.runnable_set(&graph).unwrap();

        let compiled = CompiledGraph::compile(&graph, 0.0).unwrap();
        let packed: BTreeSet<ActivityId> = compiled
            .initial_state()
            .runnable_indices()
            .map(|i| compiled.id(i).clone())
            .collect();

        assert_eq!(live, packed, "graph {:?}", graph.title);
    }
}

#[test]
fn threshold_capture_is_consistent_across_representations() {
    let graph = mined_graph();

    for threshold in [0.0, 0.15, 0.25, 0.95] {
        let semantics = Semantics::new(threshold);
        let live = semantics.runnable_set(&graph).unwrap();

        let compiled = CompiledGraph::compile(&graph, threshold).unwrap();
        let packed: BTreeSet<ActivityId> = compiled
            .initial_state()
            .runnable_indices()
            .map(|i| compiled.id(i).clone())
            .collect();

        assert_eq!(live, packed, "threshold {threshold}");
    }
}

// ============================================================================
// Trace language scenarios
// ============================================================================

#[test]
fn linear_chain_trace_language() {
    let graph = linear_chain();
    let compiled = CompiledGraph::compile(&graph, 0.0).unwrap();
    let language = language_of(&graph);

    let as_ids: BTreeSet<Vec<String>> = language
        .final_traces
        .iter()
        .map(|t| trace_ids(&compiled, t))
        .collect();

    // Every prefix of [A, B, C] leaves an accepting marking.
    assert_eq!(
        as_ids,
        BTreeSet::from([
            vec!["A".to_string()],
            vec!["A".to_string(), "B".to_string()],
            vec!["A".to_string(), "B".to_string(), "C".to_string()],
        ])
    );
    assert!(language.early_traces.is_empty());
}

#[test]
fn self_condition_never_fires() {
    let graph = self_condition_cycle();
    let language = language_of(&graph);

    let compiled = CompiledGraph::compile(&graph, 0.0).unwrap();
    let stuck = compiled.index_of(&id("stuck")).unwrap() as u32;
    assert!(!language.mentions(stuck));
}

#[test]
fn budget_exhaustion_is_not_a_language() {
    let graph = one_shot_pair();
    let outcome =
        compute_trace_language(&graph, SearchConfig::default().with_max_states(1)).unwrap();
    assert!(matches!(outcome, ExploreOutcome::BudgetExceeded { .. }));
    assert!(outcome.language().is_none());
}

// ============================================================================
// Minimizer soundness and monotonicity
// ============================================================================

#[test]
fn exhaustive_minimizer_preserves_language() {
    for graph in [
        linear_chain(),
        redundant_condition(),
        chain_inclusion(),
        dead_activity(),
        request_response(),
    ] {
        let before = final_trace_ids(&graph);
        let result = ExhaustiveMinimizer::new(SearchConfig::default())
            .minimize(&graph)
            .unwrap();
        let after = final_trace_ids(&result.graph);

        assert_eq!(
            before, after,
            "language changed for {:?}",
            graph.title
        );
    }
}

#[test]
fn minimizers_never_grow_the_graph() {
    for graph in [
        linear_chain(),
        redundant_condition(),
        chain_inclusion(),
        dead_activity(),
        self_condition_cycle(),
    ] {
        let exhaustive = ExhaustiveMinimizer::new(SearchConfig::default())
            .minimize(&graph)
            .unwrap();
        assert!(exhaustive.graph.relation_count() <= graph.relation_count());
        assert!(exhaustive.graph.node_count() <= graph.node_count());

        let patterns = PatternMinimizer::new(SearchConfig::default())
            .minimize(&graph)
            .unwrap();
        assert!(patterns.minimization.graph.relation_count() <= graph.relation_count());
        assert!(patterns.minimization.graph.node_count() <= graph.node_count());
    }
}

#[test]
fn pattern_minimizer_output_passes_the_oracle() {
    // Edge-removal-only fixtures: the oracle compares index-based traces,
    // so candidate and reference must share one activity set.
    for graph in [linear_chain(), redundant_condition(), chain_inclusion()] {
        let reference = language_of(&graph);
        let report = PatternMinimizer::new(SearchConfig::default())
            .minimize(&graph)
            .unwrap();

        let candidate = CompiledGraph::compile(&report.minimization.graph, 0.0).unwrap();
        let oracle = EquivalenceOracle::new(&reference, SearchConfig::default());
        assert_eq!(
            oracle.compare(&candidate),
            Verdict::Equivalent,
            "pattern minimizer broke {:?}",
            graph.title
        );
    }
}

#[test]
fn dead_activity_removed_by_both_strategies() {
    let graph = dead_activity();

    let exhaustive = ExhaustiveMinimizer::new(SearchConfig::default())
        .minimize(&graph)
        .unwrap();
    assert!(exhaustive.graph.activity(&id("dead")).is_none());

    let patterns = PatternMinimizer::new(SearchConfig::default())
        .minimize(&graph)
        .unwrap();
    assert!(patterns.minimization.graph.activity(&id("dead")).is_none());
    assert!(patterns.rule_counts[&PatternRuleKind::DeadActivity] >= 1);
}

#[test]
fn chain_inclusion_removed_by_both_strategies() {
    let graph = chain_inclusion();

    let exhaustive = ExhaustiveMinimizer::new(SearchConfig::default())
        .minimize(&graph)
        .unwrap();
    let patterns = PatternMinimizer::new(SearchConfig::default())
        .minimize(&graph)
        .unwrap();

    // Identical outcome on both paths for the subsumed include edge.
    assert!(!exhaustive
        .graph
        .table(RelationKind::Include)
        .contains(&id("B"), &id("C")));
    assert!(!patterns
        .minimization
        .graph
        .table(RelationKind::Include)
        .contains(&id("B"), &id("C")));
}

#[test]
fn vacuous_edges_of_self_conditioned_activity_are_removed() {
    let graph = self_condition_cycle();

    let patterns = PatternMinimizer::new(SearchConfig::default())
        .minimize(&graph)
        .unwrap();
    let result = &patterns.minimization.graph;

    assert!(!result
        .table(RelationKind::Include)
        .contains(&id("stuck"), &id("victim")));
    assert!(!result
        .table(RelationKind::Response)
        .contains(&id("stuck"), &id("other")));
    // Outgoing conditions are preserved by the pattern rule.
    assert!(result
        .table(RelationKind::Condition)
        .contains(&id("stuck"), &id("other")));
}

#[test]
fn mined_graph_minimizes_differently_per_threshold() {
    let graph = mined_graph();

    // At 0.5 only nothing is active (condition 0.2, response 0.9 -> the
    // response stays); at 0.95 every edge is inert and gets dropped.
    let strict = ExhaustiveMinimizer::new(SearchConfig::default().with_threshold(0.95))
        .minimize(&graph)
        .unwrap();
    assert_eq!(strict.graph.relation_count(), 0);

    let lax = ExhaustiveMinimizer::new(SearchConfig::default().with_threshold(0.1))
        .minimize(&graph)
        .unwrap();
    // The response (ratio 0.9) is active and load-bearing at 0.1.
    assert!(lax
        .graph
        .table(RelationKind::Response)
        .contains(&id("pay"), &id("ship")));
}

// ============================================================================
// Oracle end-to-end
// ============================================================================

#[test]
fn oracle_catches_hand_broken_candidate() {
    let graph = linear_chain();
    let reference = language_of(&graph);

    let mut broken = graph.clone();
    broken
        .remove_relation(RelationKind::Exclude, &id("A"), &id("A"))
        .unwrap();

    // Without its self-exclude, A can fire twice: [A, A] is foreign.
    let candidate = CompiledGraph::compile(&broken, 0.0).unwrap();
    let oracle = EquivalenceOracle::new(&reference, SearchConfig::default());
    assert!(!oracle.compare(&candidate).is_equivalent());
}

#[test]
fn explorer_agrees_with_explicit_construction() {
    // The one-shot pair accepts every interleaving of {x, y}.
    let graph = one_shot_pair();
    let compiled = CompiledGraph::compile(&graph, 0.0).unwrap();
    let language = match Explorer::new(&compiled, SearchConfig::default()).explore() {
        ExploreOutcome::Complete(language) => language,
        ExploreOutcome::BudgetExceeded { .. } => panic!("budget exceeded"),
    };

    assert_eq!(language.final_traces.len(), 4);
    assert_eq!(language.state_count(), 4);
}
