//! Minimal test fixtures for engine testing.
//!
//! Provides isolated, in-memory process graphs for testing without external
//! dependencies. Each constructor documents the scenario it models.

use dcr_graph_core::{Confidence, DcrGraph, GraphBuilder, RelationKind};

/// A linear one-shot chain.
///
/// ```text
/// A -->+ B -->+ C      (A included; B, C excluded; self-excludes on all)
/// ```
///
/// The only accepting runs are the prefixes of `[A, B, C]`.
pub fn linear_chain() -> DcrGraph {
    GraphBuilder::new("linear chain")
        .activity("A")
        .excluded_activity("B")
        .excluded_activity("C")
        .include("A", "B")
        .include("B", "C")
        .once("A")
        .once("B")
        .once("C")
        .build()
        .expect("fixture builds")
}

/// A graph with a dead excluded activity.
///
/// ```text
/// dead -->* live       (dead excluded, no includers anywhere)
/// live -->% live
/// ```
pub fn dead_activity() -> DcrGraph {
    GraphBuilder::new("dead activity")
        .activity("live")
        .excluded_activity("dead")
        .condition("dead", "live")
        .once("live")
        .build()
        .expect("fixture builds")
}

/// The chain-inclusion redundancy scenario.
///
/// ```text
/// A -->+ B, A -->+ C, B -->+ C    (B, C excluded; C has no excluders)
/// ```
///
/// `B -->+ C` is transitively subsumed: whenever B can fire, some includer
/// of B has already included C.
pub fn chain_inclusion() -> DcrGraph {
    GraphBuilder::new("chain inclusion")
        .activity("A")
        .excluded_activity("B")
        .excluded_activity("C")
        .include("A", "B")
        .include("A", "C")
        .include("B", "C")
        .build()
        .expect("fixture builds")
}

/// An activity wedged shut by a condition on itself.
///
/// ```text
/// stuck -->* stuck, stuck -->+ victim, stuck *--> other, stuck -->* other
/// ```
///
/// `stuck` can never execute; its outgoing Include/Response edges are
/// vacuous while the outgoing Condition stays meaningful.
pub fn self_condition_cycle() -> DcrGraph {
    GraphBuilder::new("self condition")
        .activity("stuck")
        .activity("other")
        .excluded_activity("victim")
        .condition("stuck", "stuck")
        .include("stuck", "victim")
        .response("stuck", "other")
        .condition("stuck", "other")
        .build()
        .expect("fixture builds")
}

/// Two independent one-shot activities: a minimal interleaving diamond.
pub fn one_shot_pair() -> DcrGraph {
    GraphBuilder::new("one shot pair")
        .activity("x")
        .activity("y")
        .once("x")
        .once("y")
        .build()
        .expect("fixture builds")
}

/// A redundant condition: B is only ever included after A executed.
///
/// ```text
/// A -->+ B, A -->* B     (B excluded; self-excludes on both)
/// ```
pub fn redundant_condition() -> DcrGraph {
    GraphBuilder::new("redundant condition")
        .activity("A")
        .excluded_activity("B")
        .include("A", "B")
        .condition("A", "B")
        .once("A")
        .once("B")
        .build()
        .expect("fixture builds")
}

/// A request/response loop with a milestone guard.
///
/// ```text
/// ask *--> answer, answer --><> close
/// ```
///
/// `close` is blocked while an answer is owed.
pub fn request_response() -> DcrGraph {
    GraphBuilder::new("request response")
        .activity("ask")
        .activity("answer")
        .activity("close")
        .response("ask", "answer")
        .milestone("answer", "close")
        .once("ask")
        .once("close")
        .build()
        .expect("fixture builds")
}

/// A mined graph whose condition is only active at low thresholds.
pub fn mined_graph() -> DcrGraph {
    GraphBuilder::new("mined")
        .activity("pay")
        .activity("ship")
        .relation_with_confidence(
            RelationKind::Condition,
            "pay",
            "ship",
            Confidence::new(2, 10),
        )
        .relation_with_confidence(RelationKind::Response, "pay", "ship", Confidence::new(9, 10))
        .build()
        .expect("fixture builds")
}

/// A nested sub-graph standing in for a single activity.
///
/// ```text
/// review -->* publish     where review = { check, approve }
/// ```
pub fn nested_review() -> DcrGraph {
    let review = GraphBuilder::new("review")
        .activity("check")
        .activity("approve")
        .condition("check", "approve")
        .build()
        .expect("fixture builds");

    let mut graph = GraphBuilder::new("nested review")
        .activity("publish")
        .build()
        .expect("fixture builds");
    let review_id = dcr_graph_core::ActivityId::new("review").expect("valid id");
    let publish_id = dcr_graph_core::ActivityId::new("publish").expect("valid id");
    graph.add_nested(review_id.clone(), review).expect("nested node");
    graph
        .add_relation(RelationKind::Condition, &review_id, &publish_id)
        .expect("relation");
    graph
}
