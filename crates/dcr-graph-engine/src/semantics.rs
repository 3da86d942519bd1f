//! Execution semantics over the live graph model.
//!
//! These are the driver-facing operations: compute the runnable set, fire an
//! activity, test for an accepting configuration. The state-space explorer
//! never goes through this module (it works on the packed/compiled form),
//! but both paths must agree, which is what the round-trip tests check.

use std::collections::BTreeSet;

use dcr_graph_core::{ActivityId, DcrGraph, Node, RelationKind};
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// Execution semantics with a captured confidence threshold.
///
/// The threshold is fixed for the lifetime of the value, so a sequence of
/// calls observes one consistent notion of "active edge".
#[derive(Debug, Clone, Copy)]
pub struct Semantics {
    threshold: f64,
}

impl Default for Semantics {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Semantics {
    /// Create semantics for the given confidence threshold.
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    /// The captured threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// The set of activities eligible to execute in the current state.
    ///
    /// Nested-graph targets expand to their full member set before the
    /// Condition/Milestone filters apply; the returned set contains leaf
    /// activities only.
    pub fn runnable_set(&self, graph: &DcrGraph) -> EngineResult<BTreeSet<ActivityId>> {
        let flat = graph.flatten()?;
        Ok(self.runnable_of_flat(&flat))
    }

    fn runnable_of_flat(&self, flat: &DcrGraph) -> BTreeSet<ActivityId> {
        let mut runnable = BTreeSet::new();
        for node in flat.nodes() {
            let Node::Activity(activity) = node else {
                continue;
            };
            if !activity.included {
                continue;
            }
            if self.blocked(flat, &activity.id) {
                continue;
            }
            runnable.insert(activity.id.clone());
        }
        runnable
    }

    fn blocked(&self, flat: &DcrGraph, target: &ActivityId) -> bool {
        let conditions = flat.table(RelationKind::Condition);
        for source in conditions.sources(target) {
            let active = conditions
                .confidence(source, target)
                .is_some_and(|c| c.is_active(self.threshold));
            if !active {
                continue;
            }
            if let Some(s) = flat.activity(source) {
                if s.included && !s.executed {
                    return true;
                }
            }
        }

        let milestones = flat.table(RelationKind::Milestone);
        for source in milestones.sources(target) {
            let active = milestones
                .confidence(source, target)
                .is_some_and(|c| c.is_active(self.threshold));
            if !active {
                continue;
            }
            if let Some(s) = flat.activity(source) {
                if s.included && s.pending {
                    return true;
                }
            }
        }

        false
    }

    /// Fire an activity.
    ///
    /// Returns `Ok(false)` without mutating anything when the activity is
    /// not in the runnable set, so callers may probe without control-flow
    /// cost. A nested-graph node is never itself executable, only its leaf
    /// members. Executing on a graph that was never sealed is a
    /// precondition violation, not a recoverable result.
    pub fn execute(&self, graph: &mut DcrGraph, id: &ActivityId) -> EngineResult<bool> {
        if !graph.is_running() {
            return Err(EngineError::NotRunning {
                title: graph.title.clone(),
            });
        }

        let flat = graph.flatten()?;
        if flat.activity(id).is_none() {
            if graph.has_node(id) {
                // A nested node id: present, but never runnable itself.
                return Ok(false);
            }
            return Err(EngineError::ActivityNotFound { id: id.clone() });
        }

        if !self.runnable_of_flat(&flat).contains(id) {
            debug!(activity = %id, "execute_rejected");
            return Ok(false);
        }

        // Effect targets come from the flattened tables so that relations
        // through nested endpoints fan out correctly.
        let collect = |kind: RelationKind| -> Vec<ActivityId> {
            flat.table(kind)
                .targets(id)
                .filter(|(_, c)| c.is_active(self.threshold))
                .map(|(t, _)| t.clone())
                .collect()
        };
        let responses = collect(RelationKind::Response);
        let includes = collect(RelationKind::Include);
        let excludes = collect(RelationKind::Exclude);

        let fired = graph
            .activity_mut(id)
            .ok_or_else(|| EngineError::ActivityNotFound { id: id.clone() })?;
        fired.executed = true;
        fired.pending = false;

        for target in &responses {
            if let Some(activity) = graph.activity_mut(target) {
                activity.pending = true;
            }
        }
        for target in &includes {
            if let Some(activity) = graph.activity_mut(target) {
                activity.included = true;
            }
        }
        for target in &excludes {
            if let Some(activity) = graph.activity_mut(target) {
                activity.included = false;
            }
        }

        debug!(
            activity = %id,
            responses = responses.len(),
            includes = includes.len(),
            excludes = excludes.len(),
            "execute_applied"
        );
        Ok(true)
    }

    /// Whether the graph is in an accepting configuration: no activity is
    /// simultaneously Included and Pending. Nested graphs recurse.
    pub fn is_final(&self, graph: &DcrGraph) -> bool {
        graph.nodes().all(|node| match node {
            Node::Activity(activity) => !(activity.included && activity.pending),
            Node::Nested { graph, .. } => self.is_final(graph),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcr_graph_core::{Confidence, GraphBuilder};

    fn id(s: &str) -> ActivityId {
        ActivityId::new(s).unwrap()
    }

    fn sealed_chain() -> DcrGraph {
        let mut graph = GraphBuilder::new("chain")
            .activity("A")
            .excluded_activity("B")
            .excluded_activity("C")
            .include("A", "B")
            .include("B", "C")
            .once("A")
            .once("B")
            .once("C")
            .build()
            .unwrap();
        graph.seal().unwrap();
        graph
    }

    #[test]
    fn test_linear_chain_walk() {
        let semantics = Semantics::default();
        let mut graph = sealed_chain();

        let runnable = semantics.runnable_set(&graph).unwrap();
        assert_eq!(runnable, BTreeSet::from([id("A")]));

        assert!(semantics.execute(&mut graph, &id("A")).unwrap());
        let runnable = semantics.runnable_set(&graph).unwrap();
        assert_eq!(runnable, BTreeSet::from([id("B")]));

        assert!(semantics.execute(&mut graph, &id("B")).unwrap());
        let runnable = semantics.runnable_set(&graph).unwrap();
        assert_eq!(runnable, BTreeSet::from([id("C")]));

        assert!(semantics.execute(&mut graph, &id("C")).unwrap());
        assert!(semantics.runnable_set(&graph).unwrap().is_empty());
        assert!(semantics.is_final(&graph));
    }

    #[test]
    fn test_execute_requires_running_graph() {
        let semantics = Semantics::default();
        let mut graph = GraphBuilder::new("unsealed")
            .activity("a")
            .build()
            .unwrap();

        assert!(matches!(
            semantics.execute(&mut graph, &id("a")),
            Err(EngineError::NotRunning { .. })
        ));
    }

    #[test]
    fn test_failed_execute_leaves_graph_untouched() {
        let semantics = Semantics::default();
        let mut graph = GraphBuilder::new("blocked")
            .activity("first")
            .activity("second")
            .condition("first", "second")
            .build()
            .unwrap();
        graph.seal().unwrap();

        let before = graph.clone();
        let was_final = semantics.is_final(&graph);

        assert!(!semantics.execute(&mut graph, &id("second")).unwrap());
        assert_eq!(graph, before);
        assert_eq!(semantics.is_final(&graph), was_final);
    }

    #[test]
    fn test_unknown_activity_is_an_error() {
        let semantics = Semantics::default();
        let mut graph = GraphBuilder::new("g").activity("a").build().unwrap();
        graph.seal().unwrap();

        assert!(matches!(
            semantics.execute(&mut graph, &id("ghost")),
            Err(EngineError::ActivityNotFound { .. })
        ));
    }

    #[test]
    fn test_response_sets_pending_and_blocks_acceptance() {
        let semantics = Semantics::default();
        let mut graph = GraphBuilder::new("resp")
            .activity("ask")
            .activity("answer")
            .response("ask", "answer")
            .build()
            .unwrap();
        graph.seal().unwrap();

        assert!(semantics.is_final(&graph));
        assert!(semantics.execute(&mut graph, &id("ask")).unwrap());
        assert!(!semantics.is_final(&graph));
        assert!(graph.activity(&id("answer")).unwrap().pending);

        assert!(semantics.execute(&mut graph, &id("answer")).unwrap());
        assert!(semantics.is_final(&graph));
    }

    #[test]
    fn test_milestone_blocks_on_pending_source() {
        let semantics = Semantics::default();
        let mut graph = GraphBuilder::new("milestone")
            .pending_activity("approve")
            .activity("ship")
            .milestone("approve", "ship")
            .build()
            .unwrap();
        graph.seal().unwrap();

        assert!(!semantics.runnable_set(&graph).unwrap().contains(&id("ship")));
        assert!(semantics.execute(&mut graph, &id("approve")).unwrap());
        assert!(semantics.runnable_set(&graph).unwrap().contains(&id("ship")));
    }

    #[test]
    fn test_threshold_gates_mined_condition() {
        let graph = {
            let mut g = GraphBuilder::new("mined")
                .activity("a")
                .activity("b")
                .relation_with_confidence(
                    RelationKind::Condition,
                    "a",
                    "b",
                    Confidence::new(4, 10),
                )
                .build()
                .unwrap();
            g.seal().unwrap();
            g
        };

        let lax = Semantics::new(0.3);
        assert!(!lax.runnable_set(&graph).unwrap().contains(&id("b")));

        let strict = Semantics::new(0.5);
        assert!(strict.runnable_set(&graph).unwrap().contains(&id("b")));
    }

    #[test]
    fn test_nested_node_is_not_executable() {
        let semantics = Semantics::default();
        let sub = GraphBuilder::new("sub").activity("inner").build().unwrap();
        let mut graph = DcrGraph::new("outer");
        graph.add_nested(id("group"), sub).unwrap();
        graph.seal().unwrap();

        assert!(!semantics.execute(&mut graph, &id("group")).unwrap());
        assert!(semantics.execute(&mut graph, &id("inner")).unwrap());
        assert!(graph.activity(&id("inner")).unwrap().executed);
    }
}
