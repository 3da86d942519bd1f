//! Heuristic pattern minimization.
//!
//! A fixed library of structurally-checkable rewrite rules that recognize
//! redundant relations without re-exploring the state space. Faster than the
//! exhaustive minimizer but incomplete relative to it; the two are meant to
//! be compared on the same input.
//!
//! Rules operate on a simplified boolean relation view with forward and
//! inverted adjacency for O(1) "who points at me" queries. Passes repeat,
//! base rules interleaved with the structural ones, until a fixed point.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use dcr_graph_core::{ActivityId, DcrGraph, Node, RelationKind};
use fixedbitset::FixedBitSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::compiled::AdjacencyMatrix;
use crate::config::SearchConfig;
use crate::error::EngineResult;
use crate::exhaustive::Minimization;

/// Stable tags for the rewrite rules; per-rule statistics attach to these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PatternRuleKind {
    /// An excluded activity that nobody includes is dead: delete it and
    /// every relation touching it.
    DeadActivity,
    /// An included activity that nobody excludes can never change status:
    /// incoming Include edges are redundant.
    AlwaysIncluded,
    /// A provably never-executable activity's outgoing Include, Exclude and
    /// Response edges are vacuous. Outgoing Conditions stay meaningful.
    UnreachableSource,
    /// An Include edge subsumed transitively through the source's own
    /// includers.
    ChainInclusion,
    /// A Condition implied by a stricter co-occurring Include relationship
    /// from the same or a chained source.
    PrecedenceCollapse,
}

impl PatternRuleKind {
    /// All rules in pass order: base rules first, then the structural ones.
    pub const ALL: [PatternRuleKind; 5] = [
        PatternRuleKind::DeadActivity,
        PatternRuleKind::AlwaysIncluded,
        PatternRuleKind::UnreachableSource,
        PatternRuleKind::ChainInclusion,
        PatternRuleKind::PrecedenceCollapse,
    ];

    /// Get a display label for the rule.
    pub fn label(&self) -> &'static str {
        match self {
            PatternRuleKind::DeadActivity => "dead_activity",
            PatternRuleKind::AlwaysIncluded => "always_included",
            PatternRuleKind::UnreachableSource => "unreachable_source",
            PatternRuleKind::ChainInclusion => "chain_inclusion",
            PatternRuleKind::PrecedenceCollapse => "precedence_collapse",
        }
    }
}

impl fmt::Display for PatternRuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// What one rule application changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleEffect {
    /// Edges removed by the rule.
    pub relations_removed: usize,
    /// Activities removed by the rule.
    pub activities_removed: usize,
}

impl RuleEffect {
    /// Whether the rule changed anything.
    pub fn changed(&self) -> bool {
        self.relations_removed > 0 || self.activities_removed > 0
    }

    /// Total removals, for per-rule statistics.
    pub fn total(&self) -> usize {
        self.relations_removed + self.activities_removed
    }
}

/// Boolean (non-confidence) relation view with forward and inverted
/// adjacency, plus a log of removals for rebuilding the model.
pub struct RelationView {
    ids: Vec<ActivityId>,
    included: FixedBitSet,
    removed: FixedBitSet,
    conditions: AdjacencyMatrix,
    responses: AdjacencyMatrix,
    milestones: AdjacencyMatrix,
    includes: AdjacencyMatrix,
    excludes: AdjacencyMatrix,
    removed_edges: Vec<(RelationKind, usize, usize)>,
    removed_activities: Vec<usize>,
}

impl RelationView {
    /// Build a view of the edges active at the given threshold.
    pub fn build(flat: &DcrGraph, threshold: f64) -> Self {
        let ids: Vec<ActivityId> = flat.nodes().map(|n| n.id().clone()).collect();
        let index: BTreeMap<&ActivityId, usize> =
            ids.iter().enumerate().map(|(i, id)| (id, i)).collect();
        let n = ids.len();

        let mut included = FixedBitSet::with_capacity(n);
        for (i, node) in flat.nodes().enumerate() {
            if let Node::Activity(activity) = node {
                included.set(i, activity.included);
            }
        }

        let build = |kind: RelationKind| {
            let mut matrix = AdjacencyMatrix::new(n);
            for (source, target, confidence) in flat.table(kind).iter() {
                if confidence.is_active(threshold) {
                    matrix.set(index[source], index[target]);
                }
            }
            matrix
        };
        let conditions = build(RelationKind::Condition);
        let responses = build(RelationKind::Response);
        let milestones = build(RelationKind::Milestone);
        let includes = build(RelationKind::Include);
        let excludes = build(RelationKind::Exclude);

        Self {
            ids,
            included,
            removed: FixedBitSet::with_capacity(n),
            conditions,
            responses,
            milestones,
            includes,
            excludes,
            removed_edges: Vec::new(),
            removed_activities: Vec::new(),
        }
    }

    fn matrix(&self, kind: RelationKind) -> &AdjacencyMatrix {
        match kind {
            RelationKind::Condition => &self.conditions,
            RelationKind::Response => &self.responses,
            RelationKind::Milestone => &self.milestones,
            RelationKind::Include => &self.includes,
            RelationKind::Exclude => &self.excludes,
        }
    }

    fn matrix_mut(&mut self, kind: RelationKind) -> &mut AdjacencyMatrix {
        match kind {
            RelationKind::Condition => &mut self.conditions,
            RelationKind::Response => &mut self.responses,
            RelationKind::Milestone => &mut self.milestones,
            RelationKind::Include => &mut self.includes,
            RelationKind::Exclude => &mut self.excludes,
        }
    }

    /// Live (not yet removed) activity indices.
    fn live_activities(&self) -> Vec<usize> {
        (0..self.ids.len())
            .filter(|&i| !self.removed.contains(i))
            .collect()
    }

    fn is_included(&self, i: usize) -> bool {
        self.included.contains(i)
    }

    fn includers(&self, i: usize) -> Vec<usize> {
        self.includes.sources(i).collect()
    }

    fn excluders(&self, i: usize) -> Vec<usize> {
        self.excludes.sources(i).collect()
    }

    fn remove_edge(&mut self, kind: RelationKind, source: usize, target: usize) -> bool {
        let removed = self.matrix_mut(kind).clear(source, target);
        if removed {
            self.removed_edges.push((kind, source, target));
        }
        removed
    }

    /// Remove an activity and every relation touching it. Touched edges are
    /// implied by the activity removal and are not logged individually.
    fn remove_activity(&mut self, i: usize) {
        for kind in RelationKind::ALL {
            let matrix = self.matrix_mut(kind);
            let outgoing: Vec<usize> = matrix.targets(i).collect();
            for t in outgoing {
                matrix.clear(i, t);
            }
            let incoming: Vec<usize> = matrix.sources(i).collect();
            for s in incoming {
                matrix.clear(s, i);
            }
        }
        self.removed.insert(i);
        self.removed_activities.push(i);
    }

    /// Whether the activity can be proven never executable.
    ///
    /// Recursive reachability with a visited-set cycle guard: an activity
    /// revisited mid-computation is conservatively assumed executable (the
    /// guard's default approximation, not incidental behavior).
    fn never_executable(&self, i: usize, visiting: &mut HashSet<usize>) -> bool {
        if !visiting.insert(i) {
            return false;
        }
        let verdict = if self.conditions.contains(i, i) {
            // A self-condition can never be discharged: the source must be
            // executed for the target to run, and they are the same.
            true
        } else if !self.is_included(i) {
            // Excluded with no live includer. Vacuously true when nobody
            // includes it at all.
            self.includers(i)
                .into_iter()
                .all(|s| self.never_executable(s, visiting))
        } else {
            // Included, but permanently blocked by a condition whose source
            // is included, cannot be excluded, and never executes.
            self.conditions.sources(i).collect::<Vec<_>>().into_iter().any(|s| {
                s != i
                    && self.is_included(s)
                    && self.excluders(s).is_empty()
                    && self.never_executable(s, visiting)
            })
        };
        visiting.remove(&i);
        verdict
    }

    /// Whether `target` can only ever become included after `anchor` has
    /// executed: it starts excluded and every includer is the anchor or is
    /// itself only includable after the anchor.
    fn only_includable_after(
        &self,
        target: usize,
        anchor: usize,
        visiting: &mut HashSet<usize>,
    ) -> bool {
        if !visiting.insert(target) {
            return false;
        }
        let includers = self.includers(target);
        let verdict = !includers.is_empty()
            && includers.into_iter().all(|v| {
                v == anchor
                    || (!self.is_included(v) && self.only_includable_after(v, anchor, visiting))
            });
        visiting.remove(&target);
        verdict
    }
}

type RuleFn = fn(&mut RelationView) -> RuleEffect;

struct PatternRule {
    kind: PatternRuleKind,
    apply: RuleFn,
}

fn rule_fn(kind: PatternRuleKind) -> RuleFn {
    match kind {
        PatternRuleKind::DeadActivity => dead_activity,
        PatternRuleKind::AlwaysIncluded => always_included,
        PatternRuleKind::UnreachableSource => unreachable_source,
        PatternRuleKind::ChainInclusion => chain_inclusion,
        PatternRuleKind::PrecedenceCollapse => precedence_collapse,
    }
}

fn dead_activity(view: &mut RelationView) -> RuleEffect {
    let mut effect = RuleEffect::default();
    for i in view.live_activities() {
        if !view.is_included(i) && view.includers(i).is_empty() {
            view.remove_activity(i);
            effect.activities_removed += 1;
        }
    }
    effect
}

fn always_included(view: &mut RelationView) -> RuleEffect {
    let mut effect = RuleEffect::default();
    for i in view.live_activities() {
        if view.is_included(i) && view.excluders(i).is_empty() {
            for s in view.includers(i) {
                if view.remove_edge(RelationKind::Include, s, i) {
                    effect.relations_removed += 1;
                }
            }
        }
    }
    effect
}

fn unreachable_source(view: &mut RelationView) -> RuleEffect {
    let mut effect = RuleEffect::default();
    for i in view.live_activities() {
        let mut visiting = HashSet::new();
        if !view.never_executable(i, &mut visiting) {
            continue;
        }
        for kind in [
            RelationKind::Include,
            RelationKind::Exclude,
            RelationKind::Response,
        ] {
            let targets: Vec<usize> = view.matrix(kind).targets(i).collect();
            for t in targets {
                if view.remove_edge(kind, i, t) {
                    effect.relations_removed += 1;
                }
            }
        }
    }
    effect
}

fn chain_inclusion(view: &mut RelationView) -> RuleEffect {
    let mut effect = RuleEffect::default();
    let edges: Vec<(usize, usize)> = view.includes.edges().collect();
    for (b, c) in edges {
        if view.is_included(b) {
            continue;
        }
        let includers = view.includers(b);
        if includers.is_empty() {
            continue;
        }
        let subsumed = includers
            .into_iter()
            .all(|a| a == c || view.includes.contains(a, c));
        if subsumed && view.excluders(c).is_empty() && view.remove_edge(RelationKind::Include, b, c)
        {
            effect.relations_removed += 1;
        }
    }
    effect
}

fn precedence_collapse(view: &mut RelationView) -> RuleEffect {
    let mut effect = RuleEffect::default();
    let edges: Vec<(usize, usize)> = view.conditions.edges().collect();
    for (s, t) in edges {
        if s == t || view.is_included(t) {
            continue;
        }
        let mut visiting = HashSet::new();
        if view.only_includable_after(t, s, &mut visiting)
            && view.remove_edge(RelationKind::Condition, s, t)
        {
            effect.relations_removed += 1;
        }
    }
    effect
}

/// Per-rule and per-pass accounting for a pattern minimization run.
#[derive(Debug, Clone)]
pub struct PatternReport {
    /// The minimized graph plus the shared counters.
    pub minimization: Minimization,
    /// Removals attributed to each rule.
    pub rule_counts: BTreeMap<PatternRuleKind, usize>,
    /// Passes until the fixed point (including the final no-op pass).
    pub passes: usize,
}

/// Structural rewrite minimizer.
pub struct PatternMinimizer {
    config: SearchConfig,
    rules: Vec<PatternRule>,
}

impl PatternMinimizer {
    /// Create a minimizer with the full rule library.
    pub fn new(config: SearchConfig) -> Self {
        let rules = PatternRuleKind::ALL
            .iter()
            .map(|kind| PatternRule {
                kind: *kind,
                apply: rule_fn(*kind),
            })
            .collect();
        Self { config, rules }
    }

    /// Apply the rule library to a fixed point.
    pub fn minimize(&self, graph: &DcrGraph) -> EngineResult<PatternReport> {
        let flat = graph.flatten()?;
        let mut view = RelationView::build(&flat, self.config.threshold);
        let mut rule_counts: BTreeMap<PatternRuleKind, usize> = PatternRuleKind::ALL
            .iter()
            .map(|kind| (*kind, 0))
            .collect();

        let mut passes = 0;
        loop {
            passes += 1;
            let mut changed = false;
            for rule in &self.rules {
                let effect = (rule.apply)(&mut view);
                if effect.changed() {
                    debug!(
                        rule = %rule.kind,
                        relations = effect.relations_removed,
                        activities = effect.activities_removed,
                        pass = passes,
                        "pattern_rule_applied"
                    );
                    if let Some(count) = rule_counts.get_mut(&rule.kind) {
                        *count += effect.total();
                    }
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        // Mirror the view's removal log back onto the model. Explicit edge
        // removals first; activity removals then sweep up their remaining
        // edges, so nothing is counted twice.
        let mut model = flat;
        let mut relations_removed = 0;
        for (kind, s, t) in &view.removed_edges {
            let source = view.ids[*s].clone();
            let target = view.ids[*t].clone();
            if model.remove_relation(*kind, &source, &target)? {
                relations_removed += 1;
            }
        }
        let mut activities_removed = 0;
        for i in &view.removed_activities {
            let id = view.ids[*i].clone();
            relations_removed += model.remove_activity(&id)?;
            activities_removed += 1;
        }

        info!(
            passes,
            relations_removed, activities_removed, "pattern_minimize_complete"
        );
        Ok(PatternReport {
            minimization: Minimization {
                graph: model,
                relations_removed,
                activities_removed,
            },
            rule_counts,
            passes,
        })
    }
}
