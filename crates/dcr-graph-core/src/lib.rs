//! Core domain types shared across the entire DCR-Graph workspace.
//!
//! A DCR graph is a set of activities connected by five relation kinds
//! (Condition, Response, Milestone, Include, Exclude). Each activity carries
//! three runtime flags (Included, Pending, Executed) whose joint evolution
//! under the relation semantics determines which activities may fire and when
//! the model is in an accepting configuration.
//!
//! This crate owns the *structural* model: activities, relation tables with
//! forward and inverted adjacency, confidence-weighted edges, the build/seal
//! lifecycle, and nested-graph flattening. Execution semantics live in
//! `dcr-graph-engine`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for core model operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while constructing or reshaping a graph.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An activity identifier contains characters outside the allowed class.
    #[error("malformed activity id {id:?}: only letters, digits, underscores and spaces are allowed")]
    MalformedId { id: String },

    /// Two activities (possibly across nesting levels) share an identifier.
    #[error("duplicate activity id: {id}")]
    DuplicateActivity { id: ActivityId },

    /// An activity referenced by a relation does not exist in the graph.
    #[error("unknown activity: {id}")]
    UnknownActivity { id: ActivityId },

    /// A relation kind that forbids self-loops was given `source == target`.
    #[error("self-{kind} relation on {id} is not allowed")]
    SelfRelation { kind: RelationKind, id: ActivityId },

    /// Structural mutation was attempted after the graph was sealed.
    #[error("graph {title:?} is running; structure is immutable")]
    GraphSealed { title: String },

    /// The graph was sealed twice.
    #[error("graph {title:?} is already running")]
    AlreadyRunning { title: String },
}

// =============================================================================
// Activity identity
// =============================================================================

/// Identifier for an activity.
///
/// Identity is by id only: two activities with equal ids are the same entity
/// regardless of any other field. Ids are constrained to a word-and-space
/// character class and validated at construction time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActivityId(String);

impl ActivityId {
    /// Create a validated activity id.
    pub fn new(id: impl Into<String>) -> CoreResult<Self> {
        let id = id.into();
        if id.is_empty()
            || !id
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == ' ')
        {
            return Err(CoreError::MalformedId { id });
        }
        Ok(Self(id))
    }

    /// The raw identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ActivityId {
    type Error = CoreError;

    fn try_from(value: String) -> CoreResult<Self> {
        Self::new(value)
    }
}

impl From<ActivityId> for String {
    fn from(id: ActivityId) -> Self {
        id.0
    }
}

// =============================================================================
// Relations
// =============================================================================

/// The five DCR relation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    /// Target cannot run while an Included, not-yet-Executed source exists.
    Condition,
    /// Source's execution sets target's Pending flag.
    Response,
    /// Target cannot run while an Included, Pending source exists.
    Milestone,
    /// Source's execution sets target's Included flag.
    Include,
    /// Source's execution clears target's Included flag.
    Exclude,
}

impl RelationKind {
    /// All relation kinds, in trial-deletion order.
    pub const ALL: [RelationKind; 5] = [
        RelationKind::Response,
        RelationKind::Condition,
        RelationKind::Include,
        RelationKind::Exclude,
        RelationKind::Milestone,
    ];

    /// Get a display label for the relation kind.
    pub fn label(&self) -> &'static str {
        match self {
            RelationKind::Condition => "condition",
            RelationKind::Response => "response",
            RelationKind::Milestone => "milestone",
            RelationKind::Include => "include",
            RelationKind::Exclude => "exclude",
        }
    }

    /// Get the conventional DCR arrow notation.
    pub fn symbol(&self) -> &'static str {
        match self {
            RelationKind::Condition => "-->*",
            RelationKind::Response => "*-->",
            RelationKind::Milestone => "--><>",
            RelationKind::Include => "-->+",
            RelationKind::Exclude => "-->%",
        }
    }

    /// Whether `source == target` is legal for this kind.
    ///
    /// Self-Exclude is the idiom for "at most once" activities; a
    /// self-Condition makes its activity permanently non-executable.
    pub fn allows_self_loop(&self) -> bool {
        matches!(self, RelationKind::Exclude | RelationKind::Condition)
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Statistical weight of a mined relation.
///
/// A relation is *active* iff `violations / invocations > threshold`, where
/// the threshold is supplied by the caller for every evaluation. Finalized
/// (non-statistical) graphs use [`Confidence::certain`], which is active at
/// every threshold below 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confidence {
    /// Times the relation's constraint was violated in the log.
    pub violations: u32,
    /// Times the relation's source was invoked in the log.
    pub invocations: u32,
}

impl Confidence {
    /// Confidence of a finalized (boolean) relation.
    pub fn certain() -> Self {
        Self {
            violations: 1,
            invocations: 1,
        }
    }

    /// Create a mined confidence pair.
    pub fn new(violations: u32, invocations: u32) -> Self {
        Self {
            violations,
            invocations,
        }
    }

    /// Violation ratio in `[0, 1]`, or 0.0 when never invoked.
    pub fn ratio(&self) -> f64 {
        if self.invocations == 0 {
            0.0
        } else {
            f64::from(self.violations) / f64::from(self.invocations)
        }
    }

    /// Whether the relation is active at the given threshold.
    pub fn is_active(&self, threshold: f64) -> bool {
        self.invocations > 0 && self.ratio() > threshold
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Self::certain()
    }
}

/// A single directed relation edge, the flat serde form of a table entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationEdge {
    /// Originating activity.
    pub source: ActivityId,
    /// Destination activity.
    pub target: ActivityId,
    /// Statistical weight; `certain()` for finalized graphs.
    #[serde(default)]
    pub confidence: Confidence,
}

/// One relation kind's edge set with forward and inverted adjacency.
///
/// The forward map answers "who does `s` point at", the inverted map answers
/// "who points at `t`" in O(log n); both are kept in lockstep by the
/// insert/remove operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<RelationEdge>", into = "Vec<RelationEdge>")]
pub struct RelationTable {
    forward: BTreeMap<ActivityId, BTreeMap<ActivityId, Confidence>>,
    inverted: BTreeMap<ActivityId, BTreeSet<ActivityId>>,
}

impl RelationTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an edge, replacing any previous confidence for the pair.
    pub fn insert(&mut self, source: ActivityId, target: ActivityId, confidence: Confidence) {
        self.forward
            .entry(source.clone())
            .or_default()
            .insert(target.clone(), confidence);
        self.inverted.entry(target).or_default().insert(source);
    }

    /// Remove an edge. Returns true when the edge existed.
    pub fn remove(&mut self, source: &ActivityId, target: &ActivityId) -> bool {
        let mut removed = false;
        if let Some(targets) = self.forward.get_mut(source) {
            removed = targets.remove(target).is_some();
            if targets.is_empty() {
                self.forward.remove(source);
            }
        }
        if removed {
            if let Some(sources) = self.inverted.get_mut(target) {
                sources.remove(source);
                if sources.is_empty() {
                    self.inverted.remove(target);
                }
            }
        }
        removed
    }

    /// Remove every edge touching the given activity (either endpoint).
    /// Returns the number of edges removed.
    pub fn remove_touching(&mut self, id: &ActivityId) -> usize {
        let outgoing: Vec<ActivityId> = self.targets(id).map(|(t, _)| t.clone()).collect();
        let incoming: Vec<ActivityId> = self.sources(id).cloned().collect();
        let mut removed = 0;
        for target in &outgoing {
            if self.remove(id, target) {
                removed += 1;
            }
        }
        for source in &incoming {
            if self.remove(source, id) {
                removed += 1;
            }
        }
        removed
    }

    /// Whether the edge exists.
    pub fn contains(&self, source: &ActivityId, target: &ActivityId) -> bool {
        self.forward
            .get(source)
            .is_some_and(|targets| targets.contains_key(target))
    }

    /// Confidence for an edge, if present.
    pub fn confidence(&self, source: &ActivityId, target: &ActivityId) -> Option<Confidence> {
        self.forward
            .get(source)
            .and_then(|targets| targets.get(target))
            .copied()
    }

    /// Targets of the given source with their confidences.
    pub fn targets(&self, source: &ActivityId) -> impl Iterator<Item = (&ActivityId, Confidence)> {
        self.forward
            .get(source)
            .into_iter()
            .flat_map(|targets| targets.iter().map(|(t, c)| (t, *c)))
    }

    /// Sources pointing at the given target.
    pub fn sources(&self, target: &ActivityId) -> impl Iterator<Item = &ActivityId> {
        self.inverted
            .get(target)
            .into_iter()
            .flat_map(|sources| sources.iter())
    }

    /// All edges in deterministic (source, target) order.
    pub fn iter(&self) -> impl Iterator<Item = (&ActivityId, &ActivityId, Confidence)> {
        self.forward.iter().flat_map(|(source, targets)| {
            targets.iter().map(move |(target, c)| (source, target, *c))
        })
    }

    /// Total edge count.
    pub fn len(&self) -> usize {
        self.forward.values().map(BTreeMap::len).sum()
    }

    /// Whether the table holds no edges.
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

impl From<Vec<RelationEdge>> for RelationTable {
    fn from(edges: Vec<RelationEdge>) -> Self {
        let mut table = RelationTable::new();
        for edge in edges {
            table.insert(edge.source, edge.target, edge.confidence);
        }
        table
    }
}

impl From<RelationTable> for Vec<RelationEdge> {
    fn from(table: RelationTable) -> Self {
        table
            .iter()
            .map(|(source, target, confidence)| RelationEdge {
                source: source.clone(),
                target: target.clone(),
                confidence,
            })
            .collect()
    }
}

// =============================================================================
// Activities and nodes
// =============================================================================

/// Atomic unit of work in the process graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Unique identifier; activity identity is by id only.
    pub id: ActivityId,
    /// Human readable display name.
    pub name: String,
    /// Whether the activity currently participates in the process.
    #[serde(default)]
    pub included: bool,
    /// Whether the activity must still occur before acceptance.
    #[serde(default)]
    pub pending: bool,
    /// Whether the activity has been executed at least once.
    #[serde(default)]
    pub executed: bool,
}

impl Activity {
    /// Create an activity with all flags cleared.
    pub fn new(id: ActivityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            included: false,
            pending: false,
            executed: false,
        }
    }

    /// Create an initially included activity.
    pub fn included(id: ActivityId, name: impl Into<String>) -> Self {
        Self {
            included: true,
            ..Self::new(id, name)
        }
    }

    /// Mark as pending (builder pattern).
    pub fn with_pending(mut self) -> Self {
        self.pending = true;
        self
    }
}

/// A graph node: either a leaf activity or a whole nested sub-model
/// substituting for one.
///
/// Nesting is recursive and flattens for execution purposes; traversal code
/// pattern-matches on the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// A leaf activity.
    Activity(Activity),
    /// A sub-graph standing in for an activity.
    Nested {
        /// Identity of the nested node itself.
        id: ActivityId,
        /// The sub-model; its members expand in place of this node.
        graph: DcrGraph,
    },
}

impl Node {
    /// The node's identity.
    pub fn id(&self) -> &ActivityId {
        match self {
            Node::Activity(activity) => &activity.id,
            Node::Nested { id, .. } => id,
        }
    }

    /// Whether this node is a nested sub-graph.
    pub fn is_nested(&self) -> bool {
        matches!(self, Node::Nested { .. })
    }
}

// =============================================================================
// Graph
// =============================================================================

/// Counts of activities and relations per kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    /// Leaf activities at the top level.
    pub activities: usize,
    /// Nested sub-graph nodes at the top level.
    pub nested: usize,
    /// Condition edge count.
    pub conditions: usize,
    /// Response edge count.
    pub responses: usize,
    /// Milestone edge count.
    pub milestones: usize,
    /// Include edge count.
    pub includes: usize,
    /// Exclude edge count.
    pub excludes: usize,
}

impl GraphStats {
    /// Total relation count across all five tables.
    pub fn total_relations(&self) -> usize {
        self.conditions + self.responses + self.milestones + self.includes + self.excludes
    }
}

/// A DCR process graph: nodes plus the five relation tables.
///
/// Lifecycle: built incrementally while not running, sealed with
/// [`DcrGraph::seal`] before any execution, thereafter structurally immutable.
/// Runtime flags keep changing through the engine's `execute`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcrGraph {
    /// Display title of the model.
    pub title: String,
    nodes: BTreeMap<ActivityId, Node>,
    conditions: RelationTable,
    responses: RelationTable,
    milestones: RelationTable,
    includes: RelationTable,
    excludes: RelationTable,
    running: bool,
}

impl DcrGraph {
    /// Create an empty, unsealed graph.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            nodes: BTreeMap::new(),
            conditions: RelationTable::new(),
            responses: RelationTable::new(),
            milestones: RelationTable::new(),
            includes: RelationTable::new(),
            excludes: RelationTable::new(),
            running: false,
        }
    }

    /// Whether the graph has been sealed for execution.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Seal the graph: construction is forbidden from here on.
    pub fn seal(&mut self) -> CoreResult<()> {
        if self.running {
            return Err(CoreError::AlreadyRunning {
                title: self.title.clone(),
            });
        }
        self.running = true;
        Ok(())
    }

    /// A structurally identical clone with the running flag cleared,
    /// suitable for minimization trials.
    pub fn reopened(&self) -> Self {
        let mut copy = self.clone();
        copy.running = false;
        copy
    }

    fn guard_unsealed(&self) -> CoreResult<()> {
        if self.running {
            return Err(CoreError::GraphSealed {
                title: self.title.clone(),
            });
        }
        Ok(())
    }

    /// Add a leaf activity.
    pub fn add_activity(&mut self, activity: Activity) -> CoreResult<()> {
        self.guard_unsealed()?;
        if self.nodes.contains_key(&activity.id) {
            return Err(CoreError::DuplicateActivity { id: activity.id });
        }
        self.nodes
            .insert(activity.id.clone(), Node::Activity(activity));
        Ok(())
    }

    /// Add a nested sub-graph node.
    pub fn add_nested(&mut self, id: ActivityId, graph: DcrGraph) -> CoreResult<()> {
        self.guard_unsealed()?;
        if self.nodes.contains_key(&id) {
            return Err(CoreError::DuplicateActivity { id });
        }
        self.nodes.insert(id.clone(), Node::Nested { id, graph });
        Ok(())
    }

    /// Add a relation edge with explicit confidence.
    ///
    /// Include and Exclude between the same ordered pair are mutually
    /// exclusive: inserting one evicts the other (last write wins).
    pub fn add_relation_with_confidence(
        &mut self,
        kind: RelationKind,
        source: &ActivityId,
        target: &ActivityId,
        confidence: Confidence,
    ) -> CoreResult<()> {
        self.guard_unsealed()?;
        for id in [source, target] {
            if !self.nodes.contains_key(id) {
                return Err(CoreError::UnknownActivity { id: id.clone() });
            }
        }
        if source == target && !kind.allows_self_loop() {
            return Err(CoreError::SelfRelation {
                kind,
                id: source.clone(),
            });
        }
        match kind {
            RelationKind::Include => {
                self.excludes.remove(source, target);
            }
            RelationKind::Exclude => {
                self.includes.remove(source, target);
            }
            _ => {}
        }
        self.table_mut(kind)
            .insert(source.clone(), target.clone(), confidence);
        Ok(())
    }

    /// Add a finalized (certain) relation edge.
    pub fn add_relation(
        &mut self,
        kind: RelationKind,
        source: &ActivityId,
        target: &ActivityId,
    ) -> CoreResult<()> {
        self.add_relation_with_confidence(kind, source, target, Confidence::certain())
    }

    /// Remove a relation edge. Returns true when the edge existed.
    pub fn remove_relation(
        &mut self,
        kind: RelationKind,
        source: &ActivityId,
        target: &ActivityId,
    ) -> CoreResult<bool> {
        self.guard_unsealed()?;
        Ok(self.table_mut(kind).remove(source, target))
    }

    /// Remove an activity and every relation touching it.
    /// Returns the number of relations removed alongside it.
    pub fn remove_activity(&mut self, id: &ActivityId) -> CoreResult<usize> {
        self.guard_unsealed()?;
        if self.nodes.remove(id).is_none() {
            return Err(CoreError::UnknownActivity { id: id.clone() });
        }
        let mut removed = 0;
        for kind in RelationKind::ALL {
            removed += self.table_mut(kind).remove_touching(id);
        }
        Ok(removed)
    }

    /// The relation table for a kind.
    pub fn table(&self, kind: RelationKind) -> &RelationTable {
        match kind {
            RelationKind::Condition => &self.conditions,
            RelationKind::Response => &self.responses,
            RelationKind::Milestone => &self.milestones,
            RelationKind::Include => &self.includes,
            RelationKind::Exclude => &self.excludes,
        }
    }

    fn table_mut(&mut self, kind: RelationKind) -> &mut RelationTable {
        match kind {
            RelationKind::Condition => &mut self.conditions,
            RelationKind::Response => &mut self.responses,
            RelationKind::Milestone => &mut self.milestones,
            RelationKind::Include => &mut self.includes,
            RelationKind::Exclude => &mut self.excludes,
        }
    }

    /// Iterate all nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Look up a node by id.
    pub fn node(&self, id: &ActivityId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Whether a node with this id exists anywhere in the nesting hierarchy.
    pub fn has_node(&self, id: &ActivityId) -> bool {
        self.nodes.values().any(|node| match node {
            Node::Activity(activity) => &activity.id == id,
            Node::Nested { id: nested_id, graph } => nested_id == id || graph.has_node(id),
        })
    }

    /// Look up a leaf activity by id, recursing into nested sub-graphs.
    pub fn activity(&self, id: &ActivityId) -> Option<&Activity> {
        for node in self.nodes.values() {
            match node {
                Node::Activity(activity) if &activity.id == id => return Some(activity),
                Node::Nested { graph, .. } => {
                    if let Some(found) = graph.activity(id) {
                        return Some(found);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Mutable leaf activity lookup, recursing into nested sub-graphs.
    ///
    /// Flag mutation is permitted on running graphs; this is how the engine
    /// applies execution effects.
    pub fn activity_mut(&mut self, id: &ActivityId) -> Option<&mut Activity> {
        for node in self.nodes.values_mut() {
            match node {
                Node::Activity(activity) if &activity.id == id => return Some(activity),
                Node::Nested { graph, .. } => {
                    if let Some(found) = graph.activity_mut(id) {
                        return Some(found);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Number of top-level nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Total relation count across all tables.
    pub fn relation_count(&self) -> usize {
        RelationKind::ALL.iter().map(|k| self.table(*k).len()).sum()
    }

    /// Structural statistics for reporting.
    pub fn stats(&self) -> GraphStats {
        GraphStats {
            activities: self.nodes.values().filter(|n| !n.is_nested()).count(),
            nested: self.nodes.values().filter(|n| n.is_nested()).count(),
            conditions: self.conditions.len(),
            responses: self.responses.len(),
            milestones: self.milestones.len(),
            includes: self.includes.len(),
            excludes: self.excludes.len(),
        }
    }

    /// Flatten nested sub-graphs into a single-level graph.
    ///
    /// Relations with a nested endpoint are expanded to every leaf member of
    /// that sub-graph, and the sub-graph's own relations are hoisted to the
    /// top level. Two sub-graphs sharing an activity id is a
    /// [`CoreError::DuplicateActivity`] conflict, never a silent merge.
    pub fn flatten(&self) -> CoreResult<DcrGraph> {
        let mut flat = DcrGraph::new(self.title.clone());
        self.collect_leaves(&mut flat)?;
        self.collect_relations(&mut flat)?;
        Ok(flat)
    }

    fn collect_leaves(&self, flat: &mut DcrGraph) -> CoreResult<()> {
        for node in self.nodes.values() {
            match node {
                Node::Activity(activity) => {
                    if flat.nodes.contains_key(&activity.id) {
                        return Err(CoreError::DuplicateActivity {
                            id: activity.id.clone(),
                        });
                    }
                    flat.add_activity(activity.clone())?;
                }
                Node::Nested { graph, .. } => graph.collect_leaves(flat)?,
            }
        }
        Ok(())
    }

    fn collect_relations(&self, flat: &mut DcrGraph) -> CoreResult<()> {
        for kind in RelationKind::ALL {
            for (source, target, confidence) in self.table(kind).iter() {
                for s in self.expand_members(source) {
                    for t in self.expand_members(target) {
                        // Expansion of a nested self-Exclude would fabricate
                        // cross-member exclusions; keep only the diagonal.
                        if source == target && s != t {
                            continue;
                        }
                        flat.add_relation_with_confidence(kind, &s, &t, confidence)?;
                    }
                }
            }
        }
        for node in self.nodes.values() {
            if let Node::Nested { graph, .. } = node {
                graph.collect_relations(flat)?;
            }
        }
        Ok(())
    }

    /// Leaf member ids of a node: itself for a leaf, all recursive leaf
    /// members for a nested node.
    pub fn expand_members(&self, id: &ActivityId) -> Vec<ActivityId> {
        match self.nodes.get(id) {
            Some(Node::Nested { graph, .. }) => graph.leaf_ids(),
            _ => vec![id.clone()],
        }
    }

    /// All leaf activity ids, recursing into nested sub-graphs.
    pub fn leaf_ids(&self) -> Vec<ActivityId> {
        let mut ids = Vec::new();
        for node in self.nodes.values() {
            match node {
                Node::Activity(activity) => ids.push(activity.id.clone()),
                Node::Nested { graph, .. } => ids.extend(graph.leaf_ids()),
            }
        }
        ids
    }

    /// Convert to a petgraph `StableDiGraph` for visualization/analysis.
    /// Returns the graph and a mapping from `ActivityId` to `NodeIndex`.
    pub fn to_petgraph(
        &self,
    ) -> (
        StableDiGraph<ActivityId, RelationKind>,
        BTreeMap<ActivityId, NodeIndex>,
    ) {
        let mut graph = StableDiGraph::new();
        let mut id_to_index = BTreeMap::new();

        for id in self.nodes.keys() {
            let idx = graph.add_node(id.clone());
            id_to_index.insert(id.clone(), idx);
        }

        for kind in RelationKind::ALL {
            for (source, target, _) in self.table(kind).iter() {
                if let (Some(&from), Some(&to)) =
                    (id_to_index.get(source), id_to_index.get(target))
                {
                    graph.add_edge(from, to, kind);
                }
            }
        }

        (graph, id_to_index)
    }
}

// =============================================================================
// Builder
// =============================================================================

enum BuildOp {
    Activity {
        id: String,
        name: String,
        included: bool,
        pending: bool,
    },
    Nested {
        id: String,
        graph: DcrGraph,
    },
    Relation {
        kind: RelationKind,
        source: String,
        target: String,
        confidence: Confidence,
    },
}

/// Incremental construction API for [`DcrGraph`].
///
/// Records operations on raw string ids and validates everything at
/// [`GraphBuilder::build`], surfacing the first construction error.
pub struct GraphBuilder {
    title: String,
    ops: Vec<BuildOp>,
}

impl GraphBuilder {
    /// Start building a graph with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ops: Vec::new(),
        }
    }

    /// Add an initially included activity.
    pub fn activity(mut self, id: &str) -> Self {
        self.ops.push(BuildOp::Activity {
            id: id.to_string(),
            name: id.to_string(),
            included: true,
            pending: false,
        });
        self
    }

    /// Add an initially excluded activity.
    pub fn excluded_activity(mut self, id: &str) -> Self {
        self.ops.push(BuildOp::Activity {
            id: id.to_string(),
            name: id.to_string(),
            included: false,
            pending: false,
        });
        self
    }

    /// Add an included activity that starts pending.
    pub fn pending_activity(mut self, id: &str) -> Self {
        self.ops.push(BuildOp::Activity {
            id: id.to_string(),
            name: id.to_string(),
            included: true,
            pending: true,
        });
        self
    }

    /// Add an activity with full control over name and marking.
    pub fn activity_with(
        mut self,
        id: &str,
        name: &str,
        included: bool,
        pending: bool,
    ) -> Self {
        self.ops.push(BuildOp::Activity {
            id: id.to_string(),
            name: name.to_string(),
            included,
            pending,
        });
        self
    }

    /// Add a nested sub-graph node.
    pub fn nested(mut self, id: &str, graph: DcrGraph) -> Self {
        self.ops.push(BuildOp::Nested {
            id: id.to_string(),
            graph,
        });
        self
    }

    /// Add a relation of any kind.
    pub fn relation(mut self, kind: RelationKind, source: &str, target: &str) -> Self {
        self.ops.push(BuildOp::Relation {
            kind,
            source: source.to_string(),
            target: target.to_string(),
            confidence: Confidence::certain(),
        });
        self
    }

    /// Add a relation with mined confidence.
    pub fn relation_with_confidence(
        mut self,
        kind: RelationKind,
        source: &str,
        target: &str,
        confidence: Confidence,
    ) -> Self {
        self.ops.push(BuildOp::Relation {
            kind,
            source: source.to_string(),
            target: target.to_string(),
            confidence,
        });
        self
    }

    /// Add a condition edge (`target` needs `source` executed first).
    pub fn condition(self, source: &str, target: &str) -> Self {
        self.relation(RelationKind::Condition, source, target)
    }

    /// Add a response edge (`source` makes `target` pending).
    pub fn response(self, source: &str, target: &str) -> Self {
        self.relation(RelationKind::Response, source, target)
    }

    /// Add a milestone edge (`target` blocked while `source` pending).
    pub fn milestone(self, source: &str, target: &str) -> Self {
        self.relation(RelationKind::Milestone, source, target)
    }

    /// Add an include edge.
    pub fn include(self, source: &str, target: &str) -> Self {
        self.relation(RelationKind::Include, source, target)
    }

    /// Add an exclude edge.
    pub fn exclude(self, source: &str, target: &str) -> Self {
        self.relation(RelationKind::Exclude, source, target)
    }

    /// Add a self-exclude on an activity (the "at most once" idiom).
    pub fn once(self, id: &str) -> Self {
        self.exclude(id, id)
    }

    /// Validate and build the final graph.
    pub fn build(self) -> CoreResult<DcrGraph> {
        let mut graph = DcrGraph::new(self.title);
        for op in self.ops {
            match op {
                BuildOp::Activity {
                    id,
                    name,
                    included,
                    pending,
                } => {
                    let mut activity = Activity::new(ActivityId::new(id)?, name);
                    activity.included = included;
                    activity.pending = pending;
                    graph.add_activity(activity)?;
                }
                BuildOp::Nested { id, graph: sub } => {
                    graph.add_nested(ActivityId::new(id)?, sub)?;
                }
                BuildOp::Relation {
                    kind,
                    source,
                    target,
                    confidence,
                } => {
                    let source = ActivityId::new(source)?;
                    let target = ActivityId::new(target)?;
                    graph.add_relation_with_confidence(kind, &source, &target, confidence)?;
                }
            }
        }
        Ok(graph)
    }
}
