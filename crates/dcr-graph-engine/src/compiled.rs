//! Arena-compiled graph form used by the explorer and the minimizers.
//!
//! Activities become `usize` indices into an id-sorted array; each relation
//! kind becomes a pair of bitset adjacency matrices (forward rows indexed by
//! source, inverted rows indexed by target). Edges inactive at the captured
//! confidence threshold are dropped at compile time, so every query during a
//! search observes one consistent threshold.
//!
//! Trial deletion for the exhaustive minimizer is a bit-clear with an O(1)
//! revert, never a deep clone of the relation tables.

use std::collections::BTreeMap;

use dcr_graph_core::{ActivityId, DcrGraph, Node, RelationKind};
use fixedbitset::FixedBitSet;

use crate::codec::PackedState;
use crate::error::EngineResult;

/// Boolean adjacency for one relation kind, with forward and inverted rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjacencyMatrix {
    forward: Vec<FixedBitSet>,
    inverted: Vec<FixedBitSet>,
}

impl AdjacencyMatrix {
    /// An empty matrix over `n` activities.
    pub fn new(n: usize) -> Self {
        Self {
            forward: (0..n).map(|_| FixedBitSet::with_capacity(n)).collect(),
            inverted: (0..n).map(|_| FixedBitSet::with_capacity(n)).collect(),
        }
    }

    /// Insert the edge `source -> target`.
    pub fn set(&mut self, source: usize, target: usize) {
        self.forward[source].insert(target);
        self.inverted[target].insert(source);
    }

    /// Remove the edge. Returns true when it was present.
    pub fn clear(&mut self, source: usize, target: usize) -> bool {
        let present = self.forward[source].contains(target);
        self.forward[source].set(target, false);
        self.inverted[target].set(source, false);
        present
    }

    /// Whether the edge exists.
    pub fn contains(&self, source: usize, target: usize) -> bool {
        self.forward[source].contains(target)
    }

    /// Targets of `source`.
    pub fn targets(&self, source: usize) -> impl Iterator<Item = usize> + '_ {
        self.forward[source].ones()
    }

    /// Sources pointing at `target`.
    pub fn sources(&self, target: usize) -> impl Iterator<Item = usize> + '_ {
        self.inverted[target].ones()
    }

    /// All edges as `(source, target)` pairs in index order.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.forward
            .iter()
            .enumerate()
            .flat_map(|(s, row)| row.ones().map(move |t| (s, t)))
    }

    /// Total edge count.
    pub fn len(&self) -> usize {
        self.forward.iter().map(|row| row.count_ones(..)).sum()
    }

    /// Whether the matrix holds no edges.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A [`DcrGraph`] compiled to the arena/index representation.
///
/// Compiling flattens nested sub-graphs (duplicate-id conflicts surface as
/// errors) and captures the live runtime flags as the initial packed state.
#[derive(Debug, Clone)]
pub struct CompiledGraph {
    title: String,
    ids: Vec<ActivityId>,
    threshold: f64,
    conditions: AdjacencyMatrix,
    responses: AdjacencyMatrix,
    milestones: AdjacencyMatrix,
    includes: AdjacencyMatrix,
    excludes: AdjacencyMatrix,
    initial: PackedState,
}

impl CompiledGraph {
    /// Compile a graph at the given confidence threshold.
    pub fn compile(graph: &DcrGraph, threshold: f64) -> EngineResult<Self> {
        let flat = graph.flatten()?;

        // BTreeMap-backed node storage iterates in id order, which is the
        // canonical activity ordering for packed states.
        let ids: Vec<ActivityId> = flat.nodes().map(|n| n.id().clone()).collect();
        let index: BTreeMap<&ActivityId, usize> =
            ids.iter().enumerate().map(|(i, id)| (id, i)).collect();
        let n = ids.len();

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

        let mut initial = PackedState::zeroed(n);
        for (i, node) in flat.nodes().enumerate() {
            if let Node::Activity(activity) = node {
                initial.set_included(i, activity.included);
                initial.set_pending(i, activity.pending);
                initial.set_executed(i, activity.executed);
            }
        }

        let mut compiled = Self {
            title: flat.title.clone(),
            ids,
            threshold,
            conditions,
            responses,
            milestones,
            includes,
            excludes,
            initial,
        };
        let mut initial = compiled.initial.clone();
        compiled.refresh_runnable(&mut initial);
        compiled.initial = initial;
        Ok(compiled)
    }

    /// Title of the compiled model.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Number of activities.
    pub fn activity_count(&self) -> usize {
        self.ids.len()
    }

    /// Activity ids in packed-state order.
    pub fn ids(&self) -> &[ActivityId] {
        &self.ids
    }

    /// The id of activity `i`.
    pub fn id(&self, i: usize) -> &ActivityId {
        &self.ids[i]
    }

    /// Index of an activity id, if present.
    pub fn index_of(&self, id: &ActivityId) -> Option<usize> {
        self.ids.binary_search(id).ok()
    }

    /// The captured confidence threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// The initial packed state (runnable bits already cached).
    pub fn initial_state(&self) -> PackedState {
        self.initial.clone()
    }

    /// The adjacency matrix for a relation kind.
    pub fn matrix(&self, kind: RelationKind) -> &AdjacencyMatrix {
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

    /// Whether activity `i` may fire in `state`.
    ///
    /// Starts from Included, then filters by active Condition sources that
    /// are included and not yet executed, and active Milestone sources that
    /// are included and pending. A self-Condition therefore blocks its
    /// activity permanently.
    pub fn is_runnable(&self, state: &PackedState, i: usize) -> bool {
        if !state.included(i) {
            return false;
        }
        if self
            .conditions
            .sources(i)
            .any(|s| state.included(s) && !state.executed(s))
        {
            return false;
        }
        !self
            .milestones
            .sources(i)
            .any(|s| state.included(s) && state.pending(s))
    }

    /// Recompute the cached runnable bit for every activity.
    pub fn refresh_runnable(&self, state: &mut PackedState) {
        for i in 0..self.ids.len() {
            let runnable = self.is_runnable(state, i);
            state.set_runnable(i, runnable);
        }
    }

    /// Apply the effect of firing activity `i`: a pure function from the
    /// current packed state to the next one.
    ///
    /// Condition and Milestone are read-only filters; only Response,
    /// Include and Exclude propagate byte mutations.
    pub fn fire(&self, state: &PackedState, i: usize) -> PackedState {
        let mut next = state.clone();
        next.set_executed(i, true);
        next.set_pending(i, false);
        for t in self.responses.targets(i) {
            next.set_pending(t, true);
        }
        for t in self.includes.targets(i) {
            next.set_included(t, true);
        }
        for t in self.excludes.targets(i) {
            next.set_included(t, false);
        }
        self.refresh_runnable(&mut next);
        next
    }

    /// Trial-delete an edge. Returns true when the edge was present.
    pub fn clear_edge(&mut self, kind: RelationKind, source: usize, target: usize) -> bool {
        let cleared = self.matrix_mut(kind).clear(source, target);
        if cleared {
            self.reseat_initial();
        }
        cleared
    }

    /// Revert a trial deletion.
    pub fn restore_edge(&mut self, kind: RelationKind, source: usize, target: usize) {
        self.matrix_mut(kind).set(source, target);
        self.reseat_initial();
    }

    /// Every edge touching activity `i`, across all kinds and directions.
    pub fn edges_touching(&self, i: usize) -> Vec<(RelationKind, usize, usize)> {
        let mut edges = Vec::new();
        for kind in RelationKind::ALL {
            let matrix = self.matrix(kind);
            for t in matrix.targets(i) {
                edges.push((kind, i, t));
            }
            for s in matrix.sources(i) {
                if s != i {
                    edges.push((kind, s, i));
                }
            }
        }
        edges
    }

    /// Trial-delete an activity without disturbing the index space: clear
    /// every touching edge and force it out of the initial marking. A
    /// non-included activity with no relations contributes nothing to the
    /// reachable language, so this is observationally a removal.
    ///
    /// Returns the undo record for [`CompiledGraph::restore_activity`].
    pub fn remove_activity(&mut self, i: usize) -> ActivityUndo {
        let edges = self.edges_touching(i);
        for (kind, s, t) in &edges {
            self.matrix_mut(*kind).clear(*s, *t);
        }
        let undo = ActivityUndo {
            index: i,
            edges,
            included: self.initial.included(i),
            pending: self.initial.pending(i),
        };
        self.initial.set_included(i, false);
        self.initial.set_pending(i, false);
        self.reseat_initial();
        undo
    }

    /// Revert a trial activity deletion.
    pub fn restore_activity(&mut self, undo: ActivityUndo) {
        for (kind, s, t) in &undo.edges {
            self.matrix_mut(*kind).set(*s, *t);
        }
        self.initial.set_included(undo.index, undo.included);
        self.initial.set_pending(undo.index, undo.pending);
        self.reseat_initial();
    }

    /// Runnable caches in the stored initial state depend on the relation
    /// tables, so any structural trial invalidates them.
    fn reseat_initial(&mut self) {
        let mut initial = self.initial.clone();
        self.refresh_runnable(&mut initial);
        self.initial = initial;
    }
}

/// Undo record for a trial activity deletion.
#[derive(Debug, Clone)]
pub struct ActivityUndo {
    /// The trialed activity index.
    pub index: usize,
    edges: Vec<(RelationKind, usize, usize)>,
    included: bool,
    pending: bool,
}

impl ActivityUndo {
    /// Number of edges cleared alongside the activity.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}
