//! Root coordinator: owns the quadtree roots and drives the budgeted tick.
//!
//! One [`Planet::tick`] runs four phases in priority order, each in batches
//! gated by a [`FrameBudget`]:
//!
//! 1. **Traversal** walks the tree from a resumable cursor, measuring viewer
//!    distance and raising split/unify intents on each node's parent. It also
//!    cancels in-flight transitions the viewer has since reversed.
//! 2. **Integration** folds worker output into the mesh store and commits
//!    transitions whose replacement geometry is complete.
//! 3. **Intent draining** executes queued intents, up to a quota per tick.
//! 4. **Dispatch** hands pending leaf tasks to the generation backend.
//!
//! A new traversal sweep starts only after every lower phase has had a batch
//! since the previous sweep, so a tight budget delays work but never starves
//! a phase.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use glam::DVec3;
use nebula_cubesphere::{Quad, cube_sphere_quads};
use nebula_mesh::{Integration, IntegratorStats, MeshStore, RenderEvent, ResultIntegrator};
use nebula_terrain::{GenerationBackend, MAX_SEGMENTS, MeshId, Surface, expected_vertex_count};
use tracing::{debug, error, info, trace, warn};

use crate::arena::{NodeArena, NodeId};
use crate::budget::{DEFAULT_FRAME_BUDGET, FrameBudget};
use crate::error::LodError;
use crate::leaf::{LeafNode, LeafState};
use crate::node::{Children, IntentKind, Node, Transition, TransitionQueues};
use crate::thresholds::{LodAction, LodThresholds};

/// Per-tick work limits.
#[derive(Clone, Debug, PartialEq)]
pub struct BudgetSettings {
    /// Wall-clock time the tick may spend before deferring work.
    pub frame_budget: Duration,
    /// Intents executed per tick at most.
    pub transitions_per_tick: usize,
    /// Nodes visited per traversal batch.
    pub traversal_batch: usize,
    /// Worker outputs applied per integration batch.
    pub integration_batch: usize,
    /// Leaves submitted per dispatch batch.
    pub dispatch_batch: usize,
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            frame_budget: DEFAULT_FRAME_BUDGET,
            transitions_per_tick: 16,
            traversal_batch: 64,
            integration_batch: 32,
            dispatch_batch: 32,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LodSettings {
    /// Deepest level a node may reach. Roots are level 1.
    pub max_level: u32,
    pub thresholds: LodThresholds,
    /// Grid cells per chunk edge.
    pub segments: u32,
    /// Grid density used once a chunk keeps failing to generate.
    pub placeholder_segments: u32,
    /// Failed attempts before falling back to the placeholder.
    pub max_transport_retries: u32,
    pub budget: BudgetSettings,
}

impl Default for LodSettings {
    fn default() -> Self {
        Self {
            max_level: 8,
            thresholds: LodThresholds::default(),
            segments: 16,
            placeholder_segments: 4,
            max_transport_retries: 3,
            budget: BudgetSettings::default(),
        }
    }
}

impl LodSettings {
    pub fn validate(&self) -> Result<(), LodError> {
        if self.max_level == 0 {
            return Err(LodError::InvalidSettings("max_level must be at least 1".into()));
        }
        if self.segments == 0 || self.segments > MAX_SEGMENTS {
            return Err(LodError::InvalidSettings(format!(
                "segments {} outside 1..={MAX_SEGMENTS}",
                self.segments
            )));
        }
        if self.placeholder_segments == 0 || self.placeholder_segments > self.segments {
            return Err(LodError::InvalidSettings(format!(
                "placeholder_segments {} outside 1..={}",
                self.placeholder_segments, self.segments
            )));
        }
        let b = &self.budget;
        if b.transitions_per_tick == 0
            || b.traversal_batch == 0
            || b.integration_batch == 0
            || b.dispatch_batch == 0
        {
            return Err(LodError::InvalidSettings(
                "per-tick quotas and batch sizes must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// What one tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub visited: usize,
    pub integrated: usize,
    pub stale: usize,
    pub failures: usize,
    pub intents: usize,
    pub splits_started: usize,
    pub splits_completed: usize,
    pub unifies_started: usize,
    pub unifies_completed: usize,
    pub transitions_cancelled: usize,
    pub tasks_dispatched: usize,
    pub batches: u32,
    /// Some phase was refused a batch and its work waits for the next tick.
    pub deferred: bool,
    pub elapsed: Duration,
}

/// Snapshot of the tree and its queues.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlanetStats {
    pub nodes: usize,
    pub max_depth: u32,
    pub leaves_pending: usize,
    pub leaves_in_flight: usize,
    pub leaves_generated: usize,
    pub transitions: usize,
    pub split_intents: usize,
    pub unify_intents: usize,
    pub generation_queue: usize,
    pub meshes: usize,
    pub visible_meshes: usize,
    pub in_flight_tasks: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueueOwner {
    Planet,
    Node(NodeId),
}

/// Lower phases still owed a batch since the last sweep began.
#[derive(Clone, Copy, Debug)]
struct PhaseTurns {
    owed: [bool; 3],
}

impl PhaseTurns {
    const INTEGRATE: usize = 0;
    const INTENTS: usize = 1;
    const DISPATCH: usize = 2;

    fn all_taken(&self) -> bool {
        !self.owed.iter().any(|owed| *owed)
    }

    /// A phase that already had its turn yields while a lower one waits.
    fn should_yield(&self, phase: usize) -> bool {
        !self.owed[phase] && self.owed[phase + 1..].iter().any(|owed| *owed)
    }
}

/// The LOD quadtree of one planet, plus everything that feeds it.
pub struct Planet<B: GenerationBackend> {
    settings: LodSettings,
    surface: Surface,
    backend: B,
    nodes: NodeArena<Node>,
    roots: Vec<NodeId>,
    root_queues: TransitionQueues,
    dirty_owners: VecDeque<QueueOwner>,
    generation_queue: VecDeque<(NodeId, MeshId)>,
    retry_queue: Vec<(NodeId, MeshId)>,
    mesh_owners: HashMap<MeshId, NodeId>,
    meshes: MeshStore,
    integrator: ResultIntegrator,
    traversal: Vec<NodeId>,
    turns: PhaseTurns,
    viewer: DVec3,
    ticks: u64,
}

impl<B: GenerationBackend> Planet<B> {
    /// Six cube-sphere faces around `center`.
    pub fn sphere(
        center: DVec3,
        radius: f64,
        settings: LodSettings,
        backend: B,
    ) -> Result<Self, LodError> {
        if !(radius.is_finite() && radius > 0.0) || !center.is_finite() {
            return Err(LodError::InvalidSettings(format!(
                "planet radius {radius} must be positive and finite"
            )));
        }
        Self::with_roots(
            cube_sphere_quads(center, radius).to_vec(),
            Surface::Sphere { center, radius },
            settings,
            backend,
        )
    }

    /// An `grid × grid` patch of flat terrain centred on the origin.
    pub fn flat(grid: u32, extent: f64, settings: LodSettings, backend: B) -> Result<Self, LodError> {
        if grid == 0 || !(extent.is_finite() && extent > 0.0) {
            return Err(LodError::InvalidSettings(format!(
                "flat grid {grid} with extent {extent}"
            )));
        }
        Self::with_roots(Quad::flat_grid(grid, extent), Surface::Plane, settings, backend)
    }

    fn with_roots(
        quads: Vec<Quad>,
        surface: Surface,
        settings: LodSettings,
        backend: B,
    ) -> Result<Self, LodError> {
        settings.validate()?;
        let mut planet = Self {
            settings,
            surface,
            backend,
            nodes: NodeArena::new(),
            roots: Vec::with_capacity(quads.len()),
            root_queues: TransitionQueues::default(),
            dirty_owners: VecDeque::new(),
            generation_queue: VecDeque::new(),
            retry_queue: Vec::new(),
            mesh_owners: HashMap::new(),
            meshes: MeshStore::new(),
            integrator: ResultIntegrator::new(),
            traversal: Vec::new(),
            turns: PhaseTurns { owed: [false; 3] },
            viewer: DVec3::ZERO,
            ticks: 0,
        };
        for (root, quad) in quads.into_iter().enumerate() {
            let id = planet.spawn_node(quad, 1, None, root);
            planet.roots.push(id);
        }
        info!(
            roots = planet.roots.len(),
            max_level = planet.settings.max_level,
            segments = planet.settings.segments,
            "planet created"
        );
        Ok(planet)
    }

    /// Run one budgeted tick for a viewer at `viewer`.
    pub fn tick(&mut self, viewer: DVec3) -> TickReport {
        self.viewer = viewer;
        self.ticks += 1;
        let mut budget = FrameBudget::start(self.settings.budget.frame_budget);
        let mut report = TickReport::default();

        // Chunks that failed last tick get another attempt now.
        self.generation_queue.extend(self.retry_queue.drain(..));

        if self.traversal.is_empty() && self.turns.all_taken() {
            self.traversal.extend(self.roots.iter().rev());
            self.turns.owed = [true; 3];
        }
        self.traverse(&mut budget, &mut report);

        if !self.turns.should_yield(PhaseTurns::INTEGRATE) && self.integrate(&mut budget, &mut report)
        {
            self.turns.owed[PhaseTurns::INTEGRATE] = false;
        }
        if !self.turns.should_yield(PhaseTurns::INTENTS) && self.drain_intents(&mut budget, &mut report)
        {
            self.turns.owed[PhaseTurns::INTENTS] = false;
        }
        if self.dispatch(&mut budget, &mut report) {
            self.turns.owed[PhaseTurns::DISPATCH] = false;
        }

        report.batches = budget.batches();
        report.deferred = budget.was_exhausted();
        report.elapsed = budget.elapsed();
        trace!(tick = self.ticks, ?report, "tick finished");
        report
    }

    fn traverse(&mut self, budget: &mut FrameBudget, report: &mut TickReport) {
        while !self.traversal.is_empty() {
            if !budget.allow_batch() {
                return;
            }
            for _ in 0..self.settings.budget.traversal_batch {
                let Some(id) = self.traversal.pop() else {
                    break;
                };
                self.visit(id, report);
            }
        }
    }

    fn visit(&mut self, id: NodeId, report: &mut TickReport) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        report.visited += 1;
        let distance = node.position.distance(self.viewer);
        let action = self
            .settings
            .thresholds
            .classify(node.level, node.size, distance);
        let can_split = node.level < self.settings.max_level
            && node.leaf().is_some_and(LeafNode::is_generated);
        let queued = node.queued;

        match (node.pending, node.child_ids()) {
            (Some(Transition::Splitting), _) => {
                if action == LodAction::Unify {
                    self.abort_split(id);
                    report.transitions_cancelled += 1;
                }
            }
            (Some(Transition::Unifying { replacement }), _) => {
                if action == LodAction::Split {
                    self.cancel_unify(id, replacement);
                    report.transitions_cancelled += 1;
                }
            }
            (None, None) => {
                if action == LodAction::Split && can_split && !queued {
                    self.enqueue_intent(id, IntentKind::Split);
                }
            }
            (None, Some(children)) => {
                if action == LodAction::Unify && !queued {
                    self.enqueue_intent(id, IntentKind::Unify);
                }
                self.traversal.extend(children.iter().rev());
            }
        }
    }

    fn enqueue_intent(&mut self, id: NodeId, kind: IntentKind) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        let owner = node.parent.map_or(QueueOwner::Planet, QueueOwner::Node);
        let Some(queues) = self.queues_mut(owner) else {
            return;
        };
        queues.push(kind, id);
        let newly_scheduled = !queues.scheduled;
        queues.scheduled = true;
        if newly_scheduled {
            self.dirty_owners.push_back(owner);
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.queued = true;
        }
        trace!(node = %id, ?kind, "intent queued");
    }

    fn queues_mut(&mut self, owner: QueueOwner) -> Option<&mut TransitionQueues> {
        match owner {
            QueueOwner::Planet => Some(&mut self.root_queues),
            QueueOwner::Node(id) => self.nodes.get_mut(id).map(|node| &mut node.queues),
        }
    }

    /// Returns whether the phase had its turn.
    fn integrate(&mut self, budget: &mut FrameBudget, report: &mut TickReport) -> bool {
        let batch = self.settings.budget.integration_batch;
        let mut took_turn = false;
        loop {
            if !budget.allow_batch() {
                return took_turn;
            }
            took_turn = true;
            let applied = self
                .integrator
                .drain_batch(&self.backend, &mut self.meshes, batch);
            let drained = applied.len();
            for outcome in applied {
                self.apply(outcome, report);
            }
            if drained < batch {
                return true;
            }
        }
    }

    fn apply(&mut self, outcome: Integration, report: &mut TickReport) {
        match outcome {
            Integration::Completed {
                mesh_id,
                average_position,
            } => {
                report.integrated += 1;
                self.on_leaf_generated(mesh_id, average_position, report);
            }
            Integration::Partial { .. } => report.integrated += 1,
            Integration::Stale { .. } | Integration::Duplicate { .. } => report.stale += 1,
            Integration::Failed(failure) => {
                report.failures += 1;
                self.on_leaf_failed(failure.mesh_id);
            }
        }
    }

    fn on_leaf_generated(&mut self, mesh_id: MeshId, average: DVec3, report: &mut TickReport) {
        let Some(&id) = self.mesh_owners.get(&mesh_id) else {
            return;
        };
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        let Some(leaf) = node.leaf_mut() else {
            return;
        };
        if leaf.mesh_id() != mesh_id {
            return;
        }
        leaf.mark_generated(average);
        node.position = average;
        let (parent, replaces) = (node.parent, node.replaces);

        if let Some(old) = replaces {
            self.swap_in(id, old, report);
            return;
        }
        if let Some(parent) = parent {
            let splitting = self
                .nodes
                .get(parent)
                .is_some_and(|p| p.pending == Some(Transition::Splitting));
            if splitting {
                self.try_complete_split(parent, report);
                return;
            }
        }
        self.meshes.show(mesh_id);
    }

    fn on_leaf_failed(&mut self, mesh_id: MeshId) {
        let Some(id) = self.mesh_owners.remove(&mesh_id) else {
            return;
        };
        // Partitions of the failed mesh still in flight become stale.
        self.meshes.dispose(mesh_id);

        let Some(failures) = self.nodes.get(id).and_then(Node::leaf).map(LeafNode::failures) else {
            return;
        };
        let placeholder = failures + 1 >= self.settings.max_transport_retries;
        let (segments, partitions) = if placeholder {
            (self.settings.placeholder_segments, 1)
        } else {
            (self.settings.segments, self.backend.partitions_per_chunk())
        };
        let fresh = self.meshes.allocate(expected_vertex_count(segments));
        let Some(leaf) = self.nodes.get_mut(id).and_then(Node::leaf_mut) else {
            self.meshes.dispose(fresh);
            return;
        };
        leaf.restart(fresh, segments, partitions);
        self.mesh_owners.insert(fresh, id);
        self.retry_queue.push((id, fresh));

        if placeholder {
            error!(
                node = %id,
                failures = failures + 1,
                segments,
                "chunk keeps failing, falling back to placeholder detail"
            );
        } else {
            warn!(node = %id, failures = failures + 1, "chunk generation failed, retrying next tick");
        }
    }

    fn try_complete_split(&mut self, parent: NodeId, report: &mut TickReport) {
        let Some(children) = self.nodes.get(parent).and_then(Node::child_ids) else {
            return;
        };
        let mut child_meshes = Vec::with_capacity(4);
        for child in children {
            match self.nodes.get(child).and_then(Node::leaf) {
                Some(leaf) if leaf.is_generated() => child_meshes.push(leaf.mesh_id()),
                _ => return,
            }
        }
        let Some(node) = self.nodes.get_mut(parent) else {
            return;
        };
        node.pending = None;
        let retired = node.retired_leaf.take();

        for mesh in child_meshes {
            self.meshes.show(mesh);
        }
        if let Some(leaf) = retired {
            self.dispose_leaf(&leaf);
        }
        report.splits_completed += 1;
        debug!(node = %parent, "split committed");
    }

    fn swap_in(&mut self, replacement: NodeId, old: NodeId, report: &mut TickReport) {
        let Some(node) = self.nodes.get_mut(replacement) else {
            return;
        };
        node.replaces = None;
        let (parent, root) = (node.parent, node.root);
        let mesh = node.leaf().map(LeafNode::mesh_id);

        match parent {
            Some(parent) => {
                if let Some(Children::Split(slots)) =
                    self.nodes.get_mut(parent).map(|p| &mut p.children)
                {
                    for slot in slots.iter_mut().filter(|slot| **slot == old) {
                        *slot = replacement;
                    }
                }
            }
            None => {
                if let Some(slot) = self.roots.get_mut(root).filter(|slot| **slot == old) {
                    *slot = replacement;
                }
            }
        }
        // Detach the replacement so it survives the disposal below.
        if let Some(old_node) = self.nodes.get_mut(old) {
            old_node.pending = None;
        }
        if let Some(mesh) = mesh {
            self.meshes.show(mesh);
        }
        let disposed = self.dispose_subtree(old);
        report.unifies_completed += 1;
        debug!(node = %replacement, replaced = %old, disposed, "unify committed");
    }

    fn abort_split(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        let Some(leaf) = node.retired_leaf.take() else {
            return;
        };
        let previous = std::mem::replace(&mut node.children, Children::Unified(leaf));
        node.pending = None;
        if let Children::Split(children) = previous {
            for child in children {
                self.dispose_subtree(child);
            }
        }
        debug!(node = %id, "split superseded by unify");
    }

    fn cancel_unify(&mut self, id: NodeId, replacement: NodeId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.pending = None;
        }
        self.dispose_subtree(replacement);
        debug!(node = %id, "unify superseded by split");
    }

    /// Remove `top` and everything beneath it, children before parents.
    ///
    /// Returns the number of nodes removed.
    fn dispose_subtree(&mut self, top: NodeId) -> usize {
        let mut open = vec![top];
        let mut order = Vec::new();
        while let Some(id) = open.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            order.push(id);
            if let Children::Split(children) = node.children {
                open.extend(children);
            }
            if let Some(Transition::Unifying { replacement }) = node.pending {
                open.push(replacement);
            }
        }
        for &id in order.iter().rev() {
            if let Some(node) = self.nodes.remove(id) {
                if let Children::Unified(leaf) = &node.children {
                    self.dispose_leaf(leaf);
                }
                if let Some(leaf) = &node.retired_leaf {
                    self.dispose_leaf(leaf);
                }
            }
        }
        order.len()
    }

    fn dispose_leaf(&mut self, leaf: &LeafNode) {
        let mesh = leaf.mesh_id();
        self.mesh_owners.remove(&mesh);
        self.meshes.hide(mesh);
        self.meshes.dispose(mesh);
    }

    /// Returns whether the phase had its turn.
    fn drain_intents(&mut self, budget: &mut FrameBudget, report: &mut TickReport) -> bool {
        if self.dirty_owners.is_empty() {
            return true;
        }
        let mut took_turn = false;
        let mut quota = self.settings.budget.transitions_per_tick;
        while quota > 0 {
            let Some(owner) = self.dirty_owners.pop_front() else {
                break;
            };
            if !budget.allow_batch() {
                self.dirty_owners.push_front(owner);
                break;
            }
            took_turn = true;

            let (intent, more) = match self.queues_mut(owner) {
                Some(queues) => {
                    let intent = queues.pop();
                    let more = !queues.is_empty();
                    queues.scheduled = more;
                    (intent, more)
                }
                None => (None, false),
            };
            if more {
                self.dirty_owners.push_back(owner);
            }
            let Some((kind, id)) = intent else {
                continue;
            };
            let Some(node) = self.nodes.get_mut(id) else {
                continue;
            };
            node.queued = false;
            quota -= 1;
            report.intents += 1;
            match kind {
                IntentKind::Split => self.execute_split(id, report),
                IntentKind::Unify => self.execute_unify(id, report),
            }
        }
        took_turn
    }

    /// Re-check an intent against the current viewer and tree.
    fn intent_still_valid(&self, node: &Node, kind: IntentKind) -> bool {
        let parent_busy = node
            .parent
            .and_then(|p| self.nodes.get(p))
            .is_some_and(Node::is_transitioning);
        if parent_busy || node.pending.is_some() {
            return false;
        }
        let distance = node.position.distance(self.viewer);
        let action = self
            .settings
            .thresholds
            .classify(node.level, node.size, distance);
        match kind {
            IntentKind::Split => {
                action == LodAction::Split
                    && node.level < self.settings.max_level
                    && node.leaf().is_some_and(LeafNode::is_generated)
            }
            IntentKind::Unify => action == LodAction::Unify && node.child_ids().is_some(),
        }
    }

    fn execute_split(&mut self, id: NodeId, report: &mut TickReport) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        if !self.intent_still_valid(node, IntentKind::Split) {
            trace!(node = %id, "split intent expired");
            return;
        }
        let (quad, level, root) = (node.quad, node.level, node.root);
        let children = quad
            .subdivide()
            .map(|child| self.spawn_node(child, level + 1, Some(id), root));

        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        if let Children::Unified(leaf) =
            std::mem::replace(&mut node.children, Children::Split(children))
        {
            node.retired_leaf = Some(leaf);
        }
        node.pending = Some(Transition::Splitting);
        report.splits_started += 1;
        debug!(node = %id, level, "split started");
    }

    fn execute_unify(&mut self, id: NodeId, report: &mut TickReport) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        if !self.intent_still_valid(node, IntentKind::Unify) {
            trace!(node = %id, "unify intent expired");
            return;
        }
        let (quad, level, parent, root) = (node.quad, node.level, node.parent, node.root);
        let replacement = self.spawn_node(quad, level, parent, root);
        if let Some(r) = self.nodes.get_mut(replacement) {
            r.replaces = Some(id);
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.pending = Some(Transition::Unifying { replacement });
        }
        report.unifies_started += 1;
        debug!(node = %id, %replacement, level, "unify started");
    }

    fn spawn_node(&mut self, quad: Quad, level: u32, parent: Option<NodeId>, root: usize) -> NodeId {
        let segments = self.settings.segments;
        let partitions = self.backend.partitions_per_chunk();
        let mesh_id = self.meshes.allocate(expected_vertex_count(segments));
        let id = self.nodes.insert_with(|id| {
            Node::new(
                id,
                quad,
                level,
                parent,
                root,
                LeafNode::new(quad, segments, partitions, mesh_id),
            )
        });
        self.mesh_owners.insert(mesh_id, id);
        self.generation_queue.push_back((id, mesh_id));
        id
    }

    /// Returns whether the phase had its turn.
    fn dispatch(&mut self, budget: &mut FrameBudget, report: &mut TickReport) -> bool {
        let mut took_turn = self.generation_queue.is_empty();
        while !self.generation_queue.is_empty() {
            if !budget.allow_batch() {
                return took_turn;
            }
            took_turn = true;
            for _ in 0..self.settings.budget.dispatch_batch {
                let Some((id, mesh)) = self.generation_queue.pop_front() else {
                    return true;
                };
                if !self.submit_leaf(id, mesh, report) {
                    // The backend is full; keep the order and try next tick.
                    self.generation_queue.push_front((id, mesh));
                    return true;
                }
            }
        }
        took_turn
    }

    /// Submit every remaining partition of a leaf. Returns `false` when the
    /// backend refused one.
    fn submit_leaf(&mut self, id: NodeId, mesh: MeshId, report: &mut TickReport) -> bool {
        let surface = self.surface;
        let Some(node) = self.nodes.get_mut(id) else {
            return true;
        };
        let level = node.level;
        let Some(leaf) = node.leaf_mut().filter(|leaf| leaf.mesh_id() == mesh) else {
            return true;
        };
        while let Some(task) = leaf.next_task(surface, level) {
            if self.backend.submit(task).is_err() {
                return false;
            }
            leaf.mark_dispatched();
            report.tasks_dispatched += 1;
        }
        true
    }

    pub fn settings(&self) -> &LodSettings {
        &self.settings
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    /// Current root nodes, one per face or grid cell.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
    }

    pub fn meshes(&self) -> &MeshStore {
        &self.meshes
    }

    /// Render events raised since the last call, oldest first.
    pub fn drain_render_events(&mut self) -> Vec<RenderEvent> {
        self.meshes.drain_events()
    }

    pub fn integrator_stats(&self) -> IntegratorStats {
        self.integrator.stats()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Nothing queued, in flight, or mid-transition.
    pub fn is_settled(&self) -> bool {
        self.generation_queue.is_empty()
            && self.retry_queue.is_empty()
            && self.dirty_owners.is_empty()
            && self.backend.in_flight() == 0
            && self.nodes.iter().all(|(_, node)| {
                !node.is_transitioning()
                    && node.leaf().is_none_or(|leaf| leaf.state() == LeafState::Generated)
            })
    }

    pub fn stats(&self) -> PlanetStats {
        let mut stats = PlanetStats {
            nodes: self.nodes.len(),
            split_intents: self.root_queues.split_len(),
            unify_intents: self.root_queues.unify_len(),
            generation_queue: self.generation_queue.len() + self.retry_queue.len(),
            meshes: self.meshes.len(),
            visible_meshes: self.meshes.visible_count(),
            in_flight_tasks: self.backend.in_flight(),
            ..Default::default()
        };
        for (_, node) in self.nodes.iter() {
            stats.max_depth = stats.max_depth.max(node.level);
            stats.split_intents += node.queues.split_len();
            stats.unify_intents += node.queues.unify_len();
            if node.is_transitioning() {
                stats.transitions += 1;
            }
            if let Some(leaf) = node.leaf() {
                match leaf.state() {
                    LeafState::Pending => stats.leaves_pending += 1,
                    LeafState::InFlight => stats.leaves_in_flight += 1,
                    LeafState::Generated => stats.leaves_generated += 1,
                }
            }
        }
        stats
    }
}
