//! Quadtree node: one leaf when unified, four children when split.

use std::collections::VecDeque;

use glam::DVec3;
use nebula_cubesphere::Quad;

use crate::arena::NodeId;
use crate::leaf::LeafNode;

/// The two stable shapes of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    Unified,
    Split,
}

/// What a node currently holds. Exactly one variant, so a node can never be
/// both empty and populated.
#[derive(Clone, Debug)]
pub enum Children {
    Unified(LeafNode),
    Split([NodeId; 4]),
}

/// A transition that has started but not yet been committed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Four children are generating; the old leaf stays on screen.
    Splitting,
    /// A replacement unified node is generating; the subtree stays on screen.
    Unifying { replacement: NodeId },
}

/// Which way a queued intent points.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntentKind {
    Split,
    Unify,
}

/// Split and unify intents raised by the children of one owner.
#[derive(Debug, Default)]
pub struct TransitionQueues {
    pub(crate) split: VecDeque<NodeId>,
    pub(crate) unify: VecDeque<NodeId>,
    /// Whether the owner is already listed for draining.
    pub(crate) scheduled: bool,
}

impl TransitionQueues {
    pub(crate) fn push(&mut self, kind: IntentKind, id: NodeId) {
        match kind {
            IntentKind::Split => self.split.push_back(id),
            IntentKind::Unify => self.unify.push_back(id),
        }
    }

    /// Oldest split intent first, then unify intents.
    pub(crate) fn pop(&mut self) -> Option<(IntentKind, NodeId)> {
        self.split
            .pop_front()
            .map(|id| (IntentKind::Split, id))
            .or_else(|| self.unify.pop_front().map(|id| (IntentKind::Unify, id)))
    }

    pub fn split_len(&self) -> usize {
        self.split.len()
    }

    pub fn unify_len(&self) -> usize {
        self.unify.len()
    }

    pub fn is_empty(&self) -> bool {
        self.split.is_empty() && self.unify.is_empty()
    }
}

#[derive(Debug)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) quad: Quad,
    pub(crate) level: u32,
    pub(crate) parent: Option<NodeId>,
    pub(crate) root: usize,
    pub(crate) centroid: DVec3,
    pub(crate) size: f64,
    pub(crate) position: DVec3,
    pub(crate) children: Children,
    pub(crate) retired_leaf: Option<LeafNode>,
    pub(crate) pending: Option<Transition>,
    /// Set while an intent for this node waits in its owner's queues.
    pub(crate) queued: bool,
    /// The node this one will take the place of once generated.
    pub(crate) replaces: Option<NodeId>,
    pub(crate) queues: TransitionQueues,
}

impl Node {
    pub(crate) fn new(
        id: NodeId,
        quad: Quad,
        level: u32,
        parent: Option<NodeId>,
        root: usize,
        leaf: LeafNode,
    ) -> Self {
        let centroid = quad.centroid();
        Self {
            id,
            quad,
            level,
            parent,
            root,
            centroid,
            size: quad.size(),
            position: centroid,
            children: Children::Unified(leaf),
            retired_leaf: None,
            pending: None,
            queued: false,
            replaces: None,
            queues: TransitionQueues::default(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn quad(&self) -> &Quad {
        &self.quad
    }

    /// Subdivision level; roots are level 1.
    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Index of the root tree this node belongs to.
    pub fn root(&self) -> usize {
        self.root
    }

    pub fn centroid(&self) -> DVec3 {
        self.centroid
    }

    /// Mean corner distance from the centroid.
    pub fn size(&self) -> f64 {
        self.size
    }

    /// Point used for distance checks: the generated mean vertex position
    /// once known, the planar centroid before that.
    pub fn position(&self) -> DVec3 {
        self.position
    }

    pub fn state(&self) -> NodeState {
        match self.children {
            Children::Unified(_) => NodeState::Unified,
            Children::Split(_) => NodeState::Split,
        }
    }

    pub fn children(&self) -> &Children {
        &self.children
    }

    /// The leaf when unified.
    pub fn leaf(&self) -> Option<&LeafNode> {
        match &self.children {
            Children::Unified(leaf) => Some(leaf),
            Children::Split(_) => None,
        }
    }

    pub(crate) fn leaf_mut(&mut self) -> Option<&mut LeafNode> {
        match &mut self.children {
            Children::Unified(leaf) => Some(leaf),
            Children::Split(_) => None,
        }
    }

    /// The child ids when split.
    pub fn child_ids(&self) -> Option<[NodeId; 4]> {
        match self.children {
            Children::Split(ids) => Some(ids),
            Children::Unified(_) => None,
        }
    }

    /// The leaf kept on screen while a split is in flight.
    pub fn retired_leaf(&self) -> Option<&LeafNode> {
        self.retired_leaf.as_ref()
    }

    pub fn pending(&self) -> Option<Transition> {
        self.pending
    }

    pub fn is_transitioning(&self) -> bool {
        self.pending.is_some()
    }

    /// Set on a replacement node until it has been swapped in.
    pub fn replaces(&self) -> Option<NodeId> {
        self.replaces
    }

    pub fn queues(&self) -> &TransitionQueues {
        &self.queues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::NodeArena;
    use nebula_terrain::MeshId;

    #[test]
    fn test_new_node_is_unified_at_centroid() {
        let quad = Quad::flat_grid(1, 10.0)[0];
        let mut arena = NodeArena::new();
        let id = arena.insert_with(|id| {
            Node::new(id, quad, 1, None, 0, LeafNode::new(quad, 4, 1, MeshId(0)))
        });
        let node = arena.get(id).unwrap();
        assert_eq!(node.id(), id);
        assert_eq!(node.state(), NodeState::Unified);
        assert_eq!(node.position(), quad.centroid());
        assert!(node.leaf().is_some());
        assert!(node.child_ids().is_none());
        assert!(!node.is_transitioning());
    }

    #[test]
    fn test_queues_drain_splits_before_unifies() {
        let mut arena = NodeArena::new();
        let a = arena.insert_with(|_| ());
        let b = arena.insert_with(|_| ());
        let mut queues = TransitionQueues::default();
        queues.push(IntentKind::Unify, a);
        queues.push(IntentKind::Split, b);
        assert_eq!(queues.pop(), Some((IntentKind::Split, b)));
        assert_eq!(queues.pop(), Some((IntentKind::Unify, a)));
        assert!(queues.pop().is_none());
        assert!(queues.is_empty());
    }
}
