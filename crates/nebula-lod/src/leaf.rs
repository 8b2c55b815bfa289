//! Terminal renderable chunk of the quadtree.

use glam::DVec3;
use nebula_cubesphere::Quad;
use nebula_terrain::{GenerationTask, MeshId, Surface, expected_vertex_count};

/// Generation progress of a leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeafState {
    /// Waiting for its tasks to be handed to the workers.
    Pending,
    /// Every task was submitted; results are outstanding.
    InFlight,
    /// Its mesh holds every expected vertex.
    Generated,
}

/// One chunk of terrain: a quad, its grid density, and the mesh it fills.
#[derive(Clone, Debug)]
pub struct LeafNode {
    quad: Quad,
    segments: u32,
    partitions: u32,
    mesh_id: MeshId,
    state: LeafState,
    dispatched: u32,
    failures: u32,
    avg_position: Option<DVec3>,
}

impl LeafNode {
    pub(crate) fn new(quad: Quad, segments: u32, partitions: u32, mesh_id: MeshId) -> Self {
        Self {
            quad,
            segments,
            partitions: partitions.clamp(1, segments.max(1)),
            mesh_id,
            state: LeafState::Pending,
            dispatched: 0,
            failures: 0,
            avg_position: None,
        }
    }

    pub fn quad(&self) -> &Quad {
        &self.quad
    }

    pub fn segments(&self) -> u32 {
        self.segments
    }

    pub fn partitions(&self) -> u32 {
        self.partitions
    }

    pub fn mesh_id(&self) -> MeshId {
        self.mesh_id
    }

    pub fn state(&self) -> LeafState {
        self.state
    }

    pub fn is_generated(&self) -> bool {
        self.state == LeafState::Generated
    }

    /// Failed generation attempts so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Mean generated vertex position, once generated.
    pub fn avg_position(&self) -> Option<DVec3> {
        self.avg_position
    }

    pub fn expected_vertex_count(&self) -> usize {
        expected_vertex_count(self.segments)
    }

    /// The partition that would be submitted next, if any remain.
    pub(crate) fn next_task(&self, surface: Surface, level: u32) -> Option<GenerationTask> {
        (self.state == LeafState::Pending && self.dispatched < self.partitions).then(|| {
            GenerationTask {
                mesh_id: self.mesh_id,
                quad: self.quad,
                segments: self.segments,
                partition_index: self.dispatched,
                partition_count: self.partitions,
                surface,
                level,
            }
        })
    }

    /// Record that the task from [`LeafNode::next_task`] was accepted.
    pub(crate) fn mark_dispatched(&mut self) {
        self.dispatched += 1;
        if self.dispatched >= self.partitions {
            self.state = LeafState::InFlight;
        }
    }

    pub(crate) fn mark_generated(&mut self, avg_position: DVec3) {
        self.state = LeafState::Generated;
        self.avg_position = Some(avg_position);
    }

    /// Start over with a fresh mesh after a failed attempt.
    pub(crate) fn restart(&mut self, mesh_id: MeshId, segments: u32, partitions: u32) {
        self.failures += 1;
        self.mesh_id = mesh_id;
        self.segments = segments;
        self.partitions = partitions.clamp(1, segments.max(1));
        self.state = LeafState::Pending;
        self.dispatched = 0;
        self.avg_position = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(partitions: u32) -> LeafNode {
        LeafNode::new(Quad::flat_grid(1, 10.0)[0], 4, partitions, MeshId(3))
    }

    #[test]
    fn test_dispatch_walks_partitions_then_goes_in_flight() {
        let mut leaf = leaf(2);
        let first = leaf.next_task(Surface::Plane, 2).unwrap();
        assert_eq!((first.partition_index, first.partition_count), (0, 2));
        leaf.mark_dispatched();
        assert_eq!(leaf.state(), LeafState::Pending);
        assert_eq!(leaf.next_task(Surface::Plane, 2).unwrap().partition_index, 1);
        leaf.mark_dispatched();
        assert_eq!(leaf.state(), LeafState::InFlight);
        assert!(leaf.next_task(Surface::Plane, 2).is_none());
    }

    #[test]
    fn test_partitions_never_exceed_rows() {
        assert_eq!(leaf(16).partitions(), 4);
        assert_eq!(leaf(0).partitions(), 1);
    }

    #[test]
    fn test_restart_resets_progress() {
        let mut leaf = leaf(2);
        leaf.mark_dispatched();
        leaf.mark_dispatched();
        leaf.restart(MeshId(9), 2, 1);
        assert_eq!(leaf.state(), LeafState::Pending);
        assert_eq!(leaf.mesh_id(), MeshId(9));
        assert_eq!(leaf.failures(), 1);
        assert_eq!(leaf.expected_vertex_count(), 24);
        assert_eq!(leaf.next_task(Surface::Plane, 1).unwrap().partition_count, 1);
    }

    #[test]
    fn test_generated_records_position() {
        let mut leaf = leaf(1);
        leaf.mark_generated(DVec3::new(1.0, 2.0, 3.0));
        assert!(leaf.is_generated());
        assert_eq!(leaf.avg_position(), Some(DVec3::new(1.0, 2.0, 3.0)));
    }
}
