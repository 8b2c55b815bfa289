//! Per-chunk mesh storage shared with the render collaborator.
//!
//! The store has exactly one writer, the result integrator (plus the
//! coordinator for allocation, visibility and disposal). The renderer reads
//! [`MeshStorage`] entries and drains [`RenderEvent`]s once per frame.

use std::collections::HashMap;

use glam::DVec3;
use nebula_terrain::MeshId;

/// Visibility changes the render collaborator must apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderEvent {
    /// Start drawing the mesh.
    Show(MeshId),
    /// Stop drawing the mesh but keep its buffers.
    Hide(MeshId),
    /// Free the mesh's buffers; the id will never be used again.
    Delete(MeshId),
}

/// Vertex data accumulated for one chunk.
#[derive(Clone, Debug, Default)]
pub struct MeshStorage {
    vertices: Vec<f32>,
    colors: Vec<f32>,
    visible: bool,
    expected_vertices: usize,
    partitions: Vec<u32>,
    position_sum: DVec3,
    complete: bool,
}

impl MeshStorage {
    fn new(expected_vertices: usize) -> Self {
        Self {
            expected_vertices,
            ..Default::default()
        }
    }

    /// Flat `xyz` positions, append-only until disposal.
    pub fn vertices(&self) -> &[f32] {
        &self.vertices
    }

    /// Flat `rgb` colours, one triple per vertex.
    pub fn colors(&self) -> &[f32] {
        &self.colors
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn expected_vertex_count(&self) -> usize {
        self.expected_vertices
    }

    /// Whether every expected vertex has arrived.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Whether `partition` has already been appended.
    pub fn has_partition(&self, partition: u32) -> bool {
        self.partitions.contains(&partition)
    }

    /// Vertex-weighted mean position of everything received so far.
    pub fn average_position(&self) -> Option<DVec3> {
        let n = self.vertex_count();
        (n > 0).then(|| self.position_sum / n as f64)
    }

    /// Append one partition's batch. Returns `true` when this append
    /// completes the mesh.
    pub(crate) fn append(
        &mut self,
        partition: u32,
        vertices: Vec<f32>,
        colors: Vec<f32>,
        avg_position: DVec3,
    ) -> bool {
        let count = vertices.len() / 3;
        if self.vertices.is_empty() {
            self.vertices = vertices;
            self.colors = colors;
        } else {
            self.vertices.extend_from_slice(&vertices);
            self.colors.extend_from_slice(&colors);
        }
        self.partitions.push(partition);
        self.position_sum += avg_position * count as f64;

        let completes = !self.complete && self.vertex_count() >= self.expected_vertices;
        self.complete |= completes;
        completes
    }
}

/// All live meshes, keyed by [`MeshId`].
#[derive(Debug, Default)]
pub struct MeshStore {
    meshes: HashMap<MeshId, MeshStorage>,
    next_id: u64,
    events: Vec<RenderEvent>,
}

impl MeshStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty entry expecting `expected_vertices` vertices.
    pub fn allocate(&mut self, expected_vertices: usize) -> MeshId {
        let id = MeshId(self.next_id);
        self.next_id += 1;
        self.meshes.insert(id, MeshStorage::new(expected_vertices));
        id
    }

    pub fn get(&self, id: MeshId) -> Option<&MeshStorage> {
        self.meshes.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: MeshId) -> Option<&mut MeshStorage> {
        self.meshes.get_mut(&id)
    }

    pub fn contains(&self, id: MeshId) -> bool {
        self.meshes.contains_key(&id)
    }

    /// Mark a mesh visible. No event is recorded if it already was.
    pub fn show(&mut self, id: MeshId) -> bool {
        self.set_visible(id, true)
    }

    /// Mark a mesh hidden. No event is recorded if it already was.
    pub fn hide(&mut self, id: MeshId) -> bool {
        self.set_visible(id, false)
    }

    fn set_visible(&mut self, id: MeshId, visible: bool) -> bool {
        let Some(mesh) = self.meshes.get_mut(&id) else {
            return false;
        };
        if mesh.visible == visible {
            return false;
        }
        mesh.visible = visible;
        self.events.push(if visible {
            RenderEvent::Show(id)
        } else {
            RenderEvent::Hide(id)
        });
        true
    }

    /// Remove a mesh and tell the renderer to free it.
    ///
    /// Returns `false` if the id was not live.
    pub fn dispose(&mut self, id: MeshId) -> bool {
        if self.meshes.remove(&id).is_some() {
            self.events.push(RenderEvent::Delete(id));
            true
        } else {
            false
        }
    }

    /// Take every event recorded since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<RenderEvent> {
        std::mem::take(&mut self.events)
    }

    /// Events waiting to be drained.
    pub fn pending_events(&self) -> &[RenderEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// Number of meshes currently visible.
    pub fn visible_count(&self) -> usize {
        self.meshes.values().filter(|m| m.visible).count()
    }

    /// Vertices held across all meshes.
    pub fn total_vertices(&self) -> usize {
        self.meshes.values().map(MeshStorage::vertex_count).sum()
    }

    /// Iterate over live meshes.
    pub fn iter(&self) -> impl Iterator<Item = (MeshId, &MeshStorage)> {
        self.meshes.iter().map(|(id, mesh)| (*id, mesh))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_never_reused() {
        let mut store = MeshStore::new();
        let a = store.allocate(6);
        assert!(store.dispose(a));
        let b = store.allocate(6);
        assert_ne!(a, b);
        assert!(!store.contains(a));
    }

    #[test]
    fn test_visibility_events_only_on_change() {
        let mut store = MeshStore::new();
        let id = store.allocate(6);
        assert!(store.show(id));
        assert!(!store.show(id));
        assert!(store.hide(id));
        assert!(store.dispose(id));
        assert!(!store.dispose(id));
        assert!(!store.show(id));
        assert_eq!(
            store.drain_events(),
            vec![
                RenderEvent::Show(id),
                RenderEvent::Hide(id),
                RenderEvent::Delete(id)
            ]
        );
        assert!(store.drain_events().is_empty());
    }

    #[test]
    fn test_append_accumulates_until_complete() {
        let mut store = MeshStore::new();
        let id = store.allocate(2);
        let mesh = store.get_mut(id).unwrap();
        assert!(!mesh.append(1, vec![2.0, 0.0, 0.0], vec![1.0; 3], DVec3::new(2.0, 0.0, 0.0)));
        assert!(mesh.append(0, vec![0.0; 3], vec![0.5; 3], DVec3::ZERO));
        assert!(mesh.is_complete());
        assert_eq!(mesh.vertices(), &[2.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(mesh.average_position(), Some(DVec3::new(1.0, 0.0, 0.0)));
        assert!(mesh.has_partition(0) && mesh.has_partition(1));
    }
}
