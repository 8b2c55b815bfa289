//! Typed task and result messages exchanged with the generation workers.

use std::fmt;
use std::ops::Range;

use glam::DVec3;
use nebula_cubesphere::Quad;

use crate::error::GenerationError;
use crate::transport::TransportBuffer;

/// Largest grid density a single task may request.
pub const MAX_SEGMENTS: u32 = 1024;

/// Identifier of one mesh-storage entry.
///
/// Ids are never reused, so a result carrying an id whose storage is gone is
/// recognisably stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u64);

impl fmt::Display for MeshId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mesh#{}", self.0)
    }
}

/// The surface a patch is projected onto before displacement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Surface {
    /// Normalise each grid point around `center`, scale to `radius`, then
    /// displace along the radial direction.
    Sphere { center: DVec3, radius: f64 },
    /// Keep the grid point and displace along +Y.
    Plane,
}

impl Surface {
    /// Project a planar grid point and displace it by `height`.
    ///
    /// Returns the undisplaced surface point (the noise sample point) and the
    /// displaced vertex.
    pub fn project(&self, point: DVec3, height: impl FnOnce(DVec3) -> f64) -> (DVec3, DVec3) {
        match *self {
            Surface::Sphere { center, radius } => {
                let dir = (point - center).normalize_or_zero();
                let sample = dir * radius;
                let h = height(sample);
                (sample, center + dir * (radius + h))
            }
            Surface::Plane => {
                let h = height(point);
                (point, point + DVec3::Y * h)
            }
        }
    }
}

/// One unit of worker work: a slice of rows of one patch's grid.
///
/// Immutable once submitted.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationTask {
    /// Mesh-storage entry the output is appended to.
    pub mesh_id: MeshId,
    /// Patch to tessellate.
    pub quad: Quad,
    /// Grid cells per patch edge.
    pub segments: u32,
    /// Which slice of rows this task covers.
    pub partition_index: u32,
    /// Total slices the patch was cut into.
    pub partition_count: u32,
    /// Projection applied to every grid point.
    pub surface: Surface,
    /// Subdivision level of the owning node, for diagnostics.
    pub level: u32,
}

impl GenerationTask {
    /// Check that the task can be executed as described.
    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.segments == 0 || self.segments > MAX_SEGMENTS {
            return Err(GenerationError::MalformedTask(format!(
                "segments {} outside 1..={MAX_SEGMENTS}",
                self.segments
            )));
        }
        if self.partition_count == 0 || self.partition_index >= self.partition_count {
            return Err(GenerationError::MalformedTask(format!(
                "partition {} of {}",
                self.partition_index, self.partition_count
            )));
        }
        if !self.quad.is_finite() || self.quad.is_degenerate() {
            return Err(GenerationError::MalformedTask(
                "quad is non-finite or degenerate".into(),
            ));
        }
        if let Surface::Sphere { center, radius } = self.surface {
            if !center.is_finite() || !radius.is_finite() || radius <= 0.0 {
                return Err(GenerationError::MalformedTask(format!(
                    "invalid planet radius {radius}"
                )));
            }
        }
        Ok(())
    }

    /// Grid rows `[s*i/c, s*(i+1)/c)` covered by this partition.
    ///
    /// Rows of all partitions tile `0..segments` in order.
    pub fn partition_rows(&self) -> Range<u32> {
        let s = u64::from(self.segments);
        let c = u64::from(self.partition_count.max(1));
        let i = u64::from(self.partition_index);
        (s * i / c) as u32..(s * (i + 1) / c) as u32
    }

    /// Vertices the whole patch produces across every partition.
    pub fn expected_vertex_count(&self) -> usize {
        expected_vertex_count(self.segments)
    }

    /// Vertices this partition produces.
    pub fn partition_vertex_count(&self) -> usize {
        self.partition_rows().len() * self.segments as usize * 6
    }
}

/// Vertices of a `segments × segments` triangle-list patch.
pub fn expected_vertex_count(segments: u32) -> usize {
    let s = segments as usize;
    s * s * 6
}

/// A generated slice of a patch.
#[derive(Debug)]
pub struct GenerationResult {
    pub mesh_id: MeshId,
    pub partition_index: u32,
    /// Positions and colours, leased from the transport pool.
    pub payload: TransportBuffer,
    /// Mean displaced vertex position of this slice.
    pub avg_position: DVec3,
    /// Vertices in `payload`.
    pub vertex_count: usize,
    /// Vertices the complete mesh will hold.
    pub expected_vertex_count: usize,
}

/// A task that was attempted but could not deliver output.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationFailure {
    pub mesh_id: MeshId,
    pub partition_index: u32,
    pub error: GenerationError,
}

/// Everything a worker can send back.
#[derive(Debug)]
pub enum WorkerOutput {
    Generated(GenerationResult),
    Failed(GenerationFailure),
}

impl WorkerOutput {
    /// Mesh the output belongs to.
    pub fn mesh_id(&self) -> MeshId {
        match self {
            WorkerOutput::Generated(result) => result.mesh_id,
            WorkerOutput::Failed(failure) => failure.mesh_id,
        }
    }
}
