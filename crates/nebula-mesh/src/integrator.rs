//! Single consumer that folds worker output into the mesh store.
//!
//! Partitions of one mesh may arrive in any order and are appended in arrival
//! order; a partition index seen twice is ignored. Output for a mesh id that is
//! no longer in the store belongs to a superseded chunk and is dropped, which
//! reclaims its transport lease.

use glam::DVec3;
use nebula_terrain::{GenerationBackend, GenerationFailure, MeshId, WorkerOutput};
use tracing::{trace, warn};

use crate::mesh_store::MeshStore;

/// What applying one worker output did.
#[derive(Debug, Clone, PartialEq)]
pub enum Integration {
    /// A partition was appended; more are expected.
    Partial {
        mesh_id: MeshId,
        received: usize,
        expected: usize,
    },
    /// The mesh now holds every expected vertex.
    Completed {
        mesh_id: MeshId,
        average_position: DVec3,
    },
    /// The target mesh is gone. Nothing was touched.
    Stale { mesh_id: MeshId },
    /// The partition had already been appended.
    Duplicate { mesh_id: MeshId, partition: u32 },
    /// A worker could not produce a partition of a live mesh.
    Failed(GenerationFailure),
}

/// Running totals kept by the integrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntegratorStats {
    pub appended: u64,
    pub completed: u64,
    pub stale: u64,
    pub duplicates: u64,
    pub failures: u64,
}

#[derive(Debug, Default)]
pub struct ResultIntegrator {
    stats: IntegratorStats,
}

impl ResultIntegrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> IntegratorStats {
        self.stats
    }

    /// Apply one output to the store.
    pub fn integrate(&mut self, store: &mut MeshStore, output: WorkerOutput) -> Integration {
        let mesh_id = output.mesh_id();
        let Some(mesh) = store.get_mut(mesh_id) else {
            trace!(mesh_id = mesh_id.0, "discarding stale output");
            self.stats.stale += 1;
            return Integration::Stale { mesh_id };
        };

        match output {
            WorkerOutput::Failed(failure) => {
                warn!(
                    mesh_id = mesh_id.0,
                    partition = failure.partition_index,
                    error = %failure.error,
                    "chunk partition failed"
                );
                self.stats.failures += 1;
                Integration::Failed(failure)
            }
            WorkerOutput::Generated(result) => {
                if mesh.has_partition(result.partition_index) {
                    self.stats.duplicates += 1;
                    return Integration::Duplicate {
                        mesh_id,
                        partition: result.partition_index,
                    };
                }
                let (vertices, colors) = result.payload.into_parts();
                let completed =
                    mesh.append(result.partition_index, vertices, colors, result.avg_position);
                self.stats.appended += 1;

                if completed {
                    self.stats.completed += 1;
                    Integration::Completed {
                        mesh_id,
                        average_position: mesh.average_position().unwrap_or(result.avg_position),
                    }
                } else {
                    Integration::Partial {
                        mesh_id,
                        received: mesh.vertex_count(),
                        expected: mesh.expected_vertex_count(),
                    }
                }
            }
        }
    }

    /// Pull up to `max` outputs from `backend` and apply them.
    pub fn drain_batch(
        &mut self,
        backend: &dyn GenerationBackend,
        store: &mut MeshStore,
        max: usize,
    ) -> Vec<Integration> {
        let mut applied = Vec::new();
        while applied.len() < max {
            let Some(output) = backend.try_recv() else {
                break;
            };
            applied.push(self.integrate(store, output));
        }
        applied
    }
}
