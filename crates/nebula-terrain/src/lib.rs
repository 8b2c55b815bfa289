//! Terrain patch generation: noise, tessellation, the worker protocol, budgeted
//! transport buffers, and the worker pool that runs it all off the main thread.

mod error;
mod heightmap;
mod protocol;
mod tessellate;
mod transport;
mod worker_pool;

pub use error::{GenerationError, TransportError};
pub use heightmap::{
    FlatNoise, HeightmapParams, HeightmapSampler, NoiseSettings, PlanetNoise, TerrainNoise,
};
pub use protocol::{
    GenerationFailure, GenerationResult, GenerationTask, MAX_SEGMENTS, MeshId, Surface,
    WorkerOutput, expected_vertex_count,
};
pub use tessellate::{generate_partition, shade, tessellate};
pub use transport::{LeaseId, TransportBuffer, TransportPool};
pub use worker_pool::{
    GenerationBackend, InlineGenerator, ShutdownToken, WorkerPool, WorkerPoolConfig, execute,
};
