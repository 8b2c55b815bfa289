//! Mesh storage for generated chunks and the integrator that fills it.

mod integrator;
mod mesh_store;

pub use integrator::{Integration, IntegratorStats, ResultIntegrator};
pub use mesh_store::{MeshStorage, MeshStore, RenderEvent};
