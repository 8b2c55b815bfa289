//! Cube-sphere patch geometry: face root quads and edge-matching quad subdivision.

mod cube_face;
mod quad;

pub use cube_face::{CubeFace, cube_sphere_quads};
pub use quad::{Quad, midpoint};
