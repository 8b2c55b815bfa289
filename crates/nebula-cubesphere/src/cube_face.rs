//! The six faces of a cubesphere, their basis vectors, and their root quads.

use glam::DVec3;

use crate::quad::Quad;

/// The six faces of the cube that forms the cubesphere.
///
/// Each variant corresponds to a face whose outward normal points
/// along the named axis direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum CubeFace {
    /// +X face
    PosX = 0,
    /// −X face
    NegX = 1,
    /// +Y face
    PosY = 2,
    /// −Y face
    NegY = 3,
    /// +Z face
    PosZ = 4,
    /// −Z face
    NegZ = 5,
}

impl CubeFace {
    /// All six faces in canonical order.
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PosX,
        CubeFace::NegX,
        CubeFace::PosY,
        CubeFace::NegY,
        CubeFace::PosZ,
        CubeFace::NegZ,
    ];

    /// Outward-pointing unit normal for this face.
    #[must_use]
    pub fn normal(self) -> DVec3 {
        match self {
            CubeFace::PosX => DVec3::X,
            CubeFace::NegX => DVec3::NEG_X,
            CubeFace::PosY => DVec3::Y,
            CubeFace::NegY => DVec3::NEG_Y,
            CubeFace::PosZ => DVec3::Z,
            CubeFace::NegZ => DVec3::NEG_Z,
        }
    }

    /// Tangent vector: direction of the first quad edge (corner 0 → corner 1).
    #[must_use]
    pub fn tangent(self) -> DVec3 {
        match self {
            CubeFace::PosX => DVec3::NEG_Z,
            CubeFace::NegX => DVec3::Z,
            CubeFace::PosY => DVec3::X,
            CubeFace::NegY => DVec3::X,
            CubeFace::PosZ => DVec3::X,
            CubeFace::NegZ => DVec3::NEG_X,
        }
    }

    /// Bitangent vector: direction of the last quad edge (corner 0 → corner 3).
    #[must_use]
    pub fn bitangent(self) -> DVec3 {
        match self {
            CubeFace::PosX => DVec3::Y,
            CubeFace::NegX => DVec3::Y,
            CubeFace::PosY => DVec3::NEG_Z,
            CubeFace::NegY => DVec3::Z,
            CubeFace::PosZ => DVec3::Y,
            CubeFace::NegZ => DVec3::Y,
        }
    }

    /// The root quad of this face for a cube inscribing a sphere of `radius`
    /// around `center`.
    ///
    /// Corners are wound so that `(c1 - c0) × (c3 - c0)` points away from the
    /// center. Corners are shared bit-for-bit with the adjacent faces.
    #[must_use]
    pub fn quad(self, center: DVec3, radius: f64) -> Quad {
        let n = self.normal();
        let t = self.tangent();
        let b = self.bitangent();
        Quad::new([
            center + (n - t - b) * radius,
            center + (n + t - b) * radius,
            center + (n + t + b) * radius,
            center + (n - t + b) * radius,
        ])
    }
}

/// Root quads for all six faces, in [`CubeFace::ALL`] order.
#[must_use]
pub fn cube_sphere_quads(center: DVec3, radius: f64) -> [Quad; 6] {
    CubeFace::ALL.map(|face| face.quad(center, radius))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tangent_cross_bitangent_equals_normal() {
        for face in CubeFace::ALL {
            let cross = face.tangent().cross(face.bitangent());
            assert!(
                (cross - face.normal()).length() < 1e-12,
                "tangent x bitangent != normal for {face:?}: got {cross:?}"
            );
        }
    }

    #[test]
    fn test_face_quads_wind_outward() {
        let center = DVec3::new(10.0, -4.0, 2.5);
        for face in CubeFace::ALL {
            let quad = face.quad(center, 50.0);
            let outward = quad.centroid() - center;
            assert!(
                quad.normal().dot(outward) > 0.0,
                "{face:?} quad winds inward"
            );
        }
    }

    #[test]
    fn test_face_centroid_lies_on_sphere() {
        for face in CubeFace::ALL {
            let quad = face.quad(DVec3::ZERO, 100.0);
            assert!((quad.centroid().length() - 100.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_adjacent_faces_share_corners_exactly() {
        let quads = cube_sphere_quads(DVec3::ZERO, 3.0);
        // Every cube corner is referenced by exactly three faces.
        let mut corners: Vec<(DVec3, usize)> = Vec::new();
        for quad in &quads {
            for c in quad.corners {
                match corners.iter_mut().find(|(p, _)| *p == c) {
                    Some((_, count)) => *count += 1,
                    None => corners.push((c, 1)),
                }
            }
        }
        assert_eq!(corners.len(), 8);
        assert!(corners.iter().all(|(_, count)| *count == 3));
    }
}
