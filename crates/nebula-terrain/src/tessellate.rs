//! Patch tessellation: grid a quad, project it, displace it, and colour it.
//!
//! Cell `(row, col)` becomes two triangles `p00 p10 p01` and `p01 p10 p11`,
//! where `p10` steps along the quad's `u` axis and `p01` along `v`. Both
//! triangles therefore wind like the quad itself.

use glam::{DVec3, Vec3};
use nebula_cubesphere::Quad;
use tracing::trace;

use crate::error::GenerationError;
use crate::heightmap::TerrainNoise;
use crate::protocol::{GenerationResult, GenerationTask};
use crate::transport::TransportPool;

/// Undisplaced triangle-list points for grid rows `rows` of a patch.
///
/// Row and column coordinates are computed from integer grid indices, so a
/// given grid point is bit-identical no matter which partition produces it.
pub fn tessellate(quad: &Quad, segments: u32, rows: std::ops::Range<u32>) -> Vec<DVec3> {
    let grid = grid_points(quad, segments, rows.clone(), |p| p);
    emit_triangles(&grid, segments, rows.len() as u32)
}

fn grid_points(
    quad: &Quad,
    segments: u32,
    rows: std::ops::Range<u32>,
    mut project: impl FnMut(DVec3) -> DVec3,
) -> Vec<DVec3> {
    let s = f64::from(segments);
    let width = segments as usize + 1;
    let mut grid = Vec::with_capacity((rows.len() + 1) * width);
    for row in rows.start..=rows.end {
        let v = f64::from(row) / s;
        for col in 0..=segments {
            let u = f64::from(col) / s;
            grid.push(project(quad.point_at(u, v)));
        }
    }
    grid
}

fn emit_triangles<T: Copy>(grid: &[T], segments: u32, row_count: u32) -> Vec<T> {
    let width = segments as usize + 1;
    let mut out = Vec::with_capacity(row_count as usize * segments as usize * 6);
    for row in 0..row_count as usize {
        for col in 0..segments as usize {
            let p00 = grid[row * width + col];
            let p10 = grid[row * width + col + 1];
            let p01 = grid[(row + 1) * width + col];
            let p11 = grid[(row + 1) * width + col + 1];
            out.extend_from_slice(&[p00, p10, p01, p01, p10, p11]);
        }
    }
    out
}

/// Height-ramp colour with a tint from the secondary noise field.
pub fn shade(height: f64, max_height: f64, tint: f64) -> Vec3 {
    const LOW: Vec3 = Vec3::new(0.76, 0.70, 0.50);
    const MID: Vec3 = Vec3::new(0.0, 0.40, 0.15);
    const HIGH: Vec3 = Vec3::new(0.45, 0.42, 0.40);
    const PEAK: Vec3 = Vec3::new(0.95, 0.95, 0.97);

    let t = if max_height > 0.0 {
        ((height / max_height) * 0.5 + 0.5).clamp(0.0, 1.0) as f32
    } else {
        0.5
    };
    let base = if t < 0.4 {
        LOW.lerp(MID, t / 0.4)
    } else if t < 0.75 {
        MID.lerp(HIGH, (t - 0.4) / 0.35)
    } else {
        HIGH.lerp(PEAK, (t - 0.75) / 0.25)
    };
    (base + Vec3::splat(tint as f32 * 0.15)).clamp(Vec3::ZERO, Vec3::ONE)
}

/// Execute one task: tessellate its rows, project and displace every grid
/// point, colour it, and write the triangle list into a leased buffer.
pub fn generate_partition(
    task: &GenerationTask,
    noise: &dyn TerrainNoise,
    transport: &TransportPool,
) -> Result<GenerationResult, GenerationError> {
    task.validate()?;

    let rows = task.partition_rows();
    let vertex_count = task.partition_vertex_count();
    let mut payload = transport.acquire(vertex_count)?;

    let max_height = noise.max_height();
    let surface = task.surface;
    let grid = grid_points(&task.quad, task.segments, rows.clone(), |p| p);
    let shaded: Vec<(DVec3, Vec3)> = grid
        .into_iter()
        .map(|point| {
            let mut h = 0.0;
            let (sample, vertex) = surface.project(point, |s| {
                h = noise.height(s);
                h
            });
            (vertex, shade(h, max_height, noise.color_noise(sample)))
        })
        .collect();

    let mut sum = DVec3::ZERO;
    for (vertex, color) in emit_triangles(&shaded, task.segments, rows.len() as u32) {
        sum += vertex;
        payload.push(vertex.as_vec3(), color)?;
    }

    let avg_position = if vertex_count > 0 {
        sum / vertex_count as f64
    } else {
        task.quad.centroid()
    };

    trace!(
        mesh_id = task.mesh_id.0,
        partition = task.partition_index,
        level = task.level,
        vertices = vertex_count,
        "partition generated"
    );

    Ok(GenerationResult {
        mesh_id: task.mesh_id,
        partition_index: task.partition_index,
        payload,
        avg_position,
        vertex_count,
        expected_vertex_count: task.expected_vertex_count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heightmap::{FlatNoise, NoiseSettings, PlanetNoise};
    use crate::protocol::{MeshId, Surface};
    use nebula_cubesphere::CubeFace;

    fn face_task(segments: u32, partition_index: u32, partition_count: u32) -> GenerationTask {
        GenerationTask {
            mesh_id: MeshId(7),
            quad: CubeFace::PosY.quad(DVec3::ZERO, 500.0),
            segments,
            partition_index,
            partition_count,
            surface: Surface::Sphere {
                center: DVec3::ZERO,
                radius: 500.0,
            },
            level: 1,
        }
    }

    #[test]
    fn test_partitions_concatenate_to_full_tessellation() {
        let noise = PlanetNoise::new(&NoiseSettings::default());
        let pool = TransportPool::new(1 << 20);

        let full = generate_partition(&face_task(4, 0, 1), &noise, &pool).unwrap();
        let first = generate_partition(&face_task(4, 0, 2), &noise, &pool).unwrap();
        let second = generate_partition(&face_task(4, 1, 2), &noise, &pool).unwrap();

        let mut joined = first.payload.vertices().to_vec();
        joined.extend_from_slice(second.payload.vertices());
        assert_eq!(joined, full.payload.vertices());

        let mut joined_colors = first.payload.colors().to_vec();
        joined_colors.extend_from_slice(second.payload.colors());
        assert_eq!(joined_colors, full.payload.colors());

        assert_eq!(full.vertex_count, 4 * 4 * 6);
        assert_eq!(first.vertex_count + second.vertex_count, full.vertex_count);
        assert_eq!(first.expected_vertex_count, full.vertex_count);
    }

    #[test]
    fn test_raw_tessellation_is_partition_independent() {
        let quad = CubeFace::NegX.quad(DVec3::ZERO, 1.0);
        let full = tessellate(&quad, 6, 0..6);
        let mut parts = tessellate(&quad, 6, 0..2);
        parts.extend(tessellate(&quad, 6, 2..4));
        parts.extend(tessellate(&quad, 6, 4..6));
        assert_eq!(parts, full);
    }

    #[test]
    fn test_triangles_wind_outward_on_sphere() {
        let quad = CubeFace::PosZ.quad(DVec3::ZERO, 10.0);
        let points = tessellate(&quad, 3, 0..3);
        for tri in points.chunks_exact(3) {
            let normal = (tri[1] - tri[0]).cross(tri[2] - tri[0]);
            let centroid = (tri[0] + tri[1] + tri[2]) / 3.0;
            assert!(normal.dot(centroid) > 0.0);
        }
    }

    #[test]
    fn test_flat_noise_puts_vertices_on_radius() {
        let pool = TransportPool::new(1 << 16);
        let result = generate_partition(&face_task(3, 0, 1), &FlatNoise, &pool).unwrap();
        for v in result.payload.vertices().chunks_exact(3) {
            let len = Vec3::new(v[0], v[1], v[2]).length();
            assert!((len - 500.0).abs() < 1e-2, "vertex at radius {len}");
        }
        // The mean of points on a spherical cap lies inside the sphere, on the
        // face axis.
        let avg = result.avg_position;
        assert!(avg.x.abs() < 1e-6 && avg.z.abs() < 1e-6);
        assert!(avg.y > 500.0 / 3f64.sqrt() && avg.y < 500.0);
    }

    #[test]
    fn test_plane_surface_keeps_xz() {
        let pool = TransportPool::new(1 << 16);
        let task = GenerationTask {
            quad: Quad::flat_grid(1, 20.0)[0],
            surface: Surface::Plane,
            ..face_task(2, 0, 1)
        };
        let result = generate_partition(&task, &FlatNoise, &pool).unwrap();
        assert!(result.payload.vertices().chunks_exact(3).all(|v| v[1] == 0.0));
        assert!(result.avg_position.length() < 1e-9);
    }

    #[test]
    fn test_malformed_task_leases_nothing() {
        let pool = TransportPool::new(1 << 16);
        let err = generate_partition(&face_task(0, 0, 1), &FlatNoise, &pool).unwrap_err();
        assert!(matches!(err, GenerationError::MalformedTask(_)));
        assert_eq!(pool.live_leases(), 0);
    }

    #[test]
    fn test_exhausted_transport_surfaces_as_error() {
        let pool = TransportPool::new(10);
        let err = generate_partition(&face_task(4, 0, 1), &FlatNoise, &pool).unwrap_err();
        assert!(matches!(err, GenerationError::Transport(_)));
        assert_eq!(pool.outstanding_floats(), 0);
    }

    #[test]
    fn test_shade_stays_in_unit_range() {
        for h in [-100.0, -5.0, 0.0, 5.0, 100.0] {
            for tint in [-1.0, 0.0, 1.0] {
                let c = shade(h, 10.0, tint);
                assert!(c.cmpge(Vec3::ZERO).all() && c.cmple(Vec3::ONE).all());
            }
        }
    }
}
