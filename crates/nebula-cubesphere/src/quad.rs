//! Planar 4-point terrain patches and their recursive subdivision.

use glam::DVec3;

/// Four ordered corners of a terrain patch.
///
/// Corners run `c0 → c1 → c2 → c3` around the patch. The edge `c0 → c1` is
/// the patch's `u` axis and `c0 → c3` its `v` axis, so the patch normal is
/// `(c1 - c0) × (c3 - c0)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quad {
    /// Corners in winding order.
    pub corners: [DVec3; 4],
}

impl Quad {
    /// Create a quad from four corners in winding order.
    #[must_use]
    pub const fn new(corners: [DVec3; 4]) -> Self {
        Self { corners }
    }

    /// Arithmetic mean of the four corners.
    #[must_use]
    pub fn centroid(&self) -> DVec3 {
        let [a, b, c, d] = self.corners;
        (a + b + c + d) * 0.25
    }

    /// Average distance from the corners to the centroid.
    #[must_use]
    pub fn size(&self) -> f64 {
        let centroid = self.centroid();
        self.corners
            .iter()
            .map(|c| c.distance(centroid))
            .sum::<f64>()
            * 0.25
    }

    /// Unit normal following the winding, or zero for a degenerate quad.
    #[must_use]
    pub fn normal(&self) -> DVec3 {
        let [c0, c1, _, c3] = self.corners;
        (c1 - c0).cross(c3 - c0).normalize_or_zero()
    }

    /// Bilinear point at patch coordinates `(u, v)` in `[0, 1]²`.
    ///
    /// Points on an edge depend only on that edge's two corners, so siblings
    /// that share an edge produce identical points along it.
    #[must_use]
    pub fn point_at(&self, u: f64, v: f64) -> DVec3 {
        let [c0, c1, c2, c3] = self.corners;
        let bottom = c0.lerp(c1, u);
        let top = c3.lerp(c2, u);
        bottom.lerp(top, v)
    }

    /// True when every corner coordinate is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.corners.iter().all(|c| c.is_finite())
    }

    /// True when the patch has (numerically) zero area.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        let [c0, c1, c2, c3] = self.corners;
        let area = (c1 - c0).cross(c3 - c0).length() + (c1 - c2).cross(c3 - c2).length();
        area <= f64::EPSILON * self.size().max(1.0).powi(2)
    }

    /// Split into four sub-quads through the edge midpoints and the center.
    ///
    /// Children are ordered `[near c0, near c1, near c2, near c3]` and keep
    /// the parent's winding. Every interior edge is shared exactly by two
    /// children.
    #[must_use]
    pub fn subdivide(&self) -> [Quad; 4] {
        let [c0, c1, c2, c3] = self.corners;
        let m01 = midpoint(c0, c1);
        let m12 = midpoint(c1, c2);
        let m23 = midpoint(c2, c3);
        let m30 = midpoint(c3, c0);
        let center = midpoint(c0, c2);

        [
            Quad::new([c0, m01, center, m30]),
            Quad::new([m01, c1, m12, center]),
            Quad::new([center, m12, c2, m23]),
            Quad::new([m30, center, m23, c3]),
        ]
    }

    /// Rebuild the parent quad from the children of [`Quad::subdivide`].
    #[must_use]
    pub fn recombine(children: &[Quad; 4]) -> Quad {
        Quad::new([
            children[0].corners[0],
            children[1].corners[1],
            children[2].corners[2],
            children[3].corners[3],
        ])
    }

    /// An `n × n` grid of quads tiling the square `[-extent/2, extent/2]²` on
    /// the XZ plane, wound so every normal points along +Y.
    #[must_use]
    pub fn flat_grid(n: u32, extent: f64) -> Vec<Quad> {
        let n = n.max(1);
        let step = extent / f64::from(n);
        let origin = -extent * 0.5;
        let mut quads = Vec::with_capacity((n * n) as usize);
        for row in 0..n {
            for col in 0..n {
                let x0 = origin + f64::from(col) * step;
                let z0 = origin + f64::from(row) * step;
                let (x1, z1) = (x0 + step, z0 + step);
                quads.push(Quad::new([
                    DVec3::new(x0, 0.0, z1),
                    DVec3::new(x1, 0.0, z1),
                    DVec3::new(x1, 0.0, z0),
                    DVec3::new(x0, 0.0, z0),
                ]));
            }
        }
        quads
    }
}

/// Midpoint of two points.
#[inline]
#[must_use]
pub fn midpoint(a: DVec3, b: DVec3) -> DVec3 {
    (a + b) * 0.5
}
