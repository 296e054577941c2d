//! Closed triangle meshes for volume queries.
//!
//! Phantoms ship a simplified, watertight surface mesh of the vessel lumen.
//! The task only needs three things from it: its bounding box, an
//! inside/outside test and uniform samples of the enclosed volume.

mod stl;

pub use stl::load_stl;

use nalgebra::{Point3, Vector3};
use rand::Rng;

/// Tolerance for ray/triangle intersection.
const RAY_EPSILON: f64 = 1e-12;

/// Inside-test ray directions, one per dominant axis, with unequal off-axis
/// components.
const RAY_DIRECTIONS: [[f64; 3]; 3] = [
    [1.0, 0.271_8, 0.141_4],
    [0.173_2, 1.0, 0.314_1],
    [0.223_6, 0.161_8, 1.0],
];

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Point3<f64>,
    /// Maximum corner.
    pub max: Point3<f64>,
}

impl Aabb {
    /// Create a box, reordering corners if needed.
    #[must_use]
    pub fn new(a: Point3<f64>, b: Point3<f64>) -> Self {
        Self {
            min: Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Edge lengths.
    #[must_use]
    pub fn size(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// Box volume.
    #[must_use]
    pub fn volume(&self) -> f64 {
        let s = self.size();
        s.x * s.y * s.z
    }

    /// Check if a point lies inside or on the box.
    #[must_use]
    pub fn contains(&self, p: &Point3<f64>) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }
}

/// A closed (watertight) triangle mesh.
///
/// Faces use counter-clockwise winding seen from outside.
///
/// # Example
///
/// ```
/// use sim_navigate::ClosedMesh;
/// use nalgebra::Point3;
///
/// let cube = ClosedMesh::cuboid(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
/// assert!(cube.contains(&Point3::new(0.5, 0.5, 0.5)));
/// assert!(!cube.contains(&Point3::new(1.5, 0.5, 0.5)));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClosedMesh {
    /// Vertex positions.
    pub vertices: Vec<Point3<f64>>,
    /// Triangles as vertex indices.
    pub faces: Vec<[u32; 3]>,
}

impl ClosedMesh {
    /// Create a mesh from parts.
    #[must_use]
    pub const fn from_parts(vertices: Vec<Point3<f64>>, faces: Vec<[u32; 3]>) -> Self {
        Self { vertices, faces }
    }

    /// Axis-aligned box between two corners.
    #[must_use]
    pub fn cuboid(a: Point3<f64>, b: Point3<f64>) -> Self {
        let bb = Aabb::new(a, b);
        let (lo, hi) = (bb.min, bb.max);
        let vertices = vec![
            Point3::new(lo.x, lo.y, lo.z),
            Point3::new(hi.x, lo.y, lo.z),
            Point3::new(hi.x, hi.y, lo.z),
            Point3::new(lo.x, hi.y, lo.z),
            Point3::new(lo.x, lo.y, hi.z),
            Point3::new(hi.x, lo.y, hi.z),
            Point3::new(hi.x, hi.y, hi.z),
            Point3::new(lo.x, hi.y, hi.z),
        ];
        let faces = vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [2, 3, 7],
            [2, 7, 6],
            [0, 4, 7],
            [0, 7, 3],
            [1, 2, 6],
            [1, 6, 5],
        ];
        Self { vertices, faces }
    }

    /// Check if the mesh has no faces.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Bounding box, or `None` for a mesh without vertices.
    #[must_use]
    pub fn bounds(&self) -> Option<Aabb> {
        let first = *self.vertices.first()?;
        let mut min = first;
        let mut max = first;
        for v in &self.vertices[1..] {
            min = Point3::new(min.x.min(v.x), min.y.min(v.y), min.z.min(v.z));
            max = Point3::new(max.x.max(v.x), max.y.max(v.y), max.z.max(v.z));
        }
        Some(Aabb { min, max })
    }

    /// Uniformly scaled copy (about the origin).
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            vertices: self
                .vertices
                .iter()
                .map(|v| Point3::from(v.coords * factor))
                .collect(),
            faces: self.faces.clone(),
        }
    }

    /// Corner positions of one face.
    fn triangle(&self, face: [u32; 3]) -> Option<[Point3<f64>; 3]> {
        Some([
            *self.vertices.get(face[0] as usize)?,
            *self.vertices.get(face[1] as usize)?,
            *self.vertices.get(face[2] as usize)?,
        ])
    }

    /// Iterate over triangles, skipping faces with dangling indices.
    pub fn triangles(&self) -> impl Iterator<Item = [Point3<f64>; 3]> + '_ {
        self.faces.iter().filter_map(|f| self.triangle(*f))
    }

    /// Test if a point is inside the mesh.
    ///
    /// Casts three rays in skewed directions and takes the majority vote of
    /// the crossing parities. Skewed rays do not pass through the face
    /// centres and shared diagonals of axis-aligned boxes.
    #[must_use]
    pub fn contains(&self, point: &Point3<f64>) -> bool {
        if !self.bounds().is_some_and(|b| b.contains(point)) {
            return false;
        }
        let inside = RAY_DIRECTIONS
            .iter()
            .map(|[x, y, z]| Vector3::new(*x, *y, *z))
            .filter(|dir| self.count_crossings(point, dir) % 2 == 1)
            .count();
        inside >= 2
    }

    fn count_crossings(&self, origin: &Point3<f64>, direction: &Vector3<f64>) -> usize {
        self.triangles()
            .filter(|[v0, v1, v2]| {
                ray_triangle_intersect(origin, direction, v0, v1, v2, RAY_EPSILON).is_some()
            })
            .count()
    }

    /// Draw `n` points uniformly from the bounding box and keep the ones
    /// inside the mesh.
    ///
    /// The result holds between zero and `n` points.
    pub fn sample_volume<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<Point3<f64>> {
        let Some(bounds) = self.bounds() else {
            return Vec::new();
        };
        let size = bounds.size();
        (0..n)
            .map(|_| {
                Point3::new(
                    bounds.min.x + rng.gen::<f64>() * size.x,
                    bounds.min.y + rng.gen::<f64>() * size.y,
                    bounds.min.z + rng.gen::<f64>() * size.z,
                )
            })
            .filter(|p| self.contains(p))
            .collect()
    }
}

/// Möller–Trumbore ray/triangle intersection.
///
/// Returns the ray parameter `t > epsilon` of the hit, if any.
fn ray_triangle_intersect(
    origin: &Point3<f64>,
    direction: &Vector3<f64>,
    v0: &Point3<f64>,
    v1: &Point3<f64>,
    v2: &Point3<f64>,
    epsilon: f64,
) -> Option<f64> {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    let h = direction.cross(&edge2);
    let a = edge1.dot(&h);

    // Parallel
    if a.abs() < epsilon {
        return None;
    }

    let f = 1.0 / a;
    let s = origin - v0;
    let u = f * s.dot(&h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(&edge1);
    let v = f * direction.dot(&q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(&q);
    (t > epsilon).then_some(t)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn unit_cube() -> ClosedMesh {
        ClosedMesh::cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn test_bounds() {
        let b = unit_cube().bounds().unwrap();
        assert_eq!(b.min, Point3::origin());
        assert_eq!(b.max, Point3::new(1.0, 1.0, 1.0));
        assert_relative_eq!(b.volume(), 1.0);
        assert!(ClosedMesh::default().bounds().is_none());
    }

    #[test]
    fn test_contains() {
        let cube = unit_cube();
        assert!(cube.contains(&Point3::new(0.3, 0.6, 0.2)));
        assert!(!cube.contains(&Point3::new(-0.1, 0.5, 0.5)));
        assert!(!cube.contains(&Point3::new(0.5, 0.5, 2.0)));
    }

    #[test]
    fn test_centroid_inside() {
        assert!(unit_cube().contains(&Point3::new(0.5, 0.5, 0.5)));
        let slab = ClosedMesh::cuboid(Point3::new(-0.04, -0.01, -0.01), Point3::new(0.04, 0.22, 0.01));
        assert!(slab.contains(&Point3::new(0.0, 0.105, 0.0)));
        let wide = ClosedMesh::cuboid(Point3::origin(), Point3::new(0.5, 1.0, 2.0));
        assert!(wide.contains(&Point3::new(0.25, 0.5, 1.0)));
    }

    #[test]
    fn test_scaled() {
        let cube = unit_cube().scaled(0.9);
        let b = cube.bounds().unwrap();
        assert_relative_eq!(b.max.y, 0.9);
        assert!(!cube.contains(&Point3::new(0.95, 0.5, 0.5)));
    }

    #[test]
    fn test_sample_volume_inside() {
        let mesh = ClosedMesh::cuboid(Point3::new(-1.0, -2.0, 0.0), Point3::new(1.0, 2.0, 0.5));
        let mut rng = StdRng::seed_from_u64(7);
        let points = mesh.sample_volume(64, &mut rng);
        // A cuboid fills its own bounding box.
        assert_eq!(points.len(), 64);
        for p in &points {
            assert!(mesh.bounds().unwrap().contains(p));
        }
    }

    #[test]
    fn test_sample_volume_empty_mesh() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(ClosedMesh::default().sample_volume(10, &mut rng).is_empty());
    }
}
