//! Camera projection from world coordinates to pixels.

use nalgebra::{Matrix3, Matrix3x4, Matrix4, Point3, Vector4};

use crate::physics::CameraState;

/// A 3×4 matrix mapping homogeneous world points to homogeneous pixels.
///
/// Built the way a MuJoCo camera is: translate the camera to the origin,
/// rotate into the camera frame, apply focal scaling (x mirrored, since the
/// camera looks along -Z) and shift to the image centre.
///
/// # Example
///
/// ```
/// use sim_navigate::{CameraMatrix, CameraState};
/// use nalgebra::{Matrix3, Point3};
///
/// // Looking straight down from 1 m above the origin.
/// let state = CameraState {
///     position: Point3::new(0.0, 0.0, 1.0),
///     rotation: Matrix3::identity(),
///     fovy: 90.0,
/// };
/// let camera = CameraMatrix::new(&state, 81, 81);
/// assert_eq!(camera.point_to_pixel(&Point3::origin()), Some([40, 40]));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraMatrix {
    matrix: Matrix3x4<f64>,
    width: u32,
    height: u32,
}

impl CameraMatrix {
    /// Build the projection for a camera state and image size.
    #[must_use]
    pub fn new(state: &CameraState, width: u32, height: u32) -> Self {
        let mut translation = Matrix4::identity();
        translation
            .fixed_view_mut::<3, 1>(0, 3)
            .copy_from(&(-state.position.coords));

        let mut rotation = Matrix4::identity();
        rotation
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&state.rotation.transpose());

        let focal_scaling = (1.0 / (state.fovy.to_radians() / 2.0).tan()) * f64::from(height) / 2.0;
        #[rustfmt::skip]
        let focal = Matrix3x4::new(
            -focal_scaling, 0.0, 0.0, 0.0,
            0.0, focal_scaling, 0.0, 0.0,
            0.0, 0.0, 1.0, 0.0,
        );

        let mut image = Matrix3::identity();
        image[(0, 2)] = (f64::from(width) - 1.0) / 2.0;
        image[(1, 2)] = (f64::from(height) - 1.0) / 2.0;

        Self {
            matrix: image * focal * rotation * translation,
            width,
            height,
        }
    }

    /// Wrap an existing matrix.
    #[must_use]
    pub const fn from_matrix(matrix: Matrix3x4<f64>, width: u32, height: u32) -> Self {
        Self {
            matrix,
            width,
            height,
        }
    }

    /// The raw 3×4 matrix.
    #[must_use]
    pub const fn matrix(&self) -> &Matrix3x4<f64> {
        &self.matrix
    }

    /// Image width the matrix was built for.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Image height the matrix was built for.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Homogeneous scale of a point: negative in front of the camera.
    #[must_use]
    pub fn depth(&self, point: &Point3<f64>) -> f64 {
        (self.matrix * point.to_homogeneous())[2]
    }

    /// Sub-pixel `[x, y]` coordinates of a point.
    ///
    /// Returns `None` when the point lies in the camera plane.
    #[must_use]
    pub fn project(&self, point: &Point3<f64>) -> Option<[f64; 2]> {
        let h = self.matrix * Vector4::new(point.x, point.y, point.z, 1.0);
        if h[2].abs() < f64::EPSILON {
            return None;
        }
        Some([h[0] / h[2], h[1] / h[2]])
    }

    /// Pixel `[x, y]` of a point, rounded to the nearest integer.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn point_to_pixel(&self, point: &Point3<f64>) -> Option<[i32; 2]> {
        self.project(point)
            .map(|[x, y]| [x.round() as i32, y.round() as i32])
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn overhead(height: f64, fovy: f64) -> CameraState {
        CameraState {
            position: Point3::new(0.0, 0.0, height),
            rotation: Matrix3::identity(),
            fovy,
        }
    }

    #[test]
    fn test_centre_projects_to_image_centre() {
        let camera = CameraMatrix::new(&overhead(0.15, 45.0), 80, 80);
        let [x, y] = camera.project(&Point3::origin()).unwrap();
        assert_relative_eq!(x, 39.5, epsilon = 1e-9);
        assert_relative_eq!(y, 39.5, epsilon = 1e-9);
        assert!(camera.depth(&Point3::origin()) < 0.0);
    }

    #[test]
    fn test_fov_edge_maps_to_border() {
        // 90° fov, 1 m above: the point at y = 1 is on the top/bottom edge.
        let camera = CameraMatrix::new(&overhead(1.0, 90.0), 101, 101);
        let [x, y] = camera.project(&Point3::new(0.0, 1.0, 0.0)).unwrap();
        assert_relative_eq!(x, 50.0, epsilon = 1e-9);
        assert_relative_eq!((y - 50.0).abs(), 50.5, epsilon = 1e-9);
    }

    #[test]
    fn test_image_axes() {
        let camera = CameraMatrix::new(&overhead(1.0, 90.0), 101, 101);
        let [x_plus, _] = camera.project(&Point3::new(0.5, 0.0, 0.0)).unwrap();
        let [_, y_plus] = camera.project(&Point3::new(0.0, 0.5, 0.0)).unwrap();
        // Identity rotation: world +x grows the column, world +y shrinks the row.
        assert!(x_plus > 50.0);
        assert!(y_plus < 50.0);
    }

    #[test]
    fn test_translation_invariance() {
        let a = CameraMatrix::new(&overhead(1.0, 60.0), 64, 64);
        let shifted = CameraState {
            position: Point3::new(0.2, -0.1, 1.0),
            ..overhead(1.0, 60.0)
        };
        let b = CameraMatrix::new(&shifted, 64, 64);
        let p = Point3::new(0.05, 0.02, 0.0);
        let q = Point3::new(0.25, -0.08, 0.0);
        let pa = a.project(&p).unwrap();
        let qb = b.project(&q).unwrap();
        assert_relative_eq!(pa[0], qb[0], epsilon = 1e-9);
        assert_relative_eq!(pa[1], qb[1], epsilon = 1e-9);
    }

    #[test]
    fn test_point_to_pixel_rounds() {
        let camera = CameraMatrix::new(&overhead(0.15, 45.0), 81, 81);
        assert_eq!(camera.point_to_pixel(&Point3::origin()), Some([40, 40]));
        let [x, _] = camera.point_to_pixel(&Point3::new(0.01, 0.0, 0.0)).unwrap();
        assert!(x > 40);
    }

    #[test]
    fn test_plane_point_has_no_projection() {
        let camera = CameraMatrix::new(&overhead(1.0, 45.0), 10, 10);
        assert!(camera.project(&Point3::new(0.3, 0.3, 1.0)).is_none());
    }
}
