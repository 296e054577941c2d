//! The seam to the physics engine.
//!
//! The task never integrates dynamics or rasterizes images itself. It reads
//! and writes simulator state through [`Physics`], and asks a
//! [`CompilePhysics`] backend to turn a [`WorldTree`] into a live handle at
//! the start of every episode.

use nalgebra::{Matrix3, Point3, Vector3};
use thiserror::Error;

use crate::scene_option::SceneOption;
use crate::world::WorldTree;

/// Errors raised by a physics backend.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PhysicsError {
    /// Camera name not present in the compiled model.
    #[error("unknown camera: {name}")]
    UnknownCamera {
        /// The requested name.
        name: String,
    },

    /// Camera id out of range.
    #[error("camera id {id} out of range ({count} cameras)")]
    CameraOutOfRange {
        /// The requested id.
        id: usize,
        /// Number of cameras in the model.
        count: usize,
    },

    /// Body name not present in the compiled model.
    #[error("unknown body: {name}")]
    UnknownBody {
        /// The requested name.
        name: String,
    },

    /// Named parameter not exposed by the backend.
    #[error("unknown parameter: {name}")]
    UnknownParameter {
        /// The requested name.
        name: String,
    },

    /// Control vector of the wrong length.
    #[error("control has {got} entries, model has {expected} actuators")]
    ControlSize {
        /// Number of actuators.
        expected: usize,
        /// Length of the supplied control.
        got: usize,
    },

    /// The world description could not be compiled.
    #[error("compile error: {reason}")]
    Compile {
        /// What went wrong.
        reason: String,
    },

    /// Rendering failed.
    #[error("render error: {reason}")]
    Render {
        /// What went wrong.
        reason: String,
    },

    /// Simulation produced non-finite state.
    #[error("simulation diverged: {reason}")]
    Diverged {
        /// What went wrong.
        reason: String,
    },
}

/// One active contact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// Signed distance between the geoms (negative means penetration).
    pub dist: f64,
    /// Contact position in world coordinates.
    pub pos: Point3<f64>,
    /// Normal force in the contact frame.
    pub force: f64,
}

impl Contact {
    /// Create a contact.
    #[must_use]
    pub const fn new(dist: f64, pos: Point3<f64>, force: f64) -> Self {
        Self { dist, pos, force }
    }
}

/// World pose and optics of a compiled camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    /// Camera position in world coordinates.
    pub position: Point3<f64>,
    /// Camera frame axes as columns, expressed in world coordinates.
    ///
    /// The camera looks along its local -Z axis with +Y up.
    pub rotation: Matrix3<f64>,
    /// Vertical field of view (degrees).
    pub fovy: f64,
}

/// Which camera to render from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraRef {
    /// Camera id in model order.
    Id(usize),
    /// Camera name.
    Name(String),
}

/// A render call.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    /// Camera to render from.
    pub camera: CameraRef,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Visibility options; `None` renders every group.
    pub scene_option: Option<SceneOption>,
    /// Produce per-pixel geom labels instead of colour.
    pub segmentation: bool,
}

impl RenderRequest {
    /// Square colour render from a camera id.
    #[must_use]
    pub fn rgb(camera_id: usize, size: u32) -> Self {
        Self {
            camera: CameraRef::Id(camera_id),
            width: size,
            height: size,
            scene_option: None,
            segmentation: false,
        }
    }

    /// Square segmentation render from a camera id.
    #[must_use]
    pub fn segmentation(camera_id: usize, size: u32) -> Self {
        Self {
            segmentation: true,
            ..Self::rgb(camera_id, size)
        }
    }

    /// Restrict the render to some geom groups.
    #[must_use]
    pub fn with_scene_option(mut self, option: SceneOption) -> Self {
        self.scene_option = Some(option);
        self
    }
}

/// An 8-bit RGB image, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// `width * height * 3` bytes.
    pub data: Vec<u8>,
}

impl RgbImage {
    /// Image filled with one colour.
    #[must_use]
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let n = width as usize * height as usize;
        let mut data = Vec::with_capacity(n * 3);
        for _ in 0..n {
            data.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Pixel at column `x`, row `y`.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 3;
        match self.data.get(i..i + 3)? {
            &[r, g, b] => Some([r, g, b]),
            _ => None,
        }
    }
}

/// Per-pixel geom labels, row-major.
///
/// A label is the geom id plus one; zero is background.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// `width * height` labels.
    pub data: Vec<u32>,
}

impl SegmentationImage {
    /// All-background image.
    #[must_use]
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize],
        }
    }

    /// Label at column `x`, row `y`.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Geom id at column `x`, row `y`, if any geom was drawn there.
    #[must_use]
    pub fn geom_at(&self, x: u32, y: u32) -> Option<usize> {
        self.get(x, y)
            .and_then(|label| label.checked_sub(1))
            .map(|id| id as usize)
    }
}

/// A rendered image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Image {
    /// Colour image.
    Rgb(RgbImage),
    /// Segmentation labels.
    Segmentation(SegmentationImage),
}

/// Live simulator state.
///
/// Object safe, so the task and its variators can work on `&dyn Physics`.
pub trait Physics {
    /// Physics timestep (seconds).
    fn timestep(&self) -> f64;

    /// Simulation time (seconds).
    fn time(&self) -> f64;

    /// Advance the simulation by one timestep.
    fn step(&mut self) -> Result<(), PhysicsError>;

    /// Number of actuators.
    fn num_actuators(&self) -> usize;

    /// Set the actuator controls.
    fn set_control(&mut self, control: &[f64]) -> Result<(), PhysicsError>;

    /// Generalized positions.
    fn qpos(&self) -> &[f64];

    /// Generalized velocities.
    fn qvel(&self) -> &[f64];

    /// Joint names in generalized-coordinate order.
    fn joint_names(&self) -> Vec<String>;

    /// Number of geoms.
    fn geom_count(&self) -> usize;

    /// Name of geom `id`.
    fn geom_name(&self, id: usize) -> Option<&str>;

    /// Visibility group of geom `id`.
    fn geom_group(&self, id: usize) -> Option<usize>;

    /// World position of geom `id`.
    fn geom_xpos(&self, id: usize) -> Option<Point3<f64>>;

    /// Active contacts.
    fn contacts(&self) -> &[Contact];

    /// Constraint forces in generalized coordinates.
    fn qfrc_constraint(&self) -> &[f64];

    /// Number of cameras.
    fn camera_count(&self) -> usize;

    /// Id of the camera with the given name.
    fn camera_index(&self, name: &str) -> Option<usize>;

    /// World pose and optics of camera `id`.
    fn camera(&self, id: usize) -> Result<CameraState, PhysicsError>;

    /// Render an image.
    fn render(&self, request: &RenderRequest) -> Result<Image, PhysicsError>;

    /// Move a body's root to `position` (in its parent frame) and zero its
    /// velocity.
    fn set_body_position(&mut self, body: &str, position: Vector3<f64>) -> Result<(), PhysicsError>;

    /// Current value of a named live parameter.
    fn parameter(&self, name: &str) -> Result<Vec<f64>, PhysicsError>;

    /// Overwrite a named live parameter.
    fn set_parameter(&mut self, name: &str, value: &[f64]) -> Result<(), PhysicsError>;
}

/// A backend that can be built from a world description.
pub trait CompilePhysics: Physics + Sized {
    /// Compile a world description into a live simulation.
    fn compile(world: &WorldTree) -> Result<Self, PhysicsError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_segmentation_labels() {
        let mut img = SegmentationImage::empty(4, 2);
        img.data[5] = 3;
        assert_eq!(img.get(1, 1), Some(3));
        assert_eq!(img.geom_at(1, 1), Some(2));
        assert_eq!(img.geom_at(0, 0), None);
        assert_eq!(img.get(4, 0), None);
    }

    #[test]
    fn test_render_request_builders() {
        let req = RenderRequest::segmentation(0, 64);
        assert!(req.segmentation);
        assert_eq!(req.camera, CameraRef::Id(0));
        assert_eq!((req.width, req.height), (64, 64));
    }

    #[test]
    fn test_rgb_filled() {
        let img = RgbImage::filled(2, 3, [255, 0, 10]);
        assert_eq!(img.data.len(), 18);
        assert_eq!(img.get(1, 2), Some([255, 0, 10]));
    }

    #[test]
    fn test_rgb_short_buffer() {
        let mut img = RgbImage::filled(2, 2, [1, 2, 3]);
        img.data.truncate(10);
        assert_eq!(img.get(0, 1), Some([1, 2, 3]));
        assert_eq!(img.get(1, 1), None);
    }
}
