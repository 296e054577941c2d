//! Named observations over simulator state.

use std::collections::BTreeMap;

use rand::RngCore;

use crate::physics::{CameraRef, Image, Physics, RenderRequest, RgbImage, SegmentationImage};
use crate::scene_option::SceneOption;
use crate::variation::Noise;
use crate::Result;

/// Observations keyed by observable name, in name order.
pub type Observation = BTreeMap<String, ObservationValue>;

/// A rendered camera view.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraObservable {
    /// Camera to render from.
    pub camera_name: String,
    /// Image width.
    pub width: u32,
    /// Image height.
    pub height: u32,
    /// Visibility options; `None` draws every group.
    pub scene_option: Option<SceneOption>,
    /// Render geom labels instead of colour.
    pub segmentation: bool,
}

impl CameraObservable {
    /// Colour view of a square image.
    #[must_use]
    pub fn new(camera_name: impl Into<String>, size: u32) -> Self {
        Self {
            camera_name: camera_name.into(),
            width: size,
            height: size,
            scene_option: None,
            segmentation: false,
        }
    }

    /// Segmentation view restricted to some geom groups.
    #[must_use]
    pub fn segmented(mut self, scene_option: SceneOption) -> Self {
        self.scene_option = Some(scene_option);
        self.segmentation = true;
        self
    }

    fn request(&self) -> RenderRequest {
        RenderRequest {
            camera: CameraRef::Name(self.camera_name.clone()),
            width: self.width,
            height: self.height,
            scene_option: self.scene_option,
            segmentation: self.segmentation,
        }
    }
}

/// What an observable reads.
#[derive(Debug, Clone, PartialEq)]
pub enum ObservableSource {
    /// Generalized positions.
    JointPositions,
    /// Generalized velocities.
    JointVelocities,
    /// A rendered image.
    Camera(CameraObservable),
}

/// One observed value.
#[derive(Debug, Clone, PartialEq)]
pub enum ObservationValue {
    /// Numeric vector.
    Vector(Vec<f64>),
    /// Colour image.
    Rgb(RgbImage),
    /// Geom labels.
    Segmentation(SegmentationImage),
}

impl ObservationValue {
    /// The vector, if this is one.
    #[must_use]
    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            Self::Vector(v) => Some(v),
            Self::Rgb(_) | Self::Segmentation(_) => None,
        }
    }
}

/// A named computation over simulator state.
#[derive(Debug, Clone)]
pub struct Observable {
    /// What to read.
    pub source: ObservableSource,
    /// Whether the observable is reported.
    pub enabled: bool,
    /// Noise applied to vector values after they are read.
    pub corruptor: Option<Noise>,
}

impl Observable {
    /// A disabled observable without noise.
    #[must_use]
    pub const fn new(source: ObservableSource) -> Self {
        Self {
            source,
            enabled: false,
            corruptor: None,
        }
    }

    /// Attach a corruptor.
    #[must_use]
    pub fn with_corruptor(mut self, noise: Noise) -> Self {
        self.corruptor = Some(noise);
        self
    }

    /// Enable or disable.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Read the current value.
    ///
    /// # Errors
    ///
    /// Render failures from the backend are returned unchanged.
    pub fn observe(&self, physics: &dyn Physics, rng: &mut dyn RngCore) -> Result<ObservationValue> {
        let raw = match &self.source {
            ObservableSource::JointPositions => physics.qpos().to_vec(),
            ObservableSource::JointVelocities => physics.qvel().to_vec(),
            ObservableSource::Camera(camera) => {
                return Ok(match physics.render(&camera.request())? {
                    Image::Rgb(img) => ObservationValue::Rgb(img),
                    Image::Segmentation(img) => ObservationValue::Segmentation(img),
                });
            }
        };
        Ok(ObservationValue::Vector(match &self.corruptor {
            Some(noise) => noise.corrupt(&raw, rng),
            None => raw,
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::scene_option::make_scene;
    use crate::variation::Distribution;

    #[test]
    fn test_observables_start_disabled() {
        let obs = Observable::new(ObservableSource::JointPositions);
        assert!(!obs.enabled);
        assert!(obs.corruptor.is_none());
        assert!(obs.with_enabled(true).enabled);
    }

    #[test]
    fn test_segmented_camera_request() {
        let camera = CameraObservable::new("top_camera", 80).segmented(make_scene(&[0]).unwrap());
        let request = camera.request();
        assert!(request.segmentation);
        assert_eq!(request.camera, CameraRef::Name("top_camera".to_string()));
        assert!(!request.scene_option.unwrap().is_visible(1));
    }

    #[test]
    fn test_corruptor_attached() {
        let noise = Noise::Additive(Distribution::normal(0.0, 1e-4).unwrap());
        let obs = Observable::new(ObservableSource::JointVelocities).with_corruptor(noise);
        assert!(matches!(obs.corruptor, Some(Noise::Additive(_))));
    }

    #[test]
    fn test_as_vector() {
        assert_eq!(ObservationValue::Vector(vec![1.0]).as_vector(), Some(&[1.0][..]));
        assert!(ObservationValue::Segmentation(SegmentationImage::empty(1, 1))
            .as_vector()
            .is_none());
    }
}
