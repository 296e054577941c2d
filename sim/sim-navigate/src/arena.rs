//! The static arena every task is built in.

use nalgebra::Vector3;
use tracing::debug;

use crate::config::EnvConfig;
use crate::world::{
    Asset, Camera, CameraHandle, Light, LightHandle, Site, SiteDefaults, SiteHandle, Texture,
    TextureBuiltin, TextureKind, WorldTree,
};
use crate::Result;

/// Name of the overhead camera.
pub const TOP_CAMERA: &str = "top_camera";

/// Name of the close-up overhead camera.
pub const TOP_CAMERA_CLOSE: &str = "top_camera_close";

/// Field of view of cameras added to the arena (degrees).
pub const CAMERA_FOVY: f64 = 45.0;

/// The arena: global settings, skybox, light and the two overhead cameras.
///
/// Entities are attached to [`Scene::world_mut`] afterwards.
///
/// # Example
///
/// ```
/// use sim_navigate::{EnvConfig, Scene, TOP_CAMERA};
///
/// let scene = Scene::build("arena", &EnvConfig::default()).unwrap();
/// assert_eq!(scene.world().camera_index(TOP_CAMERA), Some(0));
/// ```
#[derive(Debug, Clone)]
pub struct Scene {
    world: WorldTree,
}

impl Scene {
    /// Build the arena.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid.
    pub fn build(name: &str, config: &EnvConfig) -> Result<Self> {
        config.validate()?;

        let mut world = WorldTree::new(name);
        world.compiler = config.compiler.clone();
        world.option = config.option.clone();
        world.visual = config.visual.clone();
        world.site_default = SiteDefaults {
            size: 0.002,
            rgba: [0.8, 0.8, 0.8, 0.0],
        };
        world.add_asset(Asset::Texture(Texture {
            kind: TextureKind::Skybox,
            builtin: TextureBuiltin::Gradient,
            rgb1: [1.0, 1.0, 1.0],
            rgb2: [1.0, 1.0, 1.0],
            width: 256,
            height: 256,
        }))?;

        let mut scene = Self { world };
        scene.add_light(Vector3::new(0.0, 0.0, 10.0), Vector3::new(20.0, 20.0, -20.0), false);
        scene.add_camera(TOP_CAMERA, Vector3::new(-0.03, 0.125, 0.15), Vector3::zeros())?;
        scene.add_camera(TOP_CAMERA_CLOSE, Vector3::new(-0.03, 0.125, 0.065), Vector3::zeros())?;

        debug!(model = name, timestep = config.option.timestep, "arena built");
        Ok(scene)
    }

    /// Add a light to the worldbody.
    pub fn add_light(
        &mut self,
        pos: Vector3<f64>,
        dir: Vector3<f64>,
        cast_shadow: bool,
    ) -> LightHandle {
        self.world.add_light(Light {
            pos,
            dir,
            cast_shadow,
        })
    }

    /// Add a camera to the worldbody.
    ///
    /// # Errors
    ///
    /// Fails if the name is already taken.
    pub fn add_camera(
        &mut self,
        name: &str,
        pos: Vector3<f64>,
        euler: Vector3<f64>,
    ) -> Result<CameraHandle> {
        self.world.add_camera(Camera {
            name: name.to_string(),
            pos,
            euler,
            fovy: CAMERA_FOVY,
        })
    }

    /// Add a site to the worldbody.
    ///
    /// # Errors
    ///
    /// Fails if the name is already taken.
    pub fn add_site(&mut self, name: &str, pos: Vector3<f64>) -> Result<SiteHandle> {
        self.world.add_site(Site::new(name, pos))
    }

    /// The world description.
    #[must_use]
    pub const fn world(&self) -> &WorldTree {
        &self.world
    }

    /// The world description (mutable).
    pub fn world_mut(&mut self) -> &mut WorldTree {
        &mut self.world
    }

    /// Consume the scene.
    #[must_use]
    pub fn into_world(self) -> WorldTree {
        self.world
    }
}
