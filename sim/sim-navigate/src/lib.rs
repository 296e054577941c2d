//! Guidewire navigation task for endovascular simulation.
//!
//! A guidewire, optionally capped with a tip, is pushed and twisted through
//! a vessel phantom toward a target point. This crate assembles the scene,
//! samples targets and initial poses, computes rewards and success, and
//! exposes observations, contact forces and segmentation masks:
//!
//! - [`Scene`] - Arena: global settings, skybox, light and top cameras
//! - [`Phantom`], [`Guidewire`], [`Tip`] - Entities contributing body fragments
//! - [`Navigate`] - The task: targets, episodes, rewards, observations
//! - [`Environment`] - Episode driver over a [`CompilePhysics`] backend
//! - [`KinematicPhysics`] - Headless reference backend
//!
//! # Layering
//!
//! The task never integrates dynamics itself. Everything it reads or writes
//! goes through the object-safe [`Physics`] trait, and a backend is built
//! from the [`WorldTree`] at the start of every episode.
//!
//! # Coordinate System
//!
//! - X: right
//! - Y: forward (the insertion direction of the guidewire)
//! - Z: up
//! - Right-handed, metres
//!
//! # Example
//!
//! ```
//! use sim_navigate::{
//!     Environment, Guidewire, GuidewireConfig, KinematicPhysics, Navigate, NavigateConfig, Phantom,
//! };
//!
//! let wire = GuidewireConfig { n_bodies: 10, ..Default::default() };
//! let task = Navigate::builder()
//!     .phantom(Phantom::demo())
//!     .guidewire(Guidewire::new(&wire).unwrap())
//!     .config(NavigateConfig::default().with_sample_target(true))
//!     .build()
//!     .unwrap();
//!
//! let mut env: Environment<KinematicPhysics> = Environment::new(task, 0).with_time_limit(0.1);
//! let first = env.reset().unwrap();
//! assert!(first.first());
//!
//! let step = env.step(&[0.0, 0.0]).unwrap();
//! assert!(step.reward.unwrap() <= 0.0);
//! ```

#![doc(html_root_url = "https://docs.rs/sim-navigate/0.7.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::cast_precision_loss,       // usize to f64 is fine for counts
    clippy::missing_errors_doc,        // Error docs added where non-obvious
    clippy::module_name_repetitions,
)]

mod arena;
mod camera;
mod config;
mod entity;
mod env;
mod error;
mod kinematic;
mod mask;
mod mesh;
mod observable;
mod physics;
mod reward;
mod sampling;
mod scene_option;
mod task;
mod variation;
mod world;

pub use arena::{Scene, CAMERA_FOVY, TOP_CAMERA, TOP_CAMERA_CLOSE};
pub use camera::CameraMatrix;
pub use config::{
    AngleUnit, CompilerConfig, EnvConfig, FrictionCone, GuidewireConfig, Integrator, OptionConfig,
    OptionFlags, VisualConfig, VisualGlobal,
};
pub use entity::{
    Entity, Guidewire, GuidewireEntity, Phantom, PhantomEntity, PhantomSpec, Tip, GUIDEWIRE_ROOT,
};
pub use env::{Environment, EpisodeEnd, StepType, TimeStep};
pub use error::NavigateError;
pub use kinematic::KinematicPhysics;
pub use mask::{filter_mask, Mask, FOREGROUND};
pub use mesh::{load_stl, Aabb, ClosedMesh};
pub use observable::{CameraObservable, Observable, ObservableSource, Observation, ObservationValue};
pub use physics::{
    CameraRef, CameraState, CompilePhysics, Contact, Image, Physics, PhysicsError, RenderRequest,
    RgbImage, SegmentationImage,
};
pub use reward::{compute_reward, RewardConfig, RewardOutcome};
pub use sampling::{sample_points, RetryPolicy, UniformCircle};
pub use scene_option::{
    make_scene, SceneOption, GUIDEWIRE_GROUP, NUM_GEOM_GROUPS, PHANTOM_GROUP, TIP_GROUP,
};
pub use task::{
    ContactForce, ContactLocation, EpisodePhase, Navigate, NavigateBuilder, NavigateConfig,
    SamplerConfig, Target, TargetSpec, CONTACT_DISTANCE,
};
pub use variation::{Distribution, MjcfVariator, Noise, Offset, PhysicsVariator, Scaled, Variation};
pub use world::{
    Actuator, Asset, Attribute, Body, Camera, CameraHandle, ElementKind, Geom, GeomShape, Joint,
    JointKind, Light, LightHandle, Rgba, Site, SiteDefaults, SiteHandle, Texture, TextureBuiltin,
    TextureKind, WorldTree,
};

// Re-export math types for convenience
pub use nalgebra::{Point3, Vector3};

/// Result type for navigation operations.
pub type Result<T> = std::result::Result<T, NavigateError>;
