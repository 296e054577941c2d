//! The guidewire navigation task.
//!
//! [`Navigate`] owns the arena, the attached entities, both variators and
//! the observable set. An environment drives it through its episode hooks
//! in a fixed order:
//!
//! ```text
//! initialize_episode_mjcf -> compile -> initialize_episode
//!     -> (get_reward -> should_terminate_episode -> observe)*
//! ```
//!
//! `get_reward` must run before `should_terminate_episode` every step: the
//! success flag it sets is what terminates the episode.

use std::collections::BTreeMap;
use std::fmt;

use nalgebra::{Point3, Vector3};
use rand::seq::SliceRandom;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::arena::Scene;
use crate::camera::CameraMatrix;
use crate::config::EnvConfig;
use crate::entity::{Entity, GuidewireEntity, PhantomEntity};
use crate::mask::{filter_mask, Mask};
use crate::observable::{CameraObservable, Observable, ObservableSource, Observation};
use crate::physics::{Image, Physics, PhysicsError, RenderRequest};
use crate::reward::{self, RewardConfig, RewardOutcome};
use crate::sampling::{sample_points, RetryPolicy, UniformCircle};
use crate::scene_option::{make_scene, SceneOption, GUIDEWIRE_GROUP, PHANTOM_GROUP, TIP_GROUP};
use crate::variation::{Distribution, MjcfVariator, Noise, PhysicsVariator};
use crate::world::{Site, WorldTree};
use crate::{NavigateError, Result, TOP_CAMERA};

/// Contacts deeper than this are ignored by [`Navigate::get_contact_forces`].
pub const CONTACT_DISTANCE: f64 = 0.002;

/// Colour of phantom sites when `visualize_sites` is on.
const SITE_HIGHLIGHT: [f64; 4] = [1.0, 0.0, 0.0, 1.0];

/// Standard deviation of the additive joint-position noise.
const POSITION_NOISE: f64 = 0.0001;

/// Sigma of the multiplicative joint-velocity noise.
const VELOCITY_NOISE: f64 = 0.0001;

// ============================================================================
// Configuration
// ============================================================================

/// A target as written in a configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetSpec {
    /// Name of a phantom site.
    Site(String),
    /// World position.
    Position([f64; 3]),
}

/// Rejection sampling settings for mesh targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Open y interval targets must lie in.
    pub y_bounds: (f64, f64),
    /// Volume samples drawn per batch.
    pub batch_size: usize,
    /// Scale applied to the simplified phantom mesh.
    pub mesh_scale: f64,
    /// When to give up.
    pub retry: RetryPolicy,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            y_bounds: (0.0954, 0.1342),
            batch_size: 10,
            mesh_scale: 0.9,
            retry: RetryPolicy::default(),
        }
    }
}

/// Task options.
///
/// # Example
///
/// ```
/// use sim_navigate::{NavigateConfig, TargetSpec};
///
/// let config = NavigateConfig::default()
///     .with_delta(0.005)
///     .with_pixels(true)
///     .with_target(TargetSpec::Site("bca".to_string()));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigateConfig {
    /// Success distance threshold (m).
    pub delta: f64,
    /// Dense or sparse reward.
    pub dense_reward: bool,
    /// Reward on success.
    pub success_reward: f64,
    /// Register the `pixels` colour observable.
    pub use_pixels: bool,
    /// Register the `guidewire` segmentation observable.
    pub use_segment: bool,
    /// Register the `phantom` segmentation observable.
    pub use_phantom_segment: bool,
    /// Side of square images (pixels).
    pub image_size: u32,
    /// Draw a new target at every episode start.
    pub sample_target: bool,
    /// Colour phantom sites red.
    pub visualize_sites: bool,
    /// Sample targets from phantom sites rather than the phantom volume.
    pub target_from_sites: bool,
    /// Half-width of the initial pose jitter (m).
    pub random_init_distance: f64,
    /// Initial target.
    pub target: Option<TargetSpec>,
    /// Volume sampling settings.
    pub sampler: SamplerConfig,
}

impl Default for NavigateConfig {
    fn default() -> Self {
        Self {
            delta: 0.004,
            dense_reward: true,
            success_reward: 10.0,
            use_pixels: false,
            use_segment: false,
            use_phantom_segment: false,
            image_size: 80,
            sample_target: false,
            visualize_sites: false,
            target_from_sites: true,
            random_init_distance: 0.001,
            target: None,
            sampler: SamplerConfig::default(),
        }
    }
}

impl NavigateConfig {
    /// Set the success threshold.
    #[must_use]
    pub fn with_delta(mut self, delta: f64) -> Self {
        self.delta = delta;
        self
    }

    /// Choose dense or sparse reward.
    #[must_use]
    pub fn with_dense_reward(mut self, dense: bool) -> Self {
        self.dense_reward = dense;
        self
    }

    /// Set the success reward.
    #[must_use]
    pub fn with_success_reward(mut self, reward: f64) -> Self {
        self.success_reward = reward;
        self
    }

    /// Register the colour camera observable.
    #[must_use]
    pub fn with_pixels(mut self, enabled: bool) -> Self {
        self.use_pixels = enabled;
        self
    }

    /// Register the guidewire segmentation observable.
    #[must_use]
    pub fn with_segment(mut self, enabled: bool) -> Self {
        self.use_segment = enabled;
        self
    }

    /// Register the phantom segmentation observable.
    #[must_use]
    pub fn with_phantom_segment(mut self, enabled: bool) -> Self {
        self.use_phantom_segment = enabled;
        self
    }

    /// Set the image size.
    #[must_use]
    pub fn with_image_size(mut self, size: u32) -> Self {
        self.image_size = size;
        self
    }

    /// Re-sample the target every episode.
    #[must_use]
    pub fn with_sample_target(mut self, enabled: bool) -> Self {
        self.sample_target = enabled;
        self
    }

    /// Highlight phantom sites.
    #[must_use]
    pub fn with_visualize_sites(mut self, enabled: bool) -> Self {
        self.visualize_sites = enabled;
        self
    }

    /// Sample targets from sites (`true`) or from the phantom volume.
    #[must_use]
    pub fn with_target_from_sites(mut self, enabled: bool) -> Self {
        self.target_from_sites = enabled;
        self
    }

    /// Set the initial pose jitter.
    #[must_use]
    pub fn with_random_init_distance(mut self, distance: f64) -> Self {
        self.random_init_distance = distance;
        self
    }

    /// Set the initial target.
    #[must_use]
    pub fn with_target(mut self, target: TargetSpec) -> Self {
        self.target = Some(target);
        self
    }

    /// Set the volume sampler.
    #[must_use]
    pub fn with_sampler(mut self, sampler: SamplerConfig) -> Self {
        self.sampler = sampler;
        self
    }

    /// Reward parameters.
    #[must_use]
    pub const fn reward_config(&self) -> RewardConfig {
        RewardConfig {
            delta: self.delta,
            dense: self.dense_reward,
            success_reward: self.success_reward,
        }
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        if !(self.delta.is_finite() && self.delta > 0.0) {
            return Err(NavigateError::invalid_config("delta must be finite and > 0"));
        }
        if !self.success_reward.is_finite() {
            return Err(NavigateError::invalid_config("success_reward must be finite"));
        }
        if self.image_size == 0 {
            return Err(NavigateError::invalid_config("image_size must be > 0"));
        }
        if !(self.random_init_distance.is_finite() && self.random_init_distance >= 0.0) {
            return Err(NavigateError::invalid_config(
                "random_init_distance must be finite and >= 0",
            ));
        }
        if self.sampler.batch_size == 0 {
            return Err(NavigateError::invalid_config("sampler batch_size must be > 0"));
        }
        if !(self.sampler.mesh_scale.is_finite() && self.sampler.mesh_scale > 0.0) {
            return Err(NavigateError::invalid_config("sampler mesh_scale must be > 0"));
        }
        Ok(())
    }
}

// ============================================================================
// Task state
// ============================================================================

/// The goal the tip should reach.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// A phantom site, resolved when it was set.
    Named {
        /// Site name.
        site: String,
        /// Site position at resolution time.
        position: Point3<f64>,
    },
    /// A raw position.
    Position(Point3<f64>),
    /// Not set yet.
    Unresolved,
}

impl Target {
    /// The target position, if resolved.
    #[must_use]
    pub const fn position(&self) -> Option<Point3<f64>> {
        match self {
            Self::Named { position, .. } | Self::Position(position) => Some(*position),
            Self::Unresolved => None,
        }
    }
}

/// Where the task is in its episode lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodePhase {
    /// No episode has been initialized.
    Uninitialized,
    /// An episode is running.
    Active,
    /// The last reward evaluation reached the target.
    Succeeded,
}

/// Where a kept contact is reported.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContactLocation {
    /// World coordinates.
    World(Point3<f64>),
    /// Pixel coordinates under the cached camera matrix.
    Pixel([i32; 2]),
}

/// One contact kept by [`Navigate::get_contact_forces`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactForce {
    /// Normal force.
    pub force: f64,
    /// Contact location.
    pub location: ContactLocation,
}

// ============================================================================
// Builder
// ============================================================================

/// Assembles a [`Navigate`] task.
#[derive(Default)]
pub struct NavigateBuilder {
    phantom: Option<Box<dyn PhantomEntity>>,
    guidewire: Option<Box<dyn GuidewireEntity>>,
    tip: Option<Box<dyn Entity>>,
    config: NavigateConfig,
    env_config: EnvConfig,
}

impl NavigateBuilder {
    /// Start from default options and no entities.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the phantom.
    #[must_use]
    pub fn phantom(mut self, phantom: impl PhantomEntity + 'static) -> Self {
        self.phantom = Some(Box::new(phantom));
        self
    }

    /// Set the guidewire.
    #[must_use]
    pub fn guidewire(mut self, guidewire: impl GuidewireEntity + 'static) -> Self {
        self.guidewire = Some(Box::new(guidewire));
        self
    }

    /// Set the tip. Ignored without a guidewire.
    #[must_use]
    pub fn tip(mut self, tip: impl Entity + 'static) -> Self {
        self.tip = Some(Box::new(tip));
        self
    }

    /// Set the task options.
    #[must_use]
    pub fn config(mut self, config: NavigateConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the environment configuration.
    #[must_use]
    pub fn env_config(mut self, env_config: EnvConfig) -> Self {
        self.env_config = env_config;
        self
    }

    /// Build the task.
    ///
    /// # Errors
    ///
    /// Fails on invalid options, clashing element names, or an initial
    /// target naming a site the phantom does not have.
    pub fn build(self) -> Result<Navigate> {
        let Self {
            mut phantom,
            mut guidewire,
            tip,
            config,
            env_config,
        } = self;
        config.validate()?;

        let mut arena = Scene::build("arena", &env_config)?;
        if let Some(phantom) = phantom.as_mut() {
            if config.visualize_sites {
                phantom
                    .mjcf_mut()
                    .for_each_site_mut(&mut |site: &mut Site| site.rgba = Some(SITE_HIGHLIGHT));
            }
            attach_entity(arena.world_mut(), &**phantom)?;
        }
        if let Some(guidewire) = guidewire.as_mut() {
            if let Some(tip) = &tip {
                guidewire.attach(&**tip)?;
            }
            attach_entity(arena.world_mut(), &**guidewire)?;
        }

        let initial_pose = UniformCircle::symmetric(config.random_init_distance)?;
        let observables = build_observables(&config)?;
        let control_timestep = env_config.control_timestep();

        let mut task = Navigate {
            config,
            env_config,
            arena,
            phantom,
            guidewire,
            has_tip: tip.is_some(),
            initial_pose,
            mjcf_variator: MjcfVariator::new(),
            physics_variator: PhysicsVariator::new(),
            observables,
            control_timestep,
            target: Target::Unresolved,
            success: false,
            head_pos: None,
            camera_matrix: None,
            phase: EpisodePhase::Uninitialized,
        };
        task.set_target(task.config.target.clone())?;
        debug!(
            control_timestep,
            observables = task.observables.len(),
            "navigate task built"
        );
        Ok(task)
    }
}

fn attach_entity<E: Entity + ?Sized>(world: &mut WorldTree, entity: &E) -> Result<()> {
    for asset in entity.assets() {
        world.add_asset(asset)?;
    }
    world.attach(entity.mjcf().clone())?;
    for actuator in entity.actuators() {
        world.add_actuator(actuator)?;
    }
    Ok(())
}

fn build_observables(config: &NavigateConfig) -> Result<BTreeMap<String, Observable>> {
    let size = config.image_size;
    let mut observables = BTreeMap::new();
    let camera = |view: CameraObservable| Observable::new(ObservableSource::Camera(view));

    if config.use_pixels {
        observables.insert("pixels".to_string(), camera(CameraObservable::new(TOP_CAMERA, size)));
    }
    if config.use_segment {
        let option = make_scene(&[GUIDEWIRE_GROUP, TIP_GROUP])?;
        observables.insert(
            "guidewire".to_string(),
            camera(CameraObservable::new(TOP_CAMERA, size).segmented(option)),
        );
    }
    if config.use_phantom_segment {
        let option = make_scene(&[PHANTOM_GROUP])?;
        observables.insert(
            "phantom".to_string(),
            camera(CameraObservable::new(TOP_CAMERA, size).segmented(option)),
        );
    }
    observables.insert(
        "joint_pos".to_string(),
        Observable::new(ObservableSource::JointPositions)
            .with_corruptor(Noise::Additive(Distribution::normal(0.0, POSITION_NOISE)?)),
    );
    observables.insert(
        "joint_vel".to_string(),
        Observable::new(ObservableSource::JointVelocities)
            .with_corruptor(Noise::Multiplicative(Distribution::log_normal(0.0, VELOCITY_NOISE)?)),
    );

    for observable in observables.values_mut() {
        observable.enabled = true;
    }
    Ok(observables)
}

// ============================================================================
// Task
// ============================================================================

/// Guidewire navigation: reach a target inside the phantom with the tip.
pub struct Navigate {
    config: NavigateConfig,
    env_config: EnvConfig,
    arena: Scene,
    phantom: Option<Box<dyn PhantomEntity>>,
    guidewire: Option<Box<dyn GuidewireEntity>>,
    has_tip: bool,
    initial_pose: UniformCircle,
    mjcf_variator: MjcfVariator,
    physics_variator: PhysicsVariator,
    observables: BTreeMap<String, Observable>,
    control_timestep: f64,
    target: Target,
    success: bool,
    head_pos: Option<Point3<f64>>,
    camera_matrix: Option<CameraMatrix>,
    phase: EpisodePhase,
}

impl fmt::Debug for Navigate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Navigate")
            .field("phantom", &self.phantom.as_ref().map(|p| p.name().to_string()))
            .field("guidewire", &self.guidewire.is_some())
            .field("has_tip", &self.has_tip)
            .field("target", &self.target)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl Navigate {
    /// Start building a task.
    #[must_use]
    pub fn builder() -> NavigateBuilder {
        NavigateBuilder::new()
    }

    // ------------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------------

    /// The arena, which owns the world description.
    #[must_use]
    pub const fn root_entity(&self) -> &Scene {
        &self.arena
    }

    /// The world description to compile.
    #[must_use]
    pub const fn world(&self) -> &WorldTree {
        self.arena.world()
    }

    /// Registered observables by name.
    #[must_use]
    pub const fn task_observables(&self) -> &BTreeMap<String, Observable> {
        &self.observables
    }

    /// Task options.
    #[must_use]
    pub const fn config(&self) -> &NavigateConfig {
        &self.config
    }

    /// Environment configuration the arena was built from.
    #[must_use]
    pub const fn env_config(&self) -> &EnvConfig {
        &self.env_config
    }

    /// Physics steps per control step.
    #[must_use]
    pub const fn num_substeps(&self) -> usize {
        self.env_config.num_substeps
    }

    /// Physics timestep (seconds).
    #[must_use]
    pub const fn physics_timestep(&self) -> f64 {
        self.env_config.option.timestep
    }

    /// Control timestep (seconds): substeps times the physics timestep.
    #[must_use]
    pub const fn control_timestep(&self) -> f64 {
        self.control_timestep
    }

    /// Current target.
    #[must_use]
    pub const fn target(&self) -> &Target {
        &self.target
    }

    /// Current target position, if resolved.
    #[must_use]
    pub const fn target_pos(&self) -> Option<Point3<f64>> {
        self.target.position()
    }

    /// Tip position at the last reward evaluation.
    #[must_use]
    pub const fn head_pos(&self) -> Option<Point3<f64>> {
        self.head_pos
    }

    /// Whether the last reward evaluation reached the target.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.success
    }

    /// Lifecycle phase.
    #[must_use]
    pub const fn episode_phase(&self) -> EpisodePhase {
        self.phase
    }

    /// The cached camera matrix, once computed.
    #[must_use]
    pub const fn camera_matrix(&self) -> Option<&CameraMatrix> {
        self.camera_matrix.as_ref()
    }

    /// Whether a tip was attached to the guidewire.
    #[must_use]
    pub const fn has_tip(&self) -> bool {
        self.has_tip
    }

    /// Structural variator, for binding variations.
    pub fn mjcf_variator_mut(&mut self) -> &mut MjcfVariator {
        &mut self.mjcf_variator
    }

    /// Live-physics variator, for binding variations.
    pub fn physics_variator_mut(&mut self) -> &mut PhysicsVariator {
        &mut self.physics_variator
    }

    /// Set the target. Site names are resolved to positions immediately.
    ///
    /// # Errors
    ///
    /// - [`NavigateError::MissingEntity`] for a site name without a phantom.
    /// - [`NavigateError::UnknownSite`] for a name the phantom lacks.
    pub fn set_target(&mut self, target: Option<TargetSpec>) -> Result<()> {
        self.target = match target {
            None => Target::Unresolved,
            Some(TargetSpec::Position(p)) => Target::Position(Point3::from(p)),
            Some(TargetSpec::Site(name)) => {
                let sites = self.phantom()?.sites();
                match sites.get(&name) {
                    Some(position) => Target::Named {
                        site: name,
                        position: *position,
                    },
                    None => {
                        return Err(NavigateError::UnknownSite {
                            name,
                            valid: sites.into_keys().collect(),
                        })
                    }
                }
            }
        };
        Ok(())
    }

    fn phantom(&self) -> Result<&dyn PhantomEntity> {
        self.phantom
            .as_deref()
            .ok_or(NavigateError::MissingEntity { entity: "phantom" })
    }

    // ------------------------------------------------------------------------
    // Episode hooks
    // ------------------------------------------------------------------------

    /// Apply structural variation before the world is compiled.
    ///
    /// # Errors
    ///
    /// Fails if a bound element is missing or a value has the wrong arity.
    pub fn initialize_episode_mjcf(&mut self, rng: &mut dyn RngCore) -> Result<()> {
        self.mjcf_variator
            .apply_variations(self.arena.world_mut(), rng)
    }

    /// Start an episode on freshly compiled physics.
    ///
    /// Caches the camera matrix on the first call only, applies live-physics
    /// variation, jitters the guidewire's initial position, clears the
    /// success flag and, if configured, draws a new target.
    ///
    /// # Errors
    ///
    /// Fails without a guidewire, on backend errors, or when target sampling
    /// fails.
    pub fn initialize_episode(&mut self, physics: &mut dyn Physics, rng: &mut dyn RngCore) -> Result<()> {
        if self.guidewire.is_none() {
            return Err(NavigateError::MissingEntity { entity: "guidewire" });
        }
        if self.camera_matrix.is_none() {
            self.camera_matrix = Some(self.get_camera_matrix(physics, None, 0)?);
        }
        self.physics_variator.apply_variations(physics, rng)?;

        let pose = self.initial_pose.sample(rng);
        self.guidewire
            .as_deref()
            .ok_or(NavigateError::MissingEntity { entity: "guidewire" })?
            .set_pose(physics, pose)?;

        self.success = false;
        self.head_pos = None;
        self.phase = EpisodePhase::Active;

        if self.config.sample_target {
            let target = self.get_random_target(rng)?;
            self.target = Target::Position(target);
        }
        debug!(
            pose = ?pose.as_slice(),
            target = ?self.target_pos().map(|p| [p.x, p.y, p.z]),
            "episode initialized"
        );
        Ok(())
    }

    /// Evaluate the reward for the current state and update the success
    /// flag.
    ///
    /// # Errors
    ///
    /// Fails if the scene has no geoms or the target is unresolved.
    pub fn get_reward(&mut self, physics: &dyn Physics) -> Result<f64> {
        let head = self.get_head_pos(physics)?;
        self.head_pos = Some(head);
        let target = self.target_pos().ok_or(NavigateError::TargetUnresolved)?;
        Ok(self.compute_reward(&head, &target).reward)
    }

    /// Whether the episode is over: true iff the last reward evaluation
    /// reached the target.
    #[must_use]
    pub const fn should_terminate_episode(&self) -> bool {
        self.success
    }

    /// Reward for `achieved` against `desired`; records the success flag.
    pub fn compute_reward(&mut self, achieved: &Point3<f64>, desired: &Point3<f64>) -> RewardOutcome {
        let outcome = reward::compute_reward(&self.config.reward_config(), achieved, desired);
        self.success = outcome.success;
        if outcome.success {
            if self.phase != EpisodePhase::Succeeded {
                info!(distance = outcome.distance, "target reached");
            }
            self.phase = EpisodePhase::Succeeded;
        } else if self.phase == EpisodePhase::Succeeded {
            self.phase = EpisodePhase::Active;
        }
        outcome
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// World position of the last geom in the scene: the distal tip.
    ///
    /// # Errors
    ///
    /// Fails if the compiled model has no geoms.
    pub fn get_head_pos(&self, physics: &dyn Physics) -> Result<Point3<f64>> {
        physics
            .geom_count()
            .checked_sub(1)
            .and_then(|last| physics.geom_xpos(last))
            .ok_or(NavigateError::MissingEntity { entity: "guidewire" })
    }

    /// Generalized positions.
    #[must_use]
    pub fn get_joint_positions(&self, physics: &dyn Physics) -> Vec<f64> {
        physics.qpos().to_vec()
    }

    /// Generalized velocities.
    #[must_use]
    pub fn get_joint_velocities(&self, physics: &dyn Physics) -> Vec<f64> {
        physics.qvel().to_vec()
    }

    /// Magnitude of the constraint force on the first three generalized
    /// coordinates.
    #[must_use]
    pub fn get_force(&self, physics: &dyn Physics) -> f64 {
        let forces = physics.qfrc_constraint();
        Vector3::from_iterator(forces.iter().copied().chain(std::iter::repeat(0.0)).take(3)).norm()
    }

    /// Contacts closer than [`CONTACT_DISTANCE`] whose force magnitude is
    /// at most `threshold`.
    ///
    /// Contacts with `|force| > threshold` are the ones dropped. With
    /// `to_pixels`, positions are projected with the cached camera matrix,
    /// which is computed here at `image_size` if no episode has cached one
    /// yet. Contacts that cannot be projected (in the camera plane) are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Backend errors while computing the camera matrix.
    pub fn get_contact_forces(
        &mut self,
        physics: &dyn Physics,
        threshold: f64,
        to_pixels: bool,
        image_size: u32,
    ) -> Result<Vec<ContactForce>> {
        let matrix = match self.camera_matrix {
            Some(matrix) => matrix,
            None => {
                let matrix = self.get_camera_matrix(physics, Some(image_size), 0)?;
                self.camera_matrix = Some(matrix);
                matrix
            }
        };

        let mut out = Vec::new();
        for contact in physics.contacts() {
            if contact.dist >= CONTACT_DISTANCE || contact.force.abs() > threshold {
                continue;
            }
            let location = if to_pixels {
                match matrix.point_to_pixel(&contact.pos) {
                    Some(pixel) => ContactLocation::Pixel(pixel),
                    None => {
                        debug!("contact in the camera plane, skipped");
                        continue;
                    }
                }
            } else {
                ContactLocation::World(contact.pos)
            };
            out.push(ContactForce {
                force: contact.force,
                location,
            });
        }
        Ok(out)
    }

    /// World-to-pixel matrix of camera `camera_id` for square images of
    /// `image_size` (default: the task's image size).
    ///
    /// # Errors
    ///
    /// Backend errors for an unknown camera.
    pub fn get_camera_matrix(
        &self,
        physics: &dyn Physics,
        image_size: Option<u32>,
        camera_id: usize,
    ) -> Result<CameraMatrix> {
        let size = image_size.unwrap_or(self.config.image_size);
        let state = physics.camera(camera_id)?;
        Ok(CameraMatrix::new(&state, size, size))
    }

    /// Binary mask of the phantom seen from `camera_id`.
    ///
    /// # Errors
    ///
    /// Render errors from the backend.
    pub fn get_phantom_mask(
        &self,
        physics: &dyn Physics,
        image_size: Option<u32>,
        camera_id: usize,
    ) -> Result<Mask> {
        self.mask(physics, make_scene(&[PHANTOM_GROUP])?, image_size, camera_id)
    }

    /// Binary mask of the guidewire and tip seen from `camera_id`.
    ///
    /// # Errors
    ///
    /// Render errors from the backend.
    pub fn get_guidewire_mask(
        &self,
        physics: &dyn Physics,
        image_size: Option<u32>,
        camera_id: usize,
    ) -> Result<Mask> {
        self.mask(
            physics,
            make_scene(&[GUIDEWIRE_GROUP, TIP_GROUP])?,
            image_size,
            camera_id,
        )
    }

    fn mask(
        &self,
        physics: &dyn Physics,
        option: SceneOption,
        image_size: Option<u32>,
        camera_id: usize,
    ) -> Result<Mask> {
        let size = image_size.unwrap_or(self.config.image_size);
        let request = RenderRequest::segmentation(camera_id, size).with_scene_option(option);
        match physics.render(&request)? {
            Image::Segmentation(image) => Ok(filter_mask(&image)),
            Image::Rgb(_) => Err(PhysicsError::Render {
                reason: "segmentation render returned a colour image".to_string(),
            }
            .into()),
        }
    }

    /// Draw a target: a uniformly chosen phantom site, or a point inside the
    /// scaled simplified phantom mesh within the sampler's y slab.
    ///
    /// # Errors
    ///
    /// Fails without a phantom, with no sites to choose from, or when
    /// volume sampling fails.
    pub fn get_random_target(&self, rng: &mut dyn RngCore) -> Result<Point3<f64>> {
        let phantom = self.phantom()?;
        if self.config.target_from_sites {
            let sites = phantom.sites();
            let positions: Vec<Point3<f64>> = sites.into_values().collect();
            return positions
                .choose(rng)
                .copied()
                .ok_or_else(|| NavigateError::invalid_config("phantom has no sites to sample"));
        }
        let sampler = &self.config.sampler;
        let mesh = phantom.simplified_mesh(sampler.mesh_scale)?;
        sample_points(&mesh, sampler.y_bounds, sampler.batch_size, sampler.retry, rng)
    }

    /// World positions of geoms whose name contains `guidewire`.
    #[must_use]
    pub fn get_guidewire_geom_pos(&self, physics: &dyn Physics) -> Vec<Point3<f64>> {
        (0..physics.geom_count())
            .filter(|&id| physics.geom_name(id).is_some_and(|n| n.contains("guidewire")))
            .filter_map(|id| physics.geom_xpos(id))
            .collect()
    }

    /// Evaluate every enabled observable.
    ///
    /// # Errors
    ///
    /// Render errors from the backend.
    pub fn observe(&self, physics: &dyn Physics, rng: &mut dyn RngCore) -> Result<Observation> {
        let mut observation = Observation::new();
        for (name, observable) in &self.observables {
            if observable.enabled {
                observation.insert(name.clone(), observable.observe(physics, rng)?);
            }
        }
        Ok(observation)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::config::GuidewireConfig;
    use crate::entity::{Guidewire, Phantom, Tip};

    fn small_wire() -> GuidewireConfig {
        GuidewireConfig {
            n_bodies: 4,
            ..Default::default()
        }
    }

    fn task(config: NavigateConfig) -> Result<Navigate> {
        let wire = small_wire();
        Navigate::builder()
            .phantom(Phantom::demo())
            .guidewire(Guidewire::new(&wire)?)
            .tip(Tip::new(&wire, 2)?)
            .config(config)
            .build()
    }

    #[test]
    fn test_named_target_resolved_at_build() {
        let task = task(NavigateConfig::default().with_target(TargetSpec::Site("lcca".into()))).unwrap();
        match task.target() {
            Target::Named { site, position } => {
                assert_eq!(site, "lcca");
                approx::assert_relative_eq!(*position, Point3::new(0.0, 0.19, 0.0), epsilon = 1e-12);
            }
            other => panic!("unexpected target {other:?}"),
        }
    }

    #[test]
    fn test_unknown_site_lists_valid_names() {
        let err = task(NavigateConfig::default().with_target(TargetSpec::Site("aorta".into())))
            .unwrap_err();
        match err {
            NavigateError::UnknownSite { name, valid } => {
                assert_eq!(name, "aorta");
                assert_eq!(valid, vec!["bca", "lcca", "lsa"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_site_target_without_phantom() {
        let err = Navigate::builder()
            .config(NavigateConfig::default().with_target(TargetSpec::Site("bca".into())))
            .build()
            .unwrap_err();
        assert!(matches!(err, NavigateError::MissingEntity { entity: "phantom" }));
    }

    #[test]
    fn test_observable_set_follows_flags() {
        let plain = task(NavigateConfig::default()).unwrap();
        let names: Vec<_> = plain.task_observables().keys().cloned().collect();
        assert_eq!(names, vec!["joint_pos", "joint_vel"]);

        let full = task(
            NavigateConfig::default()
                .with_pixels(true)
                .with_segment(true)
                .with_phantom_segment(true),
        )
        .unwrap();
        let names: Vec<_> = full.task_observables().keys().cloned().collect();
        assert_eq!(names, vec!["guidewire", "joint_pos", "joint_vel", "phantom", "pixels"]);
        assert!(full.task_observables().values().all(|o| o.enabled));

        match &full.task_observables()["guidewire"].source {
            ObservableSource::Camera(camera) => {
                let option = camera.scene_option.unwrap();
                assert!(camera.segmentation);
                assert!(option.is_visible(GUIDEWIRE_GROUP) && option.is_visible(TIP_GROUP));
                assert!(!option.is_visible(PHANTOM_GROUP));
            }
            other => panic!("unexpected source {other:?}"),
        }
    }

    #[test]
    fn test_control_timestep() {
        let task = task(NavigateConfig::default()).unwrap();
        assert!((task.control_timestep() - 3.0 * 0.004).abs() < 1e-12);
        assert_eq!(task.num_substeps(), 3);
    }

    #[test]
    fn test_visualize_sites_colours_phantom_sites() {
        let task = task(NavigateConfig::default().with_visualize_sites(true)).unwrap();
        let site = task.world().find_site("bca").unwrap();
        assert_eq!(site.rgba, Some(SITE_HIGHLIGHT));

        let plain = self::task(NavigateConfig::default()).unwrap();
        assert_eq!(plain.world().find_site("bca").unwrap().rgba, None);
    }

    #[test]
    fn test_compute_reward_tracks_phase() {
        let mut task = task(NavigateConfig::default()).unwrap();
        assert_eq!(task.episode_phase(), EpisodePhase::Uninitialized);
        assert!(!task.should_terminate_episode());

        let hit = task.compute_reward(&Point3::new(0.0, 0.0, 0.003), &Point3::origin());
        assert_eq!(hit.reward, 10.0);
        assert!(task.should_terminate_episode());
        assert_eq!(task.episode_phase(), EpisodePhase::Succeeded);

        let miss = task.compute_reward(&Point3::new(0.0, 0.0, 0.01), &Point3::origin());
        assert!((miss.reward + 0.01).abs() < 1e-12);
        assert!(!task.should_terminate_episode());
    }

    #[test]
    fn test_random_site_target_is_a_site() {
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let task = task(NavigateConfig::default()).unwrap();
        let sites = Phantom::demo().sites();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..10 {
            let target = task.get_random_target(&mut rng).unwrap();
            assert!(sites.values().any(|p| *p == target));
        }
    }

    #[test]
    fn test_random_mesh_target_in_slab() {
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let task = task(NavigateConfig::default().with_target_from_sites(false)).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let target = task.get_random_target(&mut rng).unwrap();
        assert!(0.0954 < target.y && target.y < 0.1342);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(task(NavigateConfig::default().with_delta(0.0)).is_err());
        assert!(task(NavigateConfig::default().with_image_size(0)).is_err());
        assert!(task(NavigateConfig::default().with_random_init_distance(-1.0)).is_err());
    }

    #[test]
    fn test_target_spec_json() {
        let config: NavigateConfig =
            serde_json::from_str(r#"{"target": "bca", "sample_target": true}"#).unwrap();
        assert_eq!(config.target, Some(TargetSpec::Site("bca".into())));
        assert!(config.sample_target);
        assert_eq!(config.image_size, 80);

        let config: NavigateConfig = serde_json::from_str(r#"{"target": [0.0, 0.1, 0.0]}"#).unwrap();
        assert_eq!(config.target, Some(TargetSpec::Position([0.0, 0.1, 0.0])));
    }
}
