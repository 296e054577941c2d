//! Environment configuration.
//!
//! These types replace free-form attribute dictionaries with typed groups
//! that are validated when loaded: `<compiler>`, `<option>` (with its
//! `<flag>` child), `<visual>` and the guidewire geometry parameters.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{NavigateError, Result};

/// Complete environment configuration.
///
/// # Example
///
/// ```
/// use sim_navigate::EnvConfig;
///
/// let config = EnvConfig::default();
/// assert!(config.validate().is_ok());
/// assert_eq!(config.num_substeps, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Global simulation options.
    pub option: OptionConfig,
    /// Model compiler settings.
    pub compiler: CompilerConfig,
    /// Visualization settings.
    pub visual: VisualConfig,
    /// Guidewire geometry.
    pub guidewire: GuidewireConfig,
    /// Physics steps per control step.
    pub num_substeps: usize,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            option: OptionConfig::default(),
            compiler: CompilerConfig::default(),
            visual: VisualConfig::default(),
            guidewire: GuidewireConfig::default(),
            num_substeps: 3,
        }
    }
}

impl EnvConfig {
    /// Parse a configuration from a JSON string.
    ///
    /// Missing fields take their default values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.num_substeps == 0 {
            return Err(NavigateError::invalid_config("num_substeps must be > 0"));
        }
        self.option.validate()?;
        self.guidewire.validate()?;
        Ok(())
    }

    /// Duration of one control step (seconds).
    #[must_use]
    pub fn control_timestep(&self) -> f64 {
        self.num_substeps as f64 * self.option.timestep
    }
}

/// Integration method for the physics engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Integrator {
    /// Semi-implicit Euler.
    Euler,
    /// Fourth-order Runge-Kutta.
    Rk4,
    /// Implicit in velocity.
    Implicit,
    /// Implicit in velocity, without Coriolis terms.
    #[default]
    ImplicitFast,
}

/// Friction cone model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrictionCone {
    /// Pyramidal approximation.
    Pyramidal,
    /// Elliptic cone.
    #[default]
    Elliptic,
}

/// `<option>` settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionConfig {
    /// Physics timestep in seconds.
    pub timestep: f64,
    /// Integration method.
    pub integrator: Integrator,
    /// Friction cone model.
    pub cone: FrictionCone,
    /// Ratio of frictional to normal constraint impedance.
    pub impratio: f64,
    /// Medium density (kg/m³).
    pub density: f64,
    /// Medium viscosity (Pa·s).
    pub viscosity: f64,
    /// `<flag>` child element.
    pub flag: OptionFlags,
}

impl Default for OptionConfig {
    fn default() -> Self {
        Self {
            timestep: 0.004,
            integrator: Integrator::default(),
            cone: FrictionCone::default(),
            impratio: 10.0,
            density: 1060.0,
            viscosity: 0.0035,
            flag: OptionFlags::default(),
        }
    }
}

impl OptionConfig {
    /// Validate option values.
    pub fn validate(&self) -> Result<()> {
        if !self.timestep.is_finite() || self.timestep <= 0.0 {
            return Err(NavigateError::invalid_config(format!(
                "timestep must be positive and finite, got {}",
                self.timestep
            )));
        }
        if self.impratio <= 0.0 {
            return Err(NavigateError::invalid_config("impratio must be > 0"));
        }
        if self.density < 0.0 || self.viscosity < 0.0 {
            return Err(NavigateError::invalid_config(
                "density and viscosity must be non-negative",
            ));
        }
        Ok(())
    }
}

/// `<option><flag>` switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionFlags {
    /// Multiple contacts per geom pair for convex collisions.
    pub multiccd: bool,
    /// Contact generation.
    pub contact: bool,
    /// Gravity.
    pub gravity: bool,
    /// Warm-start the constraint solver.
    pub warmstart: bool,
}

impl Default for OptionFlags {
    fn default() -> Self {
        Self {
            multiccd: true,
            contact: true,
            gravity: true,
            warmstart: true,
        }
    }
}

/// Angle unit used by the compiler for euler angles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AngleUnit {
    /// Radians.
    #[default]
    Radian,
    /// Degrees.
    Degree,
}

/// `<compiler>` settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Unit for angles in the model.
    pub angle: AngleUnit,
    /// Infer `limited` from the presence of a range.
    pub autolimits: bool,
    /// Directory for mesh assets, relative to the model file.
    pub meshdir: Option<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            angle: AngleUnit::Radian,
            autolimits: true,
            meshdir: None,
        }
    }
}

/// `<visual>` settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualConfig {
    /// `<visual><global>` settings.
    pub global: VisualGlobal,
    /// Scale of rendered sites relative to their size.
    pub scale_site: f64,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            global: VisualGlobal::default(),
            scale_site: 1.0,
        }
    }
}

/// `<visual><global>` settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualGlobal {
    /// Offscreen buffer width.
    pub offwidth: u32,
    /// Offscreen buffer height.
    pub offheight: u32,
    /// Default vertical field of view of free cameras (degrees).
    pub fovy: f64,
}

impl Default for VisualGlobal {
    fn default() -> Self {
        Self {
            offwidth: 1080,
            offheight: 1080,
            fovy: 45.0,
        }
    }
}

/// Guidewire geometry parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuidewireConfig {
    /// Nominal wire diameter (m).
    pub diameter: f64,
    /// Uniform scale applied to the wire geometry.
    pub scale: f64,
    /// Ratio between cylinder height and sphere radius of one segment.
    pub sphere_to_cylinder_ratio: f64,
    /// Number of bodies in the chain.
    pub n_bodies: usize,
}

impl Default for GuidewireConfig {
    fn default() -> Self {
        Self {
            diameter: 0.001,
            scale: 1.0,
            sphere_to_cylinder_ratio: 1.5,
            n_bodies: 80,
        }
    }
}

impl GuidewireConfig {
    /// Validate geometry values.
    pub fn validate(&self) -> Result<()> {
        if self.diameter <= 0.0 || self.scale <= 0.0 || self.sphere_to_cylinder_ratio <= 0.0 {
            return Err(NavigateError::invalid_config(
                "guidewire diameter, scale and ratio must be > 0",
            ));
        }
        if self.n_bodies == 0 {
            return Err(NavigateError::invalid_config("guidewire needs at least one body"));
        }
        Ok(())
    }

    /// Scaled body diameter.
    #[must_use]
    pub fn body_diameter(&self) -> f64 {
        self.diameter * self.scale
    }

    /// Radius of the collision sphere of one segment.
    #[must_use]
    pub fn sphere_radius(&self) -> f64 {
        (self.body_diameter() / 2.0) * self.scale
    }

    /// Height of the cylinder joining two spheres.
    #[must_use]
    pub fn cylinder_height(&self) -> f64 {
        self.sphere_radius() * self.sphere_to_cylinder_ratio
    }

    /// Distance between consecutive segment origins.
    #[must_use]
    pub fn offset(&self) -> f64 {
        self.sphere_radius() + self.cylinder_height() * 2.0
    }
}
