//! Domain randomization.
//!
//! Two passes run at the start of every episode:
//!
//! - [`MjcfVariator`] rewrites attributes of the [`WorldTree`] before it is
//!   compiled (colours, sizes, positions).
//! - [`PhysicsVariator`] rewrites named parameters of the live simulation
//!   through [`Physics::set_parameter`].
//!
//! Both bind a [`Variation`] to a target and remember the target's value at
//! the first application, so every episode varies around the same initial
//! value instead of drifting.
//!
//! Observation noise lives here too: [`Noise`] corrupts an observed vector
//! element-wise.

use std::fmt;

use rand::RngCore;
use rand_distr::{Distribution as _, LogNormal, Normal, Uniform};
use tracing::trace;

use crate::physics::Physics;
use crate::world::{Attribute, ElementKind, WorldTree};
use crate::{NavigateError, Result};

// ============================================================================
// Distributions
// ============================================================================

/// A scalar random distribution.
#[derive(Debug, Clone, Copy)]
pub enum Distribution {
    /// Uniform on `[low, high]`.
    Uniform(Uniform<f64>),
    /// Gaussian.
    Normal(Normal<f64>),
    /// Log-normal: `exp(N(mu, sigma))`.
    LogNormal(LogNormal<f64>),
}

impl Distribution {
    /// Uniform on `[low, high]`. `low == high` is allowed and always yields
    /// `low`.
    ///
    /// # Errors
    ///
    /// Returns [`NavigateError::InvalidBounds`] if `low > high` or either
    /// bound is not finite.
    pub fn uniform(low: f64, high: f64) -> Result<Self> {
        if !(low.is_finite() && high.is_finite()) || low > high {
            return Err(NavigateError::InvalidBounds {
                min: low,
                max: high,
            });
        }
        Ok(Self::Uniform(Uniform::new_inclusive(low, high)))
    }

    /// Gaussian with the given mean and standard deviation.
    ///
    /// # Errors
    ///
    /// Returns an invalid configuration error for a negative or non-finite
    /// standard deviation.
    pub fn normal(mean: f64, std_dev: f64) -> Result<Self> {
        check_spread("normal", mean, std_dev)?;
        Normal::new(mean, std_dev)
            .map(Self::Normal)
            .map_err(|e| NavigateError::invalid_config(format!("normal distribution: {e}")))
    }

    /// Log-normal with the given underlying mean and sigma.
    ///
    /// # Errors
    ///
    /// Returns an invalid configuration error for a negative or non-finite
    /// sigma.
    pub fn log_normal(mu: f64, sigma: f64) -> Result<Self> {
        check_spread("log-normal", mu, sigma)?;
        LogNormal::new(mu, sigma)
            .map(Self::LogNormal)
            .map_err(|e| NavigateError::invalid_config(format!("log-normal distribution: {e}")))
    }

    /// Draw one value.
    pub fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        match self {
            Self::Uniform(d) => d.sample(rng),
            Self::Normal(d) => d.sample(rng),
            Self::LogNormal(d) => d.sample(rng),
        }
    }
}

/// Location must be finite and spread finite and non-negative.
fn check_spread(kind: &str, location: f64, spread: f64) -> Result<()> {
    if !location.is_finite() || !(spread.is_finite() && spread >= 0.0) {
        return Err(NavigateError::invalid_config(format!(
            "{kind} distribution: location {location}, spread {spread}"
        )));
    }
    Ok(())
}

// ============================================================================
// Variations
// ============================================================================

/// A randomization rule: computes a new value for a bound target.
///
/// `initial` is the target's value when the binding was first applied,
/// `current` its value right now.
pub trait Variation: fmt::Debug {
    /// Compute the new value.
    fn evaluate(&self, initial: &[f64], current: &[f64], rng: &mut dyn RngCore) -> Vec<f64>;
}

impl Variation for Distribution {
    /// One independent draw per element of `current` (one draw for an empty
    /// target).
    fn evaluate(&self, _initial: &[f64], current: &[f64], rng: &mut dyn RngCore) -> Vec<f64> {
        let n = current.len().max(1);
        (0..n).map(|_| self.sample(rng)).collect()
    }
}

/// Scale the initial value by a random factor per element.
#[derive(Debug, Clone, Copy)]
pub struct Scaled(pub Distribution);

impl Variation for Scaled {
    fn evaluate(&self, initial: &[f64], _current: &[f64], rng: &mut dyn RngCore) -> Vec<f64> {
        initial.iter().map(|v| v * self.0.sample(rng)).collect()
    }
}

/// Offset the initial value by a random amount per element.
#[derive(Debug, Clone, Copy)]
pub struct Offset(pub Distribution);

impl Variation for Offset {
    fn evaluate(&self, initial: &[f64], _current: &[f64], rng: &mut dyn RngCore) -> Vec<f64> {
        initial.iter().map(|v| v + self.0.sample(rng)).collect()
    }
}

// ============================================================================
// Noise
// ============================================================================

/// Observation corruption.
#[derive(Debug, Clone, Copy)]
pub enum Noise {
    /// `value + sample`.
    Additive(Distribution),
    /// `value * sample`.
    Multiplicative(Distribution),
}

impl Noise {
    /// Corrupt every element independently.
    pub fn corrupt(&self, values: &[f64], rng: &mut dyn RngCore) -> Vec<f64> {
        match self {
            Self::Additive(d) => values.iter().map(|v| v + d.sample(rng)).collect(),
            Self::Multiplicative(d) => values.iter().map(|v| v * d.sample(rng)).collect(),
        }
    }
}

// ============================================================================
// Variators
// ============================================================================

#[derive(Debug)]
struct MjcfBinding {
    kind: ElementKind,
    name: String,
    attribute: Attribute,
    variation: Box<dyn Variation>,
    initial: Option<Vec<f64>>,
}

/// Structural variation applied to the world description before compile.
#[derive(Debug, Default)]
pub struct MjcfVariator {
    bindings: Vec<MjcfBinding>,
}

impl MjcfVariator {
    /// Create a variator with no bindings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a variation to an attribute of a named element.
    pub fn bind(
        &mut self,
        kind: ElementKind,
        name: impl Into<String>,
        attribute: Attribute,
        variation: impl Variation + 'static,
    ) {
        self.bindings.push(MjcfBinding {
            kind,
            name: name.into(),
            attribute,
            variation: Box::new(variation),
            initial: None,
        });
    }

    /// Number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Check if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Apply every binding in order.
    ///
    /// # Errors
    ///
    /// Fails if a bound element does not exist or the variation produced a
    /// value of the wrong arity for the attribute.
    pub fn apply_variations(&mut self, world: &mut WorldTree, rng: &mut dyn RngCore) -> Result<()> {
        for binding in &mut self.bindings {
            let current = world.attribute(binding.kind, &binding.name, binding.attribute)?;
            let initial = binding
                .initial
                .get_or_insert_with(|| current.clone())
                .as_slice();
            let value = binding.variation.evaluate(initial, &current, rng);
            trace!(element = %binding.name, ?value, "structural variation");
            world.set_attribute(binding.kind, &binding.name, binding.attribute, &value)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct PhysicsBinding {
    parameter: String,
    variation: Box<dyn Variation>,
    initial: Option<Vec<f64>>,
}

/// Variation applied to live simulation parameters after compile.
#[derive(Debug, Default)]
pub struct PhysicsVariator {
    bindings: Vec<PhysicsBinding>,
}

impl PhysicsVariator {
    /// Create a variator with no bindings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a variation to a named backend parameter.
    pub fn bind(&mut self, parameter: impl Into<String>, variation: impl Variation + 'static) {
        self.bindings.push(PhysicsBinding {
            parameter: parameter.into(),
            variation: Box::new(variation),
            initial: None,
        });
    }

    /// Number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Check if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Apply every binding in order.
    ///
    /// # Errors
    ///
    /// Backend errors (unknown parameter, bad value) are returned unchanged
    /// inside [`NavigateError::Physics`].
    pub fn apply_variations(
        &mut self,
        physics: &mut dyn Physics,
        rng: &mut dyn RngCore,
    ) -> Result<()> {
        for binding in &mut self.bindings {
            let current = physics.parameter(&binding.parameter)?;
            let initial = binding
                .initial
                .get_or_insert_with(|| current.clone())
                .as_slice();
            let value = binding.variation.evaluate(initial, &current, rng);
            trace!(parameter = %binding.parameter, ?value, "physics variation");
            physics.set_parameter(&binding.parameter, &value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::world::{Body, Geom, GeomShape};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn world_with_ball() -> WorldTree {
        let mut world = WorldTree::new("test");
        world
            .attach(
                Body::new("holder")
                    .with_geom(Geom::new("ball", GeomShape::Sphere { radius: 0.01 })),
            )
            .unwrap();
        world
    }

    #[test]
    fn test_uniform_stays_in_range() {
        let d = Distribution::uniform(-0.5, 0.25).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let v = d.sample(&mut rng);
            assert!((-0.5..=0.25).contains(&v));
        }
    }

    #[test]
    fn test_degenerate_uniform() {
        let d = Distribution::uniform(0.3, 0.3).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(d.sample(&mut rng), 0.3);
    }

    #[test]
    fn test_invalid_distributions() {
        assert!(Distribution::uniform(1.0, 0.0).is_err());
        assert!(Distribution::uniform(f64::NAN, 0.0).is_err());
        assert!(Distribution::normal(0.0, -1.0).unwrap_err().is_config_error());
        assert!(Distribution::log_normal(0.0, f64::INFINITY).is_err());
        assert!(Distribution::log_normal(0.0, -1e-4).unwrap_err().is_config_error());
        assert!(Distribution::normal(f64::NAN, 1.0).is_err());
        assert!(Distribution::normal(0.0, 0.0).is_ok());
    }

    #[test]
    fn test_noise_is_small() {
        let mut rng = StdRng::seed_from_u64(3);
        let additive = Noise::Additive(Distribution::normal(0.0, 1e-4).unwrap());
        let multiplicative = Noise::Multiplicative(Distribution::log_normal(0.0, 1e-4).unwrap());
        let values = [1.0, -2.0, 0.5];

        let a = additive.corrupt(&values, &mut rng);
        let m = multiplicative.corrupt(&values, &mut rng);
        assert_eq!(a.len(), 3);
        for (v, (a, m)) in values.iter().zip(a.iter().zip(&m)) {
            assert!((a - v).abs() < 1e-2);
            assert!((m / v - 1.0).abs() < 1e-2);
        }
        // Multiplicative noise keeps zeros at zero.
        assert_eq!(multiplicative.corrupt(&[0.0], &mut rng), vec![0.0]);
    }

    #[test]
    fn test_mjcf_variator_varies_around_initial() {
        let mut world = world_with_ball();
        let mut variator = MjcfVariator::new();
        variator.bind(
            ElementKind::Geom,
            "ball",
            Attribute::Size,
            Scaled(Distribution::uniform(2.0, 2.0).unwrap()),
        );
        let mut rng = StdRng::seed_from_u64(0);

        variator.apply_variations(&mut world, &mut rng).unwrap();
        variator.apply_variations(&mut world, &mut rng).unwrap();

        // Scaled from the remembered initial radius, not compounded.
        let size = world
            .attribute(ElementKind::Geom, "ball", Attribute::Size)
            .unwrap();
        assert_eq!(size, vec![0.02]);
    }

    #[test]
    fn test_mjcf_variator_unknown_element() {
        let mut world = world_with_ball();
        let mut variator = MjcfVariator::new();
        variator.bind(
            ElementKind::Geom,
            "missing",
            Attribute::Rgba,
            Distribution::uniform(0.0, 1.0).unwrap(),
        );
        let mut rng = StdRng::seed_from_u64(0);
        let err = variator.apply_variations(&mut world, &mut rng).unwrap_err();
        assert!(matches!(err, NavigateError::ElementNotFound { .. }));
    }

    #[test]
    fn test_distribution_variation_matches_arity() {
        let mut world = world_with_ball();
        let mut variator = MjcfVariator::new();
        variator.bind(
            ElementKind::Geom,
            "ball",
            Attribute::Rgba,
            Distribution::uniform(0.0, 1.0).unwrap(),
        );
        let mut rng = StdRng::seed_from_u64(11);
        variator.apply_variations(&mut world, &mut rng).unwrap();
        let rgba = world
            .attribute(ElementKind::Geom, "ball", Attribute::Rgba)
            .unwrap();
        assert_eq!(rgba.len(), 4);
        assert!(rgba.iter().all(|c| (0.0..=1.0).contains(c)));
        assert_eq!(variator.len(), 1);
    }
}
