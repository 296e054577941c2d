//! Spatial sampling: initial-pose jitter and target points inside a mesh.

use nalgebra::{Point3, Vector3};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::mesh::ClosedMesh;
use crate::variation::{Distribution, Variation};
use crate::{NavigateError, Result};

/// Default jitter half-width (m).
const DEFAULT_HALF_WIDTH: f64 = 0.001;

/// Uniform 3-D offset with an independent range per axis.
///
/// The name is historical: the sampled region is an axis-aligned box, not a
/// disc.
#[derive(Debug, Clone, Copy)]
pub struct UniformCircle {
    x: Distribution,
    y: Distribution,
    z: Distribution,
}

impl UniformCircle {
    /// Offsets drawn from `x_range × y_range × z_range`.
    ///
    /// # Errors
    ///
    /// Returns [`NavigateError::InvalidBounds`] for an inverted or non-finite
    /// range.
    pub fn new(x_range: (f64, f64), y_range: (f64, f64), z_range: (f64, f64)) -> Result<Self> {
        Ok(Self {
            x: Distribution::uniform(x_range.0, x_range.1)?,
            y: Distribution::uniform(y_range.0, y_range.1)?,
            z: Distribution::uniform(z_range.0, z_range.1)?,
        })
    }

    /// Offsets within `±half_width` on every axis.
    ///
    /// # Errors
    ///
    /// Returns [`NavigateError::InvalidBounds`] for a negative or non-finite
    /// half-width.
    pub fn symmetric(half_width: f64) -> Result<Self> {
        let range = (-half_width, half_width);
        Self::new(range, range, range)
    }

    /// Draw one offset: x, then y, then z.
    pub fn sample(&self, rng: &mut dyn RngCore) -> Vector3<f64> {
        let x = self.x.sample(rng);
        let y = self.y.sample(rng);
        let z = self.z.sample(rng);
        Vector3::new(x, y, z)
    }
}

impl Default for UniformCircle {
    fn default() -> Self {
        let d = Distribution::Uniform(rand_distr::Uniform::new_inclusive(
            -DEFAULT_HALF_WIDTH,
            DEFAULT_HALF_WIDTH,
        ));
        Self { x: d, y: d, z: d }
    }
}

impl Variation for UniformCircle {
    fn evaluate(&self, _initial: &[f64], _current: &[f64], rng: &mut dyn RngCore) -> Vec<f64> {
        self.sample(rng).as_slice().to_vec()
    }
}

/// How long rejection sampling may keep drawing batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Draw until a point is found. Never returns if the slab misses the
    /// mesh volume.
    Unbounded,
    /// Give up after this many batches.
    Capped(usize),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Capped(1000)
    }
}

/// Sample a point inside `mesh` whose y coordinate lies strictly between
/// `y_bounds.0` and `y_bounds.1`.
///
/// Draws batches of `n_points` volume samples until at least one survives
/// the slab filter, then returns one survivor chosen uniformly.
///
/// # Errors
///
/// - [`NavigateError::InvalidBounds`] if the slab is empty or not finite.
/// - [`NavigateError::InvalidConfig`] for `n_points == 0` or an empty mesh.
/// - [`NavigateError::SamplingExhausted`] when a capped policy runs out.
pub fn sample_points<R: Rng + ?Sized>(
    mesh: &ClosedMesh,
    y_bounds: (f64, f64),
    n_points: usize,
    policy: RetryPolicy,
    rng: &mut R,
) -> Result<Point3<f64>> {
    let (min_y, max_y) = y_bounds;
    if !(min_y.is_finite() && max_y.is_finite()) || min_y >= max_y {
        return Err(NavigateError::InvalidBounds {
            min: min_y,
            max: max_y,
        });
    }
    if n_points == 0 {
        return Err(NavigateError::invalid_config("batch size must be positive"));
    }
    if mesh.is_empty() {
        return Err(NavigateError::invalid_config("cannot sample an empty mesh"));
    }
    if policy == RetryPolicy::Unbounded {
        warn!(min_y, max_y, "sampling without a retry cap");
    }

    let mut attempts = 0_usize;
    loop {
        if let RetryPolicy::Capped(cap) = policy {
            if attempts >= cap {
                return Err(NavigateError::SamplingExhausted { attempts });
            }
        }
        attempts += 1;

        let survivors: Vec<Point3<f64>> = mesh
            .sample_volume(n_points, rng)
            .into_iter()
            .filter(|p| min_y < p.y && p.y < max_y)
            .collect();

        match survivors.as_slice() {
            [] => debug!(attempts, "no sample inside the slab, redrawing"),
            [single] => return Ok(*single),
            many => {
                if let Some(point) = many.choose(rng) {
                    debug!(attempts, candidates = many.len(), "sampled point in slab");
                    return Ok(*point);
                }
            }
        }
    }
}
