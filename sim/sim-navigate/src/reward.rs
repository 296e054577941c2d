//! Goal-distance reward.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Reward shaping parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardConfig {
    /// Success distance threshold (m). Success requires a strictly smaller
    /// distance.
    pub delta: f64,
    /// Dense (negative distance) or sparse (constant -1) reward while
    /// unsuccessful.
    pub dense: bool,
    /// Reward on success.
    pub success_reward: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            delta: 0.004,
            dense: true,
            success_reward: 10.0,
        }
    }
}

/// Result of one reward evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardOutcome {
    /// Scalar reward.
    pub reward: f64,
    /// Whether the goal was reached.
    pub success: bool,
    /// Euclidean distance between achieved and desired position.
    pub distance: f64,
}

/// Reward for reaching `desired` when the tip is at `achieved`.
///
/// # Example
///
/// ```
/// use sim_navigate::{compute_reward, RewardConfig};
/// use nalgebra::Point3;
///
/// let config = RewardConfig::default();
/// let hit = compute_reward(&config, &Point3::new(0.0, 0.0, 0.003), &Point3::origin());
/// assert!(hit.success);
/// assert_eq!(hit.reward, 10.0);
///
/// let miss = compute_reward(&config, &Point3::new(0.0, 0.0, 0.01), &Point3::origin());
/// assert!(!miss.success);
/// assert!((miss.reward + 0.01).abs() < 1e-12);
/// ```
#[must_use]
pub fn compute_reward(
    config: &RewardConfig,
    achieved: &Point3<f64>,
    desired: &Point3<f64>,
) -> RewardOutcome {
    let distance = nalgebra::distance(achieved, desired);
    let success = distance < config.delta;
    let reward = match (success, config.dense) {
        (true, _) => config.success_reward,
        (false, true) => -distance,
        (false, false) => -1.0,
    };
    RewardOutcome {
        reward,
        success,
        distance,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_success_is_strict() {
        let config = RewardConfig {
            delta: 0.5,
            ..Default::default()
        };
        let at = compute_reward(&config, &Point3::new(0.5, 0.0, 0.0), &Point3::origin());
        assert!(!at.success);
        assert_relative_eq!(at.reward, -0.5);

        let inside = compute_reward(&config, &Point3::new(0.499, 0.0, 0.0), &Point3::origin());
        assert!(inside.success);
    }

    #[test]
    fn test_sparse() {
        let config = RewardConfig {
            dense: false,
            ..Default::default()
        };
        let miss = compute_reward(&config, &Point3::new(1.0, 1.0, 1.0), &Point3::origin());
        assert_eq!(miss.reward, -1.0);
        let hit = compute_reward(&config, &Point3::new(0.001, 0.0, 0.0), &Point3::origin());
        assert_eq!(hit.reward, 10.0);
    }

    #[test]
    fn test_concrete_scenario() {
        let config = RewardConfig::default();
        let hit = compute_reward(&config, &Point3::new(0.0, 0.0, 0.003), &Point3::origin());
        assert!(hit.success);
        assert_eq!(hit.reward, 10.0);
        assert_relative_eq!(hit.distance, 0.003);

        let miss = compute_reward(&config, &Point3::new(0.0, 0.0, 0.01), &Point3::origin());
        assert!(!miss.success);
        assert_relative_eq!(miss.reward, -0.01);
    }
}
