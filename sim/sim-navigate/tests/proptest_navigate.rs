//! Property-based tests for rewards and target sampling.
//!
//! Run with: cargo test -p sim-navigate -- proptest

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sim_navigate::{
    compute_reward, sample_points, ClosedMesh, NavigateError, Point3, RetryPolicy, RewardConfig,
    UniformCircle, Vector3,
};

// =============================================================================
// Strategies
// =============================================================================

fn arb_point() -> impl Strategy<Value = Point3<f64>> {
    prop::array::uniform3(-0.5..0.5f64).prop_map(|[x, y, z]| Point3::new(x, y, z))
}

fn arb_delta() -> impl Strategy<Value = f64> {
    1e-4..0.05f64
}

fn dense(delta: f64) -> RewardConfig {
    RewardConfig {
        delta,
        dense: true,
        success_reward: 10.0,
    }
}

fn phantom_box() -> ClosedMesh {
    ClosedMesh::cuboid(Point3::new(-0.04, -0.01, -0.01), Point3::new(0.04, 0.22, 0.01))
}

// =============================================================================
// Rewards
// =============================================================================

proptest! {
    #[test]
    fn proptest_dense_reward_decreases_with_distance(
        desired in arb_point(),
        direction in arb_point(),
        beyond in 1e-6..0.2f64,
        extra in 1e-6..0.2f64,
        delta in arb_delta(),
    ) {
        prop_assume!(direction.coords.norm() > 1e-6);
        let unit = direction.coords.normalize();
        let cfg = dense(delta);
        let near = delta + beyond;
        let close = compute_reward(&cfg, &(desired + unit * near), &desired);
        let far = compute_reward(&cfg, &(desired + unit * (near + extra)), &desired);
        prop_assert!(!close.success && !far.success);
        prop_assert!(close.reward > far.reward);
    }

    #[test]
    fn proptest_success_is_strictly_inside_delta(
        achieved in arb_point(),
        desired in arb_point(),
        delta in arb_delta(),
    ) {
        let outcome = compute_reward(&dense(delta), &achieved, &desired);
        let distance = nalgebra::distance(&achieved, &desired);
        prop_assert_eq!(outcome.success, distance < delta);
    }

    #[test]
    fn proptest_success_reward_same_in_both_modes(
        desired in arb_point(),
        offset in prop::array::uniform3(-1e-3..1e-3f64),
    ) {
        let achieved = desired + Vector3::from(offset);
        let sparse = RewardConfig { dense: false, ..dense(0.004) };
        let a = compute_reward(&dense(0.004), &achieved, &desired);
        let b = compute_reward(&sparse, &achieved, &desired);
        prop_assert!(a.success && b.success);
        prop_assert_eq!(a.reward, b.reward);
        prop_assert_eq!(a.reward, 10.0);
    }

    #[test]
    fn proptest_sparse_failure_is_minus_one(
        desired in arb_point(),
        achieved in arb_point(),
    ) {
        prop_assume!((achieved - desired).norm() >= 0.004);
        let sparse = RewardConfig { dense: false, ..dense(0.004) };
        prop_assert_eq!(compute_reward(&sparse, &achieved, &desired).reward, -1.0);
    }
}

#[test]
fn distance_equal_to_delta_is_not_success() {
    let outcome = compute_reward(
        &dense(0.5),
        &Point3::new(0.0, 0.0, 0.5),
        &Point3::origin(),
    );
    assert!(!outcome.success);
    assert_eq!(outcome.reward, -0.5);
}

#[test]
fn near_and_far_scenario() {
    let cfg = RewardConfig::default();
    let near = compute_reward(&cfg, &Point3::new(0.0, 0.0, 0.003), &Point3::origin());
    assert!(near.success);
    assert_eq!(near.reward, 10.0);

    let far = compute_reward(&cfg, &Point3::new(0.0, 0.0, 0.01), &Point3::origin());
    assert!(!far.success);
    assert!((far.reward + 0.01).abs() < 1e-12);
}

// =============================================================================
// Sampling
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn proptest_sampled_points_inside_mesh_and_slab(
        seed in any::<u64>(),
        low in 0.0..0.15f64,
        width in 0.01..0.05f64,
        n_points in 1usize..20,
    ) {
        let mesh = phantom_box();
        let bounds = (low, low + width);
        let mut rng = StdRng::seed_from_u64(seed);
        let point = sample_points(&mesh, bounds, n_points, RetryPolicy::Capped(1000), &mut rng).unwrap();
        prop_assert!(bounds.0 < point.y && point.y < bounds.1);
        prop_assert!(mesh.contains(&point));
    }

    #[test]
    fn proptest_jitter_within_half_width(seed in any::<u64>(), half in 1e-4..0.01f64) {
        let circle = UniformCircle::symmetric(half).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        let v = circle.sample(&mut rng);
        prop_assert!(v.iter().all(|c| c.abs() <= half));
    }
}

#[test]
fn slab_outside_mesh_exhausts_retries() {
    let mut rng = StdRng::seed_from_u64(0);
    let err = sample_points(&phantom_box(), (0.5, 0.6), 10, RetryPolicy::Capped(5), &mut rng)
        .unwrap_err();
    assert!(matches!(err, NavigateError::SamplingExhausted { attempts: 5 }));
}

#[test]
fn same_seed_same_sample() {
    let draw = |seed| {
        let mut rng = StdRng::seed_from_u64(seed);
        sample_points(&phantom_box(), (0.0954, 0.1342), 10, RetryPolicy::default(), &mut rng).unwrap()
    };
    assert_eq!(draw(42), draw(42));
}
