//! Episode driver around a [`Navigate`] task.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::observable::Observation;
use crate::physics::CompilePhysics;
use crate::task::Navigate;
use crate::Result;

/// Position of a time step within its episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepType {
    /// Returned by [`Environment::reset`].
    First,
    /// Any step that does not end the episode.
    Mid,
    /// The final step.
    Last,
}

/// Why an episode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeEnd {
    /// The task reported success.
    Success,
    /// Simulation time reached the time limit.
    Timeout,
}

/// One transition.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeStep {
    /// Position within the episode.
    pub step_type: StepType,
    /// Reward; `None` on the first step.
    pub reward: Option<f64>,
    /// Discount; `None` on the first step, 0 after success, 1 otherwise.
    pub discount: Option<f64>,
    /// Enabled observables.
    pub observation: Observation,
    /// Why the episode ended, on the last step.
    pub end: Option<EpisodeEnd>,
}

impl TimeStep {
    /// Check if this is the first step of an episode.
    #[must_use]
    pub fn first(&self) -> bool {
        self.step_type == StepType::First
    }

    /// Check if this is the last step of an episode.
    #[must_use]
    pub fn last(&self) -> bool {
        self.step_type == StepType::Last
    }
}

/// Runs episodes of a task on a compiled physics backend.
///
/// Every reset recompiles the world, so structural variation takes effect.
/// All randomness comes from one seeded generator owned by the environment.
#[derive(Debug)]
pub struct Environment<P: CompilePhysics> {
    task: Navigate,
    physics: Option<P>,
    rng: StdRng,
    time_limit: f64,
    reset_next_step: bool,
}

impl<P: CompilePhysics> Environment<P> {
    /// Wrap a task, seeding the random source. No time limit.
    #[must_use]
    pub fn new(task: Navigate, seed: u64) -> Self {
        Self {
            task,
            physics: None,
            rng: StdRng::seed_from_u64(seed),
            time_limit: f64::INFINITY,
            reset_next_step: true,
        }
    }

    /// End episodes once simulation time reaches `seconds`.
    #[must_use]
    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.time_limit = seconds;
        self
    }

    /// The task.
    #[must_use]
    pub const fn task(&self) -> &Navigate {
        &self.task
    }

    /// The task (mutable).
    pub fn task_mut(&mut self) -> &mut Navigate {
        &mut self.task
    }

    /// The physics of the current episode.
    #[must_use]
    pub const fn physics(&self) -> Option<&P> {
        self.physics.as_ref()
    }

    /// The physics of the current episode (mutable).
    pub fn physics_mut(&mut self) -> Option<&mut P> {
        self.physics.as_mut()
    }

    /// The episode time limit (seconds).
    #[must_use]
    pub const fn time_limit(&self) -> f64 {
        self.time_limit
    }

    /// Start a new episode.
    ///
    /// # Errors
    ///
    /// Variation, compilation and initialization errors.
    pub fn reset(&mut self) -> Result<TimeStep> {
        self.task.initialize_episode_mjcf(&mut self.rng)?;
        let mut physics = P::compile(self.task.world())?;
        self.task.initialize_episode(&mut physics, &mut self.rng)?;
        let observation = self.task.observe(&physics, &mut self.rng)?;
        self.physics = Some(physics);
        self.reset_next_step = false;
        debug!("episode reset");
        Ok(TimeStep {
            step_type: StepType::First,
            reward: None,
            discount: None,
            observation,
            end: None,
        })
    }

    /// Apply `action` for one control step.
    ///
    /// After the last step of an episode, the next call resets instead.
    ///
    /// # Errors
    ///
    /// Backend errors, or an unresolved target at reward time.
    pub fn step(&mut self, action: &[f64]) -> Result<TimeStep> {
        if self.reset_next_step {
            return self.reset();
        }
        let Some(physics) = self.physics.as_mut() else {
            return self.reset();
        };

        physics.set_control(action)?;
        for _ in 0..self.task.num_substeps() {
            physics.step()?;
        }

        let reward = self.task.get_reward(physics)?;
        let terminate = self.task.should_terminate_episode();
        let observation = self.task.observe(physics, &mut self.rng)?;

        let end = if terminate {
            Some(EpisodeEnd::Success)
        } else if physics.time() >= self.time_limit - self.task.physics_timestep() * 0.5 {
            Some(EpisodeEnd::Timeout)
        } else {
            None
        };
        if let Some(end) = end {
            info!(?end, reward, time = physics.time(), "episode finished");
            self.reset_next_step = true;
        }

        Ok(TimeStep {
            step_type: if end.is_some() {
                StepType::Last
            } else {
                StepType::Mid
            },
            reward: Some(reward),
            discount: Some(if end == Some(EpisodeEnd::Success) {
                0.0
            } else {
                1.0
            }),
            observation,
            end,
        })
    }
}
