//! Run domain
//!
//! The configuration a recorder sizes its buffers against: the run clock
//! and the scenario combinations. Fixed for the lifetime between two
//! `setup()` calls; changing either requires a fresh setup pass.

use crate::scenario::{ScenarioDomain, ScenarioIndex};
use crate::time::{Timestep, Timestepper};

/// The `[timesteps × scenarios]` shape of a run.
#[derive(Debug, Clone)]
pub struct Domain {
    timesteps: Vec<Timestep>,
    scenarios: ScenarioDomain,
}

impl Domain {
    pub fn new(timesteps: Vec<Timestep>, scenarios: ScenarioDomain) -> Self {
        Self {
            timesteps,
            scenarios,
        }
    }

    /// Build a domain from a clock generator and scenario set.
    pub fn from_timestepper(stepper: &Timestepper, scenarios: ScenarioDomain) -> Self {
        Self::new(stepper.timesteps(), scenarios)
    }

    /// Number of timesteps in the run.
    pub fn n_timesteps(&self) -> usize {
        self.timesteps.len()
    }

    /// Number of scenario combinations.
    pub fn n_combinations(&self) -> usize {
        self.scenarios.len()
    }

    /// The run clock in step order.
    pub fn timesteps(&self) -> &[Timestep] {
        &self.timesteps
    }

    /// Scenario combinations in global-id order.
    pub fn combinations(&self) -> &[ScenarioIndex] {
        self.scenarios.combinations()
    }

    /// The scenario dimension set.
    pub fn scenarios(&self) -> &ScenarioDomain {
        &self.scenarios
    }
}
