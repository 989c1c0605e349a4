//! Integration test harness for the sluice workspace.
//!
//! Drives full recorder lifecycles over scripted entities the way a
//! simulation engine would: setup once, then reset → after per timestep
//! → finish per run.

use chrono::NaiveDate;

use sluice_model::{Domain, ScenarioDomain, Timestep, Timestepper};
use sluice_recorders::{Error, RecorderSet, Result, SharedRecorder, StepContext};

/// A run domain plus a recorder roster, driven together.
pub struct TestHarness {
    domain: Domain,
    recorders: RecorderSet,
}

impl TestHarness {
    /// A daily clock starting 2020-01-01.
    pub fn daily(n_days: u64, scenarios: ScenarioDomain) -> Self {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let end = start + chrono::Days::new(n_days - 1);
        Self::with_timestepper(Timestepper::new(start, end, 1), scenarios)
    }

    pub fn with_timestepper(stepper: Timestepper, scenarios: ScenarioDomain) -> Self {
        Self {
            domain: Domain::from_timestepper(&stepper, scenarios),
            recorders: RecorderSet::new(),
        }
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn recorders(&self) -> &RecorderSet {
        &self.recorders
    }

    pub fn add(&mut self, recorder: SharedRecorder) -> Result<()> {
        self.recorders.add(recorder)
    }

    /// Adopt a roster built elsewhere (e.g. by the config loader).
    pub fn set_recorders(&mut self, recorders: RecorderSet) {
        self.recorders = recorders;
    }

    /// Size every recorder to the domain. Call once before `run`.
    pub fn setup(&self) -> Result<()> {
        self.recorders.setup(&self.domain)
    }

    /// One full run: reset, one after per timestep, finish. The `step`
    /// closure plays the engine, updating entity state before the
    /// recorders observe it. Call repeatedly for replays.
    pub fn run(&self, mut step: impl FnMut(&Timestep)) -> Result<()> {
        self.recorders.reset()?;
        for timestep in self.domain.timesteps() {
            step(timestep);
            self.recorders.after(&StepContext {
                timestep,
                domain: &self.domain,
            })?;
        }
        self.recorders.finish()
    }

    /// A named recorder's per-scenario values.
    pub fn values(&self, name: &str) -> Result<Vec<f64>> {
        self.recorders
            .get(name)
            .ok_or_else(|| Error::RecorderNotFound(name.to_string()))?
            .borrow()
            .values()
    }

    /// A named recorder's scenario-aggregated scalar.
    pub fn aggregated_value(&self, name: &str) -> Result<f64> {
        self.recorders
            .get(name)
            .ok_or_else(|| Error::RecorderNotFound(name.to_string()))?
            .borrow()
            .aggregated_value()
    }
}
