//! Constant-value recorders
//!
//! Each folds the current step's entity state into one running scalar
//! per scenario. Totals integrate over elapsed days; mean and frequency
//! variants finalise by the elapsed step count at `finish()`.

use std::rc::Rc;

use sluice_model::{Domain, FlowNode, IndexParameter, Parameter, StorageNode};

use crate::error::{Error, Result};
use crate::recorder::{Dependency, Recorder, RecorderMeta, StepContext};

/// A flow is counted as failing its bound when it misses by more than
/// this tolerance.
pub const DEFICIT_TOLERANCE: f64 = 1e-6;

/// Per-scenario accumulator and step counter shared by every constant
/// recorder.
#[derive(Debug)]
struct ScalarCore {
    meta: RecorderMeta,
    accumulator: Option<Vec<f64>>,
    steps: usize,
}

impl ScalarCore {
    fn new(meta: RecorderMeta) -> Self {
        Self {
            meta,
            accumulator: None,
            steps: 0,
        }
    }

    fn setup(&mut self, domain: &Domain) {
        self.accumulator = Some(vec![0.0; domain.n_combinations()]);
        self.steps = 0;
    }

    fn reset_to(&mut self, value: f64) -> Result<()> {
        let name = self.meta.name.clone();
        self.accumulator
            .as_mut()
            .ok_or(Error::NotSetup {
                recorder: name,
                operation: "reset",
            })?
            .fill(value);
        self.steps = 0;
        Ok(())
    }

    fn accumulator_mut(&mut self) -> Result<&mut [f64]> {
        let name = self.meta.name.clone();
        Ok(self
            .accumulator
            .as_mut()
            .ok_or(Error::NotSetup {
                recorder: name,
                operation: "after",
            })?
            .as_mut_slice())
    }

    fn values(&self) -> Result<Vec<f64>> {
        self.accumulator.clone().ok_or_else(|| Error::NotSetup {
            recorder: self.meta.name.clone(),
            operation: "values",
        })
    }

    /// Divide the accumulator by the elapsed step count.
    fn divide_by_steps(&mut self) -> Result<()> {
        let steps = self.steps as f64;
        for value in self.accumulator_mut()? {
            *value /= steps;
        }
        Ok(())
    }
}

macro_rules! forward_recorder_base {
    () => {
        fn meta(&self) -> &RecorderMeta {
            &self.core.meta
        }

        fn values(&self) -> Result<Vec<f64>> {
            self.core.values()
        }
    };
}

/// Accumulated shortfall against a node's flow bound, in volume-days.
pub struct TotalDeficitRecorder {
    core: ScalarCore,
    node: Rc<dyn FlowNode>,
}

impl TotalDeficitRecorder {
    pub fn new(meta: RecorderMeta, node: Rc<dyn FlowNode>) -> Self {
        node.recorder_attached(&meta.name);
        Self {
            core: ScalarCore::new(meta),
            node,
        }
    }
}

impl Recorder for TotalDeficitRecorder {
    forward_recorder_base!();

    fn setup(&mut self, domain: &Domain) -> Result<()> {
        self.core.setup(domain);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.core.reset_to(0.0)
    }

    fn after(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        let days = ctx.timestep.days;
        let node = self.node.clone();
        let accumulator = self.core.accumulator_mut()?;
        for scenario in ctx.domain.combinations() {
            let deficit = node.max_flow(scenario) - node.flow(scenario);
            accumulator[scenario.global_id] += deficit * days;
        }
        self.core.steps += 1;
        Ok(())
    }
}

/// Total flow through a node, scaled by a factor and integrated over
/// elapsed days.
pub struct TotalFlowRecorder {
    core: ScalarCore,
    node: Rc<dyn FlowNode>,
    factor: f64,
}

impl TotalFlowRecorder {
    pub fn new(meta: RecorderMeta, node: Rc<dyn FlowNode>, factor: f64) -> Self {
        node.recorder_attached(&meta.name);
        Self {
            core: ScalarCore::new(meta),
            node,
            factor,
        }
    }
}

impl Recorder for TotalFlowRecorder {
    forward_recorder_base!();

    fn setup(&mut self, domain: &Domain) -> Result<()> {
        self.core.setup(domain);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.core.reset_to(0.0)
    }

    fn after(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        let scale = self.factor * ctx.timestep.days;
        let node = self.node.clone();
        let accumulator = self.core.accumulator_mut()?;
        for scenario in ctx.domain.combinations() {
            accumulator[scenario.global_id] += node.flow(scenario) * scale;
        }
        self.core.steps += 1;
        Ok(())
    }
}

/// Mean flow through a node across the run.
pub struct MeanFlowRecorder {
    core: ScalarCore,
    node: Rc<dyn FlowNode>,
    factor: f64,
}

impl MeanFlowRecorder {
    pub fn new(meta: RecorderMeta, node: Rc<dyn FlowNode>, factor: f64) -> Self {
        node.recorder_attached(&meta.name);
        Self {
            core: ScalarCore::new(meta),
            node,
            factor,
        }
    }
}

impl Recorder for MeanFlowRecorder {
    forward_recorder_base!();

    fn setup(&mut self, domain: &Domain) -> Result<()> {
        self.core.setup(domain);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.core.reset_to(0.0)
    }

    fn after(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        let node = self.node.clone();
        let factor = self.factor;
        let accumulator = self.core.accumulator_mut()?;
        for scenario in ctx.domain.combinations() {
            accumulator[scenario.global_id] += node.flow(scenario) * factor;
        }
        self.core.steps += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.core.divide_by_steps()
    }
}

/// Fraction of timesteps on which a node missed its flow bound.
pub struct DeficitFrequencyRecorder {
    core: ScalarCore,
    node: Rc<dyn FlowNode>,
}

impl DeficitFrequencyRecorder {
    pub fn new(meta: RecorderMeta, node: Rc<dyn FlowNode>) -> Self {
        node.recorder_attached(&meta.name);
        Self {
            core: ScalarCore::new(meta),
            node,
        }
    }
}

impl Recorder for DeficitFrequencyRecorder {
    forward_recorder_base!();

    fn setup(&mut self, domain: &Domain) -> Result<()> {
        self.core.setup(domain);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.core.reset_to(0.0)
    }

    fn after(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        let node = self.node.clone();
        let accumulator = self.core.accumulator_mut()?;
        for scenario in ctx.domain.combinations() {
            let miss = (node.flow(scenario) - node.max_flow(scenario)).abs();
            if miss > DEFICIT_TOLERANCE {
                accumulator[scenario.global_id] += 1.0;
            }
        }
        self.core.steps += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.core.divide_by_steps()
    }
}

/// Lowest volume a storage reached during the run.
pub struct MinimumVolumeRecorder {
    core: ScalarCore,
    storage: Rc<dyn StorageNode>,
}

impl MinimumVolumeRecorder {
    pub fn new(meta: RecorderMeta, storage: Rc<dyn StorageNode>) -> Self {
        storage.recorder_attached(&meta.name);
        Self {
            core: ScalarCore::new(meta),
            storage,
        }
    }
}

impl Recorder for MinimumVolumeRecorder {
    forward_recorder_base!();

    fn setup(&mut self, domain: &Domain) -> Result<()> {
        self.core.setup(domain);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.core.reset_to(f64::INFINITY)
    }

    fn after(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        let storage = self.storage.clone();
        let accumulator = self.core.accumulator_mut()?;
        for scenario in ctx.domain.combinations() {
            let volume = storage.volume(scenario);
            let slot = &mut accumulator[scenario.global_id];
            *slot = slot.min(volume);
        }
        self.core.steps += 1;
        Ok(())
    }
}

/// Latched 0/1 flag: set the first time a storage's volume drops to the
/// threshold or below, never cleared mid-run.
pub struct StorageThresholdRecorder {
    core: ScalarCore,
    storage: Rc<dyn StorageNode>,
    threshold: f64,
}

impl StorageThresholdRecorder {
    pub fn new(meta: RecorderMeta, storage: Rc<dyn StorageNode>, threshold: f64) -> Self {
        storage.recorder_attached(&meta.name);
        Self {
            core: ScalarCore::new(meta),
            storage,
            threshold,
        }
    }
}

impl Recorder for StorageThresholdRecorder {
    forward_recorder_base!();

    fn setup(&mut self, domain: &Domain) -> Result<()> {
        self.core.setup(domain);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.core.reset_to(0.0)
    }

    fn after(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        let storage = self.storage.clone();
        let threshold = self.threshold;
        let accumulator = self.core.accumulator_mut()?;
        for scenario in ctx.domain.combinations() {
            if storage.volume(scenario) <= threshold {
                accumulator[scenario.global_id] = 1.0;
            }
        }
        self.core.steps += 1;
        Ok(())
    }
}

/// Number of calendar years whose maximum index met or exceeded a
/// threshold.
///
/// The per-year maximum is carried until a year boundary is seen; the
/// year still in progress at the end of the run is checked at
/// `finish()` so it is never dropped.
pub struct AnnualCountIndexThresholdRecorder {
    core: ScalarCore,
    parameter: Rc<dyn IndexParameter>,
    threshold: usize,
    year_max: Vec<usize>,
    current_year: Option<i32>,
}

impl AnnualCountIndexThresholdRecorder {
    pub fn new(meta: RecorderMeta, parameter: Rc<dyn IndexParameter>, threshold: usize) -> Self {
        parameter.recorder_attached(&meta.name);
        Self {
            core: ScalarCore::new(meta),
            parameter,
            threshold,
            year_max: Vec::new(),
            current_year: None,
        }
    }

    fn close_year(&mut self) -> Result<()> {
        let threshold = self.threshold;
        let year_max = std::mem::take(&mut self.year_max);
        let accumulator = self.core.accumulator_mut()?;
        for (slot, max) in accumulator.iter_mut().zip(&year_max) {
            if *max >= threshold {
                *slot += 1.0;
            }
        }
        self.year_max = vec![0; year_max.len()];
        Ok(())
    }
}

impl Recorder for AnnualCountIndexThresholdRecorder {
    forward_recorder_base!();

    fn setup(&mut self, domain: &Domain) -> Result<()> {
        self.core.setup(domain);
        self.year_max = vec![0; domain.n_combinations()];
        self.current_year = None;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.core.reset_to(0.0)?;
        self.year_max.fill(0);
        self.current_year = None;
        Ok(())
    }

    fn after(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        let year = ctx.timestep.year();
        match self.current_year {
            None => self.current_year = Some(year),
            Some(current) if current != year => {
                self.close_year()?;
                self.current_year = Some(year);
            }
            Some(_) => {}
        }

        for scenario in ctx.domain.combinations() {
            let index = self.parameter.index(scenario);
            let slot = &mut self.year_max[scenario.global_id];
            *slot = (*slot).max(index);
        }
        self.core.steps += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        // The in-progress year has not seen a boundary yet
        if self.current_year.is_some() {
            self.close_year()?;
        }
        Ok(())
    }

    fn dependencies(&self) -> Vec<Dependency> {
        vec![Dependency::Parameter(self.parameter.name().to_string())]
    }
}

/// Total of a parameter's values, scaled by a factor and optionally
/// integrated over elapsed days.
pub struct TotalParameterRecorder {
    core: ScalarCore,
    parameter: Rc<dyn Parameter>,
    factor: f64,
    integrate: bool,
}

impl TotalParameterRecorder {
    pub fn new(
        meta: RecorderMeta,
        parameter: Rc<dyn Parameter>,
        factor: f64,
        integrate: bool,
    ) -> Self {
        parameter.recorder_attached(&meta.name);
        Self {
            core: ScalarCore::new(meta),
            parameter,
            factor,
            integrate,
        }
    }
}

impl Recorder for TotalParameterRecorder {
    forward_recorder_base!();

    fn setup(&mut self, domain: &Domain) -> Result<()> {
        self.core.setup(domain);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.core.reset_to(0.0)
    }

    fn after(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        let scale = if self.integrate {
            self.factor * ctx.timestep.days
        } else {
            self.factor
        };
        let parameter = self.parameter.clone();
        let accumulator = self.core.accumulator_mut()?;
        for scenario in ctx.domain.combinations() {
            accumulator[scenario.global_id] += parameter.value(scenario) * scale;
        }
        self.core.steps += 1;
        Ok(())
    }

    fn dependencies(&self) -> Vec<Dependency> {
        vec![Dependency::Parameter(self.parameter.name().to_string())]
    }
}

/// Mean of a parameter's values across the run, scaled by a factor.
pub struct MeanParameterRecorder {
    core: ScalarCore,
    parameter: Rc<dyn Parameter>,
    factor: f64,
}

impl MeanParameterRecorder {
    pub fn new(meta: RecorderMeta, parameter: Rc<dyn Parameter>, factor: f64) -> Self {
        parameter.recorder_attached(&meta.name);
        Self {
            core: ScalarCore::new(meta),
            parameter,
            factor,
        }
    }
}

impl Recorder for MeanParameterRecorder {
    forward_recorder_base!();

    fn setup(&mut self, domain: &Domain) -> Result<()> {
        self.core.setup(domain);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.core.reset_to(0.0)
    }

    fn after(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        let parameter = self.parameter.clone();
        let factor = self.factor;
        let accumulator = self.core.accumulator_mut()?;
        for scenario in ctx.domain.combinations() {
            accumulator[scenario.global_id] += parameter.value(scenario) * factor;
        }
        self.core.steps += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.core.divide_by_steps()
    }

    fn dependencies(&self) -> Vec<Dependency> {
        vec![Dependency::Parameter(self.parameter.name().to_string())]
    }
}
