//! Recorder lifecycle contract and roster
//!
//! A recorder is driven through `setup` (size buffers to the run
//! domain), `reset` (clear run-scoped state), one `after` per timestep
//! in step order, and `finish` (run-level post-processing). Consumers
//! then read `values()` — always one entry per scenario combination —
//! or `aggregated_value()`, the scenario-axis reduction of `values()`.
//!
//! The model owns its recorders through a [`RecorderSet`]; recorders
//! that feed other recorders are referenced, not owned, since one
//! instance may feed several aggregators. Everything is single-threaded
//! and cooperative: each lifecycle call runs to completion before the
//! next one is made.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, info, trace};

use sluice_model::{Domain, Timestep};

use crate::aggregator::Aggregator;
use crate::error::{Error, Result};

/// How an external optimiser should treat a recorder's aggregated value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Not an objective
    #[default]
    None,
    Maximise,
    Minimise,
}

/// Identity and aggregation settings shared by every recorder.
#[derive(Debug, Clone)]
pub struct RecorderMeta {
    /// Unique name within a model
    pub name: String,
    /// Scenario-axis reduction used by `aggregated_value()`
    pub aggregator: Aggregator,
    /// Drop NaN entries before reducing
    pub ignore_nan: bool,
    /// Optimisation direction, if any
    pub objective: Direction,
    /// Usable as a constraint by an external optimiser
    pub constraint: bool,
    /// Tolerance handed to external optimisers
    pub epsilon: f64,
}

impl RecorderMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aggregator: Aggregator::default(),
            ignore_nan: false,
            objective: Direction::None,
            constraint: false,
            epsilon: 1.0,
        }
    }

    pub fn with_aggregator(mut self, aggregator: Aggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn with_ignore_nan(mut self, ignore_nan: bool) -> Self {
        self.ignore_nan = ignore_nan;
        self
    }

    pub fn with_objective(mut self, objective: Direction) -> Self {
        self.objective = objective;
        self
    }

    pub fn with_constraint(mut self, constraint: bool) -> Self {
        self.constraint = constraint;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn is_objective(&self) -> bool {
        self.objective != Direction::None
    }
}

/// Default recorder name: `<kind>.<entity>`.
pub(crate) fn default_name(kind: &str, entity: &str) -> String {
    format!("{kind}.{entity}")
}

/// Context for one `after()` call.
pub struct StepContext<'a> {
    /// The timestep the engine just solved
    pub timestep: &'a Timestep,
    /// The run domain, unchanged since `setup()`
    pub domain: &'a Domain,
}

/// A relation the external scheduler must order before this recorder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    /// A parameter this recorder reads each step
    Parameter(String),
    /// Another recorder whose values feed this one
    Recorder(String),
}

/// The recorder lifecycle and value contract.
pub trait Recorder {
    fn meta(&self) -> &RecorderMeta;

    fn name(&self) -> String {
        self.meta().name.clone()
    }

    /// Allocate run-scoped state for the given domain. Called once
    /// before any run, and again whenever the domain changes.
    fn setup(&mut self, domain: &Domain) -> Result<()>;

    /// Re-initialise run-scoped state. Called before every run.
    fn reset(&mut self) -> Result<()>;

    /// Observe the step the engine just solved. Called exactly once per
    /// timestep, in step order.
    fn after(&mut self, ctx: &StepContext<'_>) -> Result<()>;

    /// Run-level post-processing after the last timestep.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    /// Per-scenario values, one entry per scenario combination.
    fn values(&self) -> Result<Vec<f64>>;

    /// Scenario-axis reduction of `values()`.
    fn aggregated_value(&self) -> Result<f64> {
        let values = self.values()?;
        let meta = self.meta();
        Ok(meta.aggregator.aggregate_1d(&values, meta.ignore_nan))
    }

    /// Relations the external scheduler must evaluate before this
    /// recorder's `after()`.
    fn dependencies(&self) -> Vec<Dependency> {
        Vec::new()
    }
}

/// A recorder referenced from the roster and, possibly, from other
/// recorders.
pub type SharedRecorder = Rc<RefCell<dyn Recorder>>;

/// Wrap a recorder for shared use.
pub fn share<R: Recorder + 'static>(recorder: R) -> SharedRecorder {
    Rc::new(RefCell::new(recorder))
}

/// The model-owned recorder roster.
///
/// Enforces name uniqueness, preserves insertion order for lifecycle
/// fan-out, and exposes the dependency relations recorders declare.
#[derive(Default)]
pub struct RecorderSet {
    recorders: IndexMap<String, SharedRecorder>,
}

impl RecorderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a recorder. Names must be unique within the roster.
    pub fn add(&mut self, recorder: SharedRecorder) -> Result<()> {
        let name = recorder.borrow().meta().name.clone();
        if self.recorders.contains_key(&name) {
            return Err(Error::DuplicateRecorder(name));
        }
        debug!(recorder = %name, "recorder registered");
        self.recorders.insert(name, recorder);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<SharedRecorder> {
        self.recorders.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.recorders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recorders.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.recorders.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SharedRecorder> {
        self.recorders.values()
    }

    /// Run `setup` on every recorder in insertion order.
    pub fn setup(&self, domain: &Domain) -> Result<()> {
        info!(
            recorders = self.recorders.len(),
            timesteps = domain.n_timesteps(),
            combinations = domain.n_combinations(),
            "recorder setup"
        );
        for recorder in self.recorders.values() {
            recorder.borrow_mut().setup(domain)?;
        }
        Ok(())
    }

    /// Run `reset` on every recorder in insertion order.
    pub fn reset(&self) -> Result<()> {
        for recorder in self.recorders.values() {
            recorder.borrow_mut().reset()?;
        }
        Ok(())
    }

    /// Run `after` on every recorder in insertion order.
    pub fn after(&self, ctx: &StepContext<'_>) -> Result<()> {
        trace!(timestep = ctx.timestep.index, "recorder after");
        for recorder in self.recorders.values() {
            recorder.borrow_mut().after(ctx)?;
        }
        Ok(())
    }

    /// Run `finish` on every recorder in insertion order.
    pub fn finish(&self) -> Result<()> {
        info!(recorders = self.recorders.len(), "recorder finish");
        for recorder in self.recorders.values() {
            recorder.borrow_mut().finish()?;
        }
        Ok(())
    }

    /// Every declared dependency, as `(recorder, relation)` edges for
    /// the external scheduler.
    pub fn dependency_edges(&self) -> Vec<(String, Dependency)> {
        let mut edges = Vec::new();
        for (name, recorder) in &self.recorders {
            for dep in recorder.borrow().dependencies() {
                edges.push((name.clone(), dep));
            }
        }
        edges
    }

    /// Aggregated value of every recorder, keyed by name.
    pub fn aggregated_values(&self) -> Result<IndexMap<String, f64>> {
        let mut out = IndexMap::with_capacity(self.recorders.len());
        for (name, recorder) in &self.recorders {
            out.insert(name.clone(), recorder.borrow().aggregated_value()?);
        }
        Ok(out)
    }
}
