//! Time-series recorders
//!
//! Each keeps a dense `[timesteps × scenarios]` buffer, fills one row
//! per `after()` from its bound entity, and reduces over the time axis
//! with a temporal aggregator (default mean) that is configured
//! independently of the scenario-axis aggregator. The raw buffer stays
//! accessible for consumers that want the full series.

use std::rc::Rc;

use sluice_model::{Domain, FlowNode, IndexParameter, Parameter, ScenarioIndex, StorageNode};

use crate::aggregator::{Aggregator, Axis};
use crate::error::{Error, Result};
use crate::recorder::{Recorder, RecorderMeta, StepContext};
use crate::series::Series;

/// Buffer, temporal aggregation and lifecycle state shared by every
/// series recorder.
#[derive(Debug)]
pub(crate) struct SeriesCore {
    pub(crate) meta: RecorderMeta,
    pub(crate) temporal: Aggregator,
    buffer: Option<Series>,
}

impl SeriesCore {
    pub(crate) fn new(meta: RecorderMeta) -> Self {
        Self {
            meta,
            temporal: Aggregator::default(),
            buffer: None,
        }
    }

    pub(crate) fn setup(&mut self, domain: &Domain) {
        self.buffer = Some(Series::zeros(domain.n_timesteps(), domain.n_combinations()));
    }

    pub(crate) fn reset(&mut self) -> Result<()> {
        let name = self.meta.name.clone();
        self.buffer
            .as_mut()
            .ok_or(Error::NotSetup {
                recorder: name,
                operation: "reset",
            })?
            .fill(0.0);
        Ok(())
    }

    pub(crate) fn row_mut(&mut self, index: usize) -> Result<&mut [f64]> {
        let name = self.meta.name.clone();
        Ok(self
            .buffer
            .as_mut()
            .ok_or(Error::NotSetup {
                recorder: name,
                operation: "after",
            })?
            .row_mut(index))
    }

    pub(crate) fn series(&self) -> Result<&Series> {
        self.buffer.as_ref().ok_or_else(|| Error::NotSetup {
            recorder: self.meta.name.clone(),
            operation: "series",
        })
    }

    pub(crate) fn values(&self) -> Result<Vec<f64>> {
        let series = self.series()?;
        Ok(self
            .temporal
            .aggregate_2d(series, Axis::Time, self.meta.ignore_nan))
    }
}

/// Records a flow node's per-scenario flow every timestep.
pub struct FlowSeriesRecorder {
    core: SeriesCore,
    node: Rc<dyn FlowNode>,
}

impl FlowSeriesRecorder {
    pub fn new(meta: RecorderMeta, node: Rc<dyn FlowNode>) -> Self {
        node.recorder_attached(&meta.name);
        Self {
            core: SeriesCore::new(meta),
            node,
        }
    }

    pub fn with_temporal_aggregator(mut self, aggregator: Aggregator) -> Self {
        self.core.temporal = aggregator;
        self
    }

    /// The raw buffered series.
    pub fn series(&self) -> Result<&Series> {
        self.core.series()
    }
}

impl Recorder for FlowSeriesRecorder {
    fn meta(&self) -> &RecorderMeta {
        &self.core.meta
    }

    fn setup(&mut self, domain: &Domain) -> Result<()> {
        self.core.setup(domain);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.core.reset()
    }

    fn after(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        let row = self.core.row_mut(ctx.timestep.index)?;
        for scenario in ctx.domain.combinations() {
            row[scenario.global_id] = self.node.flow(scenario);
        }
        Ok(())
    }

    fn values(&self) -> Result<Vec<f64>> {
        self.core.values()
    }
}

/// Which storage quantity a [`StorageSeriesRecorder`] samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageMetric {
    #[default]
    Volume,
    /// Volume as a fraction of the current maximum volume
    ProportionalVolume,
    Level,
    Area,
}

impl StorageMetric {
    fn sample(&self, storage: &dyn StorageNode, scenario: &ScenarioIndex) -> f64 {
        match self {
            StorageMetric::Volume => storage.volume(scenario),
            StorageMetric::ProportionalVolume => {
                storage.volume(scenario) / storage.max_volume(scenario)
            }
            StorageMetric::Level => storage.level(scenario),
            StorageMetric::Area => storage.area(scenario),
        }
    }
}

/// Records one storage quantity every timestep.
pub struct StorageSeriesRecorder {
    core: SeriesCore,
    storage: Rc<dyn StorageNode>,
    metric: StorageMetric,
}

impl StorageSeriesRecorder {
    pub fn new(meta: RecorderMeta, storage: Rc<dyn StorageNode>, metric: StorageMetric) -> Self {
        storage.recorder_attached(&meta.name);
        Self {
            core: SeriesCore::new(meta),
            storage,
            metric,
        }
    }

    pub fn with_temporal_aggregator(mut self, aggregator: Aggregator) -> Self {
        self.core.temporal = aggregator;
        self
    }

    pub fn series(&self) -> Result<&Series> {
        self.core.series()
    }
}

impl Recorder for StorageSeriesRecorder {
    fn meta(&self) -> &RecorderMeta {
        &self.core.meta
    }

    fn setup(&mut self, domain: &Domain) -> Result<()> {
        self.core.setup(domain);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.core.reset()
    }

    fn after(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        let row = self.core.row_mut(ctx.timestep.index)?;
        for scenario in ctx.domain.combinations() {
            row[scenario.global_id] = self.metric.sample(self.storage.as_ref(), scenario);
        }
        Ok(())
    }

    fn values(&self) -> Result<Vec<f64>> {
        self.core.values()
    }
}

/// Records a parameter's per-scenario value every timestep.
pub struct ParameterSeriesRecorder {
    core: SeriesCore,
    parameter: Rc<dyn Parameter>,
}

impl ParameterSeriesRecorder {
    pub fn new(meta: RecorderMeta, parameter: Rc<dyn Parameter>) -> Self {
        parameter.recorder_attached(&meta.name);
        Self {
            core: SeriesCore::new(meta),
            parameter,
        }
    }

    pub fn with_temporal_aggregator(mut self, aggregator: Aggregator) -> Self {
        self.core.temporal = aggregator;
        self
    }

    pub fn series(&self) -> Result<&Series> {
        self.core.series()
    }
}

impl Recorder for ParameterSeriesRecorder {
    fn meta(&self) -> &RecorderMeta {
        &self.core.meta
    }

    fn setup(&mut self, domain: &Domain) -> Result<()> {
        self.core.setup(domain);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.core.reset()
    }

    fn after(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        let row = self.core.row_mut(ctx.timestep.index)?;
        for scenario in ctx.domain.combinations() {
            row[scenario.global_id] = self.parameter.value(scenario);
        }
        Ok(())
    }

    fn values(&self) -> Result<Vec<f64>> {
        self.core.values()
    }

    fn dependencies(&self) -> Vec<crate::recorder::Dependency> {
        vec![crate::recorder::Dependency::Parameter(
            self.parameter.name().to_string(),
        )]
    }
}

/// Records an index parameter's per-scenario index every timestep.
///
/// Indices are widened to f64 so the buffer aggregates like any other
/// series.
pub struct IndexSeriesRecorder {
    core: SeriesCore,
    parameter: Rc<dyn IndexParameter>,
}

impl IndexSeriesRecorder {
    pub fn new(meta: RecorderMeta, parameter: Rc<dyn IndexParameter>) -> Self {
        parameter.recorder_attached(&meta.name);
        Self {
            core: SeriesCore::new(meta),
            parameter,
        }
    }

    pub fn with_temporal_aggregator(mut self, aggregator: Aggregator) -> Self {
        self.core.temporal = aggregator;
        self
    }

    pub fn series(&self) -> Result<&Series> {
        self.core.series()
    }
}

impl Recorder for IndexSeriesRecorder {
    fn meta(&self) -> &RecorderMeta {
        &self.core.meta
    }

    fn setup(&mut self, domain: &Domain) -> Result<()> {
        self.core.setup(domain);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.core.reset()
    }

    fn after(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        let row = self.core.row_mut(ctx.timestep.index)?;
        for scenario in ctx.domain.combinations() {
            row[scenario.global_id] = self.parameter.index(scenario) as f64;
        }
        Ok(())
    }

    fn values(&self) -> Result<Vec<f64>> {
        self.core.values()
    }

    fn dependencies(&self) -> Vec<crate::recorder::Dependency> {
        vec![crate::recorder::Dependency::Parameter(
            self.parameter.name().to_string(),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sluice_model::testing::{ScriptedIndexParameter, ScriptedNode, ScriptedStorage};
    use sluice_model::{ScenarioDomain, Timestepper};

    fn domain(n_days: u64) -> Domain {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let end = start + chrono::Days::new(n_days - 1);
        Domain::from_timestepper(&Timestepper::new(start, end, 1), ScenarioDomain::single())
    }

    fn run<R: Recorder>(recorder: &mut R, domain: &Domain, mut step: impl FnMut(usize)) {
        recorder.setup(domain).unwrap();
        recorder.reset().unwrap();
        for timestep in domain.timesteps() {
            step(timestep.index);
            recorder
                .after(&StepContext {
                    timestep,
                    domain,
                })
                .unwrap();
        }
        recorder.finish().unwrap();
    }

    #[test]
    fn test_flow_series_mean() {
        let domain = domain(4);
        let node = ScriptedNode::new("river", 1);
        let mut recorder =
            FlowSeriesRecorder::new(RecorderMeta::new("flow_series.river"), node.clone());

        let flows = [1.0, 2.0, 3.0, 6.0];
        run(&mut recorder, &domain, |t| node.set_flow(&[flows[t]]));

        assert_eq!(recorder.values().unwrap(), vec![3.0]);
        assert_eq!(recorder.series().unwrap().column(0), flows.to_vec());
        assert_eq!(node.attached(), vec!["flow_series.river"]);
    }

    #[test]
    fn test_flow_series_temporal_max() {
        let domain = domain(3);
        let node = ScriptedNode::new("river", 1);
        let mut recorder =
            FlowSeriesRecorder::new(RecorderMeta::new("flow_series.river"), node.clone())
                .with_temporal_aggregator(Aggregator::from_name("max").unwrap());

        let flows = [1.0, 5.0, 2.0];
        run(&mut recorder, &domain, |t| node.set_flow(&[flows[t]]));

        assert_eq!(recorder.values().unwrap(), vec![5.0]);
    }

    #[test]
    fn test_storage_proportional_volume() {
        let domain = domain(2);
        let storage = ScriptedStorage::new("reservoir", 1);
        storage.set_max_volume(&[100.0]);
        let mut recorder = StorageSeriesRecorder::new(
            RecorderMeta::new("storage_series.reservoir"),
            storage.clone(),
            StorageMetric::ProportionalVolume,
        );

        let volumes = [50.0, 25.0];
        run(&mut recorder, &domain, |t| storage.set_volume(&[volumes[t]]));

        assert_eq!(recorder.series().unwrap().column(0), vec![0.5, 0.25]);
    }

    #[test]
    fn test_index_series_widens_indices() {
        let domain = domain(3);
        let parameter = ScriptedIndexParameter::new("drought_level", 1);
        let mut recorder = IndexSeriesRecorder::new(
            RecorderMeta::new("index_series.drought_level"),
            parameter.clone(),
        );

        let indices = [0usize, 2, 1];
        run(&mut recorder, &domain, |t| {
            parameter.set_indices(&[indices[t]])
        });

        assert_eq!(recorder.series().unwrap().column(0), vec![0.0, 2.0, 1.0]);
        assert_eq!(recorder.values().unwrap(), vec![1.0]);
    }

    #[test]
    fn test_values_before_setup_fails() {
        let node = ScriptedNode::new("river", 1);
        let recorder = FlowSeriesRecorder::new(RecorderMeta::new("flow_series.river"), node);
        assert!(matches!(
            recorder.values().unwrap_err(),
            Error::NotSetup { .. }
        ));
    }
}
