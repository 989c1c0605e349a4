//! Duration-curve recorders
//!
//! These buffer a full time series and post-process it once at
//! `finish()` into a `[percentiles × scenarios]` curve. `values()` then
//! reduces the curve over the percentile axis with the temporal
//! aggregator. The seasonal variant restricts the buffered rows to a
//! set of calendar months first; the deviation variant scores the curve
//! against lower/upper target curves.

use std::rc::Rc;

use sluice_model::{Domain, FlowNode, StorageNode};

use crate::aggregator::{Axis, percentile_of_sorted};
use crate::array::SeriesCore;
use crate::error::{Error, Result};
use crate::recorder::{Recorder, RecorderMeta, StepContext};
use crate::series::Series;

fn validate_percentiles(name: &str, percentiles: &[f64]) -> Result<()> {
    if percentiles.is_empty() {
        return Err(Error::Configuration {
            recorder: name.to_string(),
            message: "no percentiles given".to_string(),
        });
    }
    if let Some(bad) = percentiles
        .iter()
        .find(|p| !(0.0..=100.0).contains(*p) || p.is_nan())
    {
        return Err(Error::Configuration {
            recorder: name.to_string(),
            message: format!("percentile {bad} outside [0, 100]"),
        });
    }
    Ok(())
}

fn validate_months(name: &str, months: &[u32]) -> Result<()> {
    if months.is_empty() {
        return Err(Error::Configuration {
            recorder: name.to_string(),
            message: "no months given".to_string(),
        });
    }
    if let Some(bad) = months.iter().find(|m| !(1..=12).contains(*m)) {
        return Err(Error::Configuration {
            recorder: name.to_string(),
            message: format!("month {bad} outside 1..=12"),
        });
    }
    Ok(())
}

/// Percentiles of each buffered column, optionally restricted to a row
/// subset. Columns left empty by the restriction produce NaN cells.
fn percentile_curve(buffer: &Series, rows: Option<&[usize]>, percentiles: &[f64]) -> Series {
    let mut curve = Series::zeros(percentiles.len(), buffer.cols());
    for col in 0..buffer.cols() {
        let mut sorted: Vec<f64> = match rows {
            Some(rows) => rows.iter().map(|&r| buffer.get(r, col)).collect(),
            None => buffer.column(col),
        };
        sorted.sort_unstable_by(f64::total_cmp);
        for (i, &q) in percentiles.iter().enumerate() {
            curve.set(i, col, percentile_of_sorted(&sorted, q));
        }
    }
    curve
}

/// Flow duration curve of a node's buffered flows.
pub struct FlowDurationCurveRecorder {
    core: SeriesCore,
    node: Rc<dyn FlowNode>,
    percentiles: Vec<f64>,
    curve: Option<Series>,
}

impl FlowDurationCurveRecorder {
    pub fn new(
        meta: RecorderMeta,
        node: Rc<dyn FlowNode>,
        percentiles: Vec<f64>,
    ) -> Result<Self> {
        validate_percentiles(&meta.name, &percentiles)?;
        node.recorder_attached(&meta.name);
        Ok(Self {
            core: SeriesCore::new(meta),
            node,
            percentiles,
            curve: None,
        })
    }

    pub fn with_temporal_aggregator(mut self, aggregator: crate::aggregator::Aggregator) -> Self {
        self.core.temporal = aggregator;
        self
    }

    /// The computed `[percentiles × scenarios]` curve.
    pub fn curve(&self) -> Result<&Series> {
        self.curve.as_ref().ok_or_else(|| Error::NotFinished {
            recorder: self.core.meta.name.clone(),
            operation: "curve",
        })
    }
}

impl Recorder for FlowDurationCurveRecorder {
    fn meta(&self) -> &RecorderMeta {
        &self.core.meta
    }

    fn setup(&mut self, domain: &Domain) -> Result<()> {
        self.core.setup(domain);
        self.curve = None;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.curve = None;
        self.core.reset()
    }

    fn after(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        let row = self.core.row_mut(ctx.timestep.index)?;
        for scenario in ctx.domain.combinations() {
            row[scenario.global_id] = self.node.flow(scenario);
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let buffer = self.core.series()?;
        self.curve = Some(percentile_curve(buffer, None, &self.percentiles));
        Ok(())
    }

    fn values(&self) -> Result<Vec<f64>> {
        let curve = self.curve()?;
        Ok(self
            .core
            .temporal
            .aggregate_2d(curve, Axis::Time, self.core.meta.ignore_nan))
    }
}

/// Flow duration curve restricted to timesteps in a set of months.
pub struct SeasonalFlowDurationCurveRecorder {
    core: SeriesCore,
    node: Rc<dyn FlowNode>,
    percentiles: Vec<f64>,
    months: Vec<u32>,
    row_months: Vec<u32>,
    curve: Option<Series>,
}

impl SeasonalFlowDurationCurveRecorder {
    pub fn new(
        meta: RecorderMeta,
        node: Rc<dyn FlowNode>,
        percentiles: Vec<f64>,
        months: Vec<u32>,
    ) -> Result<Self> {
        validate_percentiles(&meta.name, &percentiles)?;
        validate_months(&meta.name, &months)?;
        node.recorder_attached(&meta.name);
        Ok(Self {
            core: SeriesCore::new(meta),
            node,
            percentiles,
            months,
            row_months: Vec::new(),
            curve: None,
        })
    }

    pub fn with_temporal_aggregator(mut self, aggregator: crate::aggregator::Aggregator) -> Self {
        self.core.temporal = aggregator;
        self
    }

    pub fn curve(&self) -> Result<&Series> {
        self.curve.as_ref().ok_or_else(|| Error::NotFinished {
            recorder: self.core.meta.name.clone(),
            operation: "curve",
        })
    }
}

impl Recorder for SeasonalFlowDurationCurveRecorder {
    fn meta(&self) -> &RecorderMeta {
        &self.core.meta
    }

    fn setup(&mut self, domain: &Domain) -> Result<()> {
        self.core.setup(domain);
        self.row_months = domain.timesteps().iter().map(|t| t.month()).collect();
        self.curve = None;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.curve = None;
        self.core.reset()
    }

    fn after(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        let row = self.core.row_mut(ctx.timestep.index)?;
        for scenario in ctx.domain.combinations() {
            row[scenario.global_id] = self.node.flow(scenario);
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let buffer = self.core.series()?;
        let rows: Vec<usize> = self
            .row_months
            .iter()
            .enumerate()
            .filter(|(_, m)| self.months.contains(m))
            .map(|(i, _)| i)
            .collect();
        self.curve = Some(percentile_curve(buffer, Some(&rows), &self.percentiles));
        Ok(())
    }

    fn values(&self) -> Result<Vec<f64>> {
        let curve = self.curve()?;
        Ok(self
            .core
            .temporal
            .aggregate_2d(curve, Axis::Time, self.core.meta.ignore_nan))
    }
}

/// Storage duration curve over buffered volumes, optionally expressed
/// as a fraction of the maximum volume.
pub struct StorageDurationCurveRecorder {
    core: SeriesCore,
    storage: Rc<dyn StorageNode>,
    percentiles: Vec<f64>,
    proportional: bool,
    curve: Option<Series>,
}

impl StorageDurationCurveRecorder {
    pub fn new(
        meta: RecorderMeta,
        storage: Rc<dyn StorageNode>,
        percentiles: Vec<f64>,
    ) -> Result<Self> {
        validate_percentiles(&meta.name, &percentiles)?;
        storage.recorder_attached(&meta.name);
        Ok(Self {
            core: SeriesCore::new(meta),
            storage,
            percentiles,
            proportional: false,
            curve: None,
        })
    }

    pub fn with_proportional(mut self, proportional: bool) -> Self {
        self.proportional = proportional;
        self
    }

    pub fn with_temporal_aggregator(mut self, aggregator: crate::aggregator::Aggregator) -> Self {
        self.core.temporal = aggregator;
        self
    }

    pub fn curve(&self) -> Result<&Series> {
        self.curve.as_ref().ok_or_else(|| Error::NotFinished {
            recorder: self.core.meta.name.clone(),
            operation: "curve",
        })
    }
}

impl Recorder for StorageDurationCurveRecorder {
    fn meta(&self) -> &RecorderMeta {
        &self.core.meta
    }

    fn setup(&mut self, domain: &Domain) -> Result<()> {
        self.core.setup(domain);
        self.curve = None;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.curve = None;
        self.core.reset()
    }

    fn after(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        let row = self.core.row_mut(ctx.timestep.index)?;
        for scenario in ctx.domain.combinations() {
            let volume = self.storage.volume(scenario);
            row[scenario.global_id] = if self.proportional {
                volume / self.storage.max_volume(scenario)
            } else {
                volume
            };
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let buffer = self.core.series()?;
        self.curve = Some(percentile_curve(buffer, None, &self.percentiles));
        Ok(())
    }

    fn values(&self) -> Result<Vec<f64>> {
        let curve = self.curve()?;
        Ok(self
            .core
            .temporal
            .aggregate_2d(curve, Axis::Time, self.core.meta.ignore_nan))
    }
}

/// A target curve and its scenario mapping, resolved at setup.
struct Target {
    curve: Series,
    /// Target column per scenario combination
    map: Vec<usize>,
}

/// Scores a node's flow duration curve against target curves.
///
/// Per percentile and scenario: `upper_dev = (actual − upper) / upper`,
/// `lower_dev = (lower − actual) / lower`, deviation
/// `max(upper_dev, lower_dev, 0)` — zero while the actual curve lies
/// between the targets. A zero target value makes that cell NaN; the
/// run carries on.
pub struct FlowDurationCurveDeviationRecorder {
    core: SeriesCore,
    node: Rc<dyn FlowNode>,
    percentiles: Vec<f64>,
    lower_target: Option<Series>,
    upper_target: Option<Series>,
    /// Named scenario dimension the target columns index, if any
    scenario_dim: Option<String>,
    lower: Option<Target>,
    upper: Option<Target>,
    curve: Option<Series>,
}

impl FlowDurationCurveDeviationRecorder {
    pub fn new(
        meta: RecorderMeta,
        node: Rc<dyn FlowNode>,
        percentiles: Vec<f64>,
        lower_target: Option<Series>,
        upper_target: Option<Series>,
        scenario_dim: Option<String>,
    ) -> Result<Self> {
        validate_percentiles(&meta.name, &percentiles)?;
        if lower_target.is_none() && upper_target.is_none() {
            return Err(Error::Configuration {
                recorder: meta.name.clone(),
                message: "neither lower nor upper target curve given".to_string(),
            });
        }
        node.recorder_attached(&meta.name);
        Ok(Self {
            core: SeriesCore::new(meta),
            node,
            percentiles,
            lower_target,
            upper_target,
            scenario_dim,
            lower: None,
            upper: None,
            curve: None,
        })
    }

    pub fn with_temporal_aggregator(mut self, aggregator: crate::aggregator::Aggregator) -> Self {
        self.core.temporal = aggregator;
        self
    }

    /// The computed `[percentiles × scenarios]` deviation curve.
    pub fn curve(&self) -> Result<&Series> {
        self.curve.as_ref().ok_or_else(|| Error::NotFinished {
            recorder: self.core.meta.name.clone(),
            operation: "curve",
        })
    }

    /// Check a target's shape against the run domain and work out which
    /// target column each scenario combination reads.
    fn resolve_target(&self, target: &Series, domain: &Domain) -> Result<Target> {
        let name = &self.core.meta.name;
        if target.rows() != self.percentiles.len() {
            return Err(Error::Configuration {
                recorder: name.clone(),
                message: format!(
                    "target has {} rows but {} percentiles are configured",
                    target.rows(),
                    self.percentiles.len()
                ),
            });
        }

        let n = domain.n_combinations();
        let map: Vec<usize> = if target.cols() == 1 {
            // Broadcast one target curve to every combination
            vec![0; n]
        } else if target.cols() == n {
            (0..n).collect()
        } else if let Some(dim) = &self.scenario_dim {
            let pos = domain.scenarios().position_of(dim).ok_or_else(|| {
                Error::Configuration {
                    recorder: name.clone(),
                    message: format!("unknown scenario dimension {dim}"),
                }
            })?;
            let size = domain.scenarios().scenarios()[pos].size;
            if target.cols() != size {
                return Err(Error::Configuration {
                    recorder: name.clone(),
                    message: format!(
                        "target has {} columns but scenario {dim} has {size} members",
                        target.cols()
                    ),
                });
            }
            domain
                .combinations()
                .iter()
                .map(|c| c.indices[pos])
                .collect()
        } else {
            return Err(Error::Configuration {
                recorder: name.clone(),
                message: format!(
                    "target has {} columns for {n} scenario combinations",
                    target.cols()
                ),
            });
        };

        Ok(Target {
            curve: target.clone(),
            map,
        })
    }
}

/// Relative deviation against one target; NaN when the target is zero.
fn relative_deviation(numerator: f64, target: f64) -> f64 {
    if target == 0.0 {
        f64::NAN
    } else {
        numerator / target
    }
}

impl Recorder for FlowDurationCurveDeviationRecorder {
    fn meta(&self) -> &RecorderMeta {
        &self.core.meta
    }

    fn setup(&mut self, domain: &Domain) -> Result<()> {
        self.core.setup(domain);
        self.lower = self
            .lower_target
            .as_ref()
            .map(|t| self.resolve_target(t, domain))
            .transpose()?;
        self.upper = self
            .upper_target
            .as_ref()
            .map(|t| self.resolve_target(t, domain))
            .transpose()?;
        self.curve = None;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.curve = None;
        self.core.reset()
    }

    fn after(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        let row = self.core.row_mut(ctx.timestep.index)?;
        for scenario in ctx.domain.combinations() {
            row[scenario.global_id] = self.node.flow(scenario);
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let buffer = self.core.series()?;
        let actual = percentile_curve(buffer, None, &self.percentiles);

        let mut curve = Series::zeros(actual.rows(), actual.cols());
        for p in 0..actual.rows() {
            for s in 0..actual.cols() {
                let value = actual.get(p, s);
                let upper_dev = self
                    .upper
                    .as_ref()
                    .map(|t| relative_deviation(value - t.curve.get(p, t.map[s]), t.curve.get(p, t.map[s])));
                let lower_dev = self
                    .lower
                    .as_ref()
                    .map(|t| relative_deviation(t.curve.get(p, t.map[s]) - value, t.curve.get(p, t.map[s])));

                let deviation = match (upper_dev, lower_dev) {
                    (Some(u), Some(l)) if u.is_nan() || l.is_nan() => f64::NAN,
                    (Some(u), Some(l)) => u.max(l).max(0.0),
                    (Some(d), None) | (None, Some(d)) => {
                        if d.is_nan() {
                            f64::NAN
                        } else {
                            d.max(0.0)
                        }
                    }
                    (None, None) => 0.0,
                };
                curve.set(p, s, deviation);
            }
        }
        self.curve = Some(curve);
        Ok(())
    }

    fn values(&self) -> Result<Vec<f64>> {
        let curve = self.curve()?;
        Ok(self
            .core
            .temporal
            .aggregate_2d(curve, Axis::Time, self.core.meta.ignore_nan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sluice_model::testing::{ScriptedNode, ScriptedStorage};
    use sluice_model::{Scenario, ScenarioDomain, Timestepper};

    fn daily_domain(start: (i32, u32, u32), end: (i32, u32, u32)) -> Domain {
        let start = NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap();
        let end = NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap();
        Domain::from_timestepper(&Timestepper::new(start, end, 1), ScenarioDomain::single())
    }

    fn drive<R: Recorder>(recorder: &mut R, domain: &Domain, mut step: impl FnMut(usize)) {
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
    fn test_fdc_percentiles() {
        let domain = daily_domain((2020, 1, 1), (2020, 1, 5));
        let node = ScriptedNode::new("river", 1);
        let mut recorder = FlowDurationCurveRecorder::new(
            RecorderMeta::new("fdc.river"),
            node.clone(),
            vec![0.0, 50.0, 100.0],
        )
        .unwrap();

        let flows = [5.0, 1.0, 3.0, 2.0, 4.0];
        drive(&mut recorder, &domain, |t| node.set_flow(&[flows[t]]));

        let curve = recorder.curve().unwrap();
        assert_eq!(curve.column(0), vec![1.0, 3.0, 5.0]);
        // Temporal mean over the percentile axis
        assert_eq!(recorder.values().unwrap(), vec![3.0]);
    }

    #[test]
    fn test_fdc_rejects_bad_percentiles() {
        let node = ScriptedNode::new("river", 1);
        let err = FlowDurationCurveRecorder::new(
            RecorderMeta::new("fdc.river"),
            node,
            vec![50.0, 120.0],
        )
        .err().unwrap();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_seasonal_fdc_filters_months() {
        // Jan 30 .. Feb 3: two January rows, three February rows
        let domain = daily_domain((2020, 1, 30), (2020, 2, 3));
        let node = ScriptedNode::new("river", 1);
        let mut recorder = SeasonalFlowDurationCurveRecorder::new(
            RecorderMeta::new("sdc.river"),
            node.clone(),
            vec![0.0, 100.0],
            vec![2],
        )
        .unwrap();

        let flows = [100.0, 200.0, 1.0, 2.0, 3.0];
        drive(&mut recorder, &domain, |t| node.set_flow(&[flows[t]]));

        // Only February flows are ranked
        let curve = recorder.curve().unwrap();
        assert_eq!(curve.column(0), vec![1.0, 3.0]);
    }

    #[test]
    fn test_seasonal_fdc_rejects_bad_month() {
        let node = ScriptedNode::new("river", 1);
        let err = SeasonalFlowDurationCurveRecorder::new(
            RecorderMeta::new("sdc.river"),
            node,
            vec![50.0],
            vec![13],
        )
        .err().unwrap();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_storage_duration_curve_proportional() {
        let domain = daily_domain((2020, 1, 1), (2020, 1, 4));
        let storage = ScriptedStorage::new("reservoir", 1);
        storage.set_max_volume(&[100.0]);
        let mut recorder = StorageDurationCurveRecorder::new(
            RecorderMeta::new("sdc.reservoir"),
            storage.clone(),
            vec![0.0, 100.0],
        )
        .unwrap()
        .with_proportional(true);

        let volumes = [80.0, 20.0, 60.0, 40.0];
        drive(&mut recorder, &domain, |t| storage.set_volume(&[volumes[t]]));

        let curve = recorder.curve().unwrap();
        assert_eq!(curve.column(0), vec![0.2, 0.8]);
    }

    fn constant_flow_deviation(
        flow: f64,
        lower: Option<f64>,
        upper: Option<f64>,
    ) -> f64 {
        let domain = daily_domain((2020, 1, 1), (2020, 1, 4));
        let node = ScriptedNode::new("river", 1);
        let mut recorder = FlowDurationCurveDeviationRecorder::new(
            RecorderMeta::new("fdc_dev.river"),
            node.clone(),
            vec![50.0],
            lower.and_then(|v| Series::from_rows(vec![vec![v]])),
            upper.and_then(|v| Series::from_rows(vec![vec![v]])),
            None,
        )
        .unwrap();

        drive(&mut recorder, &domain, |_| node.set_flow(&[flow]));
        recorder.curve().unwrap().get(0, 0)
    }

    #[test]
    fn test_deviation_inside_targets_is_zero() {
        assert_eq!(constant_flow_deviation(10.0, Some(8.0), Some(12.0)), 0.0);
    }

    #[test]
    fn test_deviation_above_upper_target() {
        let dev = constant_flow_deviation(15.0, Some(8.0), Some(12.0));
        assert!((dev - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_deviation_below_lower_target() {
        let dev = constant_flow_deviation(5.0, Some(8.0), Some(12.0));
        assert!((dev - 0.375).abs() < 1e-12);
    }

    #[test]
    fn test_deviation_zero_target_is_nan() {
        assert!(constant_flow_deviation(5.0, None, Some(0.0)).is_nan());
    }

    #[test]
    fn test_deviation_requires_a_target() {
        let node = ScriptedNode::new("river", 1);
        let err = FlowDurationCurveDeviationRecorder::new(
            RecorderMeta::new("fdc_dev.river"),
            node,
            vec![50.0],
            None,
            None,
            None,
        )
        .err().unwrap();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_deviation_target_shape_checked_at_setup() {
        let domain = daily_domain((2020, 1, 1), (2020, 1, 4));
        let node = ScriptedNode::new("river", 1);
        // Two percentiles but a one-row target
        let mut recorder = FlowDurationCurveDeviationRecorder::new(
            RecorderMeta::new("fdc_dev.river"),
            node,
            vec![20.0, 80.0],
            None,
            Series::from_rows(vec![vec![10.0]]),
            None,
        )
        .unwrap();
        assert!(matches!(
            recorder.setup(&domain).unwrap_err(),
            Error::Configuration { .. }
        ));
    }

    #[test]
    fn test_deviation_scenario_dimension_targets() {
        // Two-member scenario dimension, per-member targets
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2020, 1, 4).unwrap();
        let domain = Domain::from_timestepper(
            &Timestepper::new(start, end, 1),
            ScenarioDomain::new(vec![Scenario::new("inflow", 2)]),
        );

        let node = ScriptedNode::new("river", 2);
        let mut recorder = FlowDurationCurveDeviationRecorder::new(
            RecorderMeta::new("fdc_dev.river"),
            node.clone(),
            vec![50.0],
            None,
            Series::from_rows(vec![vec![10.0, 20.0]]),
            Some("inflow".to_string()),
        )
        .unwrap();

        recorder.setup(&domain).unwrap();
        recorder.reset().unwrap();
        for timestep in domain.timesteps() {
            node.set_flow(&[15.0, 15.0]);
            recorder
                .after(&StepContext {
                    timestep,
                    domain: &domain,
                })
                .unwrap();
        }
        recorder.finish().unwrap();

        let curve = recorder.curve().unwrap();
        // First member exceeds its target of 10, second sits under 20
        assert!((curve.get(0, 0) - 0.5).abs() < 1e-12);
        assert_eq!(curve.get(0, 1), 0.0);
    }
}
