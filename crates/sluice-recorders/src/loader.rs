//! Config loader
//!
//! Builds recorders from JSON-like configuration. The type-tag →
//! builder table is a static slice scoped to this module — nothing is
//! registered into ambient global state — and entity or recorder
//! references are resolved against a [`LoadContext`] the caller fills
//! with live objects before loading. Every loader error aborts the
//! model build.

use std::cell::Cell;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use sluice_model::{FlowNode, IndexParameter, Parameter, StorageNode};

use crate::aggregator::Aggregator;
use crate::array::{
    FlowSeriesRecorder, IndexSeriesRecorder, ParameterSeriesRecorder, StorageMetric,
    StorageSeriesRecorder,
};
use crate::combine::AggregatedRecorder;
use crate::duration::{
    FlowDurationCurveDeviationRecorder, FlowDurationCurveRecorder,
    SeasonalFlowDurationCurveRecorder, StorageDurationCurveRecorder,
};
use crate::error::{Error, Result};
use crate::recorder::{
    Direction, Recorder, RecorderMeta, RecorderSet, SharedRecorder, default_name, share,
};
use crate::rolling::{RollingMeanFlowRecorder, RollingWindowParameterRecorder};
use crate::series::Series;
use crate::totals::{
    AnnualCountIndexThresholdRecorder, DeficitFrequencyRecorder, MeanFlowRecorder,
    MeanParameterRecorder, MinimumVolumeRecorder, StorageThresholdRecorder, TotalDeficitRecorder,
    TotalFlowRecorder, TotalParameterRecorder,
};

/// Raw recorder configuration, straight from JSON.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(rename = "type")]
    kind: String,
    name: Option<String>,
    node: Option<String>,
    storage: Option<String>,
    parameter: Option<String>,
    recorders: Option<Vec<String>>,
    agg_func: Option<String>,
    temporal_agg_func: Option<String>,
    fdc_agg_func: Option<String>,
    sdc_agg_func: Option<String>,
    ignore_nan: Option<bool>,
    is_objective: Option<String>,
    is_constraint: Option<bool>,
    epsilon: Option<f64>,
    percentiles: Option<Vec<f64>>,
    months: Option<Vec<u32>>,
    window: Option<usize>,
    timesteps: Option<usize>,
    days: Option<f64>,
    threshold: Option<f64>,
    factor: Option<f64>,
    integrate: Option<bool>,
    proportional: Option<bool>,
    scenario: Option<String>,
    lower_target_fdc: Option<Vec<Vec<f64>>>,
    upper_target_fdc: Option<Vec<Vec<f64>>>,
}

impl RawConfig {
    fn require<'a, T>(&self, field: Option<&'a T>, key: &str) -> Result<&'a T> {
        field.ok_or_else(|| Error::InvalidConfig(format!("{} requires `{key}`", self.kind)))
    }
}

/// Live objects configuration references resolve against.
#[derive(Default)]
pub struct LoadContext {
    nodes: IndexMap<String, Rc<dyn FlowNode>>,
    storages: IndexMap<String, Rc<dyn StorageNode>>,
    parameters: IndexMap<String, Rc<dyn Parameter>>,
    index_parameters: IndexMap<String, Rc<dyn IndexParameter>>,
}

impl LoadContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: Rc<dyn FlowNode>) {
        self.nodes.insert(node.name().to_string(), node);
    }

    pub fn add_storage(&mut self, storage: Rc<dyn StorageNode>) {
        self.storages.insert(storage.name().to_string(), storage);
    }

    pub fn add_parameter(&mut self, parameter: Rc<dyn Parameter>) {
        self.parameters.insert(parameter.name().to_string(), parameter);
    }

    pub fn add_index_parameter(&mut self, parameter: Rc<dyn IndexParameter>) {
        self.index_parameters
            .insert(parameter.name().to_string(), parameter);
    }
}

type BuildFn = fn(&RecorderLoader, &RawConfig) -> Result<SharedRecorder>;

/// One loadable recorder kind.
struct BuilderDescriptor {
    tag: &'static str,
    build: BuildFn,
}

/// Every recorder kind the loader can build, looked up by type tag.
static BUILDERS: &[BuilderDescriptor] = &[
    BuilderDescriptor {
        tag: "flow_series",
        build: build_flow_series,
    },
    BuilderDescriptor {
        tag: "storage_series",
        build: build_storage_series,
    },
    BuilderDescriptor {
        tag: "level_series",
        build: build_level_series,
    },
    BuilderDescriptor {
        tag: "area_series",
        build: build_area_series,
    },
    BuilderDescriptor {
        tag: "parameter_series",
        build: build_parameter_series,
    },
    BuilderDescriptor {
        tag: "index_parameter_series",
        build: build_index_parameter_series,
    },
    BuilderDescriptor {
        tag: "flow_duration_curve",
        build: build_flow_duration_curve,
    },
    BuilderDescriptor {
        tag: "seasonal_flow_duration_curve",
        build: build_seasonal_flow_duration_curve,
    },
    BuilderDescriptor {
        tag: "storage_duration_curve",
        build: build_storage_duration_curve,
    },
    BuilderDescriptor {
        tag: "flow_duration_curve_deviation",
        build: build_flow_duration_curve_deviation,
    },
    BuilderDescriptor {
        tag: "rolling_window_parameter",
        build: build_rolling_window_parameter,
    },
    BuilderDescriptor {
        tag: "rolling_mean_flow",
        build: build_rolling_mean_flow,
    },
    BuilderDescriptor {
        tag: "total_deficit",
        build: build_total_deficit,
    },
    BuilderDescriptor {
        tag: "total_flow",
        build: build_total_flow,
    },
    BuilderDescriptor {
        tag: "mean_flow",
        build: build_mean_flow,
    },
    BuilderDescriptor {
        tag: "deficit_frequency",
        build: build_deficit_frequency,
    },
    BuilderDescriptor {
        tag: "minimum_volume",
        build: build_minimum_volume,
    },
    BuilderDescriptor {
        tag: "storage_threshold",
        build: build_storage_threshold,
    },
    BuilderDescriptor {
        tag: "annual_count_index_threshold",
        build: build_annual_count_index_threshold,
    },
    BuilderDescriptor {
        tag: "total_parameter",
        build: build_total_parameter,
    },
    BuilderDescriptor {
        tag: "mean_parameter",
        build: build_mean_parameter,
    },
    BuilderDescriptor {
        tag: "aggregated",
        build: build_aggregated,
    },
];

/// Builds recorders from configuration and collects them into a roster.
pub struct RecorderLoader {
    context: LoadContext,
    set: RecorderSet,
    deprecated_warned: Cell<bool>,
}

impl RecorderLoader {
    pub fn new(context: LoadContext) -> Self {
        Self {
            context,
            set: RecorderSet::new(),
            deprecated_warned: Cell::new(false),
        }
    }

    /// Build one recorder and register it in the roster.
    pub fn load(&mut self, config: &Value) -> Result<SharedRecorder> {
        let raw: RawConfig = serde_json::from_value(config.clone())
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        let descriptor = BUILDERS
            .iter()
            .find(|b| b.tag == raw.kind)
            .ok_or_else(|| Error::UnknownRecorderType(raw.kind.clone()))?;
        let recorder = (descriptor.build)(self, &raw)?;
        self.set.add(recorder.clone())?;
        Ok(recorder)
    }

    /// Build a whole configuration list, in order, so later entries can
    /// reference earlier ones.
    pub fn load_all(&mut self, configs: &[Value]) -> Result<()> {
        for config in configs {
            self.load(config)?;
        }
        Ok(())
    }

    /// Hand over the finished roster.
    pub fn into_recorders(self) -> RecorderSet {
        self.set
    }

    fn meta(&self, raw: &RawConfig, fallback_name: String) -> Result<RecorderMeta> {
        let name = raw.name.clone().unwrap_or(fallback_name);
        let mut meta = RecorderMeta::new(name);
        if let Some(token) = &raw.agg_func {
            meta = meta.with_aggregator(Aggregator::from_name(token)?);
        }
        if let Some(ignore_nan) = raw.ignore_nan {
            meta = meta.with_ignore_nan(ignore_nan);
        }
        if let Some(objective) = &raw.is_objective {
            meta = meta.with_objective(parse_direction(objective)?);
        }
        if let Some(constraint) = raw.is_constraint {
            meta = meta.with_constraint(constraint);
        }
        if let Some(epsilon) = raw.epsilon {
            meta = meta.with_epsilon(epsilon);
        }
        Ok(meta)
    }

    /// The temporal aggregator, honouring the deprecated per-curve
    /// aliases. Giving both the old and new key is an error; the alias
    /// alone warns once per loader.
    fn temporal(&self, raw: &RawConfig, meta: &RecorderMeta) -> Result<Option<Aggregator>> {
        let deprecated_key = if raw.fdc_agg_func.is_some() {
            Some("fdc_agg_func")
        } else if raw.sdc_agg_func.is_some() {
            Some("sdc_agg_func")
        } else {
            None
        };
        let deprecated = raw.fdc_agg_func.as_ref().or(raw.sdc_agg_func.as_ref());

        match (&raw.temporal_agg_func, deprecated) {
            (Some(_), Some(_)) => Err(Error::Configuration {
                recorder: meta.name.clone(),
                message: format!(
                    "both `temporal_agg_func` and deprecated `{}` given",
                    deprecated_key.unwrap_or_default()
                ),
            }),
            (Some(token), None) => Ok(Some(Aggregator::from_name(token)?)),
            (None, Some(token)) => {
                if !self.deprecated_warned.replace(true) {
                    warn!(
                        key = deprecated_key.unwrap_or_default(),
                        "deprecated key, use `temporal_agg_func`"
                    );
                }
                Ok(Some(Aggregator::from_name(token)?))
            }
            (None, None) => Ok(None),
        }
    }

    fn node(&self, raw: &RawConfig) -> Result<Rc<dyn FlowNode>> {
        let name = raw.require(raw.node.as_ref(), "node")?;
        self.context
            .nodes
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NodeNotFound(name.clone()))
    }

    fn storage(&self, raw: &RawConfig) -> Result<Rc<dyn StorageNode>> {
        let name = raw.require(raw.storage.as_ref(), "storage")?;
        self.context
            .storages
            .get(name)
            .cloned()
            .ok_or_else(|| Error::StorageNotFound(name.clone()))
    }

    fn parameter(&self, raw: &RawConfig) -> Result<Rc<dyn Parameter>> {
        let name = raw.require(raw.parameter.as_ref(), "parameter")?;
        self.context
            .parameters
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ParameterNotFound(name.clone()))
    }

    fn index_parameter(&self, raw: &RawConfig) -> Result<Rc<dyn IndexParameter>> {
        let name = raw.require(raw.parameter.as_ref(), "parameter")?;
        self.context
            .index_parameters
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ParameterNotFound(name.clone()))
    }

    fn children(&self, raw: &RawConfig) -> Result<Vec<SharedRecorder>> {
        let names = raw.require(raw.recorders.as_ref(), "recorders")?;
        names
            .iter()
            .map(|name| {
                self.set
                    .get(name)
                    .ok_or_else(|| Error::RecorderNotFound(name.clone()))
            })
            .collect()
    }
}

fn parse_direction(token: &str) -> Result<Direction> {
    match token {
        "maximise" | "maximize" => Ok(Direction::Maximise),
        "minimise" | "minimize" => Ok(Direction::Minimise),
        other => Err(Error::InvalidConfig(format!(
            "unknown objective direction `{other}`"
        ))),
    }
}

fn parse_target(raw: &RawConfig, target: &Option<Vec<Vec<f64>>>, key: &str) -> Result<Option<Series>> {
    match target {
        None => Ok(None),
        Some(rows) => Series::from_rows(rows.clone())
            .map(Some)
            .ok_or_else(|| Error::InvalidConfig(format!("{} `{key}` rows are ragged", raw.kind))),
    }
}

fn parse_index_threshold(raw: &RawConfig) -> Result<usize> {
    let threshold = *raw.require(raw.threshold.as_ref(), "threshold")?;
    if threshold < 0.0 || threshold.fract() != 0.0 {
        return Err(Error::InvalidConfig(format!(
            "{} `threshold` must be a non-negative integer",
            raw.kind
        )));
    }
    Ok(threshold as usize)
}

fn build_flow_series(loader: &RecorderLoader, raw: &RawConfig) -> Result<SharedRecorder> {
    let node = loader.node(raw)?;
    let meta = loader.meta(raw, default_name(&raw.kind, node.name()))?;
    let mut recorder = FlowSeriesRecorder::new(meta, node);
    if let Some(temporal) = loader.temporal(raw, recorder.meta())? {
        recorder = recorder.with_temporal_aggregator(temporal);
    }
    Ok(share(recorder))
}

fn build_storage_series_metric(
    loader: &RecorderLoader,
    raw: &RawConfig,
    metric: StorageMetric,
) -> Result<SharedRecorder> {
    let storage = loader.storage(raw)?;
    let meta = loader.meta(raw, default_name(&raw.kind, storage.name()))?;
    let mut recorder = StorageSeriesRecorder::new(meta, storage, metric);
    if let Some(temporal) = loader.temporal(raw, recorder.meta())? {
        recorder = recorder.with_temporal_aggregator(temporal);
    }
    Ok(share(recorder))
}

fn build_storage_series(loader: &RecorderLoader, raw: &RawConfig) -> Result<SharedRecorder> {
    let metric = if raw.proportional.unwrap_or(false) {
        StorageMetric::ProportionalVolume
    } else {
        StorageMetric::Volume
    };
    build_storage_series_metric(loader, raw, metric)
}

fn build_level_series(loader: &RecorderLoader, raw: &RawConfig) -> Result<SharedRecorder> {
    build_storage_series_metric(loader, raw, StorageMetric::Level)
}

fn build_area_series(loader: &RecorderLoader, raw: &RawConfig) -> Result<SharedRecorder> {
    build_storage_series_metric(loader, raw, StorageMetric::Area)
}

fn build_parameter_series(loader: &RecorderLoader, raw: &RawConfig) -> Result<SharedRecorder> {
    let parameter = loader.parameter(raw)?;
    let meta = loader.meta(raw, default_name(&raw.kind, parameter.name()))?;
    let mut recorder = ParameterSeriesRecorder::new(meta, parameter);
    if let Some(temporal) = loader.temporal(raw, recorder.meta())? {
        recorder = recorder.with_temporal_aggregator(temporal);
    }
    Ok(share(recorder))
}

fn build_index_parameter_series(
    loader: &RecorderLoader,
    raw: &RawConfig,
) -> Result<SharedRecorder> {
    let parameter = loader.index_parameter(raw)?;
    let meta = loader.meta(raw, default_name(&raw.kind, parameter.name()))?;
    let mut recorder = IndexSeriesRecorder::new(meta, parameter);
    if let Some(temporal) = loader.temporal(raw, recorder.meta())? {
        recorder = recorder.with_temporal_aggregator(temporal);
    }
    Ok(share(recorder))
}

fn build_flow_duration_curve(loader: &RecorderLoader, raw: &RawConfig) -> Result<SharedRecorder> {
    let node = loader.node(raw)?;
    let percentiles = raw.require(raw.percentiles.as_ref(), "percentiles")?.clone();
    let meta = loader.meta(raw, default_name(&raw.kind, node.name()))?;
    let temporal = loader.temporal(raw, &meta)?;
    let mut recorder = FlowDurationCurveRecorder::new(meta, node, percentiles)?;
    if let Some(temporal) = temporal {
        recorder = recorder.with_temporal_aggregator(temporal);
    }
    Ok(share(recorder))
}

fn build_seasonal_flow_duration_curve(
    loader: &RecorderLoader,
    raw: &RawConfig,
) -> Result<SharedRecorder> {
    let node = loader.node(raw)?;
    let percentiles = raw.require(raw.percentiles.as_ref(), "percentiles")?.clone();
    let months = raw.require(raw.months.as_ref(), "months")?.clone();
    let meta = loader.meta(raw, default_name(&raw.kind, node.name()))?;
    let temporal = loader.temporal(raw, &meta)?;
    let mut recorder = SeasonalFlowDurationCurveRecorder::new(meta, node, percentiles, months)?;
    if let Some(temporal) = temporal {
        recorder = recorder.with_temporal_aggregator(temporal);
    }
    Ok(share(recorder))
}

fn build_storage_duration_curve(
    loader: &RecorderLoader,
    raw: &RawConfig,
) -> Result<SharedRecorder> {
    let storage = loader.storage(raw)?;
    let percentiles = raw.require(raw.percentiles.as_ref(), "percentiles")?.clone();
    let meta = loader.meta(raw, default_name(&raw.kind, storage.name()))?;
    let temporal = loader.temporal(raw, &meta)?;
    let mut recorder = StorageDurationCurveRecorder::new(meta, storage, percentiles)?
        .with_proportional(raw.proportional.unwrap_or(false));
    if let Some(temporal) = temporal {
        recorder = recorder.with_temporal_aggregator(temporal);
    }
    Ok(share(recorder))
}

fn build_flow_duration_curve_deviation(
    loader: &RecorderLoader,
    raw: &RawConfig,
) -> Result<SharedRecorder> {
    let node = loader.node(raw)?;
    let percentiles = raw.require(raw.percentiles.as_ref(), "percentiles")?.clone();
    let lower = parse_target(raw, &raw.lower_target_fdc, "lower_target_fdc")?;
    let upper = parse_target(raw, &raw.upper_target_fdc, "upper_target_fdc")?;
    let meta = loader.meta(raw, default_name(&raw.kind, node.name()))?;
    let temporal = loader.temporal(raw, &meta)?;
    let mut recorder = FlowDurationCurveDeviationRecorder::new(
        meta,
        node,
        percentiles,
        lower,
        upper,
        raw.scenario.clone(),
    )?;
    if let Some(temporal) = temporal {
        recorder = recorder.with_temporal_aggregator(temporal);
    }
    Ok(share(recorder))
}

fn build_rolling_window_parameter(
    loader: &RecorderLoader,
    raw: &RawConfig,
) -> Result<SharedRecorder> {
    let parameter = loader.parameter(raw)?;
    let window = *raw.require(raw.window.as_ref(), "window")?;
    let meta = loader.meta(raw, default_name(&raw.kind, parameter.name()))?;
    let temporal = loader.temporal(raw, &meta)?;
    let mut recorder = RollingWindowParameterRecorder::new(meta, parameter, window)?;
    if let Some(window_agg) = temporal {
        recorder = recorder.with_window_aggregator(window_agg);
    }
    Ok(share(recorder))
}

fn build_rolling_mean_flow(loader: &RecorderLoader, raw: &RawConfig) -> Result<SharedRecorder> {
    let node = loader.node(raw)?;
    let meta = loader.meta(raw, default_name(&raw.kind, node.name()))?;
    let recorder = RollingMeanFlowRecorder::new(meta, node, raw.timesteps, raw.days)?;
    Ok(share(recorder))
}

fn build_total_deficit(loader: &RecorderLoader, raw: &RawConfig) -> Result<SharedRecorder> {
    let node = loader.node(raw)?;
    let meta = loader.meta(raw, default_name(&raw.kind, node.name()))?;
    Ok(share(TotalDeficitRecorder::new(meta, node)))
}

fn build_total_flow(loader: &RecorderLoader, raw: &RawConfig) -> Result<SharedRecorder> {
    let node = loader.node(raw)?;
    let meta = loader.meta(raw, default_name(&raw.kind, node.name()))?;
    Ok(share(TotalFlowRecorder::new(
        meta,
        node,
        raw.factor.unwrap_or(1.0),
    )))
}

fn build_mean_flow(loader: &RecorderLoader, raw: &RawConfig) -> Result<SharedRecorder> {
    let node = loader.node(raw)?;
    let meta = loader.meta(raw, default_name(&raw.kind, node.name()))?;
    Ok(share(MeanFlowRecorder::new(
        meta,
        node,
        raw.factor.unwrap_or(1.0),
    )))
}

fn build_deficit_frequency(loader: &RecorderLoader, raw: &RawConfig) -> Result<SharedRecorder> {
    let node = loader.node(raw)?;
    let meta = loader.meta(raw, default_name(&raw.kind, node.name()))?;
    Ok(share(DeficitFrequencyRecorder::new(meta, node)))
}

fn build_minimum_volume(loader: &RecorderLoader, raw: &RawConfig) -> Result<SharedRecorder> {
    let storage = loader.storage(raw)?;
    let meta = loader.meta(raw, default_name(&raw.kind, storage.name()))?;
    Ok(share(MinimumVolumeRecorder::new(meta, storage)))
}

fn build_storage_threshold(loader: &RecorderLoader, raw: &RawConfig) -> Result<SharedRecorder> {
    let storage = loader.storage(raw)?;
    let threshold = *raw.require(raw.threshold.as_ref(), "threshold")?;
    let meta = loader.meta(raw, default_name(&raw.kind, storage.name()))?;
    Ok(share(StorageThresholdRecorder::new(meta, storage, threshold)))
}

fn build_annual_count_index_threshold(
    loader: &RecorderLoader,
    raw: &RawConfig,
) -> Result<SharedRecorder> {
    let parameter = loader.index_parameter(raw)?;
    let threshold = parse_index_threshold(raw)?;
    let meta = loader.meta(raw, default_name(&raw.kind, parameter.name()))?;
    Ok(share(AnnualCountIndexThresholdRecorder::new(
        meta, parameter, threshold,
    )))
}

fn build_total_parameter(loader: &RecorderLoader, raw: &RawConfig) -> Result<SharedRecorder> {
    let parameter = loader.parameter(raw)?;
    let meta = loader.meta(raw, default_name(&raw.kind, parameter.name()))?;
    Ok(share(TotalParameterRecorder::new(
        meta,
        parameter,
        raw.factor.unwrap_or(1.0),
        raw.integrate.unwrap_or(false),
    )))
}

fn build_mean_parameter(loader: &RecorderLoader, raw: &RawConfig) -> Result<SharedRecorder> {
    let parameter = loader.parameter(raw)?;
    let meta = loader.meta(raw, default_name(&raw.kind, parameter.name()))?;
    Ok(share(MeanParameterRecorder::new(
        meta,
        parameter,
        raw.factor.unwrap_or(1.0),
    )))
}

fn build_aggregated(loader: &RecorderLoader, raw: &RawConfig) -> Result<SharedRecorder> {
    let children = loader.children(raw)?;
    // Without an explicit name, derive one from the first child
    let fallback = children
        .first()
        .map(|c| default_name(&raw.kind, &c.borrow().meta().name))
        .unwrap_or_else(|| raw.kind.clone());
    let meta = loader.meta(raw, fallback)?;
    Ok(share(AggregatedRecorder::new(meta, children)?))
}
