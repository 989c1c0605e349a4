//! Sluice recorders
//!
//! Recording and aggregation engine for scenario-parallel stepped
//! simulations. The simulation engine drives each recorder through
//! `setup` → `reset` → one `after` per timestep → `finish`; recorders
//! pull live values from their bound entities, buffer or fold them, and
//! expose per-scenario vectors (`values()`) and scenario-aggregated
//! scalars (`aggregated_value()`) to optimisers and reporting.
//!
//! # Architecture
//!
//! - [`aggregator`] - reduction engine shared by every recorder
//! - [`series`] - dense and circular sample buffers
//! - [`recorder`] - lifecycle contract, metadata and the roster
//! - [`array`] - full time-series recorders
//! - [`duration`] - duration-curve recorders
//! - [`rolling`] - rolling-window recorders
//! - [`totals`] - constant per-scenario accumulators
//! - [`combine`] - composition of recorders into trees
//! - [`loader`] - config-driven construction and the type registry
//! - [`error`] - error types

pub mod aggregator;
pub mod array;
pub mod combine;
pub mod duration;
pub mod error;
pub mod loader;
pub mod recorder;
pub mod rolling;
pub mod series;
pub mod totals;

pub use aggregator::{AggregationFunc, Aggregator, Axis, CustomAggregation};
pub use array::{
    FlowSeriesRecorder, IndexSeriesRecorder, ParameterSeriesRecorder, StorageMetric,
    StorageSeriesRecorder,
};
pub use combine::AggregatedRecorder;
pub use duration::{
    FlowDurationCurveDeviationRecorder, FlowDurationCurveRecorder,
    SeasonalFlowDurationCurveRecorder, StorageDurationCurveRecorder,
};
pub use error::{Error, Result};
pub use loader::{LoadContext, RecorderLoader};
pub use recorder::{
    Dependency, Direction, Recorder, RecorderMeta, RecorderSet, SharedRecorder, StepContext,
    share,
};
pub use rolling::{RollingMeanFlowRecorder, RollingWindowParameterRecorder};
pub use series::{RingBuffer, Series};
pub use totals::{
    AnnualCountIndexThresholdRecorder, DEFICIT_TOLERANCE, DeficitFrequencyRecorder,
    MeanFlowRecorder, MeanParameterRecorder, MinimumVolumeRecorder, StorageThresholdRecorder,
    TotalDeficitRecorder, TotalFlowRecorder, TotalParameterRecorder,
};
