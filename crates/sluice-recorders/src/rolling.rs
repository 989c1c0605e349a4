//! Rolling-window recorders
//!
//! A circular buffer keeps the last W raw samples per scenario; the
//! dense per-timestep series stores the *windowed aggregate*, not the
//! raw history. During the first W−1 steps the window is the partial
//! history seen so far.

use std::rc::Rc;

use sluice_model::{Domain, FlowNode, Parameter};

use crate::aggregator::Aggregator;
use crate::array::SeriesCore;
use crate::error::{Error, Result};
use crate::recorder::{Dependency, Recorder, RecorderMeta, StepContext};
use crate::series::{RingBuffer, Series};

/// Windowed aggregate of a parameter over its last W values.
pub struct RollingWindowParameterRecorder {
    core: SeriesCore,
    parameter: Rc<dyn Parameter>,
    window: usize,
    window_agg: Aggregator,
    ring: Option<RingBuffer>,
}

impl RollingWindowParameterRecorder {
    pub fn new(meta: RecorderMeta, parameter: Rc<dyn Parameter>, window: usize) -> Result<Self> {
        if window == 0 {
            return Err(Error::Configuration {
                recorder: meta.name.clone(),
                message: "window must be at least one timestep".to_string(),
            });
        }
        parameter.recorder_attached(&meta.name);
        Ok(Self {
            core: SeriesCore::new(meta),
            parameter,
            window,
            window_agg: Aggregator::default(),
            ring: None,
        })
    }

    /// Reduction applied to the samples inside the window (default mean).
    pub fn with_window_aggregator(mut self, aggregator: Aggregator) -> Self {
        self.window_agg = aggregator;
        self
    }

    pub fn with_temporal_aggregator(mut self, aggregator: Aggregator) -> Self {
        self.core.temporal = aggregator;
        self
    }

    /// The windowed-aggregate series.
    pub fn series(&self) -> Result<&Series> {
        self.core.series()
    }
}

impl Recorder for RollingWindowParameterRecorder {
    fn meta(&self) -> &RecorderMeta {
        &self.core.meta
    }

    fn setup(&mut self, domain: &Domain) -> Result<()> {
        self.core.setup(domain);
        self.ring = Some(RingBuffer::new(self.window, domain.n_combinations()));
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.core.reset()?;
        if let Some(ring) = self.ring.as_mut() {
            ring.reset();
        }
        Ok(())
    }

    fn after(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        let samples: Vec<f64> = ctx
            .domain
            .combinations()
            .iter()
            .map(|s| self.parameter.value(s))
            .collect();

        let ring = self.ring.as_mut().ok_or_else(|| Error::NotSetup {
            recorder: self.core.meta.name.clone(),
            operation: "after",
        })?;
        ring.push_row(&samples);

        let ignore_nan = self.core.meta.ignore_nan;
        let mut aggregates = Vec::with_capacity(samples.len());
        for lane in 0..samples.len() {
            aggregates.push(self.window_agg.aggregate_1d(&ring.lane(lane), ignore_nan));
        }

        self.core
            .row_mut(ctx.timestep.index)?
            .copy_from_slice(&aggregates);
        Ok(())
    }

    fn values(&self) -> Result<Vec<f64>> {
        self.core.values()
    }

    fn dependencies(&self) -> Vec<Dependency> {
        vec![Dependency::Parameter(self.parameter.name().to_string())]
    }
}

/// Rolling mean of a node's flow, with the window given in timesteps or
/// in elapsed days.
///
/// The mean is maintained incrementally — add the newest sample,
/// subtract the evicted one — so no window rescan happens per step. A
/// day-based window is resolved against the model timestep length at
/// setup.
pub struct RollingMeanFlowRecorder {
    core: SeriesCore,
    node: Rc<dyn FlowNode>,
    timesteps: Option<usize>,
    days: Option<f64>,
    ring: Option<RingBuffer>,
    sums: Vec<f64>,
}

impl RollingMeanFlowRecorder {
    pub fn new(
        meta: RecorderMeta,
        node: Rc<dyn FlowNode>,
        timesteps: Option<usize>,
        days: Option<f64>,
    ) -> Result<Self> {
        if timesteps.is_none() && days.is_none() {
            return Err(Error::Configuration {
                recorder: meta.name.clone(),
                message: "window given neither in timesteps nor in days".to_string(),
            });
        }
        if timesteps == Some(0) {
            return Err(Error::Configuration {
                recorder: meta.name.clone(),
                message: "window must be at least one timestep".to_string(),
            });
        }
        node.recorder_attached(&meta.name);
        Ok(Self {
            core: SeriesCore::new(meta),
            node,
            timesteps,
            days,
            ring: None,
            sums: Vec::new(),
        })
    }

    pub fn with_temporal_aggregator(mut self, aggregator: Aggregator) -> Self {
        self.core.temporal = aggregator;
        self
    }

    /// The rolling-mean series.
    pub fn series(&self) -> Result<&Series> {
        self.core.series()
    }

    /// The window length, once resolved at setup.
    pub fn window(&self) -> Option<usize> {
        self.ring.as_ref().map(RingBuffer::window)
    }
}

impl Recorder for RollingMeanFlowRecorder {
    fn meta(&self) -> &RecorderMeta {
        &self.core.meta
    }

    fn setup(&mut self, domain: &Domain) -> Result<()> {
        let window = match self.timesteps {
            Some(window) => window,
            None => {
                let days = self.days.unwrap_or_default();
                let step_days = domain
                    .timesteps()
                    .first()
                    .ok_or_else(|| Error::Configuration {
                        recorder: self.core.meta.name.clone(),
                        message: "cannot resolve a day-based window for an empty run".to_string(),
                    })?
                    .days;
                (days / step_days) as usize
            }
        };
        if window == 0 {
            return Err(Error::Configuration {
                recorder: self.core.meta.name.clone(),
                message: "resolved window is zero timesteps".to_string(),
            });
        }

        self.core.setup(domain);
        self.ring = Some(RingBuffer::new(window, domain.n_combinations()));
        self.sums = vec![0.0; domain.n_combinations()];
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.core.reset()?;
        if let Some(ring) = self.ring.as_mut() {
            ring.reset();
        }
        self.sums.fill(0.0);
        Ok(())
    }

    fn after(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        let samples: Vec<f64> = ctx
            .domain
            .combinations()
            .iter()
            .map(|s| self.node.flow(s))
            .collect();

        let ring = self.ring.as_mut().ok_or_else(|| Error::NotSetup {
            recorder: self.core.meta.name.clone(),
            operation: "after",
        })?;
        for (lane, &sample) in samples.iter().enumerate() {
            self.sums[lane] += sample - ring.evicting(lane).unwrap_or(0.0);
        }
        ring.push_row(&samples);
        let filled = ring.filled() as f64;

        let row = self.core.row_mut(ctx.timestep.index)?;
        for (lane, sum) in self.sums.iter().enumerate() {
            row[lane] = sum / filled;
        }
        Ok(())
    }

    fn values(&self) -> Result<Vec<f64>> {
        self.core.values()
    }
}
