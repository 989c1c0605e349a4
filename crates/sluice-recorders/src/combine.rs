//! Recorder composition
//!
//! An [`AggregatedRecorder`] combines the per-scenario values of other
//! recorders elementwise with its own reduction, so recorders compose
//! into trees. Children are referenced, not owned — one recorder may
//! feed several aggregators — and are declared as dependencies so the
//! external scheduler evaluates them first.

use sluice_model::Domain;

use crate::aggregator::{Aggregator, Axis};
use crate::error::{Error, Result};
use crate::recorder::{Dependency, Recorder, RecorderMeta, SharedRecorder, StepContext};
use crate::series::Series;

/// Combines child recorders' values with a configurable reduction.
pub struct AggregatedRecorder {
    meta: RecorderMeta,
    /// Reduction across the child recorders; defaults to the same
    /// function as the scenario-axis aggregator.
    recorder_agg: Aggregator,
    children: Vec<SharedRecorder>,
}

impl AggregatedRecorder {
    pub fn new(meta: RecorderMeta, children: Vec<SharedRecorder>) -> Result<Self> {
        if children.is_empty() {
            return Err(Error::Configuration {
                recorder: meta.name.clone(),
                message: "no child recorders given".to_string(),
            });
        }
        let recorder_agg = meta.aggregator.clone();
        Ok(Self {
            meta,
            recorder_agg,
            children,
        })
    }

    /// Override the reduction applied across child recorders.
    pub fn with_recorder_aggregator(mut self, aggregator: Aggregator) -> Self {
        self.recorder_agg = aggregator;
        self
    }
}

impl Recorder for AggregatedRecorder {
    fn meta(&self) -> &RecorderMeta {
        &self.meta
    }

    // The children run their own lifecycles through the roster; nothing
    // is buffered here.
    fn setup(&mut self, _domain: &Domain) -> Result<()> {
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        Ok(())
    }

    fn after(&mut self, _ctx: &StepContext<'_>) -> Result<()> {
        Ok(())
    }

    fn values(&self) -> Result<Vec<f64>> {
        let mut rows = Vec::with_capacity(self.children.len());
        for child in &self.children {
            rows.push(child.borrow().values()?);
        }
        let stacked = Series::from_rows(rows).ok_or_else(|| Error::Configuration {
            recorder: self.meta.name.clone(),
            message: "child recorders disagree on scenario count".to_string(),
        })?;
        Ok(self
            .recorder_agg
            .aggregate_2d(&stacked, Axis::Time, self.meta.ignore_nan))
    }

    fn dependencies(&self) -> Vec<Dependency> {
        self.children
            .iter()
            .map(|child| Dependency::Recorder(child.borrow().meta().name.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::share;

    struct FixedRecorder {
        meta: RecorderMeta,
        values: Vec<f64>,
    }

    impl FixedRecorder {
        fn shared(name: &str, values: Vec<f64>) -> SharedRecorder {
            share(Self {
                meta: RecorderMeta::new(name),
                values,
            })
        }
    }

    impl Recorder for FixedRecorder {
        fn meta(&self) -> &RecorderMeta {
            &self.meta
        }

        fn setup(&mut self, _domain: &Domain) -> Result<()> {
            Ok(())
        }

        fn reset(&mut self) -> Result<()> {
            Ok(())
        }

        fn after(&mut self, _ctx: &StepContext<'_>) -> Result<()> {
            Ok(())
        }

        fn values(&self) -> Result<Vec<f64>> {
            Ok(self.values.clone())
        }
    }

    fn pair() -> Vec<SharedRecorder> {
        vec![
            FixedRecorder::shared("a", vec![1.0, 2.0]),
            FixedRecorder::shared("b", vec![3.0, 4.0]),
        ]
    }

    #[test]
    fn test_sum_across_children() {
        let recorder = AggregatedRecorder::new(
            RecorderMeta::new("combined")
                .with_aggregator(Aggregator::from_name("sum").unwrap()),
            pair(),
        )
        .unwrap();
        assert_eq!(recorder.values().unwrap(), vec![4.0, 6.0]);
    }

    #[test]
    fn test_mean_across_children() {
        let recorder = AggregatedRecorder::new(RecorderMeta::new("combined"), pair())
            .unwrap()
            .with_recorder_aggregator(Aggregator::from_name("mean").unwrap());
        assert_eq!(recorder.values().unwrap(), vec![2.0, 3.0]);
    }

    #[test]
    fn test_recorder_aggregator_defaults_to_scenario_aggregator() {
        let recorder = AggregatedRecorder::new(
            RecorderMeta::new("combined")
                .with_aggregator(Aggregator::from_name("max").unwrap()),
            pair(),
        )
        .unwrap();
        // max across children per scenario, then max across scenarios
        assert_eq!(recorder.values().unwrap(), vec![3.0, 4.0]);
        assert_eq!(recorder.aggregated_value().unwrap(), 4.0);
    }

    #[test]
    fn test_empty_children_rejected() {
        let err = AggregatedRecorder::new(RecorderMeta::new("combined"), Vec::new()).err().unwrap();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_mismatched_children_rejected() {
        let children = vec![
            FixedRecorder::shared("a", vec![1.0, 2.0]),
            FixedRecorder::shared("b", vec![3.0]),
        ];
        let recorder = AggregatedRecorder::new(RecorderMeta::new("combined"), children).unwrap();
        assert!(matches!(
            recorder.values().unwrap_err(),
            Error::Configuration { .. }
        ));
    }

    #[test]
    fn test_children_declared_as_dependencies() {
        let recorder = AggregatedRecorder::new(RecorderMeta::new("combined"), pair()).unwrap();
        assert_eq!(
            recorder.dependencies(),
            vec![
                Dependency::Recorder("a".to_string()),
                Dependency::Recorder("b".to_string()),
            ]
        );
    }
}
