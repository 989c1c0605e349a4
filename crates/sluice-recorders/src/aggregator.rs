//! Deterministic reductions over scenario and time axes.
//!
//! Every recorder reduces with an [`Aggregator`]: once over the time (or
//! percentile) axis of its buffered series, and once over the scenario
//! axis of its per-scenario values. Reductions must produce identical
//! results run after run, so the floating-point accumulations (`sum`,
//! `product`, and `mean` via `sum`) use a fixed-structure tree: pairing
//! is determined by index, never by evaluation order.
//!
//! # NaN handling
//!
//! With `ignore_nan` set, NaN entries are filtered out before reducing.
//! If nothing is left after filtering, the result is NaN — except for
//! `Product`, whose empty reduction is the identity 1.0. With
//! `ignore_nan` unset, any NaN input yields NaN for every reduction
//! kind, order statistics included.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::Error;
use crate::series::Series;

/// Axis of a two-dimensional series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Reduce down the rows; one output per column (scenario).
    Time,
    /// Reduce along each row; one output per row (timestep).
    Scenario,
}

/// A user-supplied reduction standing in for a named one.
///
/// The shape contract mirrors the built-ins: a scalar for a vector, a
/// reduced vector for a matrix. The 2-D form receives the series as
/// buffered — NaN filtering is the implementation's own concern there.
pub trait CustomAggregation {
    fn aggregate_1d(&self, values: &[f64]) -> f64;
    fn aggregate_2d(&self, series: &Series, axis: Axis) -> Vec<f64>;
}

/// Adapter lifting a vector reduction to the 2-D contract lane by lane.
pub struct FnAggregation<F>(pub F);

impl<F> CustomAggregation for FnAggregation<F>
where
    F: Fn(&[f64]) -> f64,
{
    fn aggregate_1d(&self, values: &[f64]) -> f64 {
        (self.0)(values)
    }

    fn aggregate_2d(&self, series: &Series, axis: Axis) -> Vec<f64> {
        match axis {
            Axis::Time => (0..series.cols())
                .map(|c| (self.0)(&series.column(c)))
                .collect(),
            Axis::Scenario => (0..series.rows()).map(|r| (self.0)(series.row(r))).collect(),
        }
    }
}

/// Reduction selector.
#[derive(Clone)]
pub enum AggregationFunc {
    Sum,
    Min,
    Max,
    Mean,
    Median,
    Product,
    Custom(Arc<dyn CustomAggregation>),
}

impl AggregationFunc {
    /// Config token for this function.
    pub fn name(&self) -> &'static str {
        match self {
            AggregationFunc::Sum => "sum",
            AggregationFunc::Min => "min",
            AggregationFunc::Max => "max",
            AggregationFunc::Mean => "mean",
            AggregationFunc::Median => "median",
            AggregationFunc::Product => "product",
            AggregationFunc::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for AggregationFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AggregationFunc {
    type Err = Error;

    /// Parse a config token. Unrecognised tokens fail here, at
    /// construction time, never at reduction time.
    fn from_str(token: &str) -> Result<Self, Error> {
        match token {
            "sum" => Ok(AggregationFunc::Sum),
            "min" => Ok(AggregationFunc::Min),
            "max" => Ok(AggregationFunc::Max),
            "mean" => Ok(AggregationFunc::Mean),
            "median" => Ok(AggregationFunc::Median),
            "product" => Ok(AggregationFunc::Product),
            other => Err(Error::UnknownAggregation(other.to_string())),
        }
    }
}

/// A configured reduction engine over one or two axes.
#[derive(Debug, Clone)]
pub struct Aggregator {
    func: AggregationFunc,
}

impl Aggregator {
    pub fn new(func: AggregationFunc) -> Self {
        Self { func }
    }

    /// Parse from a config token.
    pub fn from_name(token: &str) -> Result<Self, Error> {
        Ok(Self::new(token.parse()?))
    }

    /// Wrap a vector-reduction closure as a custom aggregator.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&[f64]) -> f64 + 'static,
    {
        Self::new(AggregationFunc::Custom(Arc::new(FnAggregation(f))))
    }

    pub fn func(&self) -> &AggregationFunc {
        &self.func
    }

    /// Reduce a vector to a scalar.
    pub fn aggregate_1d(&self, values: &[f64], ignore_nan: bool) -> f64 {
        if ignore_nan {
            let filtered: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
            self.reduce(&filtered)
        } else if values.iter().any(|v| v.is_nan()) {
            f64::NAN
        } else {
            self.reduce(values)
        }
    }

    /// Reduce one axis of a matrix; output length equals the other axis.
    pub fn aggregate_2d(&self, series: &Series, axis: Axis, ignore_nan: bool) -> Vec<f64> {
        if let AggregationFunc::Custom(custom) = &self.func {
            return custom.aggregate_2d(series, axis);
        }
        match axis {
            Axis::Time => (0..series.cols())
                .map(|c| self.aggregate_1d(&series.column(c), ignore_nan))
                .collect(),
            Axis::Scenario => (0..series.rows())
                .map(|r| self.aggregate_1d(series.row(r), ignore_nan))
                .collect(),
        }
    }

    fn reduce(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            // Empty product is the identity; everything else has none.
            return match self.func {
                AggregationFunc::Product => 1.0,
                _ => f64::NAN,
            };
        }
        match &self.func {
            AggregationFunc::Sum => tree_reduce(values, |a, b| a + b),
            AggregationFunc::Product => tree_reduce(values, |a, b| a * b),
            AggregationFunc::Mean => tree_reduce(values, |a, b| a + b) / values.len() as f64,
            AggregationFunc::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            AggregationFunc::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            AggregationFunc::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_unstable_by(f64::total_cmp);
                percentile_of_sorted(&sorted, 50.0)
            }
            AggregationFunc::Custom(custom) => custom.aggregate_1d(values),
        }
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(AggregationFunc::Mean)
    }
}

/// Reduce with a fixed binary tree: pairs by index, odd element carried
/// forward. The structure depends only on the input length, so repeated
/// runs reduce in bitwise-identical order.
fn tree_reduce<F>(values: &[f64], op: F) -> f64
where
    F: Fn(f64, f64) -> f64,
{
    debug_assert!(!values.is_empty());
    if values.len() == 1 {
        return values[0];
    }

    let mut current = values.to_vec();
    let mut next = Vec::with_capacity(current.len().div_ceil(2));

    while current.len() > 1 {
        next.clear();
        let mut i = 0;
        while i + 1 < current.len() {
            next.push(op(current[i], current[i + 1]));
            i += 2;
        }
        if i < current.len() {
            next.push(current[i]);
        }
        std::mem::swap(&mut current, &mut next);
    }

    current[0]
}

/// Percentile of an ascending-sorted slice, linearly interpolated
/// between closest ranks. `q` is in [0, 100].
pub fn percentile_of_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let frac = rank - lo as f64;
    if frac == 0.0 {
        sorted[lo]
    } else {
        sorted[lo] + (sorted[lo + 1] - sorted[lo]) * frac
    }
}
