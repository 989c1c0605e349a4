//! Entity accessor traits
//!
//! The recording layer observes simulation entities through these traits
//! only; the engine owns the entities and keeps their state current. All
//! accessors take a scenario combination and return that combination's
//! value for the step just solved.
//!
//! `recorder_attached` is a bookkeeping hook: a recorder calls it once at
//! construction so the entity can keep its own back-reference list. The
//! association is bidirectional but owns nothing in either direction.

use crate::scenario::ScenarioIndex;

/// A node with a per-scenario flow and a flow upper bound.
pub trait FlowNode {
    fn name(&self) -> &str;

    /// Flow solved for the current timestep.
    fn flow(&self, scenario: &ScenarioIndex) -> f64;

    /// Flow upper bound for the current timestep.
    fn max_flow(&self, scenario: &ScenarioIndex) -> f64;

    /// Called when a recorder binds to this node.
    fn recorder_attached(&self, _recorder: &str) {}
}

/// A storage node with volume, level and surface area.
pub trait StorageNode {
    fn name(&self) -> &str;

    /// Stored volume after the current timestep.
    fn volume(&self, scenario: &ScenarioIndex) -> f64;

    /// Maximum storable volume for the current timestep.
    fn max_volume(&self, scenario: &ScenarioIndex) -> f64;

    /// Water level corresponding to the current volume.
    fn level(&self, scenario: &ScenarioIndex) -> f64;

    /// Surface area corresponding to the current volume.
    fn area(&self, scenario: &ScenarioIndex) -> f64;

    /// Called when a recorder binds to this storage.
    fn recorder_attached(&self, _recorder: &str) {}
}

/// A computed model parameter with a continuous value.
pub trait Parameter {
    fn name(&self) -> &str;

    /// Value for one scenario combination.
    fn value(&self, scenario: &ScenarioIndex) -> f64;

    /// Values for every combination, in global-id order.
    fn all_values(&self) -> Vec<f64>;

    /// Called when a recorder binds to this parameter. Recorders also
    /// declare themselves as dependents of the parameter so the external
    /// scheduler evaluates the parameter first; see
    /// `Recorder::dependencies` in the recorders crate.
    fn recorder_attached(&self, _recorder: &str) {}
}

/// A computed model parameter with a discrete index value.
pub trait IndexParameter {
    fn name(&self) -> &str;

    /// Index for one scenario combination.
    fn index(&self, scenario: &ScenarioIndex) -> usize;

    /// Indices for every combination, in global-id order.
    fn all_indices(&self) -> Vec<usize>;

    /// Called when a recorder binds to this parameter.
    fn recorder_attached(&self, _recorder: &str) {}
}
