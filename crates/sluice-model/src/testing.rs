//! Scripted entity doubles
//!
//! Vec-backed implementations of the entity traits for tests. The test
//! drives them directly: set the per-scenario state for a step, then let
//! the recorders observe it. Interior mutability stands in for the
//! engine-side state updates; the lifecycle is single-threaded.

use std::cell::RefCell;
use std::rc::Rc;

use crate::entity::{FlowNode, IndexParameter, Parameter, StorageNode};
use crate::scenario::ScenarioIndex;

/// A flow node whose flow and bound are set by the test.
#[derive(Debug)]
pub struct ScriptedNode {
    name: String,
    flow: RefCell<Vec<f64>>,
    max_flow: RefCell<Vec<f64>>,
    attached: RefCell<Vec<String>>,
}

impl ScriptedNode {
    pub fn new(name: impl Into<String>, n_combinations: usize) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            flow: RefCell::new(vec![0.0; n_combinations]),
            max_flow: RefCell::new(vec![f64::INFINITY; n_combinations]),
            attached: RefCell::new(Vec::new()),
        })
    }

    pub fn set_flow(&self, values: &[f64]) {
        self.flow.borrow_mut().copy_from_slice(values);
    }

    pub fn set_max_flow(&self, values: &[f64]) {
        self.max_flow.borrow_mut().copy_from_slice(values);
    }

    /// Names of recorders bound to this node, in attach order.
    pub fn attached(&self) -> Vec<String> {
        self.attached.borrow().clone()
    }
}

impl FlowNode for ScriptedNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn flow(&self, scenario: &ScenarioIndex) -> f64 {
        self.flow.borrow()[scenario.global_id]
    }

    fn max_flow(&self, scenario: &ScenarioIndex) -> f64 {
        self.max_flow.borrow()[scenario.global_id]
    }

    fn recorder_attached(&self, recorder: &str) {
        self.attached.borrow_mut().push(recorder.to_string());
    }
}

/// A storage node whose volume, level and area are set by the test.
#[derive(Debug)]
pub struct ScriptedStorage {
    name: String,
    volume: RefCell<Vec<f64>>,
    max_volume: RefCell<Vec<f64>>,
    level: RefCell<Vec<f64>>,
    area: RefCell<Vec<f64>>,
    attached: RefCell<Vec<String>>,
}

impl ScriptedStorage {
    pub fn new(name: impl Into<String>, n_combinations: usize) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            volume: RefCell::new(vec![0.0; n_combinations]),
            max_volume: RefCell::new(vec![1.0; n_combinations]),
            level: RefCell::new(vec![0.0; n_combinations]),
            area: RefCell::new(vec![0.0; n_combinations]),
            attached: RefCell::new(Vec::new()),
        })
    }

    pub fn set_volume(&self, values: &[f64]) {
        self.volume.borrow_mut().copy_from_slice(values);
    }

    pub fn set_max_volume(&self, values: &[f64]) {
        self.max_volume.borrow_mut().copy_from_slice(values);
    }

    pub fn set_level(&self, values: &[f64]) {
        self.level.borrow_mut().copy_from_slice(values);
    }

    pub fn set_area(&self, values: &[f64]) {
        self.area.borrow_mut().copy_from_slice(values);
    }

    pub fn attached(&self) -> Vec<String> {
        self.attached.borrow().clone()
    }
}

impl StorageNode for ScriptedStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn volume(&self, scenario: &ScenarioIndex) -> f64 {
        self.volume.borrow()[scenario.global_id]
    }

    fn max_volume(&self, scenario: &ScenarioIndex) -> f64 {
        self.max_volume.borrow()[scenario.global_id]
    }

    fn level(&self, scenario: &ScenarioIndex) -> f64 {
        self.level.borrow()[scenario.global_id]
    }

    fn area(&self, scenario: &ScenarioIndex) -> f64 {
        self.area.borrow()[scenario.global_id]
    }

    fn recorder_attached(&self, recorder: &str) {
        self.attached.borrow_mut().push(recorder.to_string());
    }
}

/// A parameter whose values are set by the test.
#[derive(Debug)]
pub struct ScriptedParameter {
    name: String,
    values: RefCell<Vec<f64>>,
    attached: RefCell<Vec<String>>,
}

impl ScriptedParameter {
    pub fn new(name: impl Into<String>, n_combinations: usize) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            values: RefCell::new(vec![0.0; n_combinations]),
            attached: RefCell::new(Vec::new()),
        })
    }

    pub fn set_values(&self, values: &[f64]) {
        self.values.borrow_mut().copy_from_slice(values);
    }

    pub fn attached(&self) -> Vec<String> {
        self.attached.borrow().clone()
    }
}

impl Parameter for ScriptedParameter {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self, scenario: &ScenarioIndex) -> f64 {
        self.values.borrow()[scenario.global_id]
    }

    fn all_values(&self) -> Vec<f64> {
        self.values.borrow().clone()
    }

    fn recorder_attached(&self, recorder: &str) {
        self.attached.borrow_mut().push(recorder.to_string());
    }
}

/// An index parameter whose indices are set by the test.
#[derive(Debug)]
pub struct ScriptedIndexParameter {
    name: String,
    indices: RefCell<Vec<usize>>,
    attached: RefCell<Vec<String>>,
}

impl ScriptedIndexParameter {
    pub fn new(name: impl Into<String>, n_combinations: usize) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            indices: RefCell::new(vec![0; n_combinations]),
            attached: RefCell::new(Vec::new()),
        })
    }

    pub fn set_indices(&self, indices: &[usize]) {
        self.indices.borrow_mut().copy_from_slice(indices);
    }

    pub fn attached(&self) -> Vec<String> {
        self.attached.borrow().clone()
    }
}

impl IndexParameter for ScriptedIndexParameter {
    fn name(&self) -> &str {
        &self.name
    }

    fn index(&self, scenario: &ScenarioIndex) -> usize {
        self.indices.borrow()[scenario.global_id]
    }

    fn all_indices(&self) -> Vec<usize> {
        self.indices.borrow().clone()
    }

    fn recorder_attached(&self, recorder: &str) {
        self.attached.borrow_mut().push(recorder.to_string());
    }
}
