//! End-to-end recorder lifecycle tests.
//!
//! Each test plays the simulation engine: it scripts entity state per
//! timestep and drives the whole roster through
//! setup → reset → after* → finish, then checks the exposed values.

use serde_json::json;

use sluice_model::testing::{
    ScriptedIndexParameter, ScriptedNode, ScriptedParameter, ScriptedStorage,
};
use sluice_model::{Scenario, ScenarioDomain};
use sluice_recorders::{
    AggregatedRecorder, Aggregator, Dependency, FlowSeriesRecorder, LoadContext,
    RecorderLoader, RecorderMeta, RollingWindowParameterRecorder, TotalFlowRecorder, share,
};
use sluice_tests::TestHarness;

/// A loaded roster observes a run and exposes per-scenario values and
/// aggregated scalars.
#[test]
fn test_loaded_roster_end_to_end() {
    let node = ScriptedNode::new("river", 2);
    let storage = ScriptedStorage::new("reservoir", 2);
    storage.set_max_volume(&[100.0, 100.0]);

    let mut context = LoadContext::new();
    context.add_node(node.clone());
    context.add_storage(storage.clone());

    let mut loader = RecorderLoader::new(context);
    loader
        .load_all(&[
            json!({"type": "total_flow", "node": "river", "name": "total", "agg_func": "sum"}),
            json!({"type": "minimum_volume", "storage": "reservoir", "name": "min_volume"}),
            json!({
                "type": "flow_duration_curve",
                "node": "river",
                "name": "fdc",
                "percentiles": [0.0, 50.0, 100.0],
            }),
        ])
        .unwrap();

    let mut harness = TestHarness::daily(4, ScenarioDomain::new(vec![Scenario::new("inflow", 2)]));
    harness.set_recorders(loader.into_recorders());
    harness.setup().unwrap();

    let flows = [[1.0, 10.0], [2.0, 20.0], [3.0, 30.0], [4.0, 40.0]];
    let volumes = [[80.0, 90.0], [60.0, 70.0], [75.0, 85.0], [90.0, 95.0]];
    harness
        .run(|timestep| {
            node.set_flow(&flows[timestep.index]);
            storage.set_volume(&volumes[timestep.index]);
        })
        .unwrap();

    assert_eq!(harness.values("total").unwrap(), vec![10.0, 100.0]);
    assert_eq!(harness.aggregated_value("total").unwrap(), 110.0);
    assert_eq!(harness.values("min_volume").unwrap(), vec![60.0, 70.0]);
    // Median flow per scenario via the duration curve
    assert_eq!(harness.values("fdc").unwrap(), vec![2.5, 25.0]);
}

/// Running the same step sequence twice from a fresh reset yields
/// identical values.
#[test]
fn test_replay_stability() {
    let node = ScriptedNode::new("river", 1);
    let parameter = ScriptedParameter::new("inflow", 1);
    let index = ScriptedIndexParameter::new("drought_level", 1);

    let mut context = LoadContext::new();
    context.add_node(node.clone());
    context.add_parameter(parameter.clone());
    context.add_index_parameter(index.clone());

    let mut loader = RecorderLoader::new(context);
    loader
        .load_all(&[
            json!({"type": "mean_flow", "node": "river", "name": "mean"}),
            json!({
                "type": "rolling_window_parameter",
                "parameter": "inflow",
                "name": "rolling",
                "window": 3,
            }),
            json!({
                "type": "annual_count_index_threshold",
                "parameter": "drought_level",
                "name": "annual",
                "threshold": 1,
            }),
            json!({
                "type": "flow_duration_curve",
                "node": "river",
                "name": "fdc",
                "percentiles": [5.0, 95.0],
            }),
        ])
        .unwrap();

    let mut harness = TestHarness::daily(10, ScenarioDomain::single());
    harness.set_recorders(loader.into_recorders());
    harness.setup().unwrap();

    let mut step = |timestep: &sluice_model::Timestep| {
        let t = timestep.index as f64;
        node.set_flow(&[(t * 1.37).sin().abs() * 10.0]);
        parameter.set_values(&[t * 0.5]);
        index.set_indices(&[timestep.index % 3]);
    };

    harness.run(&mut step).unwrap();
    let first: Vec<Vec<f64>> = ["mean", "rolling", "annual", "fdc"]
        .iter()
        .map(|name| harness.values(name).unwrap())
        .collect();

    harness.run(&mut step).unwrap();
    let second: Vec<Vec<f64>> = ["mean", "rolling", "annual", "fdc"]
        .iter()
        .map(|name| harness.values(name).unwrap())
        .collect();

    for (a, b) in first.iter().zip(&second) {
        let a_bits: Vec<u64> = a.iter().map(|v| v.to_bits()).collect();
        let b_bits: Vec<u64> = b.iter().map(|v| v.to_bits()).collect();
        assert_eq!(a_bits, b_bits);
    }
}

/// The rolling window aggregates a partial history until it fills.
#[test]
fn test_rolling_window_partial_history() {
    let parameter = ScriptedParameter::new("inflow", 1);
    let recorder = share(
        RollingWindowParameterRecorder::new(
            RecorderMeta::new("rolling.inflow"),
            parameter.clone(),
            3,
        )
        .unwrap(),
    );

    let mut harness = TestHarness::daily(5, ScenarioDomain::single());
    harness.add(recorder.clone()).unwrap();
    harness.setup().unwrap();

    let samples = [1.0, 2.0, 3.0, 4.0, 5.0];
    harness
        .run(|timestep| parameter.set_values(&[samples[timestep.index]]))
        .unwrap();

    // Values are the temporal mean of the windowed aggregates
    // [1, 1.5, 2, 3, 4]
    assert_eq!(harness.values("rolling.inflow").unwrap(), vec![2.3]);
}

/// Recorders compose: an aggregated recorder combines child values and
/// declares them as scheduler dependencies.
#[test]
fn test_aggregated_recorder_composition() {
    let supply = ScriptedNode::new("supply", 2);
    let spill = ScriptedNode::new("spill", 2);

    let total_supply = share(TotalFlowRecorder::new(
        RecorderMeta::new("total.supply"),
        supply.clone(),
        1.0,
    ));
    let total_spill = share(TotalFlowRecorder::new(
        RecorderMeta::new("total.spill"),
        spill.clone(),
        1.0,
    ));

    let combined = share(
        AggregatedRecorder::new(
            RecorderMeta::new("combined").with_aggregator(Aggregator::from_name("sum").unwrap()),
            vec![total_supply.clone(), total_spill.clone()],
        )
        .unwrap(),
    );

    let mut harness = TestHarness::daily(2, ScenarioDomain::new(vec![Scenario::new("demand", 2)]));
    harness.add(total_supply).unwrap();
    harness.add(total_spill).unwrap();
    harness.add(combined).unwrap();
    harness.setup().unwrap();

    harness
        .run(|_| {
            supply.set_flow(&[0.5, 1.0]);
            spill.set_flow(&[1.5, 2.0]);
        })
        .unwrap();

    // Children over two one-day steps: [1, 2] and [3, 4]
    assert_eq!(harness.values("total.supply").unwrap(), vec![1.0, 2.0]);
    assert_eq!(harness.values("total.spill").unwrap(), vec![3.0, 4.0]);
    assert_eq!(harness.values("combined").unwrap(), vec![4.0, 6.0]);

    let edges = harness.recorders().dependency_edges();
    assert!(edges.contains(&(
        "combined".to_string(),
        Dependency::Recorder("total.supply".to_string())
    )));
    assert!(edges.contains(&(
        "combined".to_string(),
        Dependency::Recorder("total.spill".to_string())
    )));
}

/// Scenario combinations map one column each; entity accessors see the
/// right global id.
#[test]
fn test_multi_dimension_scenarios() {
    // 2 × 2 combinations
    let scenarios = ScenarioDomain::new(vec![
        Scenario::new("inflow", 2),
        Scenario::new("demand", 2),
    ]);
    let node = ScriptedNode::new("river", scenarios.len());
    let recorder = share(FlowSeriesRecorder::new(
        RecorderMeta::new("series.river"),
        node.clone(),
    ));

    let mut harness = TestHarness::daily(3, scenarios);
    harness.add(recorder.clone()).unwrap();
    harness.setup().unwrap();

    harness
        .run(|timestep| {
            let base = (timestep.index + 1) as f64;
            node.set_flow(&[base, base * 10.0, base * 100.0, base * 1000.0]);
        })
        .unwrap();

    // Temporal mean of 1,2,3 scaled per combination
    assert_eq!(
        harness.values("series.river").unwrap(),
        vec![2.0, 20.0, 200.0, 2000.0]
    );
}

/// Objective metadata flows through the loader to optimiser consumers.
#[test]
fn test_objective_surface() {
    let node = ScriptedNode::new("river", 1);
    let mut context = LoadContext::new();
    context.add_node(node.clone());

    let mut loader = RecorderLoader::new(context);
    loader
        .load(&json!({
            "type": "total_flow",
            "node": "river",
            "name": "objective",
            "is_objective": "maximise",
            "epsilon": 0.01,
        }))
        .unwrap();

    let mut harness = TestHarness::daily(2, ScenarioDomain::single());
    harness.set_recorders(loader.into_recorders());
    harness.setup().unwrap();
    harness.run(|_| node.set_flow(&[3.0])).unwrap();

    let recorder = harness.recorders().get("objective").unwrap();
    let borrowed = recorder.borrow();
    assert!(borrowed.meta().is_objective());
    assert_eq!(borrowed.meta().epsilon, 0.01);
    assert_eq!(borrowed.aggregated_value().unwrap(), 6.0);

    let all = harness.recorders().aggregated_values().unwrap();
    assert_eq!(all["objective"], 6.0);
}

/// Entities keep a back-reference to every recorder bound to them.
#[test]
fn test_entity_back_references() {
    let node = ScriptedNode::new("river", 1);
    let _series = FlowSeriesRecorder::new(RecorderMeta::new("series.river"), node.clone());
    let _total = TotalFlowRecorder::new(RecorderMeta::new("total.river"), node.clone(), 1.0);

    assert_eq!(node.attached(), vec!["series.river", "total.river"]);
}
