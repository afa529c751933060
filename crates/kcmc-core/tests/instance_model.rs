//! Integration tests for the instance model: parsing, filtering, reduction and
//! collaborator-driven preprocessing.

use kcmc_core::{
    FormatError, HeuristicPreprocessor, HeuristicResult, Instance, InstanceError, InstanceKey,
    InstanceParser, LooseAcceptance, PreprocessingError, PreprocessingReport, SensorId, SinkId,
};
use std::collections::BTreeSet;

/// 3 POIs, 6 sensors, 2 sinks on a small grid.
const GRID: &str = "KCMC;3 6 2;100 20 30;2024;\
PI;0 0;0 1;1 1;1 2;1 3;2 4;2 5;\
II;0 1;1 2;2 3;3 4;4 5;0 5;\
IS;2 0;3 0;5 1;END";

struct FixedPreprocessor(PreprocessingReport);

impl HeuristicPreprocessor for FixedPreprocessor {
    fn preprocess(
        &self,
        _key: &InstanceKey,
        _k: u32,
        _m: u32,
    ) -> Result<PreprocessingReport, PreprocessingError> {
        Ok(self.0.clone())
    }
}

fn heuristic(method: &str, valid: bool, solution: &str) -> HeuristicResult {
    HeuristicResult {
        method: method.into(),
        num_paths: Some(1),
        runtime_us: 42,
        valid,
        num_used_sensors: solution.matches('1').count() as u32,
        compression_rate: 0.25,
        solution: solution.into(),
    }
}

#[test]
fn missing_terminator_yields_no_instance() {
    let result = Instance::parse("KCMC;1 3 1;10 5 5;42;PI 0 0;PI 0 1;II 0 1;II 1 2;IS 2 0");
    assert_eq!(
        result,
        Err(InstanceError::Format(FormatError::MissingTerminator))
    );
}

#[test]
fn round_trip_preserves_every_relation() {
    let instance = Instance::parse(GRID).unwrap();
    let reparsed = Instance::parse(&instance.serialize()).unwrap();
    assert_eq!(reparsed.coverage_graph(), instance.coverage_graph());
    assert_eq!(reparsed.communication_graph(), instance.communication_graph());
    assert_eq!(reparsed.sink_edges(), instance.sink_edges());
    assert_eq!(reparsed, instance);
}

#[test]
fn parsing_is_deterministic_under_reordering() {
    let shuffled = "KCMC;3 6 2;100 20 30;2024;\
IS;5 1;II;5 0;4 5;PI;2 5;2 4;1 3;IS;3 0;2 0;II;3 4;2 3;1 2;1 0;PI;1 2;1 1;0 1;0 0;END";
    let a = Instance::parse(GRID).unwrap();
    let b = Instance::parse(shuffled).unwrap();
    assert_eq!(a.inverse_coverage_graph(), b.inverse_coverage_graph());
    assert_eq!(a.poi_edges(), b.poi_edges());
    assert_eq!(a.sensor_edges(), b.sensor_edges());
    assert_eq!(a, b);
}

#[test]
fn filtered_parse_equals_filtered_instance() {
    let active: BTreeSet<SensorId> = [0, 1, 3, 4, 5].into_iter().map(SensorId::new).collect();
    let parsed = InstanceParser::new()
        .loose(LooseAcceptance::all())
        .active_sensors(active.clone())
        .parse(GRID)
        .unwrap();
    let derived = Instance::parse(GRID).unwrap().with_active_sensors(&active);
    assert_eq!(parsed, derived);
}

#[test]
fn excluding_every_sink_neighbour_leaves_no_sink_edges() {
    let instance = Instance::parse(GRID).unwrap();
    let active: BTreeSet<SensorId> = [0, 1, 4].into_iter().map(SensorId::new).collect();
    let filtered = instance.with_active_sensors(&active);
    assert!(filtered.sink_edges().is_empty());
    assert!(filtered.sink_neighbors(SinkId::new(0)).is_empty());
}

#[test]
fn reduction_then_filter_keeps_virtual_sinks() {
    let instance = Instance::parse(GRID).unwrap();
    let reduced = instance.to_single_sink(2).unwrap();
    let expansion = reduced.expansion().unwrap().clone();
    assert_eq!(reduced.num_sensors(), 10);

    let mut active = reduced.active_sensors();
    active.remove(&SensorId::new(2));
    let filtered = reduced.with_active_sensors(&active);
    assert_eq!(filtered.expansion(), Some(&expansion));
    // i3 still reaches both virtual sinks of s0
    let virtual_s0: BTreeSet<SensorId> = expansion.virtual_sinks_of(SinkId::new(0)).collect();
    for v in &virtual_s0 {
        assert!(filtered.communication_neighbors(*v).contains(&SensorId::new(3)));
        assert!(!filtered.communication_neighbors(*v).contains(&SensorId::new(2)));
    }
}

#[test]
fn preprocessing_filters_zeroes_out_of_the_bitstring() {
    let instance = Instance::parse(GRID).unwrap();
    let report: PreprocessingReport = [
        heuristic("kcov-dinic", true, "110111"),
        heuristic("flood-dinic", false, "111111"),
    ]
    .into_iter()
    .collect();
    let preprocessor = FixedPreprocessor(report);

    let (filtered, result) = instance
        .preprocess(&preprocessor, 1, 1, "kcov-dinic")
        .unwrap();
    assert_eq!(result.num_used_sensors, 5);
    assert!(!filtered.is_active(SensorId::new(2)));
    assert_eq!(filtered.inactive_sensors().len(), 1);

    let err = instance
        .preprocess(&preprocessor, 1, 1, "flood-dinic")
        .unwrap_err();
    assert!(matches!(err, PreprocessingError::InvalidResult { .. }));

    let err = instance
        .preprocess(&preprocessor, 1, 1, "best-dinic")
        .unwrap_err();
    assert!(err.to_string().contains("best-dinic"));
}

#[test]
fn huge_declared_sensor_count_is_rejected_without_allocating_it() {
    let raw = "KCMC;1 4000000000 1;1 1 1;1;PI 0 0;IS 0 0;END";
    let err = Instance::parse(raw).unwrap_err();
    assert!(matches!(
        err,
        InstanceError::Format(FormatError::CountMismatch {
            declared: 4_000_000_000,
            found: 1,
            ..
        })
    ));

    // storage follows the edges, so a loose parse of the same string is cheap
    let instance = InstanceParser::new()
        .loose(LooseAcceptance::all())
        .parse(raw)
        .unwrap();
    assert_eq!(instance.num_sensors(), 4_000_000_000);
    assert_eq!(instance.sensors(), vec![SensorId::new(0)]);
    assert_eq!(instance.edge_count(), 2);
    assert_eq!(instance.sink_edges(), vec![(SensorId::new(0), SinkId::new(0))]);
}
