use super::{reconcile_plain, reconcile_special, RangeIndex};
use crate::model::{
    PlainParameter, ProcessOrder, RangeBounds, RangeDefinition, Reading, ReadingValue,
    SpecialParameter, TaskRecord,
};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashSet;

fn at(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

fn order(order_id: &str) -> ProcessOrder {
    ProcessOrder {
        order_id: order_id.into(),
        master_emi: "MASTER".into(),
        batch: Some(format!("B-{order_id}")),
        material: "MAT-1".into(),
        description: Some("Tablets".into()),
        launch_date: Some(at(1, 0)),
        quantity: Some(1000.0),
        unit: Some("pcs".into()),
        strength: Some("10mg".into()),
    }
}

fn plain_def(parameter: &str, description: &str) -> PlainParameter {
    PlainParameter {
        master_emi: "MASTER".into(),
        parameter: parameter.into(),
        family: "Compression".into(),
        area: "Line 1".into(),
        description: description.into(),
        data_format: "num".into(),
        range_min: None,
        range_max: None,
    }
}

fn special_def(sub_emi: &str, parameter: &str, group_id: &str, function: &str) -> SpecialParameter {
    SpecialParameter {
        master_emi: "MASTER".into(),
        parent_emi: "WEIGH".into(),
        sub_emi: sub_emi.into(),
        parameter: parameter.into(),
        sub_emi_name: None,
        group_id: group_id.into(),
        area: "Line 1".into(),
        family: "IPC".into(),
        description: format!("Weight {group_id}"),
        agg_function: function.into(),
        data_format: "mg".into(),
    }
}

fn reading(
    order_id: &str,
    parameter: &str,
    batch_id: &str,
    operation_number: &str,
    value: f64,
    input_index: i64,
    input_date: NaiveDateTime,
) -> Reading {
    Reading {
        order_id: order_id.into(),
        parameter: parameter.into(),
        batch_id: batch_id.into(),
        operation_number: operation_number.into(),
        value: ReadingValue::Number(value),
        input_index,
        input_date: Some(input_date),
    }
}

/// Parent task 100 (WEIGH) with sub tasks 101 (SUB-A, element 10) and
/// 102 (SUB-B, element 20), both in operation index 1 of order P1.
fn tasks() -> Vec<TaskRecord> {
    let task = |task_id: &str, batch_id: &str, element_id: &str, code: &str| TaskRecord {
        order_id: "P1".into(),
        man_index: 1,
        task_id: task_id.into(),
        batch_id: batch_id.into(),
        element_id: element_id.into(),
        title: Some(format!("task {task_id}")),
        code: code.into(),
    };
    vec![
        task("100", "0", "1", "WEIGH"),
        task("101", "100", "10", "SUB-A"),
        task("102", "100", "20", "SUB-B"),
    ]
}

#[test]
fn plain_scenario_keeps_latest_reading() {
    let readings = vec![
        reading("P1", "X", "1", "1", 5.0, 1, at(1, 0)),
        reading("P1", "X", "1", "1", 7.0, 1, at(2, 0)),
    ];
    let records = reconcile_plain(
        &readings,
        &[order("P1")],
        &[plain_def("X", "Hardness")],
        &RangeIndex::default(),
    );
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].value, ReadingValue::Number(7.0));
    assert_eq!(records[0].input_date, Some(at(2, 0)));
    assert_eq!(records[0].family, "Compression");
}

#[test]
fn readings_outside_catalog_never_reach_output() {
    let readings = vec![
        reading("P1", "X", "1", "1", 5.0, 1, at(1, 0)),
        reading("P1", "UNKNOWN", "1", "1", 9.0, 1, at(1, 0)),
        reading("P9", "X", "1", "1", 9.0, 1, at(1, 0)),
    ];
    let records = reconcile_plain(
        &readings,
        &[order("P1")],
        &[plain_def("X", "Hardness")],
        &RangeIndex::default(),
    );
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].order_id, "P1");
    assert_eq!(records[0].description, "Hardness");
}

#[test]
fn special_scenario_aggregates_across_sub_tasks() {
    let catalog = vec![
        special_def("SUB-A", "W", "G1", "mean"),
        special_def("SUB-B", "W", "G1", "mean"),
    ];
    let readings = vec![
        // SUB-A: index 2 supersedes index 1
        reading("P1", "W", "100", "10", 100.0, 1, at(1, 8)),
        reading("P1", "W", "100", "10", 2.0, 2, at(1, 9)),
        reading("P1", "W", "100", "20", 4.0, 1, at(1, 10)),
        // no sub task with element 30
        reading("P1", "W", "100", "30", 50.0, 1, at(1, 11)),
    ];
    let outcome = reconcile_special(
        &readings,
        &tasks(),
        &[order("P1")],
        &catalog,
        &RangeIndex::default(),
    );
    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.records.len(), 1);
    let record = &outcome.records[0];
    assert_eq!(record.value, ReadingValue::Number(3.0));
    assert_eq!(record.description, "Weight G1");
    assert_eq!(record.input_date, Some(at(1, 10)));
}

#[test]
fn special_value_is_one_of_group_statistics() {
    let values = [2.0, 4.0, 9.0];
    for (function, expected) in [("min", 2.0), ("max", 9.0), ("mean", 5.0)] {
        let catalog = vec![
            special_def("SUB-A", "W1", "G", function),
            special_def("SUB-A", "W2", "G", function),
            special_def("SUB-B", "W3", "G", function),
        ];
        let readings = vec![
            reading("P1", "W1", "100", "10", values[0], 1, at(1, 0)),
            reading("P1", "W2", "100", "10", values[1], 1, at(1, 0)),
            reading("P1", "W3", "100", "20", values[2], 1, at(1, 0)),
        ];
        let outcome = reconcile_special(
            &readings,
            &tasks(),
            &[order("P1")],
            &catalog,
            &RangeIndex::default(),
        );
        assert_eq!(outcome.records.len(), 1, "function {function}");
        assert_eq!(
            outcome.records[0].value,
            ReadingValue::Number(expected),
            "function {function}"
        );
    }
}

#[test]
fn unsupported_function_is_reported_and_other_groups_continue() {
    let catalog = vec![
        special_def("SUB-A", "W", "G1", "unknown_fn"),
        special_def("SUB-B", "W", "G2", "max"),
    ];
    let readings = vec![
        reading("P1", "W", "100", "10", 1.0, 1, at(1, 0)),
        reading("P1", "W", "100", "20", 8.0, 1, at(1, 0)),
    ];
    let outcome = reconcile_special(
        &readings,
        &tasks(),
        &[order("P1")],
        &catalog,
        &RangeIndex::default(),
    );
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].group.group_id, "G1");
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].description, "Weight G2");
    assert_eq!(outcome.records[0].value, ReadingValue::Number(8.0));
}

#[test]
fn empty_special_input_yields_nothing() {
    let outcome = reconcile_special(
        &[],
        &tasks(),
        &[order("P1")],
        &[special_def("SUB-A", "W", "G1", "mean")],
        &RangeIndex::default(),
    );
    assert!(outcome.records.is_empty());
    assert!(outcome.failures.is_empty());
}

#[test]
fn special_ranges_are_attached_before_aggregation() {
    let catalog = vec![special_def("SUB-A", "W", "G1", "max")];
    let ranges = RangeIndex::new(vec![RangeDefinition {
        material: "MAT-1".into(),
        family: "IPC".into(),
        area: "Line 1".into(),
        description: "Weight G1".into(),
        valid_from: None,
        valid_to: None,
        bounds: RangeBounds {
            value_min: Some(90.0),
            value_max: Some(110.0),
            tolerance_min: Some(85.0),
            tolerance_max: Some(115.0),
        },
    }]);
    let outcome = reconcile_special(
        &[reading("P1", "W", "100", "10", 101.0, 1, at(1, 0))],
        &tasks(),
        &[order("P1")],
        &catalog,
        &ranges,
    );
    assert_eq!(outcome.records[0].ranges.value_min, Some(90.0));
    assert_eq!(outcome.records[0].ranges.tolerance_max, Some(115.0));
}

#[test]
fn one_record_per_logical_key() {
    let readings: Vec<Reading> = (0..20)
        .map(|i| {
            reading(
                if i % 2 == 0 { "P1" } else { "P2" },
                if i % 3 == 0 { "X" } else { "Y" },
                "1",
                "1",
                i as f64,
                i,
                at(1 + (i as u32 % 5), 0),
            )
        })
        .collect();
    let records = reconcile_plain(
        &readings,
        &[order("P1"), order("P2")],
        &[plain_def("X", "Hardness"), plain_def("Y", "Thickness")],
        &RangeIndex::default(),
    );
    let keys: HashSet<_> = records.iter().map(|r| r.sink_key()).collect();
    assert_eq!(keys.len(), records.len());
    assert_eq!(records.len(), 4);
}
