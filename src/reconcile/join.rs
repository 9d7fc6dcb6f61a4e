use super::types::{HierarchyRow, PlainRow, SpecialRow};
use crate::model::{PlainParameter, ProcessOrder, RangeBounds, Reading, SpecialParameter};
use std::collections::HashMap;

/// (order id, element id, batch id, parent task id) of a resolved sub task.
type TaskKey<'a> = (&'a str, &'a str, &'a str, &'a str);
/// (master emi, parent emi, sub emi, parameter code).
type SpecialKey<'a> = (&'a str, &'a str, &'a str, &'a str);
/// (parameter code, master emi).
type PlainKey<'a> = (&'a str, &'a str);

pub(in crate::reconcile) fn index_orders(
    orders: &[ProcessOrder],
) -> HashMap<&str, Vec<&ProcessOrder>> {
    let mut by_id: HashMap<&str, Vec<&ProcessOrder>> = HashMap::new();
    for order in orders {
        by_id.entry(order.order_id.as_str()).or_default().push(order);
    }
    by_id
}

/// Inner-joins special readings to resolved tasks, orders and the special
/// catalog. Any miss drops the reading.
///
/// The task join matches the reading's operation number against the sub
/// task's element id, and the reading's batch id against both the sub
/// task's batch id and the parent's task id.
pub fn join_special(
    readings: &[Reading],
    hierarchy: &[HierarchyRow],
    orders: &[ProcessOrder],
    catalog: &[SpecialParameter],
) -> Vec<SpecialRow> {
    if readings.is_empty() {
        return Vec::new();
    }

    let mut tasks: HashMap<TaskKey<'_>, Vec<&HierarchyRow>> = HashMap::new();
    for row in hierarchy {
        tasks
            .entry((
                row.order_id.as_str(),
                row.element_id.as_str(),
                row.batch_id.as_str(),
                row.parent_task_id.as_str(),
            ))
            .or_default()
            .push(row);
    }
    let orders_by_id = index_orders(orders);
    let mut definitions: HashMap<SpecialKey<'_>, Vec<&SpecialParameter>> = HashMap::new();
    for def in catalog {
        definitions
            .entry((
                def.master_emi.as_str(),
                def.parent_emi.as_str(),
                def.sub_emi.as_str(),
                def.parameter.as_str(),
            ))
            .or_default()
            .push(def);
    }

    let mut joined = Vec::new();
    for reading in readings {
        let task_key = (
            reading.order_id.as_str(),
            reading.operation_number.as_str(),
            reading.batch_id.as_str(),
            reading.batch_id.as_str(),
        );
        let Some(matched_tasks) = tasks.get(&task_key) else {
            continue;
        };
        let Some(matched_orders) = orders_by_id.get(reading.order_id.as_str()) else {
            continue;
        };

        for task in matched_tasks {
            for order in matched_orders {
                let def_key = (
                    order.master_emi.as_str(),
                    task.parent_emi.as_str(),
                    task.sub_emi.as_str(),
                    reading.parameter.as_str(),
                );
                let Some(defs) = definitions.get(&def_key) else {
                    continue;
                };
                for def in defs {
                    joined.push(SpecialRow {
                        order_id: reading.order_id.clone(),
                        master_emi: order.master_emi.clone(),
                        parent_emi: task.parent_emi.clone(),
                        sub_emi: task.sub_emi.clone(),
                        parent_title: task.parent_title.clone(),
                        batch_id: reading.batch_id.clone(),
                        material: order.material.clone(),
                        launch_date: order.launch_date,
                        parameter: reading.parameter.clone(),
                        group_id: def.group_id.clone(),
                        family: def.family.clone(),
                        area: def.area.clone(),
                        description: def.description.clone(),
                        agg_function: def.agg_function.clone(),
                        data_format: def.data_format.clone(),
                        value: reading.value.clone(),
                        input_index: reading.input_index,
                        input_date: reading.input_date,
                        ranges: RangeBounds::default(),
                    });
                }
            }
        }
    }

    tracing::debug!(
        readings = readings.len(),
        joined = joined.len(),
        "joined special readings"
    );
    joined
}

/// Inner-joins plain readings to orders and then to the plain catalog on
/// (parameter code, order master emi).
pub fn join_plain(
    readings: &[Reading],
    orders: &[ProcessOrder],
    catalog: &[PlainParameter],
) -> Vec<PlainRow> {
    let orders_by_id = index_orders(orders);
    let mut definitions: HashMap<PlainKey<'_>, Vec<&PlainParameter>> = HashMap::new();
    for def in catalog {
        definitions
            .entry((def.parameter.as_str(), def.master_emi.as_str()))
            .or_default()
            .push(def);
    }

    let mut joined = Vec::new();
    for reading in readings {
        let Some(matched_orders) = orders_by_id.get(reading.order_id.as_str()) else {
            continue;
        };
        for order in matched_orders {
            let Some(defs) = definitions.get(&(reading.parameter.as_str(), order.master_emi.as_str()))
            else {
                continue;
            };
            for def in defs {
                joined.push(PlainRow {
                    order_id: reading.order_id.clone(),
                    master_emi: order.master_emi.clone(),
                    material: order.material.clone(),
                    launch_date: order.launch_date,
                    parameter: reading.parameter.clone(),
                    family: def.family.clone(),
                    area: def.area.clone(),
                    description: def.description.clone(),
                    data_format: def.data_format.clone(),
                    value: reading.value.clone(),
                    input_index: reading.input_index,
                    input_date: reading.input_date,
                    catalog_range: RangeBounds {
                        value_min: def.range_min,
                        value_max: def.range_max,
                        ..RangeBounds::default()
                    },
                    ranges: RangeBounds::default(),
                });
            }
        }
    }

    tracing::debug!(
        readings = readings.len(),
        joined = joined.len(),
        "joined plain readings"
    );
    joined
}
