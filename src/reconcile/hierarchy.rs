use super::types::HierarchyRow;
use crate::model::TaskRecord;
use std::collections::HashMap;

/// (order id, operation index, task id) of a candidate parent.
type ParentKey<'a> = (&'a str, i64, &'a str);

/// Pairs every sub task with its parent task.
///
/// A task's parent is the task of the same order and operation index whose
/// task id equals the sub task's batch id. Sub tasks without a parent are
/// left out; several matching parents yield one row each.
pub fn resolve_hierarchy(tasks: &[TaskRecord]) -> Vec<HierarchyRow> {
    let mut parents: HashMap<ParentKey<'_>, Vec<&TaskRecord>> = HashMap::new();
    for task in tasks {
        parents
            .entry((task.order_id.as_str(), task.man_index, task.task_id.as_str()))
            .or_default()
            .push(task);
    }

    let mut rows = Vec::new();
    for sub in tasks {
        let key = (sub.order_id.as_str(), sub.man_index, sub.batch_id.as_str());
        let Some(matches) = parents.get(&key) else {
            continue;
        };
        for parent in matches {
            rows.push(HierarchyRow {
                order_id: sub.order_id.clone(),
                man_index: sub.man_index,
                task_id: sub.task_id.clone(),
                batch_id: sub.batch_id.clone(),
                element_id: sub.element_id.clone(),
                title: sub.title.clone(),
                sub_emi: sub.code.clone(),
                parent_emi: parent.code.clone(),
                parent_title: parent.title.clone(),
                parent_task_id: parent.task_id.clone(),
            });
        }
    }

    tracing::debug!(
        tasks = tasks.len(),
        resolved = rows.len(),
        "resolved task hierarchy"
    );
    rows
}
