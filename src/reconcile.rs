//! Core reconciliation: task hierarchy, joins, deduplication, aggregation and
//! range attachment. Everything here is synchronous and side-effect free
//! apart from logging; I/O happens in [`crate::run`].

pub mod aggregate;
pub mod dedup;
pub mod hierarchy;
pub mod join;
pub mod ranges;
pub mod types;

#[cfg(test)]
mod tests;

pub use aggregate::{AggFunction, AggregateOutcome, AggregationFailure};
pub use ranges::{RangeContext, RangeIndex, RangeLookup};
pub use types::{HierarchyRow, PlainRow, SpecialRow};

use crate::model::{
    PlainParameter, ProcessOrder, Reading, ReconciledRecord, SpecialParameter, TaskRecord,
};

/// Plain path: join to orders and catalog, keep the latest reading per key,
/// attach ranges.
pub fn reconcile_plain(
    readings: &[Reading],
    orders: &[ProcessOrder],
    catalog: &[PlainParameter],
    lookup: &dyn RangeLookup,
) -> Vec<ReconciledRecord> {
    let joined = join::join_plain(readings, orders, catalog);
    let mut rows = dedup::dedup_plain(joined);
    ranges::annotate(&mut rows, lookup);
    rows.into_iter().map(PlainRow::into_record).collect()
}

/// Special path: resolve the task tree, join, keep the highest input index
/// per key, attach ranges, then aggregate per group.
///
/// Returns an empty outcome without touching the tasks when there are no
/// special readings.
pub fn reconcile_special(
    readings: &[Reading],
    tasks: &[TaskRecord],
    orders: &[ProcessOrder],
    catalog: &[SpecialParameter],
    lookup: &dyn RangeLookup,
) -> AggregateOutcome {
    if readings.is_empty() {
        return AggregateOutcome::default();
    }
    let hierarchy = hierarchy::resolve_hierarchy(tasks);
    let joined = join::join_special(readings, &hierarchy, orders, catalog);
    let mut rows = dedup::dedup_special(joined);
    ranges::annotate(&mut rows, lookup);
    aggregate::aggregate_special(&rows)
}
