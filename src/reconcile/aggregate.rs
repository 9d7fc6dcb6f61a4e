use super::types::SpecialRow;
use crate::error::ReconcileError;
use crate::model::{RangeBounds, ReadingValue, ReconciledRecord};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggFunction {
    Min,
    Max,
    Mean,
}

impl AggFunction {
    /// Catalog labels are matched case-insensitively; `avg` and `average`
    /// are accepted spellings of `mean`.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "mean" | "avg" | "average" => Some(Self::Mean),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub order_id: String,
    pub family: String,
    pub area: String,
    pub description: String,
    pub agg_function: String,
    pub data_format: String,
    pub group_id: String,
}

impl GroupKey {
    fn of(row: &SpecialRow) -> Self {
        Self {
            order_id: row.order_id.clone(),
            family: row.family.clone(),
            area: row.area.clone(),
            description: row.description.clone(),
            agg_function: row.agg_function.clone(),
            data_format: row.data_format.clone(),
            group_id: row.group_id.clone(),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "order={} family={} area={} description={} group={}",
            self.order_id, self.family, self.area, self.description, self.group_id
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AggregationFailure {
    pub group: GroupKey,
    pub label: String,
}

impl AggregationFailure {
    pub fn to_error(&self) -> ReconcileError {
        ReconcileError::UnsupportedAggregation {
            group: self.group.to_string(),
            label: self.label.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AggregateOutcome {
    pub records: Vec<ReconciledRecord>,
    pub failures: Vec<AggregationFailure>,
}

#[derive(Debug, Default)]
struct GroupStats {
    count: usize,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
    input_date: Option<NaiveDateTime>,
    bounds: RangeBounds,
}

fn max_opt<T: PartialOrd + Copy>(current: Option<T>, candidate: Option<T>) -> Option<T> {
    match (current, candidate) {
        (Some(a), Some(b)) => Some(if b > a { b } else { a }),
        (a, b) => a.or(b),
    }
}

fn min_opt(current: Option<f64>, candidate: f64) -> Option<f64> {
    Some(current.map_or(candidate, |a| a.min(candidate)))
}

impl GroupStats {
    fn add(&mut self, row: &SpecialRow) {
        if let Some(value) = row.value.as_number() {
            self.count += 1;
            self.sum += value;
            self.min = min_opt(self.min, value);
            self.max = max_opt(self.max, Some(value));
        }
        self.input_date = max_opt(self.input_date, row.input_date);
        self.bounds = RangeBounds {
            value_min: max_opt(self.bounds.value_min, row.ranges.value_min),
            value_max: max_opt(self.bounds.value_max, row.ranges.value_max),
            tolerance_min: max_opt(self.bounds.tolerance_min, row.ranges.tolerance_min),
            tolerance_max: max_opt(self.bounds.tolerance_max, row.ranges.tolerance_max),
        };
    }

    fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }

    fn select(&self, function: AggFunction) -> Option<f64> {
        match function {
            AggFunction::Min => self.min,
            AggFunction::Max => self.max,
            AggFunction::Mean => self.mean(),
        }
    }
}

/// Rounds to two decimals, half away from zero, applied to the f64 value
/// scaled by 100. Values whose binary representation sits just below a
/// midpoint (e.g. `1.005`) round down.
pub fn round2(value: f64) -> f64 {
    // + 0.0 turns -0.0 into 0.0
    (value * 100.0).round() / 100.0 + 0.0
}

/// Reduces deduplicated special rows to one record per aggregate group.
///
/// Groups whose function label is not min/max/mean are reported in
/// `failures` and produce no record; other groups are unaffected. A group
/// without any numeric value yields a record with a missing value.
pub fn aggregate_special(rows: &[SpecialRow]) -> AggregateOutcome {
    let mut groups: BTreeMap<GroupKey, GroupStats> = BTreeMap::new();
    for row in rows {
        groups.entry(GroupKey::of(row)).or_default().add(row);
    }

    let mut outcome = AggregateOutcome::default();
    for (key, stats) in groups {
        let Some(function) = AggFunction::parse(&key.agg_function) else {
            tracing::warn!(group = %key, label = %key.agg_function, "unsupported aggregation function");
            outcome.failures.push(AggregationFailure {
                label: key.agg_function.clone(),
                group: key,
            });
            continue;
        };
        let value = stats.select(function).map(round2);
        outcome.records.push(ReconciledRecord {
            order_id: key.order_id,
            family: key.family,
            area: key.area,
            description: key.description,
            value: ReadingValue::from_optional(value),
            data_format: key.data_format,
            input_date: stats.input_date,
            ranges: stats.bounds,
        });
    }

    tracing::debug!(
        rows = rows.len(),
        groups = outcome.records.len(),
        failures = outcome.failures.len(),
        "aggregated special rows"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(group: &str, function: &str, value: ReadingValue) -> SpecialRow {
        SpecialRow {
            order_id: "P1".into(),
            master_emi: "M".into(),
            parent_emi: "PE".into(),
            sub_emi: "SE".into(),
            parent_title: None,
            batch_id: "1".into(),
            material: "MAT".into(),
            launch_date: None,
            parameter: "W".into(),
            group_id: group.into(),
            family: "f".into(),
            area: "a".into(),
            description: format!("desc-{group}"),
            agg_function: function.into(),
            data_format: "g".into(),
            value,
            input_index: 1,
            input_date: None,
            ranges: RangeBounds::default(),
        }
    }

    fn values(group: &str, function: &str, values: &[f64]) -> Vec<SpecialRow> {
        values
            .iter()
            .map(|v| row(group, function, ReadingValue::Number(*v)))
            .collect()
    }

    fn single_value(outcome: &AggregateOutcome) -> Option<f64> {
        assert_eq!(outcome.records.len(), 1);
        outcome.records[0].value.as_number()
    }

    #[test]
    fn mean_of_group() {
        let outcome = aggregate_special(&values("G", "mean", &[2.0, 4.0, 9.0]));
        assert_eq!(single_value(&outcome), Some(5.0));
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn min_and_max_select_extremes() {
        let outcome = aggregate_special(&values("G", "min", &[3.0, -1.5, 8.0]));
        assert_eq!(single_value(&outcome), Some(-1.5));
        let outcome = aggregate_special(&values("G", "MAX", &[3.0, -1.5, 8.0]));
        assert_eq!(single_value(&outcome), Some(8.0));
    }

    #[test]
    fn avg_label_is_mean() {
        let outcome = aggregate_special(&values("G", "AVG", &[1.0, 2.0]));
        assert_eq!(single_value(&outcome), Some(1.5));
    }

    #[test]
    fn mean_is_rounded_to_two_decimals() {
        let outcome = aggregate_special(&values("G", "mean", &[1.0, 1.0, 2.0]));
        assert_eq!(single_value(&outcome), Some(1.33));
    }

    #[test]
    fn round2_boundaries() {
        assert_eq!(round2(0.125), 0.13);
        assert_eq!(round2(-0.125), -0.13);
        assert_eq!(round2(2.5), 2.5);
        assert_eq!(round2(0.375), 0.38);
        assert_eq!(round2(1.234), 1.23);
        // 1.005 is stored as 1.00499999999999989...
        assert_eq!(round2(1.005), 1.0);
    }

    #[test]
    fn tiny_negative_means_round_to_plain_zero() {
        let rounded = round2(-0.001);
        assert_eq!(rounded, 0.0);
        assert!(rounded.is_sign_positive());
        assert_eq!(ReadingValue::number(rounded).to_db_text().as_deref(), Some("0"));
    }

    #[test]
    fn non_numeric_values_are_excluded() {
        let mut rows = values("G", "mean", &[2.0, 4.0]);
        rows.push(row("G", "mean", ReadingValue::Text("n/a".into())));
        rows.push(row("G", "mean", ReadingValue::Text("6".into())));
        rows.push(row("G", "mean", ReadingValue::Missing));
        let outcome = aggregate_special(&rows);
        assert_eq!(single_value(&outcome), Some(4.0));
    }

    #[test]
    fn group_without_numbers_has_missing_value() {
        let outcome = aggregate_special(&[row("G", "max", ReadingValue::Text("pass".into()))]);
        assert_eq!(outcome.records.len(), 1);
        assert!(outcome.records[0].value.is_missing());
    }

    #[test]
    fn unknown_function_fails_only_its_group() {
        let mut rows = values("A", "unknown_fn", &[1.0, 2.0]);
        rows.extend(values("B", "max", &[1.0, 2.0]));
        let outcome = aggregate_special(&rows);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].label, "unknown_fn");
        assert_eq!(outcome.failures[0].group.group_id, "A");
        assert!(matches!(
            outcome.failures[0].to_error(),
            ReconcileError::UnsupportedAggregation { .. }
        ));
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].description, "desc-B");
        assert_eq!(outcome.records[0].value, ReadingValue::Number(2.0));
    }

    #[test]
    fn dates_and_bounds_take_group_maximum() {
        let date = |d: u32| {
            NaiveDate::from_ymd_opt(2024, 3, d)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap()
        };
        let mut rows = values("G", "min", &[1.0, 2.0, 3.0]);
        rows[0].input_date = Some(date(4));
        rows[1].input_date = Some(date(9));
        rows[0].ranges = RangeBounds {
            value_min: Some(1.0),
            value_max: Some(10.0),
            tolerance_min: None,
            tolerance_max: Some(11.0),
        };
        rows[2].ranges = RangeBounds {
            value_min: Some(0.5),
            value_max: Some(12.0),
            tolerance_min: Some(0.1),
            tolerance_max: None,
        };
        let outcome = aggregate_special(&rows);
        let record = &outcome.records[0];
        assert_eq!(record.input_date, Some(date(9)));
        assert_eq!(
            record.ranges,
            RangeBounds {
                value_min: Some(1.0),
                value_max: Some(12.0),
                tolerance_min: Some(0.1),
                tolerance_max: Some(11.0),
            }
        );
    }

    #[test]
    fn groups_are_split_by_group_id() {
        let mut rows = values("A", "max", &[1.0]);
        rows.extend(values("B", "max", &[5.0]));
        let outcome = aggregate_special(&rows);
        assert_eq!(outcome.records.len(), 2);
    }
}
