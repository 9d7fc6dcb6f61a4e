use crate::model::{RangeBounds, ReadingValue, ReconciledRecord};
use chrono::NaiveDateTime;

/// A sub task paired with its parent task.
#[derive(Clone, Debug, PartialEq)]
pub struct HierarchyRow {
    pub order_id: String,
    pub man_index: i64,
    pub task_id: String,
    pub batch_id: String,
    pub element_id: String,
    pub title: Option<String>,
    pub sub_emi: String,
    pub parent_emi: String,
    pub parent_title: Option<String>,
    pub parent_task_id: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlainRow {
    pub order_id: String,
    pub master_emi: String,
    pub material: String,
    pub launch_date: Option<NaiveDateTime>,
    pub parameter: String,
    pub family: String,
    pub area: String,
    pub description: String,
    pub data_format: String,
    pub value: ReadingValue,
    pub input_index: i64,
    pub input_date: Option<NaiveDateTime>,
    /// Catalog-level min/max, used when no range definition matches.
    pub catalog_range: RangeBounds,
    pub ranges: RangeBounds,
}

impl PlainRow {
    pub fn into_record(self) -> ReconciledRecord {
        ReconciledRecord {
            order_id: self.order_id,
            family: self.family,
            area: self.area,
            description: self.description,
            value: self.value,
            data_format: self.data_format,
            input_date: self.input_date,
            ranges: self.ranges,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpecialRow {
    pub order_id: String,
    pub master_emi: String,
    pub parent_emi: String,
    pub sub_emi: String,
    pub parent_title: Option<String>,
    pub batch_id: String,
    pub material: String,
    pub launch_date: Option<NaiveDateTime>,
    pub parameter: String,
    pub group_id: String,
    pub family: String,
    pub area: String,
    pub description: String,
    pub agg_function: String,
    pub data_format: String,
    pub value: ReadingValue,
    pub input_index: i64,
    pub input_date: Option<NaiveDateTime>,
    pub ranges: RangeBounds,
}
