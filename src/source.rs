pub mod db;

use crate::error::Result;
use crate::model::{ProcessOrder, Reading, TaskRecord};
use async_trait::async_trait;
use chrono::NaiveDateTime;

pub use db::PgSourceReader;

/// Read side of the production-execution system.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Readings for `parameter_codes` entered after `since`. A full reload
    /// reads the archive and ignores `since`.
    async fn get_readings(
        &self,
        since: Option<NaiveDateTime>,
        parameter_codes: &[String],
        full_reload: bool,
    ) -> Result<Vec<Reading>>;

    /// Every reading of `parameter_codes` for the given orders, regardless of
    /// input date.
    async fn get_order_readings(
        &self,
        parameter_codes: &[String],
        order_ids: &[String],
    ) -> Result<Vec<Reading>>;

    async fn get_orders(&self, use_archive: bool) -> Result<Vec<ProcessOrder>>;

    async fn get_tasks(&self, order_ids: &[String], use_archive: bool) -> Result<Vec<TaskRecord>>;
}
