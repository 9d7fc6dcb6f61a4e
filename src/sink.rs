pub mod db;


use crate::error::Result;
use crate::model::{ProcessOrder, ReconciledRecord, Watermark};
use async_trait::async_trait;

pub use db::PgSink;

pub const READINGS_TABLE: &str = "params_values";
pub const ORDERS_TABLE: &str = "process_orders";
pub const WATERMARK_TABLE: &str = "key_values";

/// Destination store. Every write is an upsert on the table's merge key, so
/// replaying a window is harmless.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Upserts all records in one transaction. With `replace` the table is
    /// emptied first inside that same transaction. The first failing record
    /// rolls the whole table back, truncation included, and comes back as
    /// `WriteFailed`.
    async fn upsert_readings(&self, records: &[ReconciledRecord], replace: bool) -> Result<usize>;

    async fn upsert_orders(&self, orders: &[ProcessOrder], replace: bool) -> Result<usize>;

    async fn get_watermark(&self, key: &str) -> Result<Option<Watermark>>;

    async fn set_watermark(&self, watermark: &Watermark) -> Result<()>;
}

pub(crate) fn describe_record(record: &ReconciledRecord) -> String {
    format!(
        "{}/{}/{}/{}",
        record.order_id, record.family, record.area, record.description
    )
}
