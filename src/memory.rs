//! In-process implementation of the catalog, source and sink traits.
//!
//! Backs the dry-run mode of the binary and the run-level tests. Writes are
//! staged per call and only become visible when the whole call succeeds,
//! mirroring the per-table transactions of the Postgres sink.

use crate::catalog::ReferenceCatalog;
use crate::error::{ReconcileError, Result};
use crate::model::{
    Catalog, ProcessOrder, RangeDefinition, Reading, ReconciledRecord, TaskRecord, Watermark,
};
use crate::sink::{describe_record, Sink, ORDERS_TABLE, READINGS_TABLE};
use crate::source::SourceReader;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::Mutex;

type ValueKey = (String, String, String, String);

#[derive(Default)]
struct MemoryState {
    catalog: Catalog,
    ranges: Vec<RangeDefinition>,
    readings: Vec<Reading>,
    orders: Vec<ProcessOrder>,
    tasks: Vec<TaskRecord>,
    values: BTreeMap<ValueKey, ReconciledRecord>,
    stored_orders: BTreeMap<String, ProcessOrder>,
    watermarks: HashMap<String, Watermark>,
    calls: Vec<&'static str>,
    catalog_unavailable: bool,
    fail_on_order: Option<String>,
    fail_on_table: Option<&'static str>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.state.get_mut().catalog = catalog;
        self
    }

    pub fn with_ranges(mut self, ranges: Vec<RangeDefinition>) -> Self {
        self.state.get_mut().ranges = ranges;
        self
    }

    pub fn with_readings(mut self, readings: Vec<Reading>) -> Self {
        self.state.get_mut().readings = readings;
        self
    }

    pub fn with_orders(mut self, orders: Vec<ProcessOrder>) -> Self {
        self.state.get_mut().orders = orders;
        self
    }

    pub fn with_tasks(mut self, tasks: Vec<TaskRecord>) -> Self {
        self.state.get_mut().tasks = tasks;
        self
    }

    pub fn with_watermark(mut self, watermark: Watermark) -> Self {
        self.state
            .get_mut()
            .watermarks
            .insert(watermark.key.clone(), watermark);
        self
    }

    /// Any write touching `order_id` fails and rolls back its table.
    pub fn failing_on_order(mut self, order_id: impl Into<String>) -> Self {
        self.state.get_mut().fail_on_order = Some(order_id.into());
        self
    }

    /// Every write to `table` fails, whatever it holds.
    pub fn failing_on_table(mut self, table: &'static str) -> Self {
        self.state.get_mut().fail_on_table = Some(table);
        self
    }

    pub fn with_catalog_unavailable(mut self) -> Self {
        self.state.get_mut().catalog_unavailable = true;
        self
    }

    pub async fn stored_values(&self) -> Vec<ReconciledRecord> {
        self.state.lock().await.values.values().cloned().collect()
    }

    pub async fn stored_orders(&self) -> Vec<ProcessOrder> {
        self.state.lock().await.stored_orders.values().cloned().collect()
    }

    pub async fn watermark(&self, key: &str) -> Option<Watermark> {
        self.state.lock().await.watermarks.get(key).cloned()
    }

    /// Names of the trait methods called so far, in order.
    pub async fn calls(&self) -> Vec<&'static str> {
        self.state.lock().await.calls.clone()
    }
}

#[async_trait]
impl ReferenceCatalog for MemoryStore {
    async fn list_parameter_definitions(&self) -> Result<Catalog> {
        let mut state = self.state.lock().await;
        state.calls.push("list_parameter_definitions");
        if state.catalog_unavailable {
            return Err(ReconcileError::catalog_unavailable("catalog store offline"));
        }
        Ok(state.catalog.clone())
    }

    async fn list_range_definitions(&self) -> Result<Vec<RangeDefinition>> {
        let mut state = self.state.lock().await;
        state.calls.push("list_range_definitions");
        if state.catalog_unavailable {
            return Err(ReconcileError::catalog_unavailable("catalog store offline"));
        }
        Ok(state.ranges.clone())
    }
}

#[async_trait]
impl SourceReader for MemoryStore {
    async fn get_readings(
        &self,
        since: Option<NaiveDateTime>,
        parameter_codes: &[String],
        full_reload: bool,
    ) -> Result<Vec<Reading>> {
        let mut state = self.state.lock().await;
        state.calls.push("get_readings");
        let codes: HashSet<&str> = parameter_codes.iter().map(String::as_str).collect();
        let since = if full_reload { None } else { since };
        Ok(state
            .readings
            .iter()
            .filter(|r| codes.contains(r.parameter.as_str()))
            .filter(|r| match since {
                Some(since) => r.input_date.is_some_and(|date| date > since),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn get_order_readings(
        &self,
        parameter_codes: &[String],
        order_ids: &[String],
    ) -> Result<Vec<Reading>> {
        let mut state = self.state.lock().await;
        state.calls.push("get_order_readings");
        let codes: HashSet<&str> = parameter_codes.iter().map(String::as_str).collect();
        let orders: HashSet<&str> = order_ids.iter().map(String::as_str).collect();
        Ok(state
            .readings
            .iter()
            .filter(|r| codes.contains(r.parameter.as_str()) && orders.contains(r.order_id.as_str()))
            .cloned()
            .collect())
    }

    async fn get_orders(&self, _use_archive: bool) -> Result<Vec<ProcessOrder>> {
        let mut state = self.state.lock().await;
        state.calls.push("get_orders");
        Ok(state.orders.clone())
    }

    async fn get_tasks(&self, order_ids: &[String], _use_archive: bool) -> Result<Vec<TaskRecord>> {
        let mut state = self.state.lock().await;
        state.calls.push("get_tasks");
        let orders: HashSet<&str> = order_ids.iter().map(String::as_str).collect();
        Ok(state
            .tasks
            .iter()
            .filter(|t| orders.contains(t.order_id.as_str()))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl Sink for MemoryStore {
    async fn upsert_readings(&self, records: &[ReconciledRecord], replace: bool) -> Result<usize> {
        let mut state = self.state.lock().await;
        state.calls.push("upsert_readings");
        if state.fail_on_table == Some(READINGS_TABLE) {
            return Err(ReconcileError::WriteFailed {
                table: READINGS_TABLE,
                record: String::new(),
                message: "injected table failure".to_string(),
            });
        }
        let mut staged = if replace {
            BTreeMap::new()
        } else {
            state.values.clone()
        };
        for record in records {
            if state.fail_on_order.as_deref() == Some(record.order_id.as_str()) {
                return Err(ReconcileError::WriteFailed {
                    table: READINGS_TABLE,
                    record: describe_record(record),
                    message: "injected write failure".to_string(),
                });
            }
            staged.insert(record.sink_key(), record.clone());
        }
        state.values = staged;
        Ok(records.len())
    }

    async fn upsert_orders(&self, orders: &[ProcessOrder], replace: bool) -> Result<usize> {
        let mut state = self.state.lock().await;
        state.calls.push("upsert_orders");
        if state.fail_on_table == Some(ORDERS_TABLE) {
            return Err(ReconcileError::WriteFailed {
                table: ORDERS_TABLE,
                record: String::new(),
                message: "injected table failure".to_string(),
            });
        }
        let mut staged = if replace {
            BTreeMap::new()
        } else {
            state.stored_orders.clone()
        };
        for order in orders {
            if state.fail_on_order.as_deref() == Some(order.order_id.as_str()) {
                return Err(ReconcileError::WriteFailed {
                    table: ORDERS_TABLE,
                    record: order.order_id.clone(),
                    message: "injected write failure".to_string(),
                });
            }
            staged.insert(order.order_id.clone(), order.clone());
        }
        state.stored_orders = staged;
        Ok(orders.len())
    }

    async fn get_watermark(&self, key: &str) -> Result<Option<Watermark>> {
        let mut state = self.state.lock().await;
        state.calls.push("get_watermark");
        Ok(state.watermarks.get(key).cloned())
    }

    async fn set_watermark(&self, watermark: &Watermark) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push("set_watermark");
        state
            .watermarks
            .insert(watermark.key.clone(), watermark.clone());
        Ok(())
    }
}
