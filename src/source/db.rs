use super::SourceReader;
use crate::error::{ReconcileError, Result};
use crate::model::{ProcessOrder, Reading, ReadingValue, TaskRecord};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::PgPool;

#[derive(sqlx::FromRow)]
struct ReadingRow {
    mancode: String,
    parametercode: String,
    batchid: String,
    operationnumber: String,
    num_value: Option<f64>,
    text_value: Option<String>,
    date_value: Option<NaiveDateTime>,
    inputindex: i64,
    inputdate: Option<NaiveDateTime>,
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    po: String,
    emi_master: String,
    batch: Option<String>,
    material: String,
    description: Option<String>,
    launchdate: Option<NaiveDateTime>,
    quantity: Option<f64>,
    unit: Option<String>,
    strength: Option<String>,
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    mancode: String,
    manindex: i64,
    taskid: String,
    batchid: String,
    elementid: String,
    title: Option<String>,
    code: String,
}

fn clean(value: String) -> String {
    value.trim().to_string()
}

fn clean_opt(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl From<ReadingRow> for Reading {
    fn from(row: ReadingRow) -> Self {
        Self {
            order_id: clean(row.mancode),
            parameter: clean(row.parametercode),
            batch_id: clean(row.batchid),
            operation_number: clean(row.operationnumber),
            value: ReadingValue::from_columns(
                row.num_value,
                row.text_value.as_deref(),
                row.date_value,
            ),
            input_index: row.inputindex,
            input_date: row.inputdate,
        }
    }
}

impl From<OrderRow> for ProcessOrder {
    fn from(row: OrderRow) -> Self {
        Self {
            order_id: clean(row.po),
            master_emi: clean(row.emi_master),
            batch: clean_opt(row.batch),
            material: clean(row.material),
            description: clean_opt(row.description),
            launch_date: row.launchdate,
            quantity: row.quantity.filter(|v| v.is_finite()),
            unit: clean_opt(row.unit),
            strength: clean_opt(row.strength),
        }
    }
}

impl From<TaskRow> for TaskRecord {
    fn from(row: TaskRow) -> Self {
        Self {
            order_id: clean(row.mancode),
            man_index: row.manindex,
            task_id: clean(row.taskid),
            batch_id: clean(row.batchid),
            element_id: clean(row.elementid),
            title: clean_opt(row.title),
            code: clean(row.code),
        }
    }
}

/// Source tables reachable through `pool`. The live and archive copies share
/// a layout and differ only by schema.
#[derive(Clone)]
pub struct PgSourceReader {
    pool: PgPool,
    schema: String,
    archive_schema: String,
}

impl PgSourceReader {
    /// Schema names are interpolated into SQL; callers pass names already
    /// checked by `config::validate_identifier`.
    pub fn new(pool: PgPool, schema: impl Into<String>, archive_schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
            archive_schema: archive_schema.into(),
        }
    }

    fn schema_for(&self, use_archive: bool) -> &str {
        if use_archive {
            &self.archive_schema
        } else {
            &self.schema
        }
    }

    fn readings_select(schema: &str) -> String {
        format!(
            r#"
            SELECT
                mancode::text AS mancode,
                parametercode,
                batchid::text AS batchid,
                operationnumber::text AS operationnumber,
                num_value::double precision AS num_value,
                text_value,
                date_value,
                inputindex::bigint AS inputindex,
                inputdate
            FROM {schema}.parameter_values
            "#
        )
    }
}

#[async_trait]
impl SourceReader for PgSourceReader {
    async fn get_readings(
        &self,
        since: Option<NaiveDateTime>,
        parameter_codes: &[String],
        full_reload: bool,
    ) -> Result<Vec<Reading>> {
        if parameter_codes.is_empty() {
            return Ok(Vec::new());
        }
        let since = if full_reload { None } else { since };
        let query = format!(
            "{} WHERE parametercode = ANY($1) AND ($2::timestamp IS NULL OR inputdate > $2)",
            Self::readings_select(self.schema_for(full_reload))
        );
        let rows: Vec<ReadingRow> = sqlx::query_as(&query)
            .bind(parameter_codes)
            .bind(since)
            .fetch_all(&self.pool)
            .await
            .map_err(ReconcileError::source_read)?;
        tracing::info!(
            readings = rows.len(),
            since = ?since,
            full_reload,
            "fetched source readings"
        );
        Ok(rows.into_iter().map(Reading::from).collect())
    }

    async fn get_order_readings(
        &self,
        parameter_codes: &[String],
        order_ids: &[String],
    ) -> Result<Vec<Reading>> {
        if parameter_codes.is_empty() || order_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!(
            "{} WHERE parametercode = ANY($1) AND mancode::text = ANY($2)",
            Self::readings_select(&self.schema)
        );
        let rows: Vec<ReadingRow> = sqlx::query_as(&query)
            .bind(parameter_codes)
            .bind(order_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(ReconcileError::source_read)?;
        tracing::debug!(
            readings = rows.len(),
            orders = order_ids.len(),
            "re-read readings for touched orders"
        );
        Ok(rows.into_iter().map(Reading::from).collect())
    }

    async fn get_orders(&self, use_archive: bool) -> Result<Vec<ProcessOrder>> {
        let query = format!(
            r#"
            SELECT
                po::text AS po,
                emi_master,
                batch,
                material,
                description,
                launchdate,
                quantity::double precision AS quantity,
                unit,
                strength
            FROM {}.process_orders
            "#,
            self.schema_for(use_archive)
        );
        let rows: Vec<OrderRow> = sqlx::query_as(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(ReconcileError::source_read)?;
        tracing::debug!(orders = rows.len(), use_archive, "fetched process orders");
        Ok(rows.into_iter().map(ProcessOrder::from).collect())
    }

    async fn get_tasks(&self, order_ids: &[String], use_archive: bool) -> Result<Vec<TaskRecord>> {
        if order_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!(
            r#"
            SELECT
                mancode::text AS mancode,
                manindex::bigint AS manindex,
                taskid::text AS taskid,
                batchid::text AS batchid,
                elementid::text AS elementid,
                title,
                code
            FROM {}.tasks
            WHERE mancode::text = ANY($1)
            "#,
            self.schema_for(use_archive)
        );
        let rows: Vec<TaskRow> = sqlx::query_as(&query)
            .bind(order_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(ReconcileError::source_read)?;
        tracing::debug!(tasks = rows.len(), orders = order_ids.len(), "fetched tasks");
        Ok(rows.into_iter().map(TaskRecord::from).collect())
    }
}
