use super::{describe_record, Sink, ORDERS_TABLE, READINGS_TABLE};
use crate::error::{ReconcileError, Result};
use crate::model::{ProcessOrder, ReconciledRecord, Watermark};
use async_trait::async_trait;
use sqlx::{PgPool, Row};

#[derive(Clone)]
pub struct PgSink {
    pool: PgPool,
}

impl PgSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Sink for PgSink {
    async fn upsert_readings(&self, records: &[ReconciledRecord], replace: bool) -> Result<usize> {
        if records.is_empty() && !replace {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        if replace {
            sqlx::query("TRUNCATE TABLE params_values")
                .execute(&mut *tx)
                .await?;
            tracing::warn!(table = READINGS_TABLE, "table truncated for full reload");
        }
        for record in records {
            let result = sqlx::query(
                r#"
                INSERT INTO params_values
                    (po, family, area, parameter, value, unit, inputdate,
                     value_min, value_max, tolerance_min, tolerance_max)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ON CONFLICT (po, family, area, parameter) DO UPDATE SET
                    value = EXCLUDED.value,
                    unit = EXCLUDED.unit,
                    inputdate = EXCLUDED.inputdate,
                    value_min = EXCLUDED.value_min,
                    value_max = EXCLUDED.value_max,
                    tolerance_min = EXCLUDED.tolerance_min,
                    tolerance_max = EXCLUDED.tolerance_max
                "#,
            )
            .bind(&record.order_id)
            .bind(&record.family)
            .bind(&record.area)
            .bind(&record.description)
            .bind(record.value.to_db_text())
            .bind(&record.data_format)
            .bind(record.input_date)
            .bind(record.ranges.value_min)
            .bind(record.ranges.value_max)
            .bind(record.ranges.tolerance_min)
            .bind(record.ranges.tolerance_max)
            .execute(&mut *tx)
            .await;

            if let Err(err) = result {
                let record = describe_record(record);
                tracing::error!(table = READINGS_TABLE, record = %record, error = %err, "upsert failed; rolling back");
                tx.rollback().await?;
                return Err(ReconcileError::WriteFailed {
                    table: READINGS_TABLE,
                    record,
                    message: err.to_string(),
                });
            }
        }
        tx.commit().await?;
        Ok(records.len())
    }

    async fn upsert_orders(&self, orders: &[ProcessOrder], replace: bool) -> Result<usize> {
        if orders.is_empty() && !replace {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        if replace {
            sqlx::query("TRUNCATE TABLE process_orders")
                .execute(&mut *tx)
                .await?;
            tracing::warn!(table = ORDERS_TABLE, "table truncated for full reload");
        }
        for order in orders {
            let result = sqlx::query(
                r#"
                INSERT INTO process_orders
                    (process_order, batch, material, description, launch_date,
                     order_quantity, order_unit, strength)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (process_order) DO UPDATE SET
                    batch = EXCLUDED.batch,
                    material = EXCLUDED.material,
                    description = EXCLUDED.description,
                    launch_date = EXCLUDED.launch_date,
                    order_quantity = EXCLUDED.order_quantity,
                    order_unit = EXCLUDED.order_unit,
                    strength = EXCLUDED.strength
                "#,
            )
            .bind(&order.order_id)
            .bind(&order.batch)
            .bind(&order.material)
            .bind(&order.description)
            .bind(order.launch_date)
            .bind(order.quantity)
            .bind(&order.unit)
            .bind(&order.strength)
            .execute(&mut *tx)
            .await;

            if let Err(err) = result {
                tracing::error!(table = ORDERS_TABLE, order = %order.order_id, error = %err, "upsert failed; rolling back");
                tx.rollback().await?;
                return Err(ReconcileError::WriteFailed {
                    table: ORDERS_TABLE,
                    record: order.order_id.clone(),
                    message: err.to_string(),
                });
            }
        }
        tx.commit().await?;
        Ok(orders.len())
    }

    async fn get_watermark(&self, key: &str) -> Result<Option<Watermark>> {
        let row = sqlx::query("SELECT value FROM key_values WHERE keyname = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let raw = row.try_get::<Option<String>, _>("value")?.unwrap_or_default();
        match Watermark::decode(key, &raw) {
            Some(mark) => Ok(Some(mark)),
            None => Err(ReconcileError::InvalidWatermark {
                key: key.to_string(),
                value: raw,
            }),
        }
    }

    async fn set_watermark(&self, watermark: &Watermark) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO key_values (keyname, value)
            VALUES ($1, $2)
            ON CONFLICT (keyname) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(&watermark.key)
        .bind(watermark.encode())
        .execute(&self.pool)
        .await?;
        tracing::info!(key = %watermark.key, value = %watermark.encode(), "watermark advanced");
        Ok(())
    }
}
