use super::ReferenceCatalog;
use crate::error::{ReconcileError, Result};
use crate::model::{Catalog, PlainParameter, RangeBounds, RangeDefinition, SpecialParameter};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::PgPool;

#[derive(sqlx::FromRow)]
struct PlainParameterRow {
    emi_master: String,
    parameter: String,
    family: String,
    area: String,
    description: String,
    dataformat: String,
    range_min: Option<f64>,
    range_max: Option<f64>,
}

#[derive(sqlx::FromRow)]
struct SpecialParameterRow {
    emi_master: String,
    emi_parent: String,
    emi_sub: String,
    parameter: String,
    subemi_name: Option<String>,
    groupid: String,
    area: String,
    family: String,
    description: String,
    agg_function: String,
    dataformat: String,
}

#[derive(sqlx::FromRow)]
struct RangeRow {
    material: String,
    family: String,
    area: String,
    description: String,
    valid_from: Option<NaiveDateTime>,
    valid_to: Option<NaiveDateTime>,
    value_min: Option<f64>,
    value_max: Option<f64>,
    tolerance_min: Option<f64>,
    tolerance_max: Option<f64>,
}

fn trimmed(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.len() == value.len() {
        value
    } else {
        trimmed.to_string()
    }
}

impl From<PlainParameterRow> for PlainParameter {
    fn from(row: PlainParameterRow) -> Self {
        Self {
            master_emi: trimmed(row.emi_master),
            parameter: trimmed(row.parameter),
            family: trimmed(row.family),
            area: trimmed(row.area),
            description: trimmed(row.description),
            data_format: trimmed(row.dataformat),
            range_min: row.range_min.filter(|v| v.is_finite()),
            range_max: row.range_max.filter(|v| v.is_finite()),
        }
    }
}

impl From<SpecialParameterRow> for SpecialParameter {
    fn from(row: SpecialParameterRow) -> Self {
        Self {
            master_emi: trimmed(row.emi_master),
            parent_emi: trimmed(row.emi_parent),
            sub_emi: trimmed(row.emi_sub),
            parameter: trimmed(row.parameter),
            sub_emi_name: row.subemi_name.map(trimmed),
            group_id: trimmed(row.groupid),
            area: trimmed(row.area),
            family: trimmed(row.family),
            description: trimmed(row.description),
            agg_function: trimmed(row.agg_function),
            data_format: trimmed(row.dataformat),
        }
    }
}

impl From<RangeRow> for RangeDefinition {
    fn from(row: RangeRow) -> Self {
        Self {
            material: trimmed(row.material),
            family: trimmed(row.family),
            area: trimmed(row.area),
            description: trimmed(row.description),
            valid_from: row.valid_from,
            valid_to: row.valid_to,
            bounds: RangeBounds {
                value_min: row.value_min.filter(|v| v.is_finite()),
                value_max: row.value_max.filter(|v| v.is_finite()),
                tolerance_min: row.tolerance_min.filter(|v| v.is_finite()),
                tolerance_max: row.tolerance_max.filter(|v| v.is_finite()),
            },
        }
    }
}

/// Catalog tables in the destination database (`params_main`,
/// `params_special`, `param_ranges`).
#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReferenceCatalog for PgCatalog {
    async fn list_parameter_definitions(&self) -> Result<Catalog> {
        let plain: Vec<PlainParameterRow> = sqlx::query_as(
            r#"
            SELECT
                emi_master,
                parameter,
                family,
                area,
                description,
                dataformat,
                range_min::double precision AS range_min,
                range_max::double precision AS range_max
            FROM params_main
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ReconcileError::catalog_unavailable)?;

        let special: Vec<SpecialParameterRow> = sqlx::query_as(
            r#"
            SELECT
                emi_master,
                emi_parent,
                emi_sub,
                parameter,
                subemi_name,
                groupid::text AS groupid,
                area,
                family,
                description,
                agg_function,
                dataformat
            FROM params_special
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ReconcileError::catalog_unavailable)?;

        let catalog = Catalog {
            plain: plain.into_iter().map(PlainParameter::from).collect(),
            special: special.into_iter().map(SpecialParameter::from).collect(),
        };
        tracing::info!(
            plain = catalog.plain.len(),
            special = catalog.special.len(),
            "loaded parameter catalog"
        );
        Ok(catalog)
    }

    async fn list_range_definitions(&self) -> Result<Vec<RangeDefinition>> {
        let rows: Vec<RangeRow> = sqlx::query_as(
            r#"
            SELECT
                material,
                family,
                area,
                description,
                valid_from,
                valid_to,
                value_min::double precision AS value_min,
                value_max::double precision AS value_max,
                tolerance_min::double precision AS tolerance_min,
                tolerance_max::double precision AS tolerance_max
            FROM param_ranges
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ReconcileError::catalog_unavailable)?;

        tracing::debug!(ranges = rows.len(), "loaded range definitions");
        Ok(rows.into_iter().map(RangeDefinition::from).collect())
    }
}
