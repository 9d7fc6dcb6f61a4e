//! Full-reload catalog upload from CSV exports (`params_main.csv`,
//! `params_special.csv`). Only runs behind a confirmed full reload.

use crate::model::{PlainParameter, SpecialParameter};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sqlx::PgPool;
use std::path::Path;

pub const PLAIN_FILE: &str = "params_main.csv";
pub const SPECIAL_FILE: &str = "params_special.csv";

#[derive(Debug, Deserialize)]
struct PlainCsvRow {
    emi_master: String,
    parameter: String,
    family: String,
    area: String,
    description: String,
    dataformat: String,
    #[serde(default)]
    range_min: Option<f64>,
    #[serde(default)]
    range_max: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SpecialCsvRow {
    emi_master: String,
    emi_parent: String,
    emi_sub: String,
    parameter: String,
    #[serde(default)]
    subemi_name: Option<String>,
    groupid: String,
    area: String,
    family: String,
    description: String,
    agg_function: String,
    dataformat: String,
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut rows = Vec::new();
    for (line, record) in reader.deserialize::<T>().enumerate() {
        let row = record.with_context(|| {
            format!("failed to parse {} data row {}", path.display(), line + 1)
        })?;
        rows.push(row);
    }
    Ok(rows)
}

pub fn read_plain_csv(path: &Path) -> Result<Vec<PlainParameter>> {
    Ok(read_rows::<PlainCsvRow>(path)?
        .into_iter()
        .map(|row| PlainParameter {
            master_emi: row.emi_master,
            parameter: row.parameter,
            family: row.family,
            area: row.area,
            description: row.description,
            data_format: row.dataformat,
            range_min: row.range_min,
            range_max: row.range_max,
        })
        .collect())
}

pub fn read_special_csv(path: &Path) -> Result<Vec<SpecialParameter>> {
    Ok(read_rows::<SpecialCsvRow>(path)?
        .into_iter()
        .map(|row| SpecialParameter {
            master_emi: row.emi_master,
            parent_emi: row.emi_parent,
            sub_emi: row.emi_sub,
            parameter: row.parameter,
            sub_emi_name: row.subemi_name.filter(|v| !v.is_empty()),
            group_id: row.groupid,
            area: row.area,
            family: row.family,
            description: row.description,
            agg_function: row.agg_function,
            data_format: row.dataformat,
        })
        .collect())
}

/// Replaces both catalog tables with the contents of `dir`, in one
/// transaction. Returns (plain, special) row counts.
pub async fn upload_catalog(pool: &PgPool, dir: &Path) -> Result<(usize, usize)> {
    let plain = read_plain_csv(&dir.join(PLAIN_FILE))?;
    let special = read_special_csv(&dir.join(SPECIAL_FILE))?;

    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    sqlx::query("TRUNCATE TABLE params_main, params_special")
        .execute(&mut *tx)
        .await
        .context("failed to truncate catalog tables")?;

    for def in &plain {
        sqlx::query(
            r#"
            INSERT INTO params_main
                (emi_master, parameter, family, area, description, dataformat, range_min, range_max)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (emi_master, parameter) DO UPDATE SET
                family = EXCLUDED.family,
                area = EXCLUDED.area,
                description = EXCLUDED.description,
                dataformat = EXCLUDED.dataformat,
                range_min = EXCLUDED.range_min,
                range_max = EXCLUDED.range_max
            "#,
        )
        .bind(&def.master_emi)
        .bind(&def.parameter)
        .bind(&def.family)
        .bind(&def.area)
        .bind(&def.description)
        .bind(&def.data_format)
        .bind(def.range_min)
        .bind(def.range_max)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to upload plain parameter {def:?}"))?;
    }

    for def in &special {
        sqlx::query(
            r#"
            INSERT INTO params_special
                (emi_master, emi_parent, emi_sub, parameter, subemi_name, groupid,
                 area, family, description, agg_function, dataformat)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (emi_master, emi_parent, emi_sub, parameter) DO UPDATE SET
                subemi_name = EXCLUDED.subemi_name,
                groupid = EXCLUDED.groupid,
                area = EXCLUDED.area,
                family = EXCLUDED.family,
                description = EXCLUDED.description,
                agg_function = EXCLUDED.agg_function,
                dataformat = EXCLUDED.dataformat
            "#,
        )
        .bind(&def.master_emi)
        .bind(&def.parent_emi)
        .bind(&def.sub_emi)
        .bind(&def.parameter)
        .bind(&def.sub_emi_name)
        .bind(&def.group_id)
        .bind(&def.area)
        .bind(&def.family)
        .bind(&def.description)
        .bind(&def.agg_function)
        .bind(&def.data_format)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to upload special parameter {def:?}"))?;
    }

    tx.commit().await.context("failed to commit catalog upload")?;
    tracing::info!(
        plain = plain.len(),
        special = special.len(),
        dir = %dir.display(),
        "uploaded parameter catalog"
    );
    Ok((plain.len(), special.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut file = std::fs::File::create(dir.join(name)).expect("create");
        file.write_all(contents.as_bytes()).expect("write");
    }

    #[test]
    fn plain_rows_are_trimmed_and_optional_limits_parse() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(
            dir.path(),
            PLAIN_FILE,
            "emi_master,parameter,family,area,description,dataformat,range_min,range_max\n\
             M1 , HARD ,Compression,Line 1, Hardness ,N,10,20\n\
             M1,THICK,Compression,Line 1,Thickness,mm,,\n",
        );
        let rows = read_plain_csv(&dir.path().join(PLAIN_FILE)).expect("parse");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].master_emi, "M1");
        assert_eq!(rows[0].parameter, "HARD");
        assert_eq!(rows[0].description, "Hardness");
        assert_eq!(rows[0].range_min, Some(10.0));
        assert_eq!(rows[1].range_max, None);
    }

    #[test]
    fn special_rows_parse() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(
            dir.path(),
            SPECIAL_FILE,
            "emi_master,emi_parent,emi_sub,parameter,subemi_name,groupid,area,family,description,agg_function,dataformat\n\
             M1,WEIGH,SUB-A,W,,7,Line 1,IPC,Weight,AVG,mg\n",
        );
        let rows = read_special_csv(&dir.path().join(SPECIAL_FILE)).expect("parse");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].group_id, "7");
        assert_eq!(rows[0].agg_function, "AVG");
        assert_eq!(rows[0].sub_emi_name, None);
    }

    #[test]
    fn malformed_rows_report_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(
            dir.path(),
            PLAIN_FILE,
            "emi_master,parameter,family,area,description,dataformat,range_min,range_max\n\
             M1,HARD,Compression,Line 1,Hardness,N,not-a-number,20\n",
        );
        let err = read_plain_csv(&dir.path().join(PLAIN_FILE)).expect_err("should fail");
        assert!(format!("{err:#}").contains(PLAIN_FILE));
    }
}
