//! One batch pass: catalog and source reads, reconciliation, destination
//! writes and the watermark update.


use crate::catalog::ReferenceCatalog;
use crate::config::{Config, RunMode};
use crate::error::{ReconcileError, Result};
use crate::model::{Reading, Watermark};
use crate::reconcile::{
    reconcile_plain, reconcile_special, AggregateOutcome, AggregationFailure, RangeIndex,
};
use crate::sink::Sink;
use crate::source::SourceReader;
use chrono::NaiveDateTime;
use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::Instrument;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct RunOptions {
    pub mode: RunMode,
    pub watermark_key: String,
    pub full_watermark_key: String,
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            mode: config.mode,
            watermark_key: config.watermark_key.clone(),
            full_watermark_key: config.full_watermark_key.clone(),
        }
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub plain_records: usize,
    pub special_records: usize,
    pub orders: usize,
    pub aggregation_failures: Vec<AggregationFailure>,
    pub write_failures: Vec<ReconcileError>,
    pub watermark_advanced: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        !self.aggregation_failures.is_empty() || !self.write_failures.is_empty()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "run {}", self.run_id)?;
        writeln!(f, "  plain records:   {}", self.plain_records)?;
        writeln!(f, "  special records: {}", self.special_records)?;
        writeln!(f, "  process orders:  {}", self.orders)?;
        writeln!(f, "  elapsed:         {:.1}s", self.elapsed.as_secs_f64())?;
        writeln!(
            f,
            "  watermark:       {}",
            if self.watermark_advanced {
                "advanced"
            } else {
                "held"
            }
        )?;
        for failure in &self.aggregation_failures {
            writeln!(f, "  aggregation failure: {}", failure.to_error())?;
        }
        for failure in &self.write_failures {
            writeln!(f, "  write failure: {failure}")?;
        }
        Ok(())
    }
}

fn distinct_orders(readings: &[Reading]) -> Vec<String> {
    readings
        .iter()
        .map(|r| r.order_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Runs one pass. `extraction_time` becomes the new watermark and should be
/// captured before the source is read.
///
/// Catalog, source and watermark-read failures abort before anything is
/// written. Write failures and unsupported aggregation functions are
/// collected in the summary and hold the watermark.
pub async fn run_once(
    options: &RunOptions,
    catalog: &dyn ReferenceCatalog,
    source: &dyn SourceReader,
    sink: &dyn Sink,
    extraction_time: NaiveDateTime,
) -> Result<RunSummary> {
    if options.mode.full_reload && !options.mode.full_reload_confirmed {
        return Err(ReconcileError::FullReloadNotConfirmed);
    }
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!(
        "reconcile_run",
        %run_id,
        full_reload = options.mode.full_reload,
        use_archive = options.mode.reads_archive()
    );
    execute(run_id, options, catalog, source, sink, extraction_time)
        .instrument(span)
        .await
}

async fn execute(
    run_id: Uuid,
    options: &RunOptions,
    catalog: &dyn ReferenceCatalog,
    source: &dyn SourceReader,
    sink: &dyn Sink,
    extraction_time: NaiveDateTime,
) -> Result<RunSummary> {
    let started = Instant::now();
    let mode = options.mode;

    let definitions = catalog.list_parameter_definitions().await?;
    let ranges = RangeIndex::new(catalog.list_range_definitions().await?);

    let since = if mode.full_reload {
        None
    } else {
        let mark = sink
            .get_watermark(&options.watermark_key)
            .await?
            .ok_or_else(|| ReconcileError::MissingWatermark {
                key: options.watermark_key.clone(),
            })?;
        Some(mark.timestamp)
    };

    let readings = source
        .get_readings(since, &definitions.parameter_codes(), mode.full_reload)
        .await?;
    let (plain_readings, mut special_readings) = definitions.partition_readings(readings);

    // Groups aggregate over every reading of an order, not only the new ones.
    if !mode.full_reload && !special_readings.is_empty() {
        let touched = distinct_orders(&special_readings);
        special_readings = source
            .get_order_readings(&definitions.special_codes(), &touched)
            .await?;
    }
    tracing::info!(
        since = ?since,
        plain = plain_readings.len(),
        special = special_readings.len(),
        "readings extracted"
    );

    let orders = source.get_orders(mode.reads_archive()).await?;

    let plain_records = reconcile_plain(&plain_readings, &orders, &definitions.plain, &ranges);
    let special = if special_readings.is_empty() {
        AggregateOutcome::default()
    } else {
        let tasks = source
            .get_tasks(&distinct_orders(&special_readings), mode.reads_archive())
            .await?;
        reconcile_special(
            &special_readings,
            &tasks,
            &orders,
            &definitions.special,
            &ranges,
        )
    };

    let plain_count = plain_records.len();
    let special_count = special.records.len();
    let mut records = plain_records;
    records.extend(special.records);

    // a full reload replaces each table inside its own write transaction
    let mut write_failures = Vec::new();
    if let Err(err) = sink.upsert_readings(&records, mode.full_reload).await {
        tracing::error!(error = %err, "reading upsert failed");
        write_failures.push(err);
    }
    let written_orders = match sink.upsert_orders(&orders, mode.full_reload).await {
        Ok(count) => count,
        Err(err) => {
            tracing::error!(error = %err, "process order upsert failed");
            write_failures.push(err);
            0
        }
    };

    let mut watermark_advanced = false;
    if write_failures.is_empty() && special.failures.is_empty() {
        let mut keys = vec![options.watermark_key.as_str()];
        if mode.full_reload {
            keys.push(options.full_watermark_key.as_str());
        }
        watermark_advanced = true;
        for key in keys {
            if let Err(err) = sink.set_watermark(&Watermark::new(key, extraction_time)).await {
                tracing::error!(key, error = %err, "watermark update failed");
                write_failures.push(err);
                watermark_advanced = false;
                break;
            }
        }
    } else {
        tracing::warn!(
            aggregation_failures = special.failures.len(),
            write_failures = write_failures.len(),
            "watermark held; the next run reprocesses this window"
        );
    }

    let summary = RunSummary {
        run_id,
        plain_records: plain_count,
        special_records: special_count,
        orders: written_orders,
        aggregation_failures: special.failures,
        write_failures,
        watermark_advanced,
        elapsed: started.elapsed(),
    };
    tracing::info!(
        plain = summary.plain_records,
        special = summary.special_records,
        orders = summary.orders,
        watermark_advanced = summary.watermark_advanced,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "reconcile run finished"
    );
    Ok(summary)
}
