use anyhow::{bail, Result};
use chrono::Utc;
use clap::Parser;
use param_reconciler::catalog::upload::upload_catalog;
use param_reconciler::catalog::PgCatalog;
use param_reconciler::cli::Args;
use param_reconciler::config::Config;
use param_reconciler::db::build_pool;
use param_reconciler::error::ReconcileError;
use param_reconciler::memory::MemoryStore;
use param_reconciler::run::{run_once, RunOptions};
use param_reconciler::sink::{PgSink, Sink};
use param_reconciler::source::PgSourceReader;

fn init_tracing() -> Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,param_reconciler=info".into());
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let args = Args::parse();
    let mut config = Config::from_env()?;
    args.apply(&mut config);

    let options = RunOptions::from_config(&config);
    if options.mode.full_reload && !options.mode.full_reload_confirmed {
        return Err(ReconcileError::FullReloadNotConfirmed.into());
    }

    let pool = build_pool(&config.database_url, config.db_pool_size).await?;
    let source_pool = if config.source_database_url == config.database_url {
        pool.clone()
    } else {
        build_pool(&config.source_database_url, config.db_pool_size).await?
    };

    if options.mode.full_reload {
        match (&config.catalog_dir, args.dry_run) {
            (Some(dir), false) => {
                upload_catalog(&pool, dir).await?;
            }
            (Some(dir), true) => {
                tracing::info!(dir = %dir.display(), "dry run; catalog upload skipped");
            }
            (None, _) => {}
        }
    }

    let catalog = PgCatalog::new(pool.clone());
    let source = PgSourceReader::new(
        source_pool,
        config.source_schema.clone(),
        config.archive_schema.clone(),
    );
    let sink = PgSink::new(pool.clone());
    let extraction_time = Utc::now().naive_utc();

    let summary = if args.dry_run {
        let mut preview = MemoryStore::new();
        if let Some(mark) = sink.get_watermark(&options.watermark_key).await? {
            preview = preview.with_watermark(mark);
        }
        let summary = run_once(&options, &catalog, &source, &preview, extraction_time).await?;
        tracing::info!(
            records = preview.stored_values().await.len(),
            orders = preview.stored_orders().await.len(),
            "dry run; destination untouched"
        );
        summary
    } else {
        run_once(&options, &catalog, &source, &sink, extraction_time).await?
    };

    println!("{summary}");
    if summary.has_failures() {
        bail!(
            "run {} finished with {} aggregation and {} write failures",
            summary.run_id,
            summary.aggregation_failures.len(),
            summary.write_failures.len()
        );
    }
    Ok(())
}
