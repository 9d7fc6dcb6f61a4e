use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "param-reconciler",
    version,
    about = "Reconcile source parameter readings into the destination store (one batch pass)"
)]
pub struct Args {
    /// Ignore the watermark, read the archive and rebuild the destination tables.
    #[arg(long, default_value_t = false)]
    pub full_reload: bool,
    /// Required together with --full-reload; the reload truncates destination tables.
    #[arg(long, default_value_t = false)]
    pub confirm_full_reload: bool,
    /// Read orders and tasks from the archive schema.
    #[arg(long, default_value_t = false)]
    pub use_archive: bool,
    /// Reconcile without writing anything or advancing the watermark.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
    /// Directory holding params_main.csv and params_special.csv, uploaded on a full reload.
    #[arg(long)]
    pub catalog_dir: Option<PathBuf>,
}

impl Args {
    pub fn apply(&self, config: &mut crate::config::Config) {
        if self.full_reload {
            config.mode.full_reload = true;
        }
        if self.use_archive {
            config.mode.use_archive_source = true;
        }
        config.mode.full_reload_confirmed = self.confirm_full_reload;
        if let Some(dir) = &self.catalog_dir {
            config.catalog_dir = Some(dir.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_reload_flags_parse() {
        let args = Args::try_parse_from([
            "param-reconciler",
            "--full-reload",
            "--confirm-full-reload",
            "--catalog-dir",
            "/srv/catalog",
        ])
        .expect("parse");
        assert!(args.full_reload);
        assert!(args.confirm_full_reload);
        assert!(!args.dry_run);
        assert_eq!(args.catalog_dir, Some(PathBuf::from("/srv/catalog")));
    }

    #[test]
    fn defaults_are_incremental() {
        let args = Args::try_parse_from(["param-reconciler"]).expect("parse");
        assert!(!args.full_reload && !args.use_archive && !args.confirm_full_reload);
    }
}
