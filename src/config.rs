use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

const DEFAULT_SOURCE_SCHEMA: &str = "xfp";
const DEFAULT_ARCHIVE_SCHEMA: &str = "xfp_archive";
const DEFAULT_WATERMARK_KEY: &str = "last_extraction";
const DEFAULT_FULL_WATERMARK_KEY: &str = "last_full_extraction";

fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn setup_config_path() -> Option<PathBuf> {
    env_value("RECONCILER_SETUP_CONFIG_PATH").map(PathBuf::from)
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SetupConfigOverrides {
    #[serde(default)]
    database_url: Option<String>,
    #[serde(default)]
    source_database_url: Option<String>,
    #[serde(default)]
    source_schema: Option<String>,
    #[serde(default)]
    archive_schema: Option<String>,
    #[serde(default)]
    db_pool_size: Option<u32>,
    #[serde(default)]
    watermark_key: Option<String>,
    #[serde(default)]
    full_watermark_key: Option<String>,
    #[serde(default)]
    catalog_dir: Option<String>,
    #[serde(default)]
    use_archive_source: Option<bool>,
}

fn load_setup_config_overrides() -> Option<SetupConfigOverrides> {
    let path = setup_config_path()?;
    if !path.exists() {
        tracing::warn!(path = %path.display(), "setup config not found; using env defaults");
        return None;
    }
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "param-reconciler failed to read setup config; using env defaults"
            );
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "param-reconciler failed to parse setup config; using env defaults"
            );
            None
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Setup-file values only apply to keys the environment leaves unset.
fn apply_setup_overrides(
    config: &mut Config,
    overrides: &SetupConfigOverrides,
    env_allows: impl Fn(&str) -> bool,
) {
    if env_allows("RECONCILER_SOURCE_DATABASE_URL") {
        if let Some(url) = non_blank(overrides.source_database_url.as_deref()) {
            config.source_database_url = normalize_database_url(url);
        }
    }
    if env_allows("RECONCILER_SOURCE_SCHEMA") {
        if let Some(schema) = non_blank(overrides.source_schema.as_deref()) {
            config.source_schema = schema;
        }
    }
    if env_allows("RECONCILER_ARCHIVE_SCHEMA") {
        if let Some(schema) = non_blank(overrides.archive_schema.as_deref()) {
            config.archive_schema = schema;
        }
    }
    if env_allows("RECONCILER_DB_POOL_SIZE") {
        if let Some(size) = overrides.db_pool_size.filter(|v| *v != 0) {
            config.db_pool_size = size;
        }
    }
    if env_allows("RECONCILER_WATERMARK_KEY") {
        if let Some(key) = non_blank(overrides.watermark_key.as_deref()) {
            config.watermark_key = key;
        }
    }
    if env_allows("RECONCILER_FULL_WATERMARK_KEY") {
        if let Some(key) = non_blank(overrides.full_watermark_key.as_deref()) {
            config.full_watermark_key = key;
        }
    }
    if env_allows("RECONCILER_CATALOG_DIR") {
        if let Some(dir) = non_blank(overrides.catalog_dir.as_deref()) {
            config.catalog_dir = Some(PathBuf::from(dir));
        }
    }
    if env_allows("RECONCILER_USE_ARCHIVE") {
        if let Some(value) = overrides.use_archive_source {
            config.mode.use_archive_source = value;
        }
    }
}

/// How a single run reads and writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunMode {
    /// Ignore the watermark, read the archive, truncate and rewrite the
    /// destination.
    pub full_reload: bool,
    pub use_archive_source: bool,
    /// Set only by `--confirm-full-reload`; never read from the environment.
    pub full_reload_confirmed: bool,
}

impl RunMode {
    pub fn reads_archive(&self) -> bool {
        self.full_reload || self.use_archive_source
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub source_database_url: String,
    pub source_schema: String,
    pub archive_schema: String,
    pub db_pool_size: u32,
    pub watermark_key: String,
    pub full_watermark_key: String,
    pub catalog_dir: Option<PathBuf>,
    pub mode: RunMode,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let setup_overrides = load_setup_config_overrides();

        let database_url = env_value("RECONCILER_DATABASE_URL")
            .or_else(|| env_value("DATABASE_URL"))
            .or_else(|| {
                setup_overrides
                    .as_ref()
                    .and_then(|ov| non_blank(ov.database_url.as_deref()))
            })
            .context("RECONCILER_DATABASE_URL or DATABASE_URL is required (or present as database_url in the setup config)")?;
        let database_url = normalize_database_url(database_url);

        let source_database_url = env_value("RECONCILER_SOURCE_DATABASE_URL")
            .map(normalize_database_url)
            .unwrap_or_else(|| database_url.clone());
        let source_schema = env_value("RECONCILER_SOURCE_SCHEMA")
            .unwrap_or_else(|| DEFAULT_SOURCE_SCHEMA.to_string());
        let archive_schema = env_value("RECONCILER_ARCHIVE_SCHEMA")
            .unwrap_or_else(|| DEFAULT_ARCHIVE_SCHEMA.to_string());
        let db_pool_size = env_value("RECONCILER_DB_POOL_SIZE")
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v != 0)
            .unwrap_or(5);
        let watermark_key = env_value("RECONCILER_WATERMARK_KEY")
            .unwrap_or_else(|| DEFAULT_WATERMARK_KEY.to_string());
        let full_watermark_key = env_value("RECONCILER_FULL_WATERMARK_KEY")
            .unwrap_or_else(|| DEFAULT_FULL_WATERMARK_KEY.to_string());
        let catalog_dir = env_value("RECONCILER_CATALOG_DIR").map(PathBuf::from);
        let full_reload = env_value("RECONCILER_FULL_RELOAD")
            .and_then(|v| parse_bool(&v))
            .unwrap_or(false);
        let use_archive_source = env_value("RECONCILER_USE_ARCHIVE")
            .and_then(|v| parse_bool(&v))
            .unwrap_or(false);

        let mut config = Self {
            database_url,
            source_database_url,
            source_schema,
            archive_schema,
            db_pool_size,
            watermark_key,
            full_watermark_key,
            catalog_dir,
            mode: RunMode {
                full_reload,
                use_archive_source,
                full_reload_confirmed: false,
            },
        };

        if let Some(overrides) = setup_overrides.as_ref() {
            apply_setup_overrides(&mut config, overrides, |key| env_value(key).is_none());
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.source_schema).context("invalid source schema")?;
        validate_identifier(&self.archive_schema).context("invalid archive schema")?;
        if self.watermark_key == self.full_watermark_key {
            bail!(
                "watermark key and full watermark key must differ (both `{}`)",
                self.watermark_key
            );
        }
        Ok(())
    }
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Schema names end up inside SQL text, so only plain identifiers pass.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        bail!("identifier is empty");
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        bail!("identifier `{name}` must start with a letter or underscore");
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("identifier `{name}` may only contain letters, digits and underscores");
    }
    if name.len() > 63 {
        bail!("identifier `{name}` is longer than 63 bytes");
    }
    Ok(())
}

fn normalize_database_url(url: String) -> String {
    if let Some(stripped) = url.strip_prefix("postgresql+psycopg2://") {
        return format!("postgresql://{stripped}");
    }
    if let Some(stripped) = url.strip_prefix("postgresql+psycopg://") {
        return format!("postgresql://{stripped}");
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            database_url: "postgresql://localhost/dest".into(),
            source_database_url: "postgresql://localhost/dest".into(),
            source_schema: DEFAULT_SOURCE_SCHEMA.into(),
            archive_schema: DEFAULT_ARCHIVE_SCHEMA.into(),
            db_pool_size: 5,
            watermark_key: DEFAULT_WATERMARK_KEY.into(),
            full_watermark_key: DEFAULT_FULL_WATERMARK_KEY.into(),
            catalog_dir: None,
            mode: RunMode::default(),
        }
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool(" TRUE "), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn identifiers_are_checked() {
        assert!(validate_identifier("xfp_archive").is_ok());
        assert!(validate_identifier("_x1").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1abc").is_err());
        assert!(validate_identifier("xfp; DROP TABLE x").is_err());
        assert!(validate_identifier(&"a".repeat(64)).is_err());
    }

    #[test]
    fn driver_prefixes_are_stripped() {
        assert_eq!(
            normalize_database_url("postgresql+psycopg2://u@h/db".into()),
            "postgresql://u@h/db"
        );
        assert_eq!(
            normalize_database_url("postgres://u@h/db".into()),
            "postgres://u@h/db"
        );
    }

    #[test]
    fn setup_overrides_skip_keys_set_in_env() {
        let mut config = base_config();
        let overrides = SetupConfigOverrides {
            source_schema: Some(" plant_a ".into()),
            archive_schema: Some("plant_a_archive".into()),
            db_pool_size: Some(0),
            catalog_dir: Some("/srv/catalog".into()),
            use_archive_source: Some(true),
            ..SetupConfigOverrides::default()
        };
        apply_setup_overrides(&mut config, &overrides, |key| {
            key != "RECONCILER_ARCHIVE_SCHEMA"
        });
        assert_eq!(config.source_schema, "plant_a");
        assert_eq!(config.archive_schema, DEFAULT_ARCHIVE_SCHEMA);
        assert_eq!(config.db_pool_size, 5);
        assert_eq!(config.catalog_dir, Some(PathBuf::from("/srv/catalog")));
        assert!(config.mode.use_archive_source);
    }

    #[test]
    fn watermark_keys_must_differ() {
        let mut config = base_config();
        assert!(config.validate().is_ok());
        config.full_watermark_key = config.watermark_key.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn full_reload_reads_archive() {
        let mode = RunMode {
            full_reload: true,
            ..RunMode::default()
        };
        assert!(mode.reads_archive());
        assert!(!RunMode::default().reads_archive());
    }
}
