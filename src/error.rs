use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReconcileError>;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("watermark `{key}` is missing")]
    MissingWatermark { key: String },

    #[error("watermark `{key}` has unparseable value `{value}`")]
    InvalidWatermark { key: String, value: String },

    #[error("reference catalog unavailable: {message}")]
    CatalogUnavailable { message: String },

    #[error("source read failed: {message}")]
    Source { message: String },

    #[error("unsupported aggregation function `{label}` for group {group}")]
    UnsupportedAggregation { group: String, label: String },

    #[error("write to `{table}` aborted at record {record}: {message}")]
    WriteFailed {
        table: &'static str,
        record: String,
        message: String,
    },

    #[error("full reload truncates destination tables and must be confirmed explicitly")]
    FullReloadNotConfirmed,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ReconcileError {
    pub fn source_read(err: impl std::fmt::Display) -> Self {
        Self::Source {
            message: err.to_string(),
        }
    }

    pub fn catalog_unavailable(err: impl std::fmt::Display) -> Self {
        Self::CatalogUnavailable {
            message: err.to_string(),
        }
    }
}
