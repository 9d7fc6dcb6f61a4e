pub mod db;
pub mod upload;

use crate::error::Result;
use crate::model::{Catalog, RangeDefinition};
use async_trait::async_trait;

pub use db::PgCatalog;

/// Reference catalog of expected parameters and their ranges.
#[async_trait]
pub trait ReferenceCatalog: Send + Sync {
    async fn list_parameter_definitions(&self) -> Result<Catalog>;

    async fn list_range_definitions(&self) -> Result<Vec<RangeDefinition>>;
}
