//! Persistence port for cached series, one document per cache key.

use async_trait::async_trait;

use crate::domain::error::DcaError;
use crate::domain::series::{AssetSeries, CacheKey};

#[async_trait]
pub trait SeriesRepository: Send + Sync {
    /// The persisted entry for `key`. Absent or unreadable entries are `None`.
    async fn load(&self, key: &CacheKey) -> Option<AssetSeries>;

    async fn save(&self, series: &AssetSeries) -> Result<(), DcaError>;
}
