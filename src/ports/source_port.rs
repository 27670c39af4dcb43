//! Upstream market-data source port.

use async_trait::async_trait;

use crate::domain::error::DcaError;

/// Retrieves the raw delimited text behind a provider URL.
///
/// Implementations report transport and HTTP status failures as
/// [`DcaError::Fetch`]. The per-provider time bound is applied by the caller,
/// which drops the returned future on expiry.
#[async_trait]
pub trait SourcePort: Send + Sync {
    async fn fetch_text(&self, provider: &str, url: &str) -> Result<String, DcaError>;
}
