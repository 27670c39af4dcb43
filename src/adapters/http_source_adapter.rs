//! HTTP upstream source via `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::domain::error::DcaError;
use crate::ports::source_port::SourcePort;

pub const DEFAULT_USER_AGENT: &str = "dcalab/0.1";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

pub struct HttpSourceAdapter {
    client: Client,
}

impl HttpSourceAdapter {
    pub fn new(user_agent: &str) -> Result<Self, DcaError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(user_agent)
            .build()
            .map_err(|e| DcaError::ConfigInvalid {
                section: "fetch".to_string(),
                key: "user_agent".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SourcePort for HttpSourceAdapter {
    async fn fetch_text(&self, provider: &str, url: &str) -> Result<String, DcaError> {
        let fetch_error = |reason: String| DcaError::Fetch {
            provider: provider.to_string(),
            reason,
        };

        debug!(provider, url, "requesting upstream series");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("HTTP {}", status.as_u16())));
        }

        response.text().await.map_err(|e| fetch_error(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_default_user_agent() {
        assert!(HttpSourceAdapter::new(DEFAULT_USER_AGENT).is_ok());
    }

    #[test]
    fn rejects_header_unsafe_user_agent() {
        let result = HttpSourceAdapter::new("bad\nagent");
        assert!(matches!(result, Err(DcaError::ConfigInvalid { .. })));
    }
}
