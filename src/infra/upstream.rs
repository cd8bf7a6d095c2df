//! HTTP upstream backed by reqwest.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::application::ports::{UpstreamError, UpstreamSource};

use super::error::InfraError;

const SOURCE: &str = "covid_chart::upstream";

#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    /// Build a client. Without `timeout` the transport defaults apply.
    pub fn new(user_agent: &str, timeout: Option<Duration>) -> Result<Self, InfraError> {
        let mut builder = reqwest::Client::builder().user_agent(user_agent);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl UpstreamSource for HttpUpstream {
    async fn get_text(&self, url: &str) -> Result<String, UpstreamError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| UpstreamError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            })?;

        // Status is informational only; an error page fails to decode later.
        let status = response.status();
        if !status.is_success() {
            warn!(
                target: SOURCE,
                url,
                status = status.as_u16(),
                "upstream returned non-success status"
            );
        }

        response.text().await.map_err(|err| UpstreamError::Body {
            url: url.to_string(),
            message: err.to_string(),
        })
    }
}
