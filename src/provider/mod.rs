//! Client for the external music search/stream provider.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::{common::errors::ProviderError, configs::ProviderConfig};

const USER_AGENT: &str = concat!("tandem/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct StreamBody {
    url: Option<String>,
}

pub struct MusicProvider {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl MusicProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config
                .base_url
                .as_deref()
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.base_url.is_some()
    }

    fn endpoint(&self, path: &str) -> Result<String, ProviderError> {
        let base = self.base_url.as_deref().ok_or(ProviderError::Disabled)?;
        Ok(format!("{}/{}", base, path))
    }

    /// Returns the provider's search payload untouched.
    pub async fn search(&self, query: &str, offset: u32) -> Result<Value, ProviderError> {
        let url = self.endpoint("search")?;
        debug!("Provider search: {:?} (offset {})", query, offset);
        let offset = offset.to_string();
        let resp = self
            .client
            .get(url)
            .query(&[("q", query), ("offset", offset.as_str())])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ProviderError::Status(resp.status().as_u16()));
        }
        Ok(resp.json().await?)
    }

    /// Resolves a track id to a playable URL.
    pub async fn stream(&self, track_id: &str) -> Result<String, ProviderError> {
        let url = self.endpoint("stream")?;
        debug!("Provider stream: {}", track_id);
        let resp = self
            .client
            .get(url)
            .query(&[("id", track_id)])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ProviderError::Status(resp.status().as_u16()));
        }
        let body: StreamBody = resp.json().await?;
        body.url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ProviderError::MissingUrl(track_id.to_string()))
    }
}
