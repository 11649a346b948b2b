use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;

use crate::error::SearchError;

/// Endpoint of DuckDuckGo's no-JavaScript HTML interface.
const DEFAULT_BASE_URL: &str = "https://html.duckduckgo.com/html";
/// Environment override so tests (and the curious) can point the client at a
/// mock server.
pub const BASE_URL_ENV: &str = "QUACKR_BASE_URL";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/127.0.0.0 Safari/537.36 quackr/0.1";

/// Thin wrapper over the HTTP client: posts form fields to the search
/// endpoint and hands back decoded body text. Redirects are followed and
/// gzip/brotli bodies decoded by reqwest itself.
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    base_url: String,
}

impl Transport {
    pub fn new(timeout_secs: u64, proxy: Option<&str>) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(USER_AGENT)
            .gzip(true)
            .brotli(true)
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(2)
            .timeout(Duration::from_secs(timeout_secs));
        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy).context("invalid proxy URL")?);
        }
        let client = builder.build().context("failed to build HTTP client")?;

        let base_url = std::env::var(BASE_URL_ENV)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Transport { client, base_url })
    }

    #[cfg(test)]
    pub fn with_base_url(base_url: &str) -> Self {
        Transport {
            client: Client::new(),
            base_url: base_url.to_string(),
        }
    }

    /// POST one page request. Any non-2xx status (after redirects) or I/O
    /// failure collapses into the uniform connection error; the caller keeps
    /// its current results either way.
    pub async fn fetch_page(&self, fields: &[(&str, String)]) -> Result<String, SearchError> {
        tracing::debug!(url = %self.base_url, ?fields, "fetching result page");
        let resp = self
            .client
            .post(&self.base_url)
            .form(fields)
            .send()
            .await
            .map_err(|e| SearchError::Connection(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SearchError::Connection(format!("HTTP status {status}")));
        }
        resp.text()
            .await
            .map_err(|e| SearchError::Connection(e.to_string()))
    }
}
