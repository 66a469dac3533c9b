use std::time::Duration;

use anyhow::{Context, Result};
use common::StatusDocument;
use reqwest::Client;
pub use reqwest::Url;
use view_core::{DEFAULT_REQUEST_TIMEOUT, StatusSource};

/// Location of the status document relative to the status page.
pub const STATUS_PATH_FROM_PAGE: &str = "../status/json/";

#[derive(Clone)]
pub struct StatusClient {
    http: Client,
    status_url: Url,
}

impl StatusClient {
    pub fn new(status_url: &str) -> Result<Self> {
        let status_url = Url::parse(status_url)
            .with_context(|| format!("invalid status url: {status_url}"))?;
        Self::with_timeout(status_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Targets the status document the way the status page's own script does.
    pub fn for_page(page_url: &str) -> Result<Self> {
        Self::with_timeout(status_url_for_page(page_url)?, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(status_url: Url, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;

        Ok(Self { http, status_url })
    }

    pub fn status_url(&self) -> &Url {
        &self.status_url
    }

    pub async fn fetch(&self) -> Result<StatusDocument> {
        let url = self.status_url.as_str();

        self.http
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to contact status endpoint {url}"))?
            .error_for_status()
            .with_context(|| format!("status endpoint {url} returned error status"))?
            .json::<StatusDocument>()
            .await
            .with_context(|| format!("failed to decode status document from {url}"))
    }

    pub async fn fetch_raw(&self) -> Result<serde_json::Value> {
        let url = self.status_url.as_str();

        self.http
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to contact status endpoint {url}"))?
            .error_for_status()
            .with_context(|| format!("status endpoint {url} returned error status"))?
            .json::<serde_json::Value>()
            .await
            .with_context(|| format!("failed to decode status response from {url}"))
    }
}

impl StatusSource for StatusClient {
    async fn fetch_status(&self) -> Result<StatusDocument> {
        self.fetch().await
    }
}

pub fn status_url_for_page(page_url: &str) -> Result<Url> {
    let page = Url::parse(page_url).with_context(|| format!("invalid page url: {page_url}"))?;
    page.join(STATUS_PATH_FROM_PAGE)
        .with_context(|| format!("failed to resolve status url against {page_url}"))
}
