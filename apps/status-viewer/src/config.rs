use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use client_sdk::{StatusClient, Url, status_url_for_page};
use view_core::DEFAULT_REQUEST_TIMEOUT;

pub(crate) const DEFAULT_PAGE_URL: &str = "http://127.0.0.1:8080/plugins/multi-master/static/";
pub(crate) const DEFAULT_BIND: &str = "127.0.0.1:8081";

const PAGE_URL_ENV: &str = "PEERWATCH_PAGE_URL";
const STATUS_URL_ENV: &str = "PEERWATCH_STATUS_URL";
const TIMEOUT_ENV: &str = "PEERWATCH_TIMEOUT_MS";
const BIND_ENV: &str = "PEERWATCH_BIND";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ViewerConfig {
    pub(crate) page_url: String,
    pub(crate) status_url: Option<String>,
    pub(crate) request_timeout: Duration,
    pub(crate) bind: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            page_url: DEFAULT_PAGE_URL.to_string(),
            status_url: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

impl ViewerConfig {
    pub(crate) fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(page_url) = lookup(PAGE_URL_ENV) {
            config.page_url = page_url;
        }
        config.status_url = lookup(STATUS_URL_ENV).filter(|url| !url.trim().is_empty());
        if let Some(raw) = lookup(TIMEOUT_ENV) {
            let millis = raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{TIMEOUT_ENV} must be a number of milliseconds"))?;
            config.request_timeout = Duration::from_millis(millis.max(1));
        }
        if let Some(bind) = lookup(BIND_ENV) {
            config.bind = bind;
        }

        Ok(config)
    }

    pub(crate) fn apply_overrides(
        mut self,
        page_url: Option<String>,
        status_url: Option<String>,
        timeout_ms: Option<u64>,
    ) -> Self {
        if let Some(page_url) = page_url {
            self.page_url = page_url;
        }
        if status_url.is_some() {
            self.status_url = status_url;
        }
        if let Some(millis) = timeout_ms {
            self.request_timeout = Duration::from_millis(millis.max(1));
        }
        self
    }

    pub(crate) fn status_client(&self) -> Result<StatusClient> {
        let url = match &self.status_url {
            Some(url) => url
                .parse::<Url>()
                .with_context(|| format!("invalid status url: {url}"))?,
            None => status_url_for_page(&self.page_url)?,
        };
        StatusClient::with_timeout(url, self.request_timeout)
    }

    pub(crate) fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid bind address: {}", self.bind))
    }
}
