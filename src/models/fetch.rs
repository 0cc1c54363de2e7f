use bytes::Bytes;
use serde::Serialize;
use url::Url;

use super::endpoint::ProxyEndpoint;
use crate::error::{LensError, Result};

/// A validated browse request
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub target: Url,
    pub proxy: ProxyEndpoint,
    pub filter_enabled: bool,
}

impl FetchRequest {
    /// Validate raw caller input without touching the network
    pub fn parse(raw_url: &str, raw_proxy: &str, filter_enabled: bool) -> Result<Self> {
        let raw_url = raw_url.trim();
        let raw_proxy = raw_proxy.trim();
        if raw_url.is_empty() || raw_proxy.is_empty() {
            return Err(LensError::InvalidInput(
                "URL and proxy are required".to_string(),
            ));
        }

        let target = Url::parse(raw_url)
            .map_err(|_| LensError::InvalidInput("Invalid URL format".to_string()))?;
        if !matches!(target.scheme(), "http" | "https") {
            return Err(LensError::InvalidInput(format!(
                "Unsupported URL scheme: {}",
                target.scheme()
            )));
        }
        if target.host_str().map_or(true, str::is_empty) {
            return Err(LensError::InvalidInput("URL must include a host".to_string()));
        }

        let proxy = raw_proxy.parse()?;

        Ok(Self {
            target,
            proxy,
            filter_enabled,
        })
    }
}

/// What the markup filter did for a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FilterReport {
    NotRequested,
    /// Filtering was requested but the content is not HTML
    NotHtml,
    Applied { removed: usize },
    /// Filtering was attempted and abandoned; the original body was kept
    Degraded { reason: String },
}

/// The response envelope handed back to the caller
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status_code: u16,
    pub content_type: String,
    pub body: Bytes,
    pub final_url: Url,
    pub proxy: ProxyEndpoint,
    pub filter_requested: bool,
    pub filter: FilterReport,
}

impl FetchResult {
    /// True only when the filter actually ran over the document
    pub fn applied_filter(&self) -> bool {
        matches!(self.filter, FilterReport::Applied { .. })
    }

    pub fn removed_elements(&self) -> usize {
        match self.filter {
            FilterReport::Applied { removed } => removed,
            _ => 0,
        }
    }
}

/// Whether a content type should go through the markup filter
pub fn is_html(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    content_type.contains("text/html") || content_type.contains("application/xhtml+xml")
}
