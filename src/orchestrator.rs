//! Fetch orchestrator
//!
//! Drives one browse request through its stages:
//! `Validating -> Fetching (dial + transfer) -> Filtering -> Done`, with any
//! stage able to fail. Filtering failures degrade to the unfiltered body
//! and never fail the request.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::Config;
use crate::error::Result;
use crate::fetch::ContentFetcher;
use crate::filter::{FilterOutcome, LazyEngine, MarkupFilter};
use crate::models::{is_html, FetchRequest, FetchResult, FilterReport};
use crate::proxy::{Deadline, ProxyDialer};

/// Pipeline stage, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    Fetching,
    Filtering,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validating => "validating",
            Stage::Fetching => "fetching",
            Stage::Filtering => "filtering",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Configuration for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Deadline covering dial and transfer
    pub request_timeout: Duration,
    /// Documents above this size are returned unfiltered
    pub max_filter_bytes: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_filter_bytes: 5 * 1024 * 1024, // 5 MB
        }
    }
}

/// Composes dialing, fetching and filtering for each request
pub struct FetchOrchestrator {
    fetcher: ContentFetcher,
    markup: MarkupFilter,
    engine: Arc<LazyEngine>,
    config: OrchestratorConfig,
}

impl FetchOrchestrator {
    pub fn new(fetcher: ContentFetcher, engine: Arc<LazyEngine>, config: OrchestratorConfig) -> Self {
        Self {
            fetcher,
            markup: MarkupFilter::new(),
            engine,
            config,
        }
    }

    /// Wire up the pipeline from application configuration
    pub fn from_config(config: &Config, engine: Arc<LazyEngine>) -> Result<Self> {
        let dialer = ProxyDialer::new(config.dialer_config());
        let fetcher = ContentFetcher::new(dialer, config.fetcher_config())?;
        Ok(Self::new(
            fetcher,
            engine,
            OrchestratorConfig {
                request_timeout: config.request_timeout(),
                max_filter_bytes: config.filter.max_document_bytes,
            },
        ))
    }

    pub fn engine(&self) -> &Arc<LazyEngine> {
        &self.engine
    }

    /// Fetch `raw_url` through `raw_proxy`, optionally stripping ads.
    #[instrument(skip(self), fields(request_id = %uuid::Uuid::new_v4()))]
    pub async fn handle(
        &self,
        raw_url: &str,
        raw_proxy: &str,
        filter_enabled: bool,
    ) -> Result<FetchResult> {
        debug!(stage = %Stage::Validating);
        let request = FetchRequest::parse(raw_url, raw_proxy, filter_enabled).map_err(|e| {
            debug!(stage = %Stage::Failed, error = %e);
            e
        })?;

        debug!(stage = %Stage::Fetching, proxy = %request.proxy);
        let deadline = Deadline::after(self.config.request_timeout);
        let fetched = self
            .fetcher
            .fetch(&request.target, &request.proxy, &deadline)
            .await
            .map_err(|e| {
                warn!(
                    stage = %Stage::Failed,
                    kind = e.kind(),
                    proxy_failure = e.is_proxy_failure(),
                    proxy = %request.proxy,
                    "Fetch failed: {}",
                    e
                );
                e
            })?;

        let (body, filter) = if !request.filter_enabled {
            (fetched.body, FilterReport::NotRequested)
        } else if !is_html(&fetched.content_type) {
            (fetched.body, FilterReport::NotHtml)
        } else {
            debug!(stage = %Stage::Filtering);
            self.filter_document(fetched.body, fetched.final_url.clone())
                .await
        };

        info!(
            stage = %Stage::Done,
            status = fetched.status.as_u16(),
            bytes = body.len(),
            filter = ?filter,
            "Fetched {} through {}",
            fetched.final_url,
            request.proxy
        );

        Ok(FetchResult {
            status_code: fetched.status.as_u16(),
            content_type: fetched.content_type,
            body,
            final_url: fetched.final_url,
            proxy: request.proxy,
            filter_requested: request.filter_enabled,
            filter,
        })
    }

    /// Best-effort filtering; on any failure the original body is kept.
    async fn filter_document(&self, body: Bytes, page: Url) -> (Bytes, FilterReport) {
        if body.len() > self.config.max_filter_bytes {
            return degraded(
                body,
                format!("document exceeds {} bytes", self.config.max_filter_bytes),
            );
        }

        let html = match std::str::from_utf8(&body) {
            Ok(html) => html.to_string(),
            Err(_) => return degraded(body, "document is not valid UTF-8".to_string()),
        };

        let engine = self.engine.clone();
        let markup = self.markup;
        // Parsing and the first engine build are CPU-bound.
        let task = tokio::task::spawn_blocking(move || markup.filter(html, &page, engine.get()));

        match task.await {
            Ok(FilterOutcome::Unchanged(_)) => (body, FilterReport::Applied { removed: 0 }),
            Ok(FilterOutcome::Filtered { html, removed }) => {
                (Bytes::from(html), FilterReport::Applied { removed })
            }
            Err(e) => degraded(body, format!("filter task failed: {}", e)),
        }
    }
}

fn degraded(body: Bytes, reason: String) -> (Bytes, FilterReport) {
    warn!("Filtering skipped: {}", reason);
    (body, FilterReport::Degraded { reason })
}
