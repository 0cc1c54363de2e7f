//! Proxy list provider
//!
//! Pulls a public free-proxy list, keeps the live entries and ranks them
//! so the best candidates come first. Results are cached for a TTL; when
//! the cache is stale exactly one caller refreshes it while the others
//! wait for that result.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::ProxyListConfig;
use crate::error::{LensError, Result};
use crate::models::{rank_listings, ProxyEndpoint, ProxyListing};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const UNKNOWN_COUNTRY: &str = "Unknown";
const UNKNOWN_ANONYMITY: &str = "unknown";

/// A ranked list of proxies and when it was fetched
#[derive(Debug, Clone)]
pub struct ProxySnapshot {
    pub listings: Arc<Vec<ProxyListing>>,
    pub fetched_at: DateTime<Utc>,
}

/// Source of candidate proxies
#[async_trait]
pub trait ProxySource: Send + Sync {
    /// Current ranked proxy list
    async fn snapshot(&self) -> Result<ProxySnapshot>;
}

struct CachedList {
    snapshot: ProxySnapshot,
    expires_at: Instant,
}

/// Upstream-backed proxy source with a TTL cache
pub struct ProxyListProvider {
    client: reqwest::Client,
    url: String,
    ttl: Duration,
    cache: ArcSwapOption<CachedList>,
    refresh: Mutex<()>,
}

impl ProxyListProvider {
    pub fn new(config: &ProxyListConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("Mozilla/5.0")
            .build()
            .map_err(|e| LensError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            ttl: Duration::from_secs(config.ttl),
            cache: ArcSwapOption::empty(),
            refresh: Mutex::new(()),
        })
    }

    fn cached(&self) -> Option<ProxySnapshot> {
        self.cache
            .load_full()
            .filter(|cached| cached.expires_at > Instant::now())
            .map(|cached| cached.snapshot.clone())
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn refresh(&self) -> Result<ProxySnapshot> {
        let _guard = self.refresh.lock().await;

        // Another caller may have refreshed while we waited.
        if let Some(snapshot) = self.cached() {
            return Ok(snapshot);
        }

        let raw: RawProxyList = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| {
                warn!("Failed to fetch proxy list: {}", e);
                LensError::Upstream(format!("Failed to fetch proxies: {}", e))
            })?
            .json()
            .await
            .map_err(|e| LensError::Upstream(format!("Invalid proxy list response: {}", e)))?;

        let total = raw.proxies.len();
        let listings = normalize_listings(raw);
        info!("Loaded {} proxies ({} upstream entries)", listings.len(), total);

        let snapshot = ProxySnapshot {
            listings: Arc::new(listings),
            fetched_at: Utc::now(),
        };
        self.cache.store(Some(Arc::new(CachedList {
            snapshot: snapshot.clone(),
            expires_at: Instant::now() + self.ttl,
        })));

        Ok(snapshot)
    }
}

#[async_trait]
impl ProxySource for ProxyListProvider {
    async fn snapshot(&self) -> Result<ProxySnapshot> {
        match self.cached() {
            Some(snapshot) => Ok(snapshot),
            None => self.refresh().await,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawProxyList {
    #[serde(default)]
    proxies: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawProxy {
    ip: Option<String>,
    port: Option<u16>,
    protocol: Option<String>,
    country: Option<String>,
    anonymity: Option<String>,
    uptime: Option<f64>,
    timeout: Option<f64>,
    proxy: Option<String>,
    alive: Option<bool>,
    ip_data: Option<RawIpData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawIpData {
    country: Option<String>,
}

/// Keep usable entries and rank them; malformed entries are skipped.
fn normalize_listings(raw: RawProxyList) -> Vec<ProxyListing> {
    let mut listings: Vec<ProxyListing> = raw
        .proxies
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<RawProxy>(value) {
            Ok(entry) => normalize(entry),
            Err(e) => {
                debug!("Skipping malformed proxy entry: {}", e);
                None
            }
        })
        .collect();

    rank_listings(&mut listings);
    listings
}

fn normalize(raw: RawProxy) -> Option<ProxyListing> {
    if raw.alive == Some(false) {
        return None;
    }

    let protocol = raw.protocol.as_deref().map(str::to_ascii_lowercase);
    let address = match (&raw.proxy, &protocol, &raw.ip, raw.port) {
        (Some(proxy), _, _, _) => proxy.clone(),
        (None, Some(protocol), Some(ip), Some(port)) => format!("{}://{}:{}", protocol, ip, port),
        _ => return None,
    };
    let endpoint: ProxyEndpoint = match address.parse() {
        Ok(endpoint) => endpoint,
        Err(e) => {
            debug!("Skipping proxy {}: {}", address, e);
            return None;
        }
    };

    let country = raw
        .ip_data
        .and_then(|d| d.country)
        .filter(|c| !c.is_empty())
        .or(raw.country.filter(|c| !c.is_empty()))
        .unwrap_or_else(|| UNKNOWN_COUNTRY.to_string());

    Some(ProxyListing {
        ip: raw.ip.unwrap_or_else(|| endpoint.host().to_string()),
        port: raw.port.unwrap_or_else(|| endpoint.port()),
        protocol: protocol.unwrap_or_else(|| endpoint.scheme().as_str().to_string()),
        country,
        anonymity: raw
            .anonymity
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| UNKNOWN_ANONYMITY.to_string()),
        uptime: raw.uptime,
        timeout: raw.timeout,
        proxy: endpoint,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::testing::{ok_response, status_response, FakeHttpProxy};

    fn raw_list(value: serde_json::Value) -> RawProxyList {
        serde_json::from_value(value).unwrap()
    }

    fn provider(upstream: &FakeHttpProxy, ttl: u64) -> ProxyListProvider {
        ProxyListProvider::new(&ProxyListConfig {
            url: format!("{}/v4/free-proxy-list", upstream.endpoint),
            ttl,
        })
        .unwrap()
    }

    fn upstream_body() -> String {
        json!({
            "proxies": [
                {"ip": "10.0.0.1", "port": 8080, "protocol": "HTTP", "proxy": "http://10.0.0.1:8080",
                 "uptime": 70.0, "timeout": 300.0, "alive": true},
                {"ip": "10.0.0.2", "port": 1080, "protocol": "socks5", "proxy": "socks5://10.0.0.2:1080",
                 "uptime": 99.5, "country": "DE", "ip_data": {"country": "NL"}, "anonymity": "elite"},
                {"ip": "10.0.0.3", "port": 3128, "protocol": "http", "proxy": "http://10.0.0.3:3128",
                 "uptime": 100.0, "alive": false}
            ]
        })
        .to_string()
    }

    #[test]
    fn test_normalize_filters_dead_and_ranks() {
        let listings = normalize_listings(raw_list(serde_json::from_str(&upstream_body()).unwrap()));

        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].ip, "10.0.0.2");
        assert_eq!(listings[0].country, "NL");
        assert_eq!(listings[0].anonymity, "elite");
        assert_eq!(listings[1].protocol, "http");
        assert_eq!(listings[1].country, "Unknown");
        assert_eq!(listings[1].anonymity, "unknown");
        assert_eq!(listings[1].proxy.to_string(), "http://10.0.0.1:8080");
    }

    #[test]
    fn test_normalize_builds_missing_proxy_string() {
        let listings = normalize_listings(raw_list(json!({
            "proxies": [{"ip": "10.0.0.9", "port": 4145, "protocol": "SOCKS4", "country": "FR"}]
        })));

        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].proxy.to_string(), "socks4://10.0.0.9:4145");
        assert_eq!(listings[0].country, "FR");
    }

    #[test]
    fn test_normalize_skips_malformed_entries() {
        let listings = normalize_listings(raw_list(json!({
            "proxies": [
                {"ip": "10.0.0.1", "port": "not-a-port", "protocol": "http"},
                {"proxy": "ftp://10.0.0.2:21"},
                {"ip": "10.0.0.3"},
                {"proxy": "http://10.0.0.4:80"}
            ]
        })));

        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].ip, "10.0.0.4");
        assert_eq!(listings[0].port, 80);
        assert_eq!(listings[0].protocol, "http");
    }

    #[tokio::test]
    async fn test_provider_caches_within_ttl() {
        let upstream =
            FakeHttpProxy::start(vec![ok_response(Some("application/json"), &upstream_body())])
                .await;
        let provider = provider(&upstream, 300);

        let first = provider.snapshot().await.unwrap();
        let second = provider.snapshot().await.unwrap();

        assert_eq!(first.listings.len(), 2);
        assert!(Arc::ptr_eq(&first.listings, &second.listings));
        assert_eq!(upstream.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_provider_refresh_is_single_flight() {
        let upstream =
            FakeHttpProxy::start(vec![ok_response(Some("application/json"), &upstream_body())])
                .await;
        let provider = Arc::new(provider(&upstream, 300));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let provider = provider.clone();
            tasks.spawn(async move { provider.snapshot().await.unwrap().listings.len() });
        }
        while let Some(len) = tasks.join_next().await {
            assert_eq!(len.unwrap(), 2);
        }

        assert_eq!(upstream.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_provider_refetches_after_expiry() {
        let upstream = FakeHttpProxy::start(vec![
            ok_response(Some("application/json"), &upstream_body()),
            ok_response(Some("application/json"), r#"{"proxies": []}"#),
        ])
        .await;
        let provider = provider(&upstream, 0);

        assert_eq!(provider.snapshot().await.unwrap().listings.len(), 2);
        assert!(provider.snapshot().await.unwrap().listings.is_empty());
        assert_eq!(upstream.requests().await.len(), 2);
    }

    #[tokio::test]
    async fn test_provider_upstream_failure_is_upstream_error() {
        let upstream = FakeHttpProxy::start(vec![status_response(500, "Internal Server Error")]).await;
        let provider = provider(&upstream, 300);

        let err = provider.snapshot().await.unwrap_err();
        assert!(matches!(err, LensError::Upstream(_)));
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_GATEWAY);
    }
}
