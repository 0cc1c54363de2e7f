//! Content fetcher
//!
//! Performs a single GET through a proxy, following redirects, under one
//! request deadline. No retries: a failing proxy is reported to the caller.

use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Limited};
use hyper::header::{
    ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CONNECTION, CONTENT_TYPE, HOST, LOCATION, USER_AGENT,
};
use hyper::{Request, StatusCode};
use hyper_util::rt::TokioIo;
use tokio_rustls::TlsConnector;
use tracing::{debug, instrument};
use url::{Position, Url};

use crate::error::{LensError, Result};
use crate::fetch::tls;
use crate::models::ProxyEndpoint;
use crate::proxy::deadline::Deadline;
use crate::proxy::dialer::{target_host_port, ProxyConnection, ProxyDialer, RequestForm};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const DEFAULT_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// Content type assumed when the upstream does not send one
pub const DEFAULT_CONTENT_TYPE: &str = "text/html";

/// Configuration for the content fetcher
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub user_agent: String,
    /// Maximum redirect hops before giving up
    pub max_redirects: usize,
    /// Maximum response body size
    pub max_body_bytes: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_redirects: 10,
            max_body_bytes: 10 * 1024 * 1024, // 10 MB
        }
    }
}

/// Final response after redirects
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub content_type: String,
    pub body: Bytes,
    pub final_url: Url,
}

/// Fetches pages through an upstream proxy
#[derive(Clone)]
pub struct ContentFetcher {
    dialer: ProxyDialer,
    tls: TlsConnector,
    config: FetcherConfig,
}

impl ContentFetcher {
    pub fn new(dialer: ProxyDialer, config: FetcherConfig) -> Result<Self> {
        Ok(Self {
            dialer,
            tls: tls::connector()?,
            config,
        })
    }

    /// GET `target` through `proxy`; everything runs under `deadline`.
    #[instrument(skip(self, deadline), fields(target = %target, proxy = %proxy))]
    pub async fn fetch(
        &self,
        target: &Url,
        proxy: &ProxyEndpoint,
        deadline: &Deadline,
    ) -> Result<FetchedResponse> {
        deadline
            .run(self.fetch_following_redirects(target, proxy, deadline))
            .await
    }

    async fn fetch_following_redirects(
        &self,
        target: &Url,
        proxy: &ProxyEndpoint,
        deadline: &Deadline,
    ) -> Result<FetchedResponse> {
        let mut current = target.clone();
        let mut hops = 0;

        loop {
            let (parts, body) = self.fetch_once(&current, proxy, deadline).await?;

            if is_followed_redirect(parts.status) {
                if let Some(location) = parts.headers.get(LOCATION) {
                    if hops >= self.config.max_redirects {
                        return Err(LensError::TooManyRedirects { hops });
                    }
                    hops += 1;
                    current = next_location(&current, location)?;
                    debug!(hop = hops, location = %current, "Following redirect");
                    continue;
                }
            }

            if !parts.status.is_success() {
                return Err(LensError::UpstreamHttp {
                    status: parts.status.as_u16(),
                });
            }

            let content_type = parts
                .headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_string();

            debug!(
                status = %parts.status,
                bytes = body.len(),
                redirects = hops,
                "Fetch complete"
            );

            return Ok(FetchedResponse {
                status: parts.status,
                content_type,
                body,
                final_url: current,
            });
        }
    }

    /// One request on a freshly dialed connection
    async fn fetch_once(
        &self,
        url: &Url,
        proxy: &ProxyEndpoint,
        deadline: &Deadline,
    ) -> Result<(http::response::Parts, Bytes)> {
        let conn = self.dialer.dial(proxy, url, deadline).await?;
        let request = self.build_request(url, conn.form)?;

        let io: Box<dyn ProxyConnection> = if url.scheme() == "https" {
            let (host, _) = target_host_port(url)?;
            Box::new(tls::handshake(&self.tls, &host, conn.stream).await?)
        } else {
            Box::new(conn.stream)
        };

        exchange(io, request, self.config.max_body_bytes).await
    }

    fn build_request(&self, url: &Url, form: RequestForm) -> Result<Request<Empty<Bytes>>> {
        let uri = match form {
            RequestForm::Absolute => &url[..Position::AfterQuery],
            RequestForm::Origin => &url[Position::BeforePath..Position::AfterQuery],
        };
        let host = &url[Position::BeforeHost..Position::AfterPort];

        Request::builder()
            .method(hyper::Method::GET)
            .uri(uri)
            .header(HOST, host)
            .header(USER_AGENT, &self.config.user_agent)
            .header(ACCEPT, DEFAULT_ACCEPT)
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.5")
            .header(ACCEPT_ENCODING, "identity")
            .header("Upgrade-Insecure-Requests", "1")
            .header(CONNECTION, "close")
            .body(Empty::new())
            .map_err(|e| LensError::InvalidInput(format!("Failed to build request: {}", e)))
    }
}

/// Send `request` on `io` and read the whole response body.
///
/// The hyper connection is driven inside this future rather than spawned,
/// so dropping the future tears the socket down with it.
async fn exchange(
    io: Box<dyn ProxyConnection>,
    request: Request<Empty<Bytes>>,
    max_body_bytes: usize,
) -> Result<(http::response::Parts, Bytes)> {
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(io))
        .await
        .map_err(|e| LensError::Upstream(format!("HTTP handshake failed: {}", e)))?;
    tokio::pin!(conn);

    let exchange = async move {
        let response = sender
            .send_request(request)
            .await
            .map_err(|e| LensError::Upstream(format!("Request failed: {}", e)))?;

        let (parts, body) = response.into_parts();
        let body = Limited::new(body, max_body_bytes)
            .collect()
            .await
            .map_err(|e| {
                if e.downcast_ref::<http_body_util::LengthLimitError>().is_some() {
                    LensError::Upstream(format!(
                        "Response body exceeds {} bytes",
                        max_body_bytes
                    ))
                } else {
                    LensError::Upstream(format!("Failed to read response: {}", e))
                }
            })?
            .to_bytes();

        Ok::<_, LensError>((parts, body))
    };
    tokio::pin!(exchange);

    tokio::select! {
        result = &mut exchange => result,
        conn_result = &mut conn => {
            conn_result.map_err(|e| LensError::Upstream(format!("Connection error: {}", e)))?;
            exchange.await
        }
    }
}

/// Only these statuses are followed; other 3xx are final responses.
fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

fn next_location(current: &Url, location: &http::HeaderValue) -> Result<Url> {
    let location = location
        .to_str()
        .map_err(|_| LensError::Upstream("Redirect Location is not valid text".to_string()))?;
    let next = current
        .join(location)
        .map_err(|e| LensError::Upstream(format!("Invalid redirect Location '{}': {}", location, e)))?;

    if !matches!(next.scheme(), "http" | "https") {
        return Err(LensError::Upstream(format!(
            "Refusing redirect to unsupported scheme: {}",
            next.scheme()
        )));
    }
    Ok(next)
}
