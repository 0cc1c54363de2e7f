//! Proxy dialer for HTTP and SOCKS upstreams
//!
//! Opens a connection routed through a caller-chosen proxy. There is no
//! direct-connect path: if the proxy cannot be used the dial fails.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_socks::tcp::socks4::Socks4Stream;
use tokio_socks::tcp::Socks5Stream;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{LensError, Result};
use crate::models::{format_authority, ProxyEndpoint, ProxyScheme};
use crate::proxy::deadline::Deadline;

/// Largest CONNECT response header block we accept
const MAX_CONNECT_RESPONSE: usize = 8 * 1024;

/// Trait for streams the fetcher can speak HTTP over
pub trait ProxyConnection: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> ProxyConnection for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// How the HTTP request line must be written on a dialed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestForm {
    /// Plain HTTP forwarded by an HTTP proxy: `GET http://host/path`
    Absolute,
    /// Tunnelled to the target: `GET /path`
    Origin,
}

/// An established connection through a proxy
pub struct DialedConnection {
    pub stream: TcpStream,
    pub form: RequestForm,
}

/// Dialer configuration
#[derive(Debug, Clone)]
pub struct DialerConfig {
    /// Bound on TCP connect plus proxy handshake
    pub connect_timeout: Duration,
    /// Schemes this environment cannot dial
    pub disabled_schemes: Vec<ProxyScheme>,
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            disabled_schemes: Vec::new(),
        }
    }
}

/// Opens connections through upstream proxies
#[derive(Debug, Clone)]
pub struct ProxyDialer {
    config: DialerConfig,
}

impl ProxyDialer {
    pub fn new(config: DialerConfig) -> Self {
        Self { config }
    }

    /// Connect to `target` through `proxy`.
    ///
    /// The TCP connect and the proxy handshake share `connect_timeout`;
    /// neither may run past `deadline`.
    #[instrument(skip(self, deadline), fields(proxy = %proxy, target = %target))]
    pub async fn dial(
        &self,
        proxy: &ProxyEndpoint,
        target: &Url,
        deadline: &Deadline,
    ) -> Result<DialedConnection> {
        let scheme = proxy.scheme();
        if self.config.disabled_schemes.contains(&scheme) {
            debug!("Refusing to dial disabled proxy scheme {}", scheme);
            return Err(LensError::ProxyUnsupported(scheme));
        }

        let (target_host, target_port) = target_host_port(target)?;
        let tunnel = scheme.is_socks() || target.scheme() == "https";

        let timed_out = LensError::ProxyUnreachable(format!(
            "{} did not complete connect within {:?}",
            proxy, self.config.connect_timeout
        ));

        deadline
            .limit(self.config.connect_timeout, timed_out, async {
                let stream = connect_tcp(proxy).await?;

                let stream = match scheme {
                    ProxyScheme::Http | ProxyScheme::Https if !tunnel => {
                        debug!("Forwarding plain HTTP through {}", proxy);
                        return Ok(DialedConnection {
                            stream,
                            form: RequestForm::Absolute,
                        });
                    }
                    ProxyScheme::Http | ProxyScheme::Https => {
                        http_connect(stream, &target_host, target_port).await?
                    }
                    ProxyScheme::Socks4 => Socks4Stream::connect_with_socket(
                        stream,
                        (target_host.as_str(), target_port),
                    )
                    .await
                    .map_err(|e| {
                        LensError::ProxyProtocol(format!("SOCKS4 negotiation failed: {}", e))
                    })?
                    .into_inner(),
                    ProxyScheme::Socks5 => Socks5Stream::connect_with_socket(
                        stream,
                        (target_host.as_str(), target_port),
                    )
                    .await
                    .map_err(|e| {
                        LensError::ProxyProtocol(format!("SOCKS5 negotiation failed: {}", e))
                    })?
                    .into_inner(),
                };

                debug!("Tunnel to {}:{} established", target_host, target_port);
                Ok(DialedConnection {
                    stream,
                    form: RequestForm::Origin,
                })
            })
            .await
    }
}

async fn connect_tcp(proxy: &ProxyEndpoint) -> Result<TcpStream> {
    TcpStream::connect(proxy.socket_addr())
        .await
        .map_err(|e| LensError::ProxyUnreachable(format!("TCP connect to {} failed: {}", proxy, e)))
}

/// Open an HTTP CONNECT tunnel over `stream`
pub async fn http_connect<S>(mut stream: S, target_host: &str, target_port: u16) -> Result<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let authority = format_authority(target_host, target_port);
    let request = format!(
        "CONNECT {} HTTP/1.1\r\nHost: {}\r\nProxy-Connection: keep-alive\r\n\r\n",
        authority, authority
    );

    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| LensError::ProxyProtocol(format!("Failed to send CONNECT: {}", e)))?;

    let mut response = Vec::with_capacity(512);
    let mut chunk = [0u8; 512];
    while !response.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await.map_err(|e| {
            LensError::ProxyProtocol(format!("Failed to read CONNECT response: {}", e))
        })?;
        if n == 0 {
            return Err(LensError::ProxyProtocol(
                "Proxy closed the connection during CONNECT".to_string(),
            ));
        }
        response.extend_from_slice(&chunk[..n]);
        if response.len() > MAX_CONNECT_RESPONSE {
            return Err(LensError::ProxyProtocol(
                "CONNECT response headers too large".to_string(),
            ));
        }
    }

    let response_str = String::from_utf8_lossy(&response);
    let status_line = response_str.lines().next().unwrap_or_default();
    let status = status_line
        .strip_prefix("HTTP/1.1 ")
        .or_else(|| status_line.strip_prefix("HTTP/1.0 "))
        .and_then(|rest| rest.get(..3))
        .and_then(|code| code.parse::<u16>().ok());

    match status {
        Some(code) if (200..300).contains(&code) => Ok(stream),
        Some(_) => Err(LensError::ProxyProtocol(format!(
            "CONNECT rejected: {}",
            status_line
        ))),
        None => Err(LensError::ProxyProtocol(format!(
            "Malformed CONNECT response: {}",
            status_line
        ))),
    }
}

/// Host (without IPv6 brackets) and port of a target URL
pub fn target_host_port(target: &Url) -> Result<(String, u16)> {
    let host = match target.host() {
        Some(url::Host::Domain(domain)) => domain.to_string(),
        Some(url::Host::Ipv4(ip)) => ip.to_string(),
        Some(url::Host::Ipv6(ip)) => ip.to_string(),
        None => {
            return Err(LensError::InvalidInput(format!(
                "URL has no host: {}",
                target
            )))
        }
    };
    let port = target
        .port_or_known_default()
        .ok_or_else(|| LensError::InvalidInput(format!("URL has no port: {}", target)))?;
    Ok((host, port))
}
