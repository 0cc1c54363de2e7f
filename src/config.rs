use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{LensError, Result};
use crate::fetch::fetcher::DEFAULT_USER_AGENT;
use crate::fetch::FetcherConfig;
use crate::filter::RuleSource;
use crate::models::ProxyScheme;
use crate::proxy::DialerConfig;

const DEFAULT_PROXY_LIST_URL: &str = "https://api.proxyscrape.com/v4/free-proxy-list/get?request=display_proxies&proxy_format=protocolipport&format=json";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Proxied fetch configuration
    pub fetch: FetchConfig,
    /// Ad/tracker filter configuration
    pub filter: FilterConfig,
    /// Proxy list provider configuration
    pub proxy_list: ProxyListConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
    /// Port to bind to (default: 3000)
    pub port: u16,
    /// Allowed CORS origins (comma-separated, empty = any origin)
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Overall request deadline in seconds
    pub timeout: u64,
    /// Proxy connect + handshake timeout in seconds
    pub connect_timeout: u64,
    /// Maximum redirect hops
    pub max_redirects: usize,
    /// Maximum response body size in bytes
    pub max_body_bytes: usize,
    /// User-Agent sent upstream
    pub user_agent: String,
    /// Proxy schemes this environment cannot dial
    pub disabled_schemes: Vec<ProxyScheme>,
}

#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// EasyList-format filter list files (empty = bundled list)
    pub lists: Vec<PathBuf>,
    /// Documents larger than this are returned unfiltered
    pub max_document_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct ProxyListConfig {
    /// Upstream proxy list endpoint (JSON)
    pub url: String,
    /// Cache lifetime in seconds
    pub ttl: u64,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            server: ServerConfig {
                host: get_env_or("SERVER_HOST", "0.0.0.0"),
                port: parse_env("SERVER_PORT", "3000")?,
                cors_origins: get_env_or("CORS_ORIGINS", "")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            fetch: FetchConfig {
                timeout: parse_env("FETCH_TIMEOUT", "30")?,
                connect_timeout: parse_env("PROXY_CONNECT_TIMEOUT", "10")?,
                max_redirects: parse_env("FETCH_MAX_REDIRECTS", "10")?,
                max_body_bytes: parse_env("FETCH_MAX_BODY_BYTES", "10485760")?,
                user_agent: get_env_or("FETCH_USER_AGENT", DEFAULT_USER_AGENT),
                disabled_schemes: parse_disabled_schemes()?,
            },
            filter: FilterConfig {
                lists: get_env_or("FILTER_LISTS", "")
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(PathBuf::from)
                    .collect(),
                max_document_bytes: parse_env("FILTER_MAX_BYTES", "5242880")?,
            },
            proxy_list: ProxyListConfig {
                url: get_env_or("PROXY_LIST_URL", DEFAULT_PROXY_LIST_URL),
                ttl: parse_env("PROXY_LIST_TTL", "300")?,
            },
            log: LogConfig {
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        })
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout)
    }

    pub fn dialer_config(&self) -> DialerConfig {
        DialerConfig {
            connect_timeout: Duration::from_secs(self.fetch.connect_timeout),
            disabled_schemes: self.fetch.disabled_schemes.clone(),
        }
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            user_agent: self.fetch.user_agent.clone(),
            max_redirects: self.fetch.max_redirects,
            max_body_bytes: self.fetch.max_body_bytes,
        }
    }

    pub fn rule_source(&self) -> RuleSource {
        if self.filter.lists.is_empty() {
            RuleSource::Bundled
        } else {
            RuleSource::Files(self.filter.lists.clone())
        }
    }
}

fn parse_disabled_schemes() -> Result<Vec<ProxyScheme>> {
    get_env_or("PROXY_DISABLED_SCHEMES", "")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            ProxyScheme::parse(s).ok_or_else(|| {
                LensError::InvalidConfig(format!(
                    "PROXY_DISABLED_SCHEMES has unknown scheme: {}",
                    s
                ))
            })
        })
        .collect()
}

/// Parse an environment variable, falling back to `default` when unset
fn parse_env<T: FromStr>(key: &str, default: &str) -> Result<T> {
    let raw = get_env_or(key, default);
    raw.trim()
        .parse()
        .map_err(|_| LensError::InvalidConfig(format!("{} has an invalid value: {}", key, raw)))
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
