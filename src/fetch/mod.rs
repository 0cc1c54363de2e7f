//! Fetching pages through upstream proxies
//!
//! - HTTP/1.1 over hyper client connections
//! - TLS to the target through CONNECT or SOCKS tunnels
//! - Redirect following with a hop cap

pub mod fetcher;
pub mod tls;

pub use fetcher::{ContentFetcher, FetchedResponse, FetcherConfig};
