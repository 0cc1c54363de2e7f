//! ProxyLens - Proxied Browsing Service
//!
//! Fetches web pages through user-selected third-party proxies and
//! optionally strips ad/tracker elements before handing them back.
//!
//! ## Features
//!
//! - HTTP, HTTPS (CONNECT), SOCKS4/4a, and SOCKS5 proxy support
//! - No direct-connection fallback: a failed proxy fails the request
//! - One deadline per request, covering dial and transfer
//! - EasyList-compatible ad/tracker filtering with graceful degradation
//! - Cached, ranked public proxy list

pub mod api;
pub mod config;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod models;
pub mod orchestrator;
pub mod proxy;
pub mod services;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{LensError, Result};
pub use orchestrator::FetchOrchestrator;
