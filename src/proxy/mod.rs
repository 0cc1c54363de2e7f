//! Upstream proxy plumbing
//!
//! This module provides:
//! - Dialing through HTTP, SOCKS4 and SOCKS5 proxies
//! - The per-request deadline shared by dialing and fetching

pub mod deadline;
pub mod dialer;

pub use deadline::Deadline;
pub use dialer::{DialerConfig, ProxyDialer};
