//! Supporting services

pub mod proxy_list;

pub use proxy_list::{ProxyListProvider, ProxySnapshot, ProxySource};
