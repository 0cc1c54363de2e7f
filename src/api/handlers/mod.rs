//! API request handlers

pub mod browse;
pub mod health;
pub mod proxies;
