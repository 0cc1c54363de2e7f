//! HTTP API
//!
//! Thin axum boundary over the fetch orchestrator and proxy list.

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;

pub use server::{ApiServer, AppState};
