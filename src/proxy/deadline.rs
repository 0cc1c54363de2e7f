//! Request deadline
//!
//! A single absolute deadline is created per request and passed down
//! through dialing and fetching. Anything run under it is dropped when the
//! deadline passes, which closes sockets and frees buffers owned by that
//! future.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{LensError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    expires_at: Instant,
}

impl Deadline {
    /// Deadline `budget` from now
    pub fn after(budget: Duration) -> Self {
        Self {
            expires_at: Instant::now() + budget,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Drive `fut` until it finishes or the deadline passes.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_expired() {
            return Err(LensError::Timeout);
        }
        tokio::time::timeout_at(self.expires_at, fut)
            .await
            .map_err(|_| LensError::Timeout)?
    }

    /// Like `tokio::time::timeout`, but never past this deadline.
    ///
    /// `on_elapsed` is returned when the local limit fires first; the
    /// deadline itself always yields `Timeout`.
    pub async fn limit<T, F>(&self, local: Duration, on_elapsed: LensError, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let local_at = Instant::now() + local;
        if local_at >= self.expires_at {
            return self.run(fut).await;
        }
        match tokio::time::timeout_at(local_at, fut).await {
            Ok(result) => result,
            Err(_) => Err(on_elapsed),
        }
    }
}
