//! Injectable sleep used by retry loops.
//!
//! Production code sleeps on the tokio timer; tests inject a fake that records
//! requested delays and returns immediately.

use async_trait::async_trait;
use std::time::Duration;

/// Suspends the caller for a duration.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
