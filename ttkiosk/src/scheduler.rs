//! Timer seam for the poll loops.
//!
//! The controller only ever waits through a [`Scheduler`], so every loop is
//! "do the work, then arm the next tick". Tests run on tokio's paused clock
//! or plug in their own scheduler.

use std::time::Duration;

use async_trait::async_trait;

#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TokioScheduler;

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
