//! Pacing policies awaited by the job scheduler after every job.

use std::time::Duration;

use async_trait::async_trait;

#[async_trait]
pub trait Throttle: Send + Sync {
    /// Suspend until the next job may start.
    async fn wait(&self);
}

/// Static spacing: always sleep the same interval.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    interval: Duration,
}

impl FixedDelay {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[async_trait]
impl Throttle for FixedDelay {
    async fn wait(&self) {
        tokio::time::sleep(self.interval).await;
    }
}
