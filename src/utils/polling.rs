/// Repeating an operation until it settles or a deadline passes
use anyhow::Result;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Configuration for polling operations
#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub timeout: Duration,
    pub interval: Duration,
    pub description: String,
}

impl PollingConfig {
    pub fn new(timeout: Duration, interval: Duration, description: impl Into<String>) -> Self {
        Self {
            timeout,
            interval,
            description: description.into(),
        }
    }

    /// Poll until the condition yields a value or the timeout elapses
    ///
    /// The condition returns `Ok(Some(T))` when done, `Ok(None)` to keep
    /// polling, and `Err` to stop immediately.
    pub async fn poll<F, Fut, T>(&self, mut condition: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        info!("{}...", self.description);

        let start = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            if let Some(value) = condition().await? {
                info!(attempts = attempt, elapsed = ?start.elapsed(), "✓ {}", self.description);
                return Ok(value);
            }

            let elapsed = start.elapsed();
            if elapsed >= self.timeout {
                anyhow::bail!(
                    "Timeout after {} seconds ({} attempts): {}",
                    self.timeout.as_secs(),
                    attempt,
                    self.description
                );
            }

            debug!(attempt, elapsed = ?elapsed, "{} not settled yet", self.description);
            tokio::time::sleep(self.interval.min(self.timeout - elapsed)).await;
        }
    }
}
