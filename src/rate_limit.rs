use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::debug;

/// Fixed delay inserted between consecutive page fetches
///
/// The delay only suspends the task running the search session, never the
/// runtime. A zero delay makes [`PageThrottle::pause`] a no-op.
#[derive(Debug)]
pub struct PageThrottle {
    /// Pause before every page after the first
    delay: Duration,
    /// Number of pauses taken so far
    pauses: usize,
    /// Total time spent paused
    paused_for: Duration,
}

impl PageThrottle {
    /// Creates a throttle
    ///
    /// # Arguments
    ///
    /// * `delay_ms` - Milliseconds to wait between pages, 0 disables throttling
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            pauses: 0,
            paused_for: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.delay.is_zero()
    }

    /// Waits out the configured delay before the next page is requested
    pub async fn pause(&mut self) {
        if !self.is_enabled() {
            return;
        }

        debug!("Throttling for {:?} before next page", self.delay);
        let started = Instant::now();
        sleep(self.delay).await;

        self.pauses += 1;
        self.paused_for += started.elapsed();
    }

    pub fn pauses(&self) -> usize {
        self.pauses
    }

    pub fn paused_for(&self) -> Duration {
        self.paused_for
    }
}
