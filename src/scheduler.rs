//! Fixed-interval repetition of a [`Cycle`].

use crate::pipeline::Cycle;
use std::time::Duration;

/// Interval between iterations when none is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Clone, Copy, Debug)]
pub struct Scheduler {
    interval: Duration,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run `cycle` now and then once per interval, forever.
    ///
    /// A failed iteration is logged and the loop waits for the next one.
    /// Stop it by dropping the future (e.g. from a `select!` on Ctrl-C).
    pub async fn run<C: Cycle>(&self, cycle: &mut C) {
        let mut iteration: u64 = 0;
        loop {
            iteration += 1;
            match cycle.run_once().await {
                Ok(report) => tracing::debug!(iteration, samples = report.samples, "Iteration succeeded"),
                Err(e) => tracing::warn!(iteration, error = %e, "⚠️ Iteration failed, retrying next cycle"),
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
