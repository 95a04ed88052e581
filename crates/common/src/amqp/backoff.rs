use std::time::Duration;
use tokio::time::Instant;

/// Retry schedule for broker (re)connection attempts.
pub trait BackoffPolicy: Send + Sync {
    /// Delay before the next attempt, or `None` once the budget is spent
    fn next_backoff(&mut self) -> Option<Duration>;

    /// Start a fresh sequence
    fn reset(&mut self);
}

/// Exponentially growing delays, capped per attempt and bounded by a total
/// elapsed-time budget measured from the first `next_backoff` call.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_interval: Duration,
    multiplier: f64,
    max_interval: Duration,
    max_elapsed: Duration,
    current: Duration,
    started: Option<Instant>,
}

impl ExponentialBackoff {
    pub fn new(
        initial_interval: Duration,
        multiplier: f64,
        max_interval: Duration,
        max_elapsed: Duration,
    ) -> Self {
        Self {
            initial_interval,
            multiplier: multiplier.max(1.0),
            max_interval,
            max_elapsed,
            current: initial_interval,
            started: None,
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(500),
            1.5,
            Duration::from_secs(60),
            Duration::from_secs(15 * 60),
        )
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        let started = *self.started.get_or_insert_with(Instant::now);
        let delay = self.current;

        if started.elapsed() + delay > self.max_elapsed {
            return None;
        }

        self.current = self.current.mul_f64(self.multiplier).min(self.max_interval);
        Some(delay)
    }

    fn reset(&mut self) {
        self.current = self.initial_interval;
        self.started = None;
    }
}
