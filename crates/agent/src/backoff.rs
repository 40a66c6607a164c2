use std::time::Duration;

use rand::Rng;

/// Upper bound on the backoff base.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Exponential reconnect backoff with up to 50% random jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    current: Duration,
}

impl Backoff {
    #[must_use]
    pub fn new(initial: Duration) -> Self {
        let initial = initial.min(MAX_BACKOFF);
        Self {
            initial,
            current: initial,
        }
    }

    /// Base delay for the next failure.
    #[must_use]
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Record a failure: returns the base to wait on and doubles the next one.
    pub fn next_base(&mut self) -> Duration {
        let base = self.current;
        self.current = (base * 2).min(MAX_BACKOFF);
        base
    }

    /// Record a failure and return the full delay (base plus jitter).
    pub fn next_delay(&mut self) -> Duration {
        let base = self.next_base();
        base + jitter(base)
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Uniform in `[0, base / 2)`.
#[must_use]
pub fn jitter(base: Duration) -> Duration {
    base.mul_f64(rand::rng().random_range(0.0..0.5))
}
