use std::time::Duration;

const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(5);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1);

/// Doubling delay in `[min, max]`, used to pace accept-error retries.
#[derive(Debug)]
pub struct ExpDelay {
    d: Duration,
    min: Duration,
    max: Duration,
}

impl ExpDelay {
    /// Zero bounds fall back to the defaults (5ms / 1s); an inverted range
    /// collapses to `max`.
    pub fn new(min: Duration, max: Duration) -> Self {
        let min = if min.is_zero() { DEFAULT_MIN_DELAY } else { min };
        let max = if max.is_zero() { DEFAULT_MAX_DELAY } else { max };
        let min = if min > max { max } else { min };
        Self {
            d: Duration::ZERO,
            min,
            max,
        }
    }

    /// Returns the next delay: `min` on the first call, then doubling up to
    /// `max`.
    pub fn get(&mut self) -> Duration {
        if self.d.is_zero() {
            self.d = self.min;
        } else if self.d < self.max {
            self.d = (self.d * 2).min(self.max);
        }
        self.d
    }

    pub fn reset(&mut self) {
        self.d = Duration::ZERO;
    }
}

impl Default for ExpDelay {
    fn default() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }
}
