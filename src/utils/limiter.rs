use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time;

/// Counting semaphore with a bounded acquire wait.
///
/// `allow` tries a non-blocking acquire first and only then waits up to the
/// limiter's timeout. A zero timeout makes `allow` strictly non-blocking.
/// Every successful `allow` must be balanced by exactly one `revert`.
#[derive(Debug, Clone)]
pub struct TimeoutLimiter {
    sem: Arc<Semaphore>,
    timeout: Duration,
}

impl TimeoutLimiter {
    pub fn new(n: u32, timeout: Duration) -> Self {
        Self {
            sem: Arc::new(Semaphore::new(n as usize)),
            timeout,
        }
    }

    /// Returns true if a permit was acquired, false on timeout.
    pub async fn allow(&self) -> bool {
        if let Ok(permit) = self.sem.try_acquire() {
            permit.forget();
            return true;
        }
        if self.timeout.is_zero() {
            return false;
        }
        match time::timeout(self.timeout, self.sem.acquire()).await {
            Ok(Ok(permit)) => {
                permit.forget();
                true
            }
            // semaphore closed or timer fired before a permit freed up
            _ => false,
        }
    }

    /// Releases one permit.
    pub fn revert(&self) {
        self.sem.add_permits(1);
    }

    #[cfg(test)]
    pub(crate) fn available(&self) -> usize {
        self.sem.available_permits()
    }
}
