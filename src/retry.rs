use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::capability::BackendError;

/// Exponential backoff shared by every backend call in the pipeline.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
    /// Upper bound for a single call; elapsing counts as a transient failure.
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            factor: 2.0,
            max_delay: Duration::from_secs(60),
            call_timeout: Duration::from_secs(300),
        }
    }
}

/// Result of a retried call together with how many attempts it took.
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, BackendError>,
    pub attempts: u32,
}

impl<T> Attempted<T> {
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

impl RetryPolicy {
    /// Delay slept after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(30) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.factor.powi(exp);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }

    pub async fn run<F, Fut, T>(&self, label: &str, mut operation: F) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!(label, attempt, max_attempts, "calling backend");
            let outcome = match timeout(self.call_timeout, operation()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(BackendError::timed_out(self.call_timeout)),
            };
            match outcome {
                Ok(value) => {
                    return Attempted {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(err) if !err.is_transient() || attempt >= max_attempts => {
                    return Attempted {
                        result: Err(err),
                        attempts: attempt,
                    };
                }
                Err(err) => {
                    let wait = self.delay_after(attempt);
                    warn!(label, attempt, wait = ?wait, error = %err, "retrying backend call");
                    if !wait.is_zero() {
                        sleep(wait).await;
                    }
                }
            }
        }
    }
}
