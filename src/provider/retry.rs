use std::time::Duration;

use super::transport::TransportError;

/// Blocks the calling thread between attempts. Swappable so tests can
/// observe the backoff without waiting for it.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
}

impl RetryPolicy {
    /// Three total attempts, sleeping 2s then 4s between them.
    pub fn timeouts_only() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            multiplier: 2,
        }
    }

    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            multiplier: 1,
        }
    }

    /// Delay slept after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::timeouts_only()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryError {
    pub attempts: u32,
    pub last_error: TransportError,
}

#[derive(Debug)]
struct RetryState {
    attempt: u32,
    last_error: Option<TransportError>,
    next_delay: Duration,
}

enum Transition<T> {
    Finished(T),
    Backoff(Duration),
    GiveUp(TransportError),
}

impl RetryState {
    fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempt: 0,
            last_error: None,
            next_delay: policy.initial_delay,
        }
    }

    fn observe<T>(
        &mut self,
        policy: &RetryPolicy,
        outcome: Result<T, TransportError>,
    ) -> Transition<T> {
        match outcome {
            Ok(value) => Transition::Finished(value),
            Err(err) if err.is_timeout() && self.attempt < policy.max_attempts => {
                let delay = self.next_delay;
                self.next_delay = policy.delay_after(self.attempt + 1);
                self.last_error = Some(err);
                Transition::Backoff(delay)
            }
            Err(err) => Transition::GiveUp(err),
        }
    }
}

/// Runs `operation` until it succeeds, fails with a non-timeout error, or
/// the attempt budget is spent. Only timeouts are retried.
pub fn run_with_retry<T, F>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    mut operation: F,
) -> Result<T, RetryError>
where
    F: FnMut(u32) -> Result<T, TransportError>,
{
    let mut state = RetryState::new(policy);

    loop {
        state.attempt += 1;
        match state.observe(policy, operation(state.attempt)) {
            Transition::Finished(value) => return Ok(value),
            Transition::Backoff(delay) => {
                if let Some(err) = &state.last_error {
                    tracing::warn!(
                        "attempt {}/{} timed out ({}), retrying in {:?}",
                        state.attempt,
                        policy.max_attempts,
                        err,
                        delay
                    );
                }
                sleeper.sleep(delay);
            }
            Transition::GiveUp(last_error) => {
                return Err(RetryError {
                    attempts: state.attempt,
                    last_error,
                })
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::Sleeper;

    #[derive(Default)]
    pub struct RecordingSleeper {
        pub slept: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub fn delays(&self) -> Vec<Duration> {
            self.slept.lock().unwrap().clone()
        }
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }
}
