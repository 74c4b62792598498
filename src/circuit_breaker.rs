//! Circuit breaker guarding calls to the payment gateway.
//!
//! After `failure_threshold` consecutive failures the circuit opens and calls
//! are rejected without touching the network until `cool_down` has passed. The
//! next call is then let through as a trial; `trials_to_close` trial successes
//! close the circuit again, a single trial failure reopens it.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed { consecutive_failures: u32 },
    Open { opened_at: Instant },
    HalfOpen { trial_successes: u32 },
}

impl Phase {
    fn state(self) -> CircuitState {
        match self {
            Phase::Closed { .. } => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

#[derive(Error, Debug)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit breaker is open")]
    CircuitOpen,
    #[error(transparent)]
    ServiceFailure(E),
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    trials_to_close: u32,
    cool_down: Duration,
    phase: Arc<Mutex<Phase>>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cool_down: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            trials_to_close: 1,
            cool_down,
            phase: Arc::new(Mutex::new(Phase::Closed {
                consecutive_failures: 0,
            })),
        }
    }

    /// Runs `operation` unless the circuit is open, recording its outcome.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.admit() {
            return Err(CircuitBreakerError::CircuitOpen);
        }

        let outcome = operation().await;
        self.record(outcome.is_ok());
        outcome.map_err(CircuitBreakerError::ServiceFailure)
    }

    pub fn state(&self) -> CircuitState {
        self.phase().state()
    }

    fn phase(&self) -> MutexGuard<'_, Phase> {
        match self.phase.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn admit(&self) -> bool {
        let mut phase = self.phase();
        match *phase {
            Phase::Open { opened_at } if opened_at.elapsed() >= self.cool_down => {
                *phase = Phase::HalfOpen { trial_successes: 0 };
                true
            }
            Phase::Open { .. } => false,
            Phase::Closed { .. } | Phase::HalfOpen { .. } => true,
        }
    }

    fn record(&self, succeeded: bool) {
        let mut phase = self.phase();
        *phase = match (*phase, succeeded) {
            (Phase::Closed { .. }, true) => Phase::Closed {
                consecutive_failures: 0,
            },
            (Phase::Closed { consecutive_failures }, false) => {
                let failures = consecutive_failures + 1;
                if failures >= self.failure_threshold {
                    tracing::warn!(failures, "gateway circuit opened");
                    Phase::Open {
                        opened_at: Instant::now(),
                    }
                } else {
                    Phase::Closed {
                        consecutive_failures: failures,
                    }
                }
            }
            (Phase::HalfOpen { trial_successes }, true) => {
                if trial_successes + 1 >= self.trials_to_close {
                    tracing::info!("gateway circuit closed");
                    Phase::Closed {
                        consecutive_failures: 0,
                    }
                } else {
                    Phase::HalfOpen {
                        trial_successes: trial_successes + 1,
                    }
                }
            }
            (Phase::HalfOpen { .. }, false) => Phase::Open {
                opened_at: Instant::now(),
            },
            // A call admitted before another one tripped the circuit.
            (open @ Phase::Open { .. }, _) => open,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fail(cb: &CircuitBreaker) -> Result<(), CircuitBreakerError<&'static str>> {
        cb.call(|| async { Err::<(), _>("boom") }).await
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<u8, CircuitBreakerError<&'static str>> {
        cb.call(|| async { Ok::<_, &'static str>(7) }).await
    }

    #[tokio::test]
    async fn opens_after_threshold_and_rejects() {
        let cb = CircuitBreaker::new(2, Duration::from_secs(60));
        assert!(matches!(
            fail(&cb).await,
            Err(CircuitBreakerError::ServiceFailure("boom"))
        ));
        assert_eq!(cb.state(), CircuitState::Closed);
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(matches!(
            succeed(&cb).await,
            Err(CircuitBreakerError::CircuitOpen)
        ));
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let cb = CircuitBreaker::new(2, Duration::from_secs(60));
        let _ = fail(&cb).await;
        assert_eq!(succeed(&cb).await.unwrap(), 7);
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn trial_success_closes_the_circuit() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(0));
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(succeed(&cb).await.unwrap(), 7);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn trial_failure_reopens() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(0));
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
