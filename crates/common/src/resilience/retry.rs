//! Bounded retry orchestration for operations that can be re-attempted
//!
//! The executor drives an explicit state machine:
//!
//! - `Running`: an attempt is in flight.
//! - `RetryPending`: the last attempt failed with a retryable error and the
//!   executor is sleeping before the next one.
//! - Done: the [`RetryOutcome`] returned from [`RetryExecutor::run`].
//!
//! Operations classify their own failures by returning an
//! [`AttemptOutcome`]; the executor never inspects the error. Only
//! `Retryable` leads to another attempt, and only while the caller's time
//! budget allows it. Cancellation is observed both during an attempt and
//! during a backoff sleep.
//!
//! Time is read from `tokio::time`, so tests can run under a paused clock.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Exponent cap for exponential backoff; keeps the multiplication finite.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Result of a single attempt, as classified by the operation itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome<T, E> {
    /// The attempt succeeded.
    Success(T),
    /// The attempt failed in a way that may succeed if tried again later.
    Retryable(E),
    /// The attempt failed and must not be repeated.
    Fatal(E),
}

/// An operation the executor can attempt repeatedly.
///
/// Implemented on explicit context structs that hold everything one attempt
/// needs (client handle, identifier, payload).
#[async_trait]
pub trait RetryableOperation: Send + Sync {
    type Output: Send;
    type Error: Send + fmt::Display;

    /// Name used in log fields.
    fn name(&self) -> &str;

    /// Perform one attempt.
    async fn attempt(&self) -> AttemptOutcome<Self::Output, Self::Error>;
}

/// Terminal failure of a retried operation
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The operation failed with a non-retryable error
    #[error("operation failed: {source}")]
    Fatal { source: E },

    /// The time budget ran out before the operation succeeded
    #[error("retry budget exhausted after {elapsed:?} ({attempts} attempts)")]
    TimedOut {
        elapsed: Duration,
        attempts: u32,
        last_error: Option<E>,
    },

    /// The surrounding context was cancelled
    #[error("operation cancelled after {attempts} attempts")]
    Cancelled { attempts: u32, last_error: Option<E> },
}

impl<E> RetryError<E> {
    /// The most recent error observed from the operation, if any.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            Self::Fatal { source } => Some(source),
            Self::TimedOut { last_error, .. } | Self::Cancelled { last_error, .. } => {
                last_error.as_ref()
            }
        }
    }
}

/// Outcome of a retry execution including summary statistics.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// Final result.
    pub result: Result<T, RetryError<E>>,
    /// Attempts started, including the last.
    pub attempts: u32,
    /// Time spent sleeping between attempts.
    pub total_delay: Duration,
}

impl<T, E> RetryOutcome<T, E> {
    /// Consume the outcome and return only the result.
    pub fn into_result(self) -> Result<T, RetryError<E>> {
        self.result
    }

    /// Average delay between attempts (excludes attempt execution time).
    pub fn average_delay(&self) -> Duration {
        if self.attempts <= 1 {
            return Duration::ZERO;
        }
        self.total_delay / (self.attempts - 1)
    }
}

/// Backoff strategy for calculating retry delays
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed(Duration),
    /// `initial_delay + attempt * increment`
    Linear { initial_delay: Duration, increment: Duration },
    /// `initial_delay * multiplier^attempt`, capped at `max_delay`
    Exponential { initial_delay: Duration, multiplier: u32, max_delay: Duration },
}

impl BackoffStrategy {
    /// Delay before retry number `attempt` (0-based).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Linear { initial_delay, increment } => {
                initial_delay.saturating_add(increment.saturating_mul(attempt))
            }
            Self::Exponential { initial_delay, multiplier, max_delay } => {
                let exponent = attempt.min(MAX_BACKOFF_EXPONENT);
                let factor = multiplier.saturating_pow(exponent);
                initial_delay.saturating_mul(factor).min(*max_delay)
            }
        }
    }
}

/// Jitter applied on top of the backoff delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jitter {
    /// No jitter
    None,
    /// Uniform in `0..=delay`
    Full,
    /// Uniform in `delay/2..=delay`
    Equal,
}

impl Jitter {
    /// Randomize `delay` according to this jitter.
    pub fn apply(self, delay: Duration) -> Duration {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        if millis == 0 {
            return delay;
        }

        let mut rng = rand::thread_rng();
        match self {
            Self::None => delay,
            Self::Full => Duration::from_millis(rng.gen_range(0..=millis)),
            Self::Equal => {
                let half = millis / 2;
                Duration::from_millis(half + rng.gen_range(0..=millis - half))
            }
        }
    }
}

/// Invalid [`RetryConfig`] rejected by the builder.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid retry configuration: {message}")]
pub struct InvalidRetryConfig {
    /// What is wrong with the configuration.
    pub message: String,
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Backoff strategy for calculating delays
    pub backoff: BackoffStrategy,
    /// Jitter type for randomizing delays
    pub jitter: Jitter,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffStrategy::Exponential {
                initial_delay: Duration::from_millis(500),
                multiplier: 2,
                max_delay: Duration::from_secs(10),
            },
            jitter: Jitter::Equal,
        }
    }
}

impl RetryConfig {
    /// Builder starting from the defaults.
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Jittered delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.jitter.apply(self.backoff.calculate_delay(attempt))
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns [`InvalidRetryConfig`] for a zero multiplier or an initial
    /// delay above the cap.
    pub fn validate(&self) -> Result<(), InvalidRetryConfig> {
        if let BackoffStrategy::Exponential { initial_delay, multiplier, max_delay } = &self.backoff
        {
            if *multiplier == 0 {
                return Err(InvalidRetryConfig {
                    message: "exponential multiplier must be greater than 0".to_string(),
                });
            }
            if initial_delay > max_delay {
                return Err(InvalidRetryConfig {
                    message: format!(
                        "initial delay {initial_delay:?} exceeds max delay {max_delay:?}"
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Builder for RetryConfig with fluent API
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    /// Builder starting from the defaults.
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    /// Same delay before every retry.
    #[must_use]
    pub fn fixed_backoff(mut self, delay: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Fixed(delay);
        self
    }

    /// Delay growing by `increment` per retry.
    #[must_use]
    pub fn linear_backoff(mut self, initial_delay: Duration, increment: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Linear { initial_delay, increment };
        self
    }

    /// Delay multiplied per retry, capped at `max_delay`.
    #[must_use]
    pub fn exponential_backoff(
        mut self,
        initial_delay: Duration,
        multiplier: u32,
        max_delay: Duration,
    ) -> Self {
        self.config.backoff = BackoffStrategy::Exponential { initial_delay, multiplier, max_delay };
        self
    }

    /// Jitter applied to each delay.
    #[must_use]
    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.config.jitter = jitter;
        self
    }

    /// Use delays exactly as computed.
    #[must_use]
    pub fn no_jitter(self) -> Self {
        self.jitter(Jitter::None)
    }

    /// # Errors
    /// Returns [`InvalidRetryConfig`] if validation fails.
    pub fn build(self) -> Result<RetryConfig, InvalidRetryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

enum RetryState<E> {
    Running { last_error: Option<E> },
    RetryPending { delay: Duration, last_error: E },
}

/// Drives a [`RetryableOperation`] until success, a fatal error, budget
/// exhaustion, or cancellation.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Executor for an already validated config.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Configuration in use.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` within `budget`.
    ///
    /// A pending delay that would overrun the remaining budget ends the run
    /// at once with [`RetryError::TimedOut`]. A delay that ends exactly at
    /// the deadline still gets its attempt. An attempt that is still in
    /// flight when the budget runs out is abandoned with `TimedOut`.
    #[instrument(
        skip(self, operation, cancellation),
        fields(operation = operation.name(), budget = ?budget)
    )]
    pub async fn run<O>(
        &self,
        operation: &O,
        budget: Duration,
        cancellation: &CancellationToken,
    ) -> RetryOutcome<O::Output, O::Error>
    where
        O: RetryableOperation + ?Sized,
    {
        let started = Instant::now();
        let deadline = started + budget;
        let mut attempts: u32 = 0;
        let mut total_delay = Duration::ZERO;
        let mut state = RetryState::Running { last_error: None };

        let finish = |result: Result<O::Output, RetryError<O::Error>>, attempts, total_delay| {
            RetryOutcome { result, attempts, total_delay }
        };

        loop {
            state = match state {
                RetryState::Running { last_error } => {
                    if cancellation.is_cancelled() {
                        debug!(attempts, "Cancelled before attempt");
                        return finish(
                            Err(RetryError::Cancelled { attempts, last_error }),
                            attempts,
                            total_delay,
                        );
                    }

                    attempts += 1;
                    debug!(attempt = attempts, "Executing operation");

                    // The attempt is polled before the deadline so it always
                    // runs at least once.
                    let outcome = tokio::select! {
                        biased;
                        () = cancellation.cancelled() => {
                            warn!(attempt = attempts, "Operation cancelled while in flight");
                            return finish(
                                Err(RetryError::Cancelled { attempts, last_error }),
                                attempts,
                                total_delay,
                            );
                        }
                        outcome = operation.attempt() => outcome,
                        () = tokio::time::sleep_until(deadline) => {
                            let elapsed = started.elapsed();
                            warn!(
                                attempt = attempts,
                                elapsed = ?elapsed,
                                "Retry budget exhausted while attempt in flight"
                            );
                            return finish(
                                Err(RetryError::TimedOut { elapsed, attempts, last_error }),
                                attempts,
                                total_delay,
                            );
                        }
                    };

                    match outcome {
                        AttemptOutcome::Success(value) => {
                            if attempts > 1 {
                                debug!(
                                    attempts,
                                    total_delay = ?total_delay,
                                    "Operation succeeded after retries"
                                );
                            }
                            return finish(Ok(value), attempts, total_delay);
                        }
                        AttemptOutcome::Fatal(source) => {
                            debug!(attempt = attempts, error = %source, "Error is not retryable");
                            return finish(Err(RetryError::Fatal { source }), attempts, total_delay);
                        }
                        AttemptOutcome::Retryable(error) => {
                            let delay = self.config.delay_for(attempts - 1);
                            let remaining = deadline.saturating_duration_since(Instant::now());
                            if delay > remaining {
                                warn!(
                                    attempts,
                                    delay = ?delay,
                                    remaining = ?remaining,
                                    error = %error,
                                    "Next retry would exceed budget, aborting"
                                );
                                return finish(
                                    Err(RetryError::TimedOut {
                                        elapsed: started.elapsed(),
                                        attempts,
                                        last_error: Some(error),
                                    }),
                                    attempts,
                                    total_delay,
                                );
                            }

                            warn!(
                                attempt = attempts,
                                delay = ?delay,
                                error = %error,
                                "Retryable failure, backing off"
                            );
                            RetryState::RetryPending { delay, last_error: error }
                        }
                    }
                }
                RetryState::RetryPending { delay, last_error } => {
                    tokio::select! {
                        biased;
                        () = cancellation.cancelled() => {
                            warn!(attempts, "Operation cancelled during backoff");
                            return finish(
                                Err(RetryError::Cancelled {
                                    attempts,
                                    last_error: Some(last_error),
                                }),
                                attempts,
                                total_delay,
                            );
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                    total_delay += delay;
                    RetryState::Running { last_error: Some(last_error) }
                }
            };
        }
    }
}
