//! Resilience patterns for fault tolerance
//!
//! - **Retry**: a bounded, cancellable retry executor with configurable
//!   backoff and jitter. Operations classify their own failures as
//!   retryable or fatal; the executor only decides *when* to try again.

pub mod retry;

pub use retry::{
    AttemptOutcome, BackoffStrategy, InvalidRetryConfig, Jitter, RetryConfig, RetryConfigBuilder,
    RetryError, RetryExecutor, RetryOutcome, RetryableOperation,
};
