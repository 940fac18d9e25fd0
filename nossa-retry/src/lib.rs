//! # nossa-retry
//!
//! Retry-with-backoff execution for the Nossa Maternidade data layer.
//!
//! Every call to a backend (profile, community posts, habit check-ins) goes
//! through the same policy: a bounded number of sequential attempts,
//! exponentially growing waits between them, and a predicate that decides
//! which failures are worth another try.
//!
//! ## Core Concepts
//!
//! - **[`RetryConfig`]** / **[`RetryOptions`]**: attempt limits and delays,
//!   with partial options merged over the defaults
//! - **[`calculate_delay`]**: `min(initial * multiplier^(n-1), max)`
//! - **[`RetryCondition`]**: which errors are retryable; [`NetworkErrors`]
//!   retries only failures that look like connectivity problems
//! - **[`execute`]** / **[`execute_network_request`]**: run an operation with
//!   retries and get back its value or its last error, unchanged
//! - **[`DataFetcher`]**: loading state plus error notification for screens
//! - **[`RetryClient`]**: HTTP client with built-in retry support
//!
//! ## Example
//!
//! ```ignore
//! use nossa_retry::{execute_network_request, RetryOptions};
//! use std::time::Duration;
//!
//! let posts = execute_network_request(
//!     || api.community_posts(page),
//!     RetryOptions::new()
//!         .max_attempts(4)
//!         .initial_delay(Duration::from_millis(500)),
//! )
//! .await?;
//! ```
//!
//! ## Cancellation
//!
//! ```ignore
//! use nossa_retry::{execute_cancellable, RetryOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! let token = CancellationToken::new();
//! // token.cancel() from elsewhere stops the sequence before the next
//! // attempt or in the middle of a wait.
//! let result = execute_cancellable(|| api.habits(), RetryOptions::new(), &token).await;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod backoff;
pub mod config;
pub mod error;
pub mod executor;
pub mod fetch;
pub mod policy;
pub mod transport;

// Re-exports
pub use backoff::{calculate_delay, schedule};
pub use config::{RetryConfig, RetryOptions, SharedCondition};
pub use error::{ConfigError, FetchError, Interrupted};
pub use executor::{
    execute, execute_cancellable, execute_network_request, execute_with_report, AttemptInfo,
    Retry, RetryReport,
};
pub use fetch::{DataFetcher, FetchState, LogNotifier, Notifier};
pub use policy::{is_network_error, Always, AnyOf, Never, NetworkErrors, RetryCondition};
pub use transport::{RetryClient, RetryClientBuilder};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        execute, execute_network_request, DataFetcher, FetchError, FetchState, NetworkErrors,
        Retry, RetryClient, RetryCondition, RetryConfig, RetryOptions,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;

        let options: RetryOptions<FetchError> = RetryOptions::new().max_attempts(5);
        assert_eq!(options.resolve().max_attempts, 5);
    }

    #[test]
    fn test_config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.delays().collect::<Vec<_>>(), vec![
            Duration::from_millis(1000),
            Duration::from_millis(2000),
        ]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logs_through_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("nossa_retry=debug")
            .try_init();

        let result = execute_network_request(
            || async { Err::<(), _>(FetchError::Timeout) },
            RetryOptions::new().max_attempts(2),
        )
        .await;

        assert!(matches!(result, Err(FetchError::Timeout)));
    }
}
