//! Retry executor for running operations with retries.

use crate::backoff::calculate_delay;
use crate::config::{RetryConfig, RetryOptions, SharedCondition};
use crate::error::{ConfigError, Interrupted};
use crate::policy::{Always, NetworkErrors, RetryCondition};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Record of one retry sequence.
#[derive(Debug, Clone, Default)]
pub struct RetryReport {
    /// Attempts made (1-indexed count).
    pub attempts: u32,
    /// Total time spent waiting between attempts.
    pub total_wait_time: Duration,
    /// History of attempts.
    pub history: Vec<AttemptInfo>,
}

impl RetryReport {
    /// Whether the final recorded attempt succeeded.
    pub fn succeeded(&self) -> bool {
        self.history.last().is_some_and(|a| a.success)
    }

    fn record_success(&mut self, attempt: u32) {
        self.history.push(AttemptInfo {
            attempt,
            success: true,
            error: None,
            wait_after: Duration::ZERO,
        });
    }

    fn record_wait(&mut self, wait: Duration) {
        self.total_wait_time = self.total_wait_time.saturating_add(wait);
    }

    fn record_failure(&mut self, attempt: u32, error: &dyn fmt::Display, wait_after: Duration) {
        self.history.push(AttemptInfo {
            attempt,
            success: false,
            error: Some(error.to_string()),
            wait_after,
        });
    }
}

/// Information about a single attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptInfo {
    /// Attempt number.
    pub attempt: u32,
    /// Whether it succeeded.
    pub success: bool,
    /// Error message if failed.
    pub error: Option<String>,
    /// Time scheduled to wait before the next attempt.
    pub wait_after: Duration,
}

/// A validated retry policy that can run any number of operations.
///
/// Holds no state between runs; each `run` starts from attempt 1.
pub struct Retry<E> {
    config: RetryConfig,
    condition: SharedCondition<E>,
}

impl<E> Clone for Retry<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            condition: Arc::clone(&self.condition),
        }
    }
}

impl<E> fmt::Debug for Retry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<E: fmt::Display + 'static> Retry<E> {
    /// Build from partial options merged over the defaults.
    pub fn new(options: RetryOptions<E>) -> Self {
        Self {
            config: options.resolve(),
            condition: options.condition(),
        }
    }

    /// Build from a full config, rejecting invalid values. Retries every error.
    pub fn from_config(config: RetryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            condition: Arc::new(Always),
        })
    }

    /// Replace the retry predicate.
    pub fn with_condition(mut self, condition: impl RetryCondition<E> + 'static) -> Self {
        self.condition = Arc::new(condition);
        self
    }

    /// The effective config.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run the operation until it succeeds, fails with a non-retryable
    /// error, or runs out of attempts.
    pub async fn run<F, Fut, T>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut report = RetryReport::default();
        let result = self.drive(None, &mut report, operation).await;
        uncancellable(result)
    }

    /// Run and return the attempt history alongside the result.
    pub async fn run_with_report<F, Fut, T>(&self, operation: F) -> (Result<T, E>, RetryReport)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut report = RetryReport::default();
        let result = self.drive(None, &mut report, operation).await;
        (uncancellable(result), report)
    }

    /// Run, stopping early once `token` is cancelled.
    ///
    /// The token is checked before every attempt and before every wait, and
    /// a wait in progress ends as soon as it fires. An attempt already
    /// running is allowed to finish.
    pub async fn run_until_cancelled<F, Fut, T>(
        &self,
        token: &CancellationToken,
        operation: F,
    ) -> Result<T, Interrupted<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut report = RetryReport::default();
        self.drive(Some(token), &mut report, operation).await
    }

    async fn drive<F, Fut, T>(
        &self,
        cancel: Option<&CancellationToken>,
        report: &mut RetryReport,
        mut operation: F,
    ) -> Result<T, Interrupted<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error: Option<E> = None;
        let mut attempt = 0;

        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                info!(attempts = attempt, "Retry cancelled before attempt");
                return Err(Interrupted::Cancelled {
                    attempts: attempt,
                    last_error,
                });
            }

            attempt += 1;
            report.attempts = attempt;

            debug!(attempt, max_attempts, "Executing retry attempt");

            let error = match operation().await {
                Ok(value) => {
                    report.record_success(attempt);
                    return Ok(value);
                }
                Err(error) => error,
            };

            let retryable = self.condition.is_retryable(&error);
            if !retryable || attempt >= max_attempts {
                report.record_failure(attempt, &error, Duration::ZERO);
                warn!(
                    attempt,
                    retryable,
                    error = %error,
                    "Retry exhausted or error not retryable"
                );
                return Err(Interrupted::Failed(error));
            }

            let wait = calculate_delay(attempt, &self.config);
            report.record_failure(attempt, &error, wait);

            debug!(
                attempt,
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Waiting before retry"
            );

            match cancel {
                Some(token) => {
                    if token.is_cancelled() {
                        info!(attempts = attempt, "Retry cancelled before wait");
                        return Err(Interrupted::Cancelled {
                            attempts: attempt,
                            last_error: Some(error),
                        });
                    }
                    tokio::select! {
                        () = sleep(wait) => {}
                        () = token.cancelled() => {
                            info!(attempts = attempt, "Retry cancelled during wait");
                            return Err(Interrupted::Cancelled {
                                attempts: attempt,
                                last_error: Some(error),
                            });
                        }
                    }
                }
                None => sleep(wait).await,
            }

            report.record_wait(wait);
            last_error = Some(error);
        }
    }
}

fn uncancellable<T, E>(result: Result<T, Interrupted<E>>) -> Result<T, E> {
    match result {
        Ok(value) => Ok(value),
        Err(Interrupted::Failed(error)) => Err(error),
        Err(Interrupted::Cancelled { .. }) => {
            unreachable!("cancellation requires a token")
        }
    }
}

/// Execute an operation with retries.
///
/// Options left unset take the defaults (3 attempts, 1s initial delay, 10s
/// cap, x2 growth, retry everything). A terminal failure returns the last
/// attempt's error unchanged.
///
/// # Example
///
/// ```ignore
/// use nossa_retry::{execute, RetryOptions};
///
/// let profile = execute(|| client.load_profile(user_id), RetryOptions::new().max_attempts(5)).await?;
/// ```
pub async fn execute<F, Fut, T, E>(operation: F, options: RetryOptions<E>) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display + 'static,
{
    Retry::new(options).run(operation).await
}

/// Execute with retries and get the attempt history.
pub async fn execute_with_report<F, Fut, T, E>(
    operation: F,
    options: RetryOptions<E>,
) -> (Result<T, E>, RetryReport)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display + 'static,
{
    Retry::new(options).run_with_report(operation).await
}

/// Execute with retries, stopping early once `token` is cancelled.
pub async fn execute_cancellable<F, Fut, T, E>(
    operation: F,
    options: RetryOptions<E>,
    token: &CancellationToken,
) -> Result<T, Interrupted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display + 'static,
{
    Retry::new(options).run_until_cancelled(token, operation).await
}

/// Execute a network request with retries.
///
/// Same as [`execute`], except that unless the options carry their own
/// predicate only network-looking failures are retried
/// (see [`is_network_error`](crate::policy::is_network_error)).
pub async fn execute_network_request<F, Fut, T, E>(
    operation: F,
    options: RetryOptions<E>,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display + 'static,
{
    execute(operation, options.or_retry_condition(NetworkErrors)).await
}
