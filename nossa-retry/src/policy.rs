//! Retry conditions for deciding which errors are worth another attempt.

use std::fmt;

/// Message fragments that mark an error as a transient network failure.
pub const NETWORK_ERROR_MARKERS: [&str; 4] = ["network", "timeout", "fetch", "connection"];

/// Decides whether a failed attempt should be retried.
///
/// Implemented for any `Fn(&E) -> bool + Send + Sync` closure.
pub trait RetryCondition<E: ?Sized>: Send + Sync {
    /// Check if the error should be retried.
    fn is_retryable(&self, error: &E) -> bool;
}

impl<E, F> RetryCondition<E> for F
where
    E: ?Sized,
    F: Fn(&E) -> bool + Send + Sync,
{
    fn is_retryable(&self, error: &E) -> bool {
        self(error)
    }
}

/// Retries every error.
#[derive(Debug, Clone, Copy, Default)]
pub struct Always;

impl<E: ?Sized> RetryCondition<E> for Always {
    fn is_retryable(&self, _error: &E) -> bool {
        true
    }
}

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct Never;

impl<E: ?Sized> RetryCondition<E> for Never {
    fn is_retryable(&self, _error: &E) -> bool {
        false
    }
}

/// Retries errors whose message looks like a transient network failure.
///
/// See [`is_network_error`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkErrors;

impl<E: fmt::Display + ?Sized> RetryCondition<E> for NetworkErrors {
    fn is_retryable(&self, error: &E) -> bool {
        is_network_error(error)
    }
}

/// Check whether an error message names a network, timeout, fetch or
/// connection failure. Case-insensitive substring match on the `Display`
/// output; error codes are not inspected.
pub fn is_network_error<E: fmt::Display + ?Sized>(error: &E) -> bool {
    let message = error.to_string().to_lowercase();
    NETWORK_ERROR_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

/// Combine multiple conditions with OR logic.
pub struct AnyOf<E: ?Sized> {
    conditions: Vec<Box<dyn RetryCondition<E>>>,
}

impl<E: ?Sized> fmt::Debug for AnyOf<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyOf")
            .field("condition_count", &self.conditions.len())
            .finish()
    }
}

impl<E: ?Sized> AnyOf<E> {
    /// Create an empty combination, which retries nothing.
    pub fn new() -> Self {
        Self {
            conditions: Vec::new(),
        }
    }

    /// Add a condition.
    pub fn or(mut self, condition: impl RetryCondition<E> + 'static) -> Self {
        self.conditions.push(Box::new(condition));
        self
    }
}

impl<E: ?Sized> Default for AnyOf<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ?Sized> RetryCondition<E> for AnyOf<E> {
    fn is_retryable(&self, error: &E) -> bool {
        self.conditions.iter().any(|c| c.is_retryable(error))
    }
}
