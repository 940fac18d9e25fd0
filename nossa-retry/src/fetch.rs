//! Data loading with retries, loading state and user-facing error reporting.
//!
//! [`DataFetcher`] is what a screen holds to load its data: it runs the
//! fetch through [`execute_cancellable`] with the network classifier, exposes
//! a [`FetchState`], and on terminal failure logs the error and hands a
//! message to a [`Notifier`].

use crate::config::RetryOptions;
use crate::error::Interrupted;
use crate::executor::execute_cancellable;
use crate::policy::NetworkErrors;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Surface for user-facing error messages (a toast, a banner).
pub trait Notifier: Send + Sync {
    /// Show that loading `context` failed with `message`.
    fn notify_error(&self, context: &str, message: &str);
}

/// Notifier that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_error(&self, context: &str, message: &str) {
        warn!(context, message, "Fetch failed");
    }
}

/// Loading state of a [`DataFetcher`].
#[derive(Debug, Clone, PartialEq)]
pub enum FetchState<T> {
    /// Nothing requested yet, or the last request was abandoned.
    Idle,
    /// A request is in flight.
    Loading,
    /// The last request succeeded.
    Loaded(T),
    /// The last request failed after retries; holds the error message.
    Failed(String),
}

impl<T> Default for FetchState<T> {
    fn default() -> Self {
        Self::Idle
    }
}

impl<T> FetchState<T> {
    /// Whether a request is in flight.
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Loaded data, if any.
    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Loaded(data) => Some(data),
            _ => None,
        }
    }

    /// Error message of a failed request.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed(message) => Some(message),
            _ => None,
        }
    }
}

/// State plus the number of the most recently started fetch.
#[derive(Debug)]
struct Slot<T> {
    generation: u64,
    state: FetchState<T>,
}

/// Loads data with network retries and tracks the outcome.
///
/// Overlapping fetches are allowed; only the most recently started one
/// writes its outcome and notifies.
pub struct DataFetcher<T, E> {
    context: String,
    options: RetryOptions<E>,
    notifier: Arc<dyn Notifier>,
    slot: Mutex<Slot<T>>,
    token: CancellationToken,
}

impl<T, E> fmt::Debug for DataFetcher<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFetcher")
            .field("context", &self.context)
            .field("options", &self.options)
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<T, E> DataFetcher<T, E>
where
    T: Clone,
    E: fmt::Display + 'static,
{
    /// Create a fetcher. `context` names the data in logs and notifications.
    pub fn new(context: impl Into<String>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            context: context.into(),
            options: RetryOptions::new(),
            notifier,
            slot: Mutex::new(Slot {
                generation: 0,
                state: FetchState::Idle,
            }),
            token: CancellationToken::new(),
        }
    }

    /// Replace the retry options. Without a predicate, network errors are
    /// retried.
    pub fn with_options(mut self, options: RetryOptions<E>) -> Self {
        self.options = options;
        self
    }

    /// Override the number of attempts.
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.options = self.options.max_attempts(n);
        self
    }

    /// Use a custom retry predicate.
    pub fn is_retryable<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.options = self.options.is_retryable(predicate);
        self
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> FetchState<T> {
        self.slot.lock().state.clone()
    }

    /// Whether a request is in flight.
    pub fn is_loading(&self) -> bool {
        self.slot.lock().state.is_loading()
    }

    /// Loaded data, if any.
    pub fn data(&self) -> Option<T> {
        self.slot.lock().state.data().cloned()
    }

    /// Abandon the fetcher: a request in progress stops at its next check and
    /// later calls to [`fetch`](Self::fetch) do nothing.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Run `operation` with retries and record the outcome.
    ///
    /// Returns the resulting state. Calling it again refetches; if another
    /// fetch starts before this one finishes, this one's outcome is dropped
    /// and the current state is returned instead.
    pub async fn fetch<F, Fut>(&self, operation: F) -> FetchState<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if self.token.is_cancelled() {
            debug!(context = %self.context, "Fetcher cancelled, skipping fetch");
            return self.state();
        }

        let generation = {
            let mut slot = self.slot.lock();
            slot.generation += 1;
            slot.state = FetchState::Loading;
            slot.generation
        };

        let options = self.options.clone().or_retry_condition(NetworkErrors);
        let result = execute_cancellable(operation, options, &self.token).await;

        let mut slot = self.slot.lock();
        if slot.generation != generation {
            debug!(
                context = %self.context,
                generation,
                current = slot.generation,
                "Fetch superseded, dropping outcome"
            );
            return slot.state.clone();
        }

        let (next, failure) = match result {
            Ok(data) => (FetchState::Loaded(data), None),
            Err(Interrupted::Failed(err)) => {
                let message = err.to_string();
                (FetchState::Failed(message.clone()), Some(message))
            }
            Err(Interrupted::Cancelled { attempts, .. }) => {
                debug!(context = %self.context, attempts, "Fetch abandoned");
                (FetchState::Idle, None)
            }
        };
        slot.state = next.clone();
        drop(slot);

        if let Some(message) = failure {
            error!(context = %self.context, error = %message, "Fetch failed after retries");
            self.notifier.notify_error(&self.context, &message);
        }
        next
    }
}
