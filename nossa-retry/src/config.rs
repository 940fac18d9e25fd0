//! Retry configuration.

use crate::backoff;
use crate::error::ConfigError;
use crate::policy::{Always, RetryCondition};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default number of attempts, counting the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default delay before the second attempt.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1000);
/// Default cap on any single delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(10_000);
/// Default growth factor between delays.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Timing and attempt limits for a retry sequence.
///
/// Serialized with delays in whole milliseconds:
///
/// ```json
/// { "max_attempts": 5, "initial_delay_ms": 250, "max_delay_ms": 4000, "backoff_multiplier": 2.0 }
/// ```
///
/// Missing keys take the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    #[serde(rename = "initial_delay_ms", with = "millis")]
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    #[serde(rename = "max_delay_ms", with = "millis")]
    pub max_delay: Duration,
    /// Factor applied to the delay after each failed attempt.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryConfig {
    /// Create a new default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max attempts.
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the initial delay.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier.
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the config's invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidMultiplier(self.backoff_multiplier));
        }
        if self.max_delay < self.initial_delay {
            return Err(ConfigError::DelayOrder {
                initial: self.initial_delay,
                max: self.max_delay,
            });
        }
        Ok(())
    }

    /// Bring out-of-range values back inside the invariants.
    ///
    /// Zero attempts becomes one, a non-finite multiplier falls back to the
    /// default, a multiplier below one becomes one, and a `max_delay` shorter
    /// than `initial_delay` is raised to it.
    pub fn normalized(mut self) -> Self {
        self.max_attempts = self.max_attempts.max(1);
        if !self.backoff_multiplier.is_finite() {
            self.backoff_multiplier = DEFAULT_BACKOFF_MULTIPLIER;
        }
        self.backoff_multiplier = self.backoff_multiplier.max(1.0);
        self.max_delay = self.max_delay.max(self.initial_delay);
        self
    }

    /// Delay to wait after the given (1-based) attempt fails.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        backoff::calculate_delay(attempt, self)
    }

    /// Every delay the sequence could wait, in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        backoff::schedule(*self)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Shared, type-erased retry predicate.
pub type SharedCondition<E> = Arc<dyn RetryCondition<E>>;

/// Per-call overrides merged over [`RetryConfig::default`].
///
/// Any field left as `None` takes its default; the default predicate retries
/// every error.
pub struct RetryOptions<E> {
    /// Maximum number of attempts.
    pub max_attempts: Option<u32>,
    /// Delay before the second attempt.
    pub initial_delay: Option<Duration>,
    /// Upper bound for any single delay.
    pub max_delay: Option<Duration>,
    /// Delay growth factor.
    pub backoff_multiplier: Option<f64>,
    /// Retry predicate.
    pub is_retryable: Option<SharedCondition<E>>,
}

impl<E> Default for RetryOptions<E> {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_delay: None,
            max_delay: None,
            backoff_multiplier: None,
            is_retryable: None,
        }
    }
}

impl<E> Clone for RetryOptions<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            backoff_multiplier: self.backoff_multiplier,
            is_retryable: self.is_retryable.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryOptions<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("is_retryable", &self.is_retryable.as_ref().map(|_| "custom"))
            .finish()
    }
}

impl<E> From<RetryConfig> for RetryOptions<E> {
    fn from(config: RetryConfig) -> Self {
        Self {
            max_attempts: Some(config.max_attempts),
            initial_delay: Some(config.initial_delay),
            max_delay: Some(config.max_delay),
            backoff_multiplier: Some(config.backoff_multiplier),
            is_retryable: None,
        }
    }
}

impl<E: 'static> RetryOptions<E> {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max attempts.
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = Some(n);
        self
    }

    /// Set the initial delay.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set the maximum delay.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set the backoff multiplier.
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = Some(multiplier);
        self
    }

    /// Use a closure as the retry predicate.
    pub fn is_retryable<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.is_retryable = Some(Arc::new(predicate));
        self
    }

    /// Use a condition value as the retry predicate.
    pub fn retry_condition(mut self, condition: impl RetryCondition<E> + 'static) -> Self {
        self.is_retryable = Some(Arc::new(condition));
        self
    }

    /// Fill in the predicate only if none was set.
    pub fn or_retry_condition(mut self, condition: impl RetryCondition<E> + 'static) -> Self {
        if self.is_retryable.is_none() {
            self.is_retryable = Some(Arc::new(condition));
        }
        self
    }

    /// Merge over the defaults and normalize.
    pub fn resolve(&self) -> RetryConfig {
        let defaults = RetryConfig::default();
        RetryConfig {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
            initial_delay: self.initial_delay.unwrap_or(defaults.initial_delay),
            max_delay: self.max_delay.unwrap_or(defaults.max_delay),
            backoff_multiplier: self
                .backoff_multiplier
                .unwrap_or(defaults.backoff_multiplier),
        }
        .normalized()
    }

    /// The configured predicate, or one that retries everything.
    pub fn condition(&self) -> SharedCondition<E> {
        self.is_retryable
            .clone()
            .unwrap_or_else(|| Arc::new(Always) as SharedCondition<E>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_delay, Duration::from_millis(1000));
        assert_eq!(config.max_delay, Duration::from_millis(10_000));
        assert_eq!(config.backoff_multiplier, 2.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = RetryConfig::new()
            .max_attempts(5)
            .initial_delay(Duration::from_millis(200))
            .max_delay(Duration::from_secs(2))
            .backoff_multiplier(3.0);

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_delay, Duration::from_millis(200));
        assert_eq!(config.max_delay, Duration::from_secs(2));
        assert_eq!(config.backoff_multiplier, 3.0);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(matches!(
            RetryConfig::new().max_attempts(0).validate(),
            Err(ConfigError::ZeroAttempts)
        ));
        assert!(matches!(
            RetryConfig::new().backoff_multiplier(0.5).validate(),
            Err(ConfigError::InvalidMultiplier(_))
        ));
        assert!(matches!(
            RetryConfig::new().backoff_multiplier(f64::NAN).validate(),
            Err(ConfigError::InvalidMultiplier(_))
        ));
        assert!(matches!(
            RetryConfig::new()
                .initial_delay(Duration::from_secs(5))
                .max_delay(Duration::from_secs(1))
                .validate(),
            Err(ConfigError::DelayOrder { .. })
        ));
    }

    #[test]
    fn test_normalized() {
        let config = RetryConfig::new()
            .max_attempts(0)
            .backoff_multiplier(0.25)
            .initial_delay(Duration::from_secs(5))
            .max_delay(Duration::from_secs(1))
            .normalized();

        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.backoff_multiplier, 1.0);
        assert_eq!(config.max_delay, Duration::from_secs(5));
        assert!(config.validate().is_ok());

        let config = RetryConfig::new()
            .backoff_multiplier(f64::INFINITY)
            .normalized();
        assert_eq!(config.backoff_multiplier, DEFAULT_BACKOFF_MULTIPLIER);
    }

    #[test]
    fn test_from_json() {
        let config =
            RetryConfig::from_json(r#"{ "max_attempts": 5, "initial_delay_ms": 250 }"#).unwrap();
        assert_eq!(
            config,
            RetryConfig::new()
                .max_attempts(5)
                .initial_delay(Duration::from_millis(250))
        );
    }

    #[test]
    fn test_from_json_validates() {
        let err = RetryConfig::from_json(r#"{ "max_attempts": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroAttempts));

        let err = RetryConfig::from_json("not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_json_uses_millis() {
        let json = serde_json::to_value(RetryConfig::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "max_attempts": 3,
                "initial_delay_ms": 1000,
                "max_delay_ms": 10000,
                "backoff_multiplier": 2.0,
            })
        );
    }

    #[test]
    fn test_options_resolve_over_defaults() {
        let options: RetryOptions<String> = RetryOptions::new().max_attempts(5);
        let config = options.resolve();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_delay, DEFAULT_INITIAL_DELAY);
        assert_eq!(config.max_delay, DEFAULT_MAX_DELAY);
        assert_eq!(config.backoff_multiplier, DEFAULT_BACKOFF_MULTIPLIER);
    }

    #[test]
    fn test_options_resolve_normalizes() {
        let options: RetryOptions<String> = RetryOptions::new()
            .max_attempts(0)
            .initial_delay(Duration::from_secs(20));
        let config = options.resolve();
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.max_delay, Duration::from_secs(20));
    }

    #[test]
    fn test_default_condition_retries_everything() {
        let options: RetryOptions<String> = RetryOptions::new();
        assert!(options.condition().is_retryable(&"anything".to_string()));
    }

    #[test]
    fn test_or_retry_condition_keeps_custom_predicate() {
        let options: RetryOptions<String> = RetryOptions::new()
            .is_retryable(|_| false)
            .or_retry_condition(Always);
        assert!(!options.condition().is_retryable(&"network".to_string()));

        let options: RetryOptions<String> = RetryOptions::new().or_retry_condition(Always);
        assert!(options.condition().is_retryable(&"x".to_string()));
    }
}
