//! Retry with Exponential Backoff
//!
//! [`RetryCaller`] runs an async operation and retries it when it fails with
//! [`LlmError::Request`]. Every other error is returned immediately. Retries
//! are sequential; each failed attempt is kept so the final [`RetryError`]
//! carries the full history.

use std::future::Future;
use std::str::FromStr;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::error::{LlmError, RequestError, Result, RetryError};

/// Configuration for retry behavior
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 disables retrying)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Wait before the first retry
    #[serde(default = "default_initial_interval", with = "secs_f64")]
    pub initial_interval: Duration,

    /// Whether to grow the wait exponentially
    #[serde(default = "default_true")]
    pub exponential: bool,

    /// Growth factor for exponential backoff
    #[serde(default = "default_exponent")]
    pub exponent: f64,

    /// Upper bound for exponential growth
    #[serde(default = "default_max_interval", with = "secs_f64")]
    pub max_interval: Duration,

    /// Whether to randomize each wait
    #[serde(default = "default_true")]
    pub jitter: bool,

    /// Maximum relative perturbation applied by jitter (0.0-1.0)
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_interval() -> Duration { Duration::from_secs(1) }
fn default_true() -> bool { true }
fn default_exponent() -> f64 { 2.0 }
fn default_max_interval() -> Duration { Duration::from_secs(60) }
fn default_jitter_factor() -> f64 { 0.1 }

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_interval: default_initial_interval(),
            exponential: true,
            exponent: default_exponent(),
            max_interval: default_max_interval(),
            jitter: true,
            jitter_factor: default_jitter_factor(),
        }
    }
}

impl RetryConfig {
    /// Single attempt, never retry
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Load from `LLM_RETRY_*` environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`RetryConfig::from_env`] with a custom variable source
    pub fn from_lookup<L>(lookup: L) -> Result<Self>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("LLM_RETRY_MAX_RETRIES") {
            config.max_retries = parse_var("LLM_RETRY_MAX_RETRIES", &value)?;
        }
        if let Some(value) = lookup("LLM_RETRY_INITIAL_INTERVAL") {
            config.initial_interval = parse_secs("LLM_RETRY_INITIAL_INTERVAL", &value)?;
        }
        if let Some(value) = lookup("LLM_RETRY_MAX_INTERVAL") {
            config.max_interval = parse_secs("LLM_RETRY_MAX_INTERVAL", &value)?;
        }
        if let Some(value) = lookup("LLM_RETRY_EXPONENTIAL") {
            config.exponential = parse_var("LLM_RETRY_EXPONENTIAL", &value)?;
        }
        if let Some(value) = lookup("LLM_RETRY_EXPONENT") {
            config.exponent = parse_var("LLM_RETRY_EXPONENT", &value)?;
        }
        if let Some(value) = lookup("LLM_RETRY_JITTER") {
            config.jitter = parse_var("LLM_RETRY_JITTER", &value)?;
        }
        if let Some(value) = lookup("LLM_RETRY_JITTER_FACTOR") {
            config.jitter_factor = parse_var("LLM_RETRY_JITTER_FACTOR", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.initial_interval.is_zero() {
            return Err(LlmError::Configuration(
                "initial_interval must be greater than zero".into(),
            ));
        }
        if self.exponential && !(self.exponent > 1.0) {
            return Err(LlmError::Configuration(format!(
                "exponent must be greater than 1, got {}",
                self.exponent
            )));
        }
        if self.max_interval < self.initial_interval {
            return Err(LlmError::Configuration(
                "max_interval must not be smaller than initial_interval".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(LlmError::Configuration(format!(
                "jitter_factor must be within [0, 1], got {}",
                self.jitter_factor
            )));
        }
        Ok(())
    }

    /// Builder: set max retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Builder: set initial interval
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Builder: set max interval
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Builder: toggle exponential growth
    pub fn with_exponential(mut self, exponential: bool) -> Self {
        self.exponential = exponential;
        self
    }

    /// Builder: set exponent
    pub fn with_exponent(mut self, exponent: f64) -> Self {
        self.exponent = exponent;
        self
    }

    /// Builder: toggle jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Builder: set jitter factor
    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor;
        self
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| LlmError::Configuration(format!("{key} has invalid value '{value}'")))
}

fn parse_secs(key: &str, value: &str) -> Result<Duration> {
    let secs: f64 = parse_var(key, value)?;
    Duration::try_from_secs_f64(secs)
        .map_err(|_| LlmError::Configuration(format!("{key} has invalid value '{value}'")))
}

/// Durations as float seconds
mod secs_f64 {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Executes an operation under a [`RetryConfig`]
pub struct RetryCaller<F> {
    config: RetryConfig,
    handler: F,
}

impl<F, Fut, T> RetryCaller<F>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    pub fn new(config: RetryConfig, handler: F) -> Self {
        Self { config, handler }
    }

    /// Run the handler until it succeeds, fails terminally, or retries run out
    pub async fn call(&self) -> Result<T> {
        self.call_timed().await.map(|(value, _)| value)
    }

    /// Like [`RetryCaller::call`], also returning how long the successful
    /// attempt took. Failed attempts and backoff waits are not included.
    pub async fn call_timed(&self) -> Result<(T, Duration)> {
        let mut errors: Vec<RequestError> = Vec::new();
        let mut call_count: u32 = 1;

        loop {
            let started = Instant::now();

            match (self.handler)().await {
                Ok(value) => {
                    let elapsed = started.elapsed();
                    if call_count > 1 {
                        info!(attempt = call_count, "Succeeded after retries");
                    }
                    return Ok((value, elapsed));
                }
                Err(LlmError::Request(err)) => {
                    if call_count > self.config.max_retries {
                        errors.push(err);
                        error!(
                            attempts = call_count,
                            max_retries = self.config.max_retries,
                            "Retry policy exhausted"
                        );
                        return Err(RetryError {
                            attempt_count: call_count,
                            errors,
                        }
                        .into());
                    }

                    let wait = self.calculate_wait_time(call_count, &err);
                    warn!(
                        attempt = call_count,
                        max_retries = self.config.max_retries,
                        error = %err,
                        wait_ms = wait.as_millis(),
                        "Attempt failed, waiting before next try"
                    );
                    errors.push(err);

                    sleep(wait).await;
                    call_count += 1;
                }
                Err(other) => return Err(other),
            }
        }
    }
}

impl<F> RetryCaller<F> {
    /// Wait before the retry that follows attempt `call_count` (1-based)
    pub fn calculate_wait_time(&self, call_count: u32, error: &RequestError) -> Duration {
        if let Some(hint) = error.retry_after {
            return hint;
        }

        let initial = self.config.initial_interval.as_secs_f64();
        let max = self.config.max_interval.as_secs_f64();

        let base = if self.config.exponential {
            let power = i32::try_from(call_count.saturating_sub(1)).unwrap_or(i32::MAX);
            (initial * self.config.exponent.powi(power)).min(max)
        } else {
            initial
        };

        let secs = if self.config.jitter {
            // fields are public, so the factor may not have been validated
            let range = base * self.config.jitter_factor.clamp(0.0, 1.0);
            let jitter = if range > 0.0 {
                rand::thread_rng().gen_range(-range..=range)
            } else {
                0.0
            };
            (base + jitter).max(0.0)
        } else {
            base
        };

        Duration::try_from_secs_f64(secs).unwrap_or(self.config.max_interval)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            initial_interval: Duration::from_millis(10),
            exponential: true,
            exponent: 2.0,
            max_interval: Duration::from_secs(1),
            jitter: false,
            jitter_factor: 0.1,
        }
    }

    fn noop() -> std::future::Ready<Result<()>> {
        std::future::ready(Ok(()))
    }

    #[tokio::test]
    async fn test_successful_call() {
        let caller = RetryCaller::new(fast_config(), || async { Ok("success") });
        assert_eq!(caller.call().await.unwrap(), "success");
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let attempts = AtomicU32::new(0);
        let caller = RetryCaller::new(fast_config(), || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 2 {
                    Err(LlmError::Request(RequestError::new("flaky")))
                } else {
                    Ok("success after retry")
                }
            }
        });

        assert_eq!(caller.call().await.unwrap(), "success after retry");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhaustion_performs_retries_plus_one_attempts() {
        let attempts = AtomicU32::new(0);
        let caller = RetryCaller::new(fast_config(), || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let err = RequestError::new(format!("failure {attempt}"));
            async move { Err::<(), _>(LlmError::Request(err)) }
        });

        match caller.call().await {
            Err(LlmError::Retry(err)) => {
                assert_eq!(err.attempt_count, 3);
                assert_eq!(err.errors.len(), 3);
                assert_eq!(err.errors[0].message, "failure 1");
                assert_eq!(err.last_error().unwrap().message, "failure 3");
            }
            other => panic!("expected RetryError, got {other:?}"),
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_retries_means_single_attempt() {
        let attempts = AtomicU32::new(0);
        let caller = RetryCaller::new(RetryConfig::none(), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(LlmError::Request(RequestError::new("down"))) }
        });

        let err = caller.call().await.unwrap_err();
        assert!(matches!(err, LlmError::Retry(RetryError { attempt_count: 1, .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let attempts = AtomicU32::new(0);
        let caller = RetryCaller::new(fast_config(), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(LlmError::validation("bad payload")) }
        });

        let err = caller.call().await.unwrap_err();
        assert!(matches!(err, LlmError::ResponseValidation { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_after_hint_is_honored() {
        let attempts = AtomicU32::new(0);
        let caller = RetryCaller::new(fast_config(), || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 2 {
                    let wait = Duration::from_millis(30);
                    Err(LlmError::Request(
                        RequestError::new("rate limited").with_retry_after(wait),
                    ))
                } else {
                    Ok(())
                }
            }
        });

        let started = Instant::now();
        caller.call().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_call_timed_excludes_backoff() {
        let attempts = AtomicU32::new(0);
        let config = fast_config().with_initial_interval(Duration::from_millis(50));
        let caller = RetryCaller::new(config, || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 2 {
                    Err(LlmError::Request(RequestError::new("flaky")))
                } else {
                    Ok(())
                }
            }
        });

        let ((), elapsed) = caller.call_timed().await.unwrap();
        assert!(elapsed < Duration::from_millis(50));
    }

    #[test]
    fn test_calculate_wait_time_exponential() {
        let caller = RetryCaller::new(fast_config(), noop);
        let err = RequestError::new("test");
        assert_eq!(caller.calculate_wait_time(1, &err), Duration::from_millis(10));
        assert_eq!(caller.calculate_wait_time(2, &err), Duration::from_millis(20));
        assert_eq!(caller.calculate_wait_time(3, &err), Duration::from_millis(40));
    }

    #[test]
    fn test_calculate_wait_time_capped_by_max_interval() {
        let config = fast_config()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_interval(Duration::from_secs(1));
        let caller = RetryCaller::new(config, noop);
        let err = RequestError::new("test");
        assert_eq!(caller.calculate_wait_time(3, &err), Duration::from_secs(1));
        assert_eq!(caller.calculate_wait_time(40, &err), Duration::from_secs(1));
    }

    #[test]
    fn test_calculate_wait_time_non_exponential() {
        let caller = RetryCaller::new(fast_config().with_exponential(false), noop);
        let err = RequestError::new("test");
        assert_eq!(caller.calculate_wait_time(1, &err), Duration::from_millis(10));
        assert_eq!(caller.calculate_wait_time(3, &err), Duration::from_millis(10));
    }

    #[test]
    fn test_calculate_wait_time_with_jitter_stays_in_bounds() {
        let config = fast_config().with_jitter(true).with_jitter_factor(0.5);
        let caller = RetryCaller::new(config, noop);
        let err = RequestError::new("test");
        for _ in 0..200 {
            let wait = caller.calculate_wait_time(1, &err);
            assert!(wait >= Duration::from_millis(5), "{wait:?}");
            assert!(wait <= Duration::from_millis(15), "{wait:?}");
        }
    }

    #[test]
    fn test_full_jitter_never_goes_negative() {
        let config = fast_config().with_jitter(true).with_jitter_factor(1.0);
        let caller = RetryCaller::new(config, noop);
        let err = RequestError::new("test");
        for _ in 0..200 {
            assert!(caller.calculate_wait_time(2, &err) <= Duration::from_millis(40));
        }
    }

    #[test]
    fn test_unvalidated_jitter_factor_is_clamped() {
        let err = RequestError::new("test");
        for factor in [f64::INFINITY, 5.0, -3.0, f64::NAN] {
            let mut config = fast_config().with_jitter(true);
            config.jitter_factor = factor;
            let caller = RetryCaller::new(config, noop);
            for _ in 0..50 {
                assert!(caller.calculate_wait_time(1, &err) <= Duration::from_millis(20));
            }
        }
    }

    #[test]
    fn test_hint_bypasses_backoff_math() {
        let caller = RetryCaller::new(fast_config().with_jitter(true), noop);
        let err = RequestError::new("slow down").with_retry_after(Duration::from_secs(7));
        assert_eq!(caller.calculate_wait_time(5, &err), Duration::from_secs(7));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(RetryConfig::default().validate().is_ok());
        assert!(fast_config().with_initial_interval(Duration::ZERO).validate().is_err());
        assert!(fast_config().with_exponent(1.0).validate().is_err());
        assert!(fast_config().with_exponential(false).with_exponent(1.0).validate().is_ok());
        assert!(
            fast_config()
                .with_max_interval(Duration::from_millis(1))
                .validate()
                .is_err()
        );
        assert!(fast_config().with_jitter_factor(1.5).validate().is_err());
    }

    #[test]
    fn test_from_lookup_overlays_defaults() {
        let config = RetryConfig::from_lookup(|key| match key {
            "LLM_RETRY_MAX_RETRIES" => Some("5".into()),
            "LLM_RETRY_INITIAL_INTERVAL" => Some("0.25".into()),
            "LLM_RETRY_JITTER" => Some("false".into()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.initial_interval, Duration::from_millis(250));
        assert!(!config.jitter);
        assert_eq!(config.max_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let result = RetryConfig::from_lookup(|key| {
            (key == "LLM_RETRY_EXPONENT").then(|| "steep".to_string())
        });
        assert!(matches!(result, Err(LlmError::Configuration(_))));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: RetryConfig =
            serde_json::from_str(r#"{"max_retries": 1, "initial_interval": 0.5}"#).unwrap();
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.initial_interval, Duration::from_millis(500));
        assert_eq!(config.exponent, 2.0);
        assert!(config.jitter);
    }
}
