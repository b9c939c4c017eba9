//! Error Types
//!
//! Every public operation either succeeds or fails with one of the documented
//! kinds below. Adapter failures that are not [`RequestError`] travel through
//! [`LlmError::Provider`] untouched.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, LlmError>;

/// Transient request failure reported by a provider adapter.
///
/// This is the only error kind the retry policy acts on.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct RequestError {
    /// Human-readable description
    pub message: String,

    /// Provider-supplied wait hint; replaces the computed backoff when set
    pub retry_after: Option<Duration>,

    /// Extra diagnostic context (status codes, tool names, ...)
    pub context: HashMap<String, serde_json::Value>,
}

impl RequestError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retry_after: None,
            context: HashMap::new(),
        }
    }

    /// Attach a provider wait hint
    pub fn with_retry_after(mut self, wait: Duration) -> Self {
        self.retry_after = Some(wait);
        self
    }

    /// Attach a context entry
    pub fn with_context(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Retry policy exhausted
#[derive(Error, Debug)]
#[error("Max retries exceeded after {attempt_count} attempts: {}", last_message(.errors))]
pub struct RetryError {
    /// Number of attempts performed (retries + 1)
    pub attempt_count: u32,

    /// Every request error observed, in order
    pub errors: Vec<RequestError>,
}

impl RetryError {
    /// The error raised by the final attempt
    pub fn last_error(&self) -> Option<&RequestError> {
        self.errors.last()
    }
}

fn last_message(errors: &[RequestError]) -> String {
    errors
        .last()
        .map_or_else(|| "no errors recorded".to_string(), |e| e.message.clone())
}

/// Raw payload could not be converted into the requested type.
///
/// Never surfaces on its own: the client wraps it as
/// [`LlmError::ResponseValidation`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cannot decode {observed} to {target}: {reason}")]
pub struct DeserializationError {
    /// Shape of the value received
    pub observed: String,

    /// Type that was requested
    pub target: String,

    /// What went wrong
    pub reason: String,
}

impl DeserializationError {
    pub fn new(
        observed: impl Into<String>,
        target: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            observed: observed.into(),
            target: target.into(),
            reason: reason.into(),
        }
    }
}

/// Client error types
#[derive(Error, Debug)]
pub enum LlmError {
    /// Transient provider failure (retryable)
    #[error("Request error: {0}")]
    Request(#[from] RequestError),

    /// Retry policy exhausted
    #[error(transparent)]
    Retry(#[from] RetryError),

    /// Decoded payload does not match the requested type or schema
    #[error("Response validation error: {message}")]
    ResponseValidation {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid construction-time configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Non-retryable adapter failure, passed through as-is
    #[error(transparent)]
    Provider(#[from] anyhow::Error),
}

impl LlmError {
    /// Build a validation error without an underlying cause
    pub fn validation(message: impl Into<String>) -> Self {
        LlmError::ResponseValidation {
            message: message.into(),
            source: None,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Request(_))
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            LlmError::Request(_) => {
                "The AI service is temporarily unavailable. Please try again.".into()
            }
            LlmError::Retry(e) => format!(
                "The AI service did not respond after {} attempts. Please try again later.",
                e.attempt_count
            ),
            LlmError::ResponseValidation { .. } => {
                "The AI service returned a malformed response.".into()
            }
            LlmError::Configuration(msg) => format!("Invalid client configuration: {msg}"),
            LlmError::Provider(_) => "The AI service encountered an error.".into(),
        }
    }
}

impl From<DeserializationError> for LlmError {
    fn from(err: DeserializationError) -> Self {
        LlmError::ResponseValidation {
            message: "Failed to deserialize tool call response".into(),
            source: Some(Box::new(err)),
        }
    }
}
