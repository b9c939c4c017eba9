//! Responses and Callbacks

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// Response from an LLM operation: one per completion, per tool call and per
/// streamed chunk
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LLMResponse<C> {
    /// Completion text, decoded tool result, or stream chunk
    pub content: C,

    /// Tokens reported by the provider
    pub tokens: u32,

    /// Time spent producing this response
    pub duration: Duration,
}

impl<C> LLMResponse<C> {
    pub fn new(content: C, tokens: u32, duration: Duration) -> Self {
        Self {
            content,
            tokens,
            duration,
        }
    }

    /// Duration in (fractional) seconds
    pub fn duration_secs(&self) -> f64 {
        self.duration.as_secs_f64()
    }

    /// Transform the content, keeping tokens and duration
    pub fn map<U>(self, f: impl FnOnce(C) -> U) -> LLMResponse<U> {
        LLMResponse {
            content: f(self.content),
            tokens: self.tokens,
            duration: self.duration,
        }
    }
}

type SyncTransform<T> = dyn Fn(LLMResponse<T>) -> LLMResponse<T> + Send + Sync;
type AsyncTransform<T> = dyn Fn(LLMResponse<T>) -> BoxFuture<'static, LLMResponse<T>> + Send + Sync;

/// Post-processing step applied to a response before it reaches the caller
pub enum Callback<T> {
    /// Plain function
    Sync(Arc<SyncTransform<T>>),
    /// Function returning a future; awaited before the response is returned
    Async(Arc<AsyncTransform<T>>),
}

impl<T: Send + 'static> Callback<T> {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(LLMResponse<T>) -> LLMResponse<T> + Send + Sync + 'static,
    {
        Callback::Sync(Arc::new(f))
    }

    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(LLMResponse<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LLMResponse<T>> + Send + 'static,
    {
        Callback::Async(Arc::new(move |response| -> BoxFuture<'static, LLMResponse<T>> {
            Box::pin(f(response))
        }))
    }

    /// Run the callback, awaiting only the async variant
    pub async fn apply(&self, response: LLMResponse<T>) -> LLMResponse<T> {
        match self {
            Callback::Sync(f) => f(response),
            Callback::Async(f) => f(response).await,
        }
    }
}

impl<T> Clone for Callback<T> {
    fn clone(&self) -> Self {
        match self {
            Callback::Sync(f) => Callback::Sync(Arc::clone(f)),
            Callback::Async(f) => Callback::Async(Arc::clone(f)),
        }
    }
}

impl<T> fmt::Debug for Callback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::Sync(_) => f.write_str("Callback::Sync"),
            Callback::Async(_) => f.write_str("Callback::Async"),
        }
    }
}
