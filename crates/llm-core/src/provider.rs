//! Provider Adapter Contract
//!
//! Defines the four operations every LLM vendor integration implements. The
//! client orchestrates retries, decoding, validation and callbacks on top of
//! them, so an adapter only translates messages and talks to its SDK.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use llm_core::provider::ProviderAdapter;
//!
//! // Pick a provider by composition
//! let client = LlmClient::builder(OpenAiAdapter)
//!     .client_config(OpenAiConfig::from_env()?)
//!     .build()?;
//!
//! let response = client.text_completion(&messages, &config, CompletionOptions::default()).await?;
//! ```

use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::decoder::RawPayload;
use crate::error::Result;
use crate::message::InputMessage;
use crate::schema::ResponseType;
use crate::tool::ToolDefinition;

/// Stream of `(chunk, tokens)` pairs from a streaming completion
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<(String, u32)>> + Send>>;

/// Capability interface implemented once per LLM vendor.
///
/// Transient failures must be reported as
/// [`LlmError::Request`](crate::LlmError::Request) so the client can retry
/// them; anything else is passed back to the caller unchanged.
#[async_trait]
pub trait ProviderAdapter: Send + Sync + 'static {
    /// Settings needed to build the SDK client
    type ClientConfig: Send;

    /// SDK client handle, created once per [`LlmClient`](crate::LlmClient)
    type Client: Send + Sync;

    /// Per-request settings (model, temperature, ...)
    type CompletionConfig: Send + Sync;

    /// Create the SDK client. Called once, before any request is made.
    fn instantiate_client(&self, config: Self::ClientConfig) -> Result<Self::Client>;

    /// Generate a completion, returning the text and the tokens used
    async fn generate_completion(
        &self,
        client: &Self::Client,
        messages: &[InputMessage],
        config: &Self::CompletionConfig,
    ) -> Result<(String, u32)>;

    /// Ask the model to answer through `tool`, returning the raw tool call
    /// payload and the tokens used
    async fn generate_tool_call<R: ResponseType>(
        &self,
        client: &Self::Client,
        messages: &[InputMessage],
        tool: &ToolDefinition<R>,
        config: &Self::CompletionConfig,
    ) -> Result<(RawPayload, u32)>;

    /// Open a streaming completion
    async fn generate_completion_stream(
        &self,
        client: &Self::Client,
        messages: &[InputMessage],
        config: &Self::CompletionConfig,
    ) -> Result<ChunkStream>;
}

/// Vendor-neutral request settings adapters may use as their
/// `CompletionConfig`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Model identifier (e.g., "gpt-4o", "claude-3-sonnet")
    pub model: String,

    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Nucleus sampling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,

    /// Seed for best-effort deterministic sampling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// End-user identifier forwarded to the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Request timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<f64>,

    /// Free-form metadata attached to the request
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl CompletionConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: None,
            max_tokens: None,
            top_p: None,
            stop_sequences: Vec::new(),
            seed: None,
            user: None,
            timeout_secs: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Request timeout, if one was set
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}
