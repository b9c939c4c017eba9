//! LLM Client
//!
//! [`LlmClient`] wraps a [`ProviderAdapter`] and exposes the three public
//! operations. Each call owns its own [`RetryCaller`]; the client itself is
//! read-only after [`LlmClientBuilder::build`], so one instance can serve
//! many concurrent calls.
//!
//! Tool calls run in a fixed order: resolve the [`ToolDefinition`], call the
//! adapter under the retry policy, decode, apply the callback, then validate
//! against the tool's schema.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, warn};

use crate::decoder::{Decoder, PayloadDecoder};
use crate::error::{LlmError, Result};
use crate::message::InputMessage;
use crate::provider::ProviderAdapter;
use crate::response::{Callback, LLMResponse};
use crate::retry::{RetryCaller, RetryConfig};
use crate::schema::{JsonSchemaValidator, ResponseType, SchemaHook, SchemaValidator};
use crate::tool::ToolDefinition;

/// Stream of completion chunks; an `Err` item ends the stream
pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<LLMResponse<String>>> + Send>>;

/// Options for [`LlmClient::text_completion`] and
/// [`LlmClient::stream_completion`]
#[derive(Clone, Debug, Default)]
pub struct CompletionOptions {
    /// Applied to every response (or chunk) before it is returned
    pub callback: Option<Callback<String>>,

    /// Overrides the client's default retry policy
    pub retry_config: Option<RetryConfig>,
}

impl CompletionOptions {
    pub fn with_callback(mut self, callback: Callback<String>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = Some(retry_config);
        self
    }
}

/// Options for [`LlmClient::tool_call`]
pub struct ToolCallOptions<T> {
    /// Applied to the decoded response before schema validation
    pub callback: Option<Callback<T>>,

    /// Tool description; defaults to the schema's `description`
    pub description: Option<String>,

    /// Re-validate the decoded result against the tool schema
    pub enforce_schema_validation: bool,

    /// Tool name; defaults to the lower-cased type name
    pub name: Option<String>,

    /// Overrides the client's default retry policy
    pub retry_config: Option<RetryConfig>,

    /// Tool schema; defaults to the type's generated schema
    pub schema: Option<Value>,
}

impl<T> Default for ToolCallOptions<T> {
    fn default() -> Self {
        Self {
            callback: None,
            description: None,
            enforce_schema_validation: true,
            name: None,
            retry_config: None,
            schema: None,
        }
    }
}

impl<T> ToolCallOptions<T> {
    pub fn with_callback(mut self, callback: Callback<T>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = Some(retry_config);
        self
    }

    /// Skip re-validation of the decoded result
    pub fn without_schema_validation(mut self) -> Self {
        self.enforce_schema_validation = false;
        self
    }
}

/// Provider-agnostic LLM client
pub struct LlmClient<A: ProviderAdapter> {
    adapter: A,
    client: A::Client,
    decoder: Decoder,
    schema_hook: Option<SchemaHook>,
    validator: Arc<dyn SchemaValidator>,
    retry_config: RetryConfig,
}

impl<A: ProviderAdapter> LlmClient<A> {
    /// Start building a client around `adapter`
    pub fn builder(adapter: A) -> LlmClientBuilder<A> {
        LlmClientBuilder::new(adapter)
    }

    /// Create a client with default settings
    pub fn new(adapter: A, client_config: A::ClientConfig) -> Result<Self> {
        Self::builder(adapter).client_config(client_config).build()
    }

    /// The adapter this client delegates to
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// The SDK client created by the adapter
    pub fn client(&self) -> &A::Client {
        &self.client
    }

    /// Decoder used for tool call payloads
    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    /// Retry policy used when a call does not supply one
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry_config
    }

    /// Generate a text completion
    pub async fn text_completion(
        &self,
        messages: &[InputMessage],
        config: &A::CompletionConfig,
        options: CompletionOptions,
    ) -> Result<LLMResponse<String>> {
        let retry_config = self.resolve_retry_config(options.retry_config)?;
        debug!(messages = messages.len(), "Dispatching text completion");

        let caller = RetryCaller::new(retry_config, || {
            self.adapter.generate_completion(&self.client, messages, config)
        });
        let ((content, tokens), duration) = caller.call_timed().await?;

        let mut response = LLMResponse::new(content, tokens, duration);
        if let Some(callback) = &options.callback {
            response = callback.apply(response).await;
        }

        debug!(
            tokens = response.tokens,
            duration_ms = response.duration.as_millis(),
            "Text completion finished"
        );
        Ok(response)
    }

    /// Build a tool definition for `T`, deriving whatever is not supplied
    pub fn prepare_tool_call<T: ResponseType>(
        &self,
        name: Option<String>,
        description: Option<String>,
        schema: Option<Value>,
    ) -> Result<ToolDefinition<T>> {
        ToolDefinition::derive(name, description, schema, self.schema_hook.as_ref())
    }

    /// Ask the model for a structured response of type `T`
    pub async fn tool_call<T: ResponseType>(
        &self,
        messages: &[InputMessage],
        config: &A::CompletionConfig,
        mut options: ToolCallOptions<T>,
    ) -> Result<LLMResponse<T>> {
        let tool = self.prepare_tool_call::<T>(
            options.name.take(),
            options.description.take(),
            options.schema.take(),
        )?;
        self.tool_call_with(messages, &tool, config, options).await
    }

    /// Tool call with a pre-built definition. `name`, `description` and
    /// `schema` in `options` are ignored.
    pub async fn tool_call_with<T: ResponseType>(
        &self,
        messages: &[InputMessage],
        tool: &ToolDefinition<T>,
        config: &A::CompletionConfig,
        options: ToolCallOptions<T>,
    ) -> Result<LLMResponse<T>> {
        let ToolCallOptions {
            callback,
            enforce_schema_validation,
            retry_config,
            ..
        } = options;
        let retry_config = self.resolve_retry_config(retry_config)?;
        debug!(tool = tool.name(), messages = messages.len(), "Dispatching tool call");

        let caller = RetryCaller::new(retry_config, || {
            self.adapter.generate_tool_call(&self.client, messages, tool, config)
        });
        let (payload, tokens) = caller.call().await?;

        let started = Instant::now();
        let content: T = self.decoder.decode(payload)?;

        let mut response = LLMResponse::new(content, tokens, started.elapsed());
        if let Some(callback) = &callback {
            response = callback.apply(response).await;
        }

        if enforce_schema_validation {
            self.validate_content(&response.content, tool)?;
        }
        response.duration = started.elapsed();

        debug!(
            tool = tool.name(),
            tokens = response.tokens,
            duration_ms = response.duration.as_millis(),
            "Tool call finished"
        );
        Ok(response)
    }

    /// Stream a completion chunk by chunk.
    ///
    /// Opening the stream is retried under the retry policy; failures after
    /// the first chunk are yielded once and end the stream.
    pub async fn stream_completion(
        &self,
        messages: &[InputMessage],
        config: &A::CompletionConfig,
        options: CompletionOptions,
    ) -> Result<ResponseStream> {
        let retry_config = self.resolve_retry_config(options.retry_config)?;
        debug!(messages = messages.len(), "Opening completion stream");

        let caller = RetryCaller::new(retry_config, || {
            self.adapter
                .generate_completion_stream(&self.client, messages, config)
        });
        let mut chunks = caller.call().await?;

        let callback = options.callback;
        let opened = Instant::now();

        let stream = async_stream::stream! {
            let mut last = opened;
            while let Some(chunk) = chunks.next().await {
                match chunk {
                    Ok((content, tokens)) => {
                        let mut response = LLMResponse::new(content, tokens, last.elapsed());
                        if let Some(callback) = &callback {
                            response = callback.apply(response).await;
                        }
                        last = Instant::now();
                        yield Ok(response);
                    }
                    Err(err) => {
                        warn!(error = %err, "Completion stream failed");
                        yield Err(err);
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    fn resolve_retry_config(&self, retry_config: Option<RetryConfig>) -> Result<RetryConfig> {
        match retry_config {
            Some(config) => {
                config.validate()?;
                Ok(config)
            }
            None => Ok(self.retry_config.clone()),
        }
    }

    fn validate_content<T: ResponseType>(
        &self,
        content: &T,
        tool: &ToolDefinition<T>,
    ) -> Result<()> {
        let plain = serde_json::to_value(content).map_err(|e| LlmError::ResponseValidation {
            message: format!("could not convert '{}' response to plain data", tool.name()),
            source: Some(Box::new(e)),
        })?;

        self.validator
            .validate(&plain, tool.compiled_schema())
            .map_err(|violations| {
                let details = violations
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                warn!(
                    tool = tool.name(),
                    violations = violations.len(),
                    "Schema validation failed"
                );
                LlmError::validation(format!(
                    "tool call response does not match schema for '{}': {details}",
                    tool.name()
                ))
            })
    }
}

impl<A: ProviderAdapter> fmt::Debug for LlmClient<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmClient")
            .field("adapter", &std::any::type_name::<A>())
            .field("decoder", &self.decoder)
            .field("schema_hook", &self.schema_hook.is_some())
            .field("retry_config", &self.retry_config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`LlmClient`]
pub struct LlmClientBuilder<A: ProviderAdapter> {
    adapter: A,
    client_config: Option<A::ClientConfig>,
    decoders: Vec<Arc<dyn PayloadDecoder>>,
    schema_hook: Option<SchemaHook>,
    validator: Option<Arc<dyn SchemaValidator>>,
    retry_config: RetryConfig,
}

impl<A: ProviderAdapter> LlmClientBuilder<A> {
    pub fn new(adapter: A) -> Self {
        Self {
            adapter,
            client_config: None,
            decoders: Vec::new(),
            schema_hook: None,
            validator: None,
            retry_config: RetryConfig::default(),
        }
    }

    /// Settings passed to [`ProviderAdapter::instantiate_client`]
    pub fn client_config(mut self, config: A::ClientConfig) -> Self {
        self.client_config = Some(config);
        self
    }

    /// Register a payload decoder (one per payload kind)
    pub fn decoder<D: PayloadDecoder + 'static>(mut self, decoder: D) -> Self {
        self.decoders.push(Arc::new(decoder));
        self
    }

    /// Post-process every generated tool schema
    pub fn schema_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, Value) -> Value + Send + Sync + 'static,
    {
        self.schema_hook = Some(Arc::new(hook));
        self
    }

    /// Replace the built-in schema validator
    pub fn validator<V: SchemaValidator + 'static>(mut self, validator: V) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Default retry policy for calls that do not supply one
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Validate the configuration and create the SDK client
    pub fn build(self) -> Result<LlmClient<A>> {
        self.retry_config.validate()?;
        let decoder = Decoder::with_overrides(self.decoders)?;
        let client_config = self
            .client_config
            .ok_or_else(|| LlmError::Configuration("client configuration is required".into()))?;

        let client = self.adapter.instantiate_client(client_config)?;
        debug!(adapter = std::any::type_name::<A>(), "LLM client ready");

        Ok(LlmClient {
            adapter: self.adapter,
            client,
            decoder,
            schema_hook: self.schema_hook,
            validator: self
                .validator
                .unwrap_or_else(|| Arc::new(JsonSchemaValidator)),
            retry_config: self.retry_config,
        })
    }
}
