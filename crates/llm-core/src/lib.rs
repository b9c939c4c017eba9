//! # llm-core
//!
//! Provider-agnostic LLM client with retries, structured tool calls and
//! streaming.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         LlmClient                            │
//! │  ┌─────────────┐  ┌─────────────┐  ┌──────────────────────┐  │
//! │  │ RetryCaller │  │   Decoder   │  │   ProviderAdapter    │  │
//! │  │  (backoff)  │──│  + Schema   │──│     (Strategy)       │  │
//! │  └─────────────┘  └─────────────┘  └──────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! A `ProviderAdapter` only talks to one vendor's SDK. Retries, decoding,
//! schema validation and callbacks live in the client and behave the same
//! for every provider.

pub mod client;
pub mod decoder;
pub mod error;
pub mod message;
pub mod provider;
pub mod response;
pub mod retry;
pub mod schema;
pub mod tool;

#[cfg(test)]
mod testing;

pub use client::{CompletionOptions, LlmClient, LlmClientBuilder, ResponseStream, ToolCallOptions};
pub use decoder::{Decoder, FnDecoder, PayloadDecoder, PayloadKind, RawPayload};
pub use error::{DeserializationError, LlmError, RequestError, Result, RetryError};
pub use message::{InputMessage, Role};
pub use provider::{ChunkStream, CompletionConfig, ProviderAdapter};
pub use response::{Callback, LLMResponse};
pub use retry::{RetryCaller, RetryConfig};
pub use schema::{
    CompiledSchema, JsonSchemaValidator, ResponseType, SchemaHook, SchemaValidator,
    SchemaViolation, generate_schema,
};
pub use schemars::JsonSchema;
pub use tool::ToolDefinition;
