//! Scripted adapter and validator for tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;

use crate::decoder::RawPayload;
use crate::error::{LlmError, Result};
use crate::message::InputMessage;
use crate::provider::{ChunkStream, CompletionConfig, ProviderAdapter};
use crate::schema::{
    CompiledSchema, JsonSchemaValidator, ResponseType, SchemaValidator, SchemaViolation,
};
use crate::tool::ToolDefinition;

type Chunks = Vec<Result<(String, u32)>>;

/// Tool as the adapter received it
#[derive(Clone, Debug)]
pub struct SeenTool {
    pub name: String,
    pub schema: Value,
    pub description: Option<String>,
}

/// Adapter that replays queued outcomes, one per call
pub struct ScriptedAdapter {
    completions: Mutex<VecDeque<Result<(String, u32)>>>,
    tool_calls: Mutex<VecDeque<Result<(RawPayload, u32)>>>,
    streams: Mutex<VecDeque<Result<Chunks>>>,
    seen_tools: Mutex<Vec<SeenTool>>,
    completion_calls: AtomicU32,
    tool_call_calls: AtomicU32,
    stream_calls: AtomicU32,
    latency: Duration,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self {
            completions: Mutex::new(VecDeque::new()),
            tool_calls: Mutex::new(VecDeque::new()),
            streams: Mutex::new(VecDeque::new()),
            seen_tools: Mutex::new(Vec::new()),
            completion_calls: AtomicU32::new(0),
            tool_call_calls: AtomicU32::new(0),
            stream_calls: AtomicU32::new(0),
            latency: Duration::from_millis(2),
        }
    }

    pub fn completion(self, outcome: Result<(String, u32)>) -> Self {
        self.completions.lock().unwrap().push_back(outcome);
        self
    }

    pub fn tool_call(self, outcome: Result<(RawPayload, u32)>) -> Self {
        self.tool_calls.lock().unwrap().push_back(outcome);
        self
    }

    pub fn stream(self, outcome: Result<Chunks>) -> Self {
        self.streams.lock().unwrap().push_back(outcome);
        self
    }

    pub fn completion_calls(&self) -> u32 {
        self.completion_calls.load(Ordering::SeqCst)
    }

    pub fn tool_calls(&self) -> u32 {
        self.tool_call_calls.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> u32 {
        self.stream_calls.load(Ordering::SeqCst)
    }

    pub fn seen_tools(&self) -> Vec<SeenTool> {
        self.seen_tools.lock().unwrap().clone()
    }

    fn next<T>(queue: &Mutex<VecDeque<Result<T>>>) -> Result<T> {
        queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted").into()))
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    type ClientConfig = String;
    type Client = String;
    type CompletionConfig = CompletionConfig;

    fn instantiate_client(&self, api_key: String) -> Result<String> {
        if api_key.is_empty() {
            return Err(LlmError::Configuration("api key must not be empty".into()));
        }
        Ok(api_key)
    }

    async fn generate_completion(
        &self,
        _client: &String,
        _messages: &[InputMessage],
        _config: &CompletionConfig,
    ) -> Result<(String, u32)> {
        self.completion_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        Self::next(&self.completions)
    }

    async fn generate_tool_call<R: ResponseType>(
        &self,
        _client: &String,
        _messages: &[InputMessage],
        tool: &ToolDefinition<R>,
        _config: &CompletionConfig,
    ) -> Result<(RawPayload, u32)> {
        self.tool_call_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_tools.lock().unwrap().push(SeenTool {
            name: tool.name().to_string(),
            schema: tool.schema().clone(),
            description: tool.description().map(str::to_string),
        });
        tokio::time::sleep(self.latency).await;
        Self::next(&self.tool_calls)
    }

    async fn generate_completion_stream(
        &self,
        _client: &String,
        _messages: &[InputMessage],
        _config: &CompletionConfig,
    ) -> Result<ChunkStream> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let chunks = Self::next(&self.streams)?;
        let latency = self.latency;

        let stream = futures::stream::iter(chunks).then(move |chunk| async move {
            tokio::time::sleep(latency).await;
            chunk
        });
        Ok(Box::pin(stream))
    }
}

/// Schema validator that counts its invocations
#[derive(Default)]
pub struct CountingValidator {
    calls: Arc<AtomicU32>,
}

impl CountingValidator {
    pub fn calls(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }
}

impl SchemaValidator for CountingValidator {
    fn validate(
        &self,
        instance: &Value,
        schema: &CompiledSchema,
    ) -> std::result::Result<(), Vec<SchemaViolation>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        JsonSchemaValidator.validate(instance, schema)
    }
}
