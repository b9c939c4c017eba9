//! Payload Decoding
//!
//! Adapters hand back tool call results in whatever shape their SDK produces.
//! [`Decoder`] turns that raw payload into the exact type the caller asked
//! for:
//!
//! 1. a [`RawPayload::Typed`] value that already is the target type is
//!    returned as-is;
//! 2. otherwise the decoder registered for the payload's [`PayloadKind`]
//!    converts it to plain JSON data, which is then deserialized;
//! 3. with no decoder for the kind, types built from a single string
//!    (paths, UUIDs) are constructed straight from the raw text;
//! 4. anything else is a [`DeserializationError`].
//!
//! There is exactly one decoder per kind. A user decoder replaces the
//! built-in one for its kind; two user decoders for the same kind are a
//! configuration error.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{DeserializationError, LlmError, Result};
use crate::schema::{ResponseType, json_kind, type_name};

/// Raw tool call payload as returned by an adapter
pub enum RawPayload {
    /// JSON text (function call arguments, usually)
    Text(String),
    /// JSON bytes
    Bytes(Vec<u8>),
    /// Already parsed JSON
    Json(Value),
    /// A native value; returned untouched when it has the requested type
    Typed(Box<dyn Any + Send>),
}

/// Source shape of a [`RawPayload`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Text,
    Bytes,
    Json,
    Typed,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadKind::Text => write!(f, "text"),
            PayloadKind::Bytes => write!(f, "bytes"),
            PayloadKind::Json => write!(f, "json"),
            PayloadKind::Typed => write!(f, "typed"),
        }
    }
}

impl RawPayload {
    /// Wrap a native value
    pub fn typed<T: Send + 'static>(value: T) -> Self {
        RawPayload::Typed(Box::new(value))
    }

    pub fn kind(&self) -> PayloadKind {
        match self {
            RawPayload::Text(_) => PayloadKind::Text,
            RawPayload::Bytes(_) => PayloadKind::Bytes,
            RawPayload::Json(_) => PayloadKind::Json,
            RawPayload::Typed(_) => PayloadKind::Typed,
        }
    }

    /// Textual form, when the payload has one
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawPayload::Text(text) => Some(text),
            RawPayload::Bytes(bytes) => std::str::from_utf8(bytes).ok(),
            RawPayload::Json(Value::String(text)) => Some(text),
            RawPayload::Json(_) => None,
            RawPayload::Typed(value) => value
                .downcast_ref::<String>()
                .map(String::as_str)
                .or_else(|| value.downcast_ref::<&'static str>().copied()),
        }
    }

    /// Observed shape, for error messages
    pub fn describe(&self) -> String {
        match self {
            RawPayload::Json(value) => format!("json {}", json_kind(value)),
            other => other.kind().to_string(),
        }
    }
}

impl fmt::Debug for RawPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawPayload::Text(text) => f.debug_tuple("Text").field(text).finish(),
            RawPayload::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            RawPayload::Json(value) => f.debug_tuple("Json").field(value).finish(),
            RawPayload::Typed(_) => f.write_str("Typed(..)"),
        }
    }
}

impl From<String> for RawPayload {
    fn from(text: String) -> Self {
        RawPayload::Text(text)
    }
}

impl From<&str> for RawPayload {
    fn from(text: &str) -> Self {
        RawPayload::Text(text.to_string())
    }
}

impl From<Vec<u8>> for RawPayload {
    fn from(bytes: Vec<u8>) -> Self {
        RawPayload::Bytes(bytes)
    }
}

impl From<Value> for RawPayload {
    fn from(value: Value) -> Self {
        RawPayload::Json(value)
    }
}

/// Converts one kind of raw payload into plain JSON data
pub trait PayloadDecoder: Send + Sync {
    /// The payload kind this decoder handles
    fn kind(&self) -> PayloadKind;

    /// Convert the payload. Must not assume anything about the target type.
    fn decode(&self, payload: &RawPayload) -> std::result::Result<Value, DeserializationError>;
}

/// [`PayloadDecoder`] backed by a closure
pub struct FnDecoder<F> {
    kind: PayloadKind,
    convert: F,
}

impl<F> FnDecoder<F>
where
    F: Fn(&RawPayload) -> std::result::Result<Value, DeserializationError> + Send + Sync,
{
    pub fn new(kind: PayloadKind, convert: F) -> Self {
        Self { kind, convert }
    }
}

impl<F> PayloadDecoder for FnDecoder<F>
where
    F: Fn(&RawPayload) -> std::result::Result<Value, DeserializationError> + Send + Sync,
{
    fn kind(&self) -> PayloadKind {
        self.kind
    }

    fn decode(&self, payload: &RawPayload) -> std::result::Result<Value, DeserializationError> {
        (self.convert)(payload)
    }
}

/// Built-in decoder: JSON text and JSON bytes are parsed, parsed JSON is
/// passed through
struct JsonDecoder(PayloadKind);

impl PayloadDecoder for JsonDecoder {
    fn kind(&self) -> PayloadKind {
        self.0
    }

    fn decode(&self, payload: &RawPayload) -> std::result::Result<Value, DeserializationError> {
        let parsed = match payload {
            RawPayload::Text(text) => serde_json::from_str(text),
            RawPayload::Bytes(bytes) => serde_json::from_slice(bytes),
            RawPayload::Json(value) => return Ok(value.clone()),
            RawPayload::Typed(_) => {
                return Err(DeserializationError::new(
                    payload.describe(),
                    "json",
                    "native values are not JSON",
                ));
            }
        };
        parsed.map_err(|e| DeserializationError::new(payload.describe(), "json", e.to_string()))
    }
}

/// Type-to-converter registry used for tool call responses.
///
/// Read-only once built, so one instance is shared by all concurrent calls.
#[derive(Clone)]
pub struct Decoder {
    defaults: HashMap<PayloadKind, Arc<dyn PayloadDecoder>>,
    overrides: HashMap<PayloadKind, Arc<dyn PayloadDecoder>>,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    /// Decoder with the built-in text, bytes and JSON handling
    pub fn new() -> Self {
        let defaults = [PayloadKind::Text, PayloadKind::Bytes, PayloadKind::Json]
            .into_iter()
            .map(|kind| (kind, Arc::new(JsonDecoder(kind)) as Arc<dyn PayloadDecoder>))
            .collect();

        Self {
            defaults,
            overrides: HashMap::new(),
        }
    }

    /// Built-in decoders plus user overrides (at most one per kind)
    pub fn with_overrides<I>(overrides: I) -> Result<Self>
    where
        I: IntoIterator<Item = Arc<dyn PayloadDecoder>>,
    {
        let mut decoder = Self::new();
        for custom in overrides {
            let kind = custom.kind();
            if decoder.overrides.insert(kind, custom).is_some() {
                return Err(LlmError::Configuration(format!(
                    "more than one decoder registered for {kind} payloads"
                )));
            }
        }
        Ok(decoder)
    }

    /// Decoder applied to payloads of `kind`
    pub fn lookup(&self, kind: PayloadKind) -> Option<&Arc<dyn PayloadDecoder>> {
        self.overrides.get(&kind).or_else(|| self.defaults.get(&kind))
    }

    /// Convert `payload` into `T`
    pub fn decode<T: ResponseType>(
        &self,
        payload: RawPayload,
    ) -> std::result::Result<T, DeserializationError> {
        let payload = match payload {
            RawPayload::Typed(value) => match value.downcast::<T>() {
                Ok(typed) => return Ok(*typed),
                Err(value) => RawPayload::Typed(value),
            },
            other => other,
        };

        let target = type_name::<T>();

        if let Some(decoder) = self.lookup(payload.kind()) {
            let plain = decoder.decode(&payload)?;
            return serde_json::from_value(plain)
                .map_err(|e| DeserializationError::new(payload.describe(), target, e.to_string()));
        }

        if let Some(text) = payload.as_text() {
            return serde_json::from_value(Value::String(text.to_string()))
                .map_err(|e| DeserializationError::new(payload.describe(), target, e.to_string()));
        }

        Err(DeserializationError::new(
            payload.describe(),
            target,
            "no decoder registered for this payload",
        ))
    }
}

impl fmt::Debug for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut overridden: Vec<String> = self.overrides.keys().map(ToString::to_string).collect();
        overridden.sort();
        f.debug_struct("Decoder").field("overrides", &overridden).finish()
    }
}
