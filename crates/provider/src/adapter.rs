//! Enum dispatch over the per-vendor adapters.

use crate::{AnthropicAdapter, DeepSeekAdapter, GeminiAdapter, LlmClient, OpenAiAdapter};
use compact_str::CompactString;
use manta_core::{Error, LLMResponse, Provider, UniversalRequest};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Unified adapter enum.
///
/// The gateway constructs the appropriate variant for the provider resolved
/// from the model name; callers dispatch through one uniform contract.
#[derive(Debug, Clone)]
pub enum Adapter {
    /// OpenAI Responses API. Also serves xAI's compatible endpoint.
    OpenAi(OpenAiAdapter),
    /// Anthropic Messages API.
    Anthropic(AnthropicAdapter),
    /// Google Gemini generateContent API.
    Gemini(GeminiAdapter),
    /// DeepSeek chat completions API.
    DeepSeek(DeepSeekAdapter),
}

impl Adapter {
    /// Wrap a resolved client in the adapter for its provider.
    pub fn for_provider(provider: Provider, client: LlmClient) -> Result<Self, Error> {
        match provider {
            Provider::OpenAi | Provider::Xai => {
                Ok(Self::OpenAi(OpenAiAdapter::new(client, provider)))
            }
            Provider::Anthropic => Ok(Self::Anthropic(AnthropicAdapter::new(client))),
            Provider::Gemini => Ok(Self::Gemini(GeminiAdapter::new(client))),
            Provider::DeepSeek => Ok(Self::DeepSeek(DeepSeekAdapter::new(client))),
            Provider::Unknown => Err(Error::llm(provider, "no adapter for unknown provider")),
        }
    }

    /// The provider this adapter serves.
    pub fn provider(&self) -> Provider {
        match self {
            Self::OpenAi(a) => a.provider(),
            Self::Anthropic(_) => Provider::Anthropic,
            Self::Gemini(_) => Provider::Gemini,
            Self::DeepSeek(_) => Provider::DeepSeek,
        }
    }

    /// Translate the universal request into the vendor wire format, call the
    /// vendor, and normalize the response. Any failure surfaces as
    /// [`Error::Llm`].
    pub async fn create_response(&self, req: &UniversalRequest) -> Result<LLMResponse, Error> {
        match self {
            Self::OpenAi(a) => a.create_response(req).await,
            Self::Anthropic(a) => a.create_response(req).await,
            Self::Gemini(a) => a.create_response(req).await,
            Self::DeepSeek(a) => a.create_response(req).await,
        }
    }
}

/// A tool call an adapter has emitted, remembered so a later
/// `function_call_output` can be rebuilt into the vendor's request/result
/// pair shape.
#[derive(Debug, Clone)]
pub(crate) struct PendingCall {
    pub name: CompactString,
    /// The call arguments in object form.
    pub input: Value,
}

/// Capped registry of emitted tool calls, keyed by call id.
///
/// Only needed by vendors without native call-id correlation. Entries are
/// inserted when a tool call is normalized out of a response and read (not
/// removed) when a matching result arrives; the oldest entries are evicted
/// past the cap so the registry stays bounded for the process lifetime.
/// Cloning shares the underlying registry.
#[derive(Debug, Clone, Default)]
pub(crate) struct PendingCalls {
    inner: Arc<Mutex<PendingInner>>,
}

#[derive(Debug, Default)]
struct PendingInner {
    calls: HashMap<CompactString, PendingCall>,
    order: VecDeque<CompactString>,
}

const PENDING_CALL_CAP: usize = 1024;

impl PendingCalls {
    pub fn record(&self, call_id: &str, name: impl Into<CompactString>, input: Value) {
        if call_id.is_empty() {
            return;
        }

        let id = CompactString::from(call_id);
        let mut inner = self.inner.lock();
        if inner
            .calls
            .insert(
                id.clone(),
                PendingCall {
                    name: name.into(),
                    input,
                },
            )
            .is_none()
        {
            inner.order.push_back(id);
        }

        while inner.order.len() > PENDING_CALL_CAP {
            if let Some(oldest) = inner.order.pop_front() {
                inner.calls.remove(&oldest);
            }
        }
    }

    pub fn get(&self, call_id: &str) -> Option<PendingCall> {
        self.inner.lock().calls.get(call_id).cloned()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().calls.len()
    }
}

/// Render a tool output value as text for vendors that expect a string.
pub(crate) fn serialize_tool_output(output: &Value) -> String {
    match output {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Normalize vendor tool arguments to object form for the pending registry.
pub(crate) fn tool_input_object(args: &Value) -> Value {
    match args {
        Value::Object(_) => args.clone(),
        Value::Null => Value::Object(Default::default()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(parsed @ Value::Object(_)) => parsed,
            Ok(other) => serde_json::json!({ "value": other }),
            Err(_) => serde_json::json!({ "value": s }),
        },
        other => serde_json::json!({ "value": other }),
    }
}
