//! The normalized response contract.
//!
//! Every adapter constructs an [`LLMResponse`] fresh from one vendor
//! response. It is immutable and has no persistence of its own; the caller
//! decides whether and how to store it.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Normalized completion status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// The model produced a final answer.
    Completed,
    /// The model requested one or more tool calls.
    ToolCalls,
    /// The vendor reported a non-success terminal state.
    Failed,
}

impl ResponseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::ToolCalls => "tool_calls",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn function_call_type() -> CompactString {
    CompactString::const_new("function_call")
}

/// A model-issued request to invoke a named function.
///
/// `arguments` is always valid JSON text, regardless of how the vendor
/// originally encoded the parameters, so downstream tool-invocation code has
/// one parsing path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: CompactString,
    #[serde(rename = "type", default = "function_call_type")]
    pub call_type: CompactString,
    pub name: CompactString,
    pub arguments: String,
}

impl ToolCall {
    pub fn new(
        call_id: impl Into<CompactString>,
        name: impl Into<CompactString>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            call_type: function_call_type(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse the JSON-encoded arguments.
    pub fn parse_arguments(&self) -> serde_json::Result<Value> {
        serde_json::from_str(&self.arguments)
    }
}

/// Re-encode vendor tool arguments as a JSON string.
///
/// Vendors encode parameters either as a JSON string or as a native
/// structure; the normalized form is always JSON text. A string that is not
/// itself valid JSON is wrapped as `{"value": …}` so the invariant holds.
pub fn encode_tool_arguments(args: &Value) -> String {
    match args {
        Value::Null => "{}".to_owned(),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(_) => s.clone(),
            Err(_) => serde_json::json!({ "value": s }).to_string(),
        },
        other => other.to_string(),
    }
}

/// Token usage, defaulting to 0 when a vendor omits it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64, total_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// A typed output content block (text or generated image).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        media_type: CompactString,
        data: String,
    },
}

/// The normalized result of one vendor call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub id: CompactString,
    pub model: CompactString,
    pub status: ResponseStatus,
    /// Concatenated text output.
    #[serde(default)]
    pub output_text: String,
    /// Tool calls requested by the model, in vendor order.
    #[serde(default)]
    pub output: Vec<ToolCall>,
    #[serde(default)]
    pub usage: Usage,
    /// Newline-joined reasoning fragments, empty if the vendor exposes none.
    #[serde(default)]
    pub reasoning_content: String,
    /// Typed output blocks, including any generated images.
    #[serde(default)]
    pub content_parts: Vec<ContentBlock>,
}

impl LLMResponse {
    /// Whether the model requested at least one tool call.
    pub fn has_tool_calls(&self) -> bool {
        !self.output.is_empty()
    }
}
