//! Anthropic Messages API adapter.
//!
//! Anthropic is integrated as client-side history, so `previous_response_id`
//! is ignored. Tool results must pair with a `tool_use` block in a preceding
//! assistant turn; the pending-call registry reconstructs that pair, and an
//! unrecognized call id degrades to a plain-text user turn rather than a
//! hard API error.

use crate::LlmClient;
use crate::adapter::{PendingCalls, serialize_tool_output, tool_input_object};
use compact_str::CompactString;
use manta_core::{
    Content, ContentBlock, ContentPart, Error, ImageAttachment, InputItem, LLMResponse, Provider,
    ResponseStatus, Role, ToolCall, ToolChoice, UniversalRequest, Usage, encode_tool_arguments,
    guess_mime,
};
use serde::Deserialize;
use serde_json::{Value, json};

const DEFAULT_MAX_TOKENS: u64 = 2048;

/// Adapter for the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicAdapter {
    client: LlmClient,
    pending: PendingCalls,
}

impl AnthropicAdapter {
    pub fn new(client: LlmClient) -> Self {
        Self {
            client,
            pending: PendingCalls::default(),
        }
    }

    /// Call the Messages API and map the result to the common shape.
    pub async fn create_response(&self, req: &UniversalRequest) -> Result<LLMResponse, Error> {
        let body = self.build_body(req);
        tracing::trace!("request: {body}");

        let resp = self
            .client
            .http
            .post(&self.client.endpoint)
            .headers(self.client.headers.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::llm(Provider::Anthropic, e))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::llm(Provider::Anthropic, e))?;
        if !status.is_success() {
            return Err(Error::llm(
                Provider::Anthropic,
                format!("HTTP {status}: {text}"),
            ));
        }

        tracing::trace!("response: {text}");
        let raw: RawResponse = serde_json::from_str(&text)
            .map_err(|e| Error::llm(Provider::Anthropic, format!("malformed response: {e}")))?;
        Ok(self.to_response(raw, &req.model))
    }

    fn build_body(&self, req: &UniversalRequest) -> Value {
        let (system, mut messages) = self.render_messages(&req.input);
        if !req.images.is_empty() {
            attach_images(&mut messages, &req.images);
        }

        let hint = req.text.as_ref();
        let max_tokens = hint
            .and_then(|t| t.get("max_tokens"))
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let mut body = json!({
            "model": req.model,
            "max_tokens": max_tokens,
            "messages": messages,
        });

        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if let Some(temperature) = hint.and_then(|t| t.get("temperature")).and_then(Value::as_f64)
        {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = hint.and_then(|t| t.get("top_p")).and_then(Value::as_f64) {
            body["top_p"] = json!(top_p);
        }

        if !req.tools.is_empty() {
            body["tools"] = req
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "description": tool.description,
                        "input_schema": tool.parameters,
                    })
                })
                .collect();
            if let Some(choice) = render_tool_choice(&req.tool_choice, req) {
                body["tool_choice"] = choice;
            }
        }

        body
    }

    /// Split system turns into the top-level system prompt and render the
    /// rest in Messages content-block format.
    fn render_messages(&self, input: &[InputItem]) -> (Option<String>, Vec<Value>) {
        let mut system_parts: Vec<String> = Vec::new();
        let mut messages: Vec<Value> = Vec::new();

        for item in input {
            match item {
                InputItem::Message(turn) if turn.role == Role::System => {
                    let text = turn.content.text();
                    if !text.is_empty() {
                        system_parts.push(text);
                    }
                }
                InputItem::Message(turn) => {
                    let role = match turn.role {
                        Role::User => "user",
                        _ => "assistant",
                    };
                    messages.push(json!({ "role": role, "content": render_content(&turn.content) }));
                }
                InputItem::FunctionCallOutput(out) => {
                    let output_text = serialize_tool_output(&out.output);
                    if let Some(prior) = self.pending.get(&out.call_id) {
                        messages.push(json!({
                            "role": "assistant",
                            "content": [{
                                "type": "tool_use",
                                "id": out.call_id,
                                "name": prior.name,
                                "input": prior.input,
                            }],
                        }));
                        messages.push(json!({
                            "role": "user",
                            "content": [{
                                "type": "tool_result",
                                "tool_use_id": out.call_id,
                                "content": output_text,
                            }],
                        }));
                    } else {
                        tracing::warn!(
                            call_id = %out.call_id,
                            "no recorded tool_use for call id, sending tool output as plain text"
                        );
                        messages.push(json!({
                            "role": "user",
                            "content": format!("Tool result:\n{output_text}"),
                        }));
                    }
                }
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n"))
        };
        (system, messages)
    }

    fn to_response(&self, raw: RawResponse, fallback_model: &str) -> LLMResponse {
        let mut output_text = String::new();
        let mut tool_calls = Vec::new();
        let mut content_parts = Vec::new();
        let mut reasoning: Vec<String> = Vec::new();

        for block in raw.content {
            match block {
                RawBlock::Text { text } => {
                    if !text.is_empty() {
                        output_text.push_str(&text);
                        content_parts.push(ContentBlock::Text { text });
                    }
                }
                RawBlock::Thinking { thinking } => {
                    if !thinking.is_empty() {
                        reasoning.push(thinking);
                    }
                }
                RawBlock::ToolUse { id, name, input } => {
                    self.pending
                        .record(&id, name.clone(), tool_input_object(&input));
                    tool_calls.push(ToolCall::new(id, name, encode_tool_arguments(&input)));
                }
                RawBlock::Image { source } => {
                    if !source.data.is_empty() {
                        content_parts.push(ContentBlock::Image {
                            media_type: source.media_type,
                            data: source.data,
                        });
                    }
                }
                RawBlock::Other => {}
            }
        }

        let status = if tool_calls.is_empty() {
            ResponseStatus::Completed
        } else {
            ResponseStatus::ToolCalls
        };

        let usage = raw
            .usage
            .map(|u| Usage::new(u.input_tokens, u.output_tokens, u.input_tokens + u.output_tokens))
            .unwrap_or_default();

        LLMResponse {
            id: raw.id,
            model: if raw.model.is_empty() {
                CompactString::from(fallback_model)
            } else {
                raw.model
            },
            status,
            output_text,
            output: tool_calls,
            usage,
            reasoning_content: reasoning.join("\n"),
            content_parts,
        }
    }
}

fn render_content(content: &Content) -> Value {
    match content {
        Content::Text(text) => json!(text),
        Content::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => json!({ "type": "text", "text": text }),
                ContentPart::Image { media_type, data } => json!({
                    "type": "image",
                    "source": {
                        "type": "base64",
                        "media_type": media_type,
                        "data": data,
                    },
                }),
            })
            .collect(),
    }
}

fn render_tool_choice(choice: &ToolChoice, req: &UniversalRequest) -> Option<Value> {
    match choice {
        ToolChoice::Auto => Some(json!({ "type": "auto" })),
        ToolChoice::Required => Some(json!({ "type": "any" })),
        ToolChoice::None => None,
        ToolChoice::Tool(name) => {
            if req.tools.iter().any(|t| t.name == *name) {
                Some(json!({ "type": "tool", "name": name }))
            } else {
                Some(json!({ "type": "auto" }))
            }
        }
    }
}

/// Append base64 image blocks to the last user turn that is not a lone
/// tool-result block. With no such turn the messages are left unchanged.
fn attach_images(messages: &mut [Value], images: &[ImageAttachment]) {
    let Some(target) = messages
        .iter_mut()
        .rev()
        .find(|msg| msg["role"] == "user" && !is_tool_result(msg))
    else {
        return;
    };

    let mut blocks = match &target["content"] {
        Value::String(text) if text.is_empty() => Vec::new(),
        Value::String(text) => vec![json!({ "type": "text", "text": text })],
        Value::Array(parts) => parts.clone(),
        _ => Vec::new(),
    };

    for img in images {
        blocks.push(json!({
            "type": "image",
            "source": {
                "type": "base64",
                "media_type": guess_mime(&img.name),
                "data": img.base64,
            },
        }));
    }

    target["content"] = Value::Array(blocks);
}

fn is_tool_result(message: &Value) -> bool {
    let Some(parts) = message["content"].as_array() else {
        return false;
    };
    parts.len() == 1 && parts[0]["type"] == "tool_result"
}

#[derive(Deserialize)]
struct RawResponse {
    #[serde(default)]
    id: CompactString,
    #[serde(default)]
    model: CompactString,
    #[serde(default)]
    content: Vec<RawBlock>,
    #[serde(default)]
    usage: Option<RawUsage>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    ToolUse {
        #[serde(default)]
        id: CompactString,
        #[serde(default)]
        name: CompactString,
        #[serde(default)]
        input: Value,
    },
    Image {
        source: RawImageSource,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct RawImageSource {
    #[serde(default)]
    media_type: CompactString,
    #[serde(default)]
    data: String,
}

#[derive(Deserialize)]
struct RawUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}
