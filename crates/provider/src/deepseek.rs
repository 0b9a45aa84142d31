//! DeepSeek chat completions adapter.
//!
//! DeepSeek speaks the OpenAI chat-completions dialect: tool results travel
//! as `role: "tool"` messages that must follow the assistant message carrying
//! the matching `tool_calls` entry, so emitted calls are kept in a pending
//! registry and the pair is rebuilt when the result comes back. The reasoner
//! models additionally return a `reasoning_content` field per choice.

use crate::LlmClient;
use crate::adapter::{PendingCalls, serialize_tool_output, tool_input_object};
use compact_str::CompactString;
use manta_core::{
    Content, ContentBlock, ContentPart, Error, ImageAttachment, InputItem, LLMResponse, Provider,
    ResponseStatus, Role, ToolCall, ToolChoice, UniversalRequest, Usage, encode_tool_arguments,
};
use serde::Deserialize;
use serde_json::{Value, json};

/// Adapter for the DeepSeek chat completions API.
#[derive(Debug, Clone)]
pub struct DeepSeekAdapter {
    client: LlmClient,
    pending: PendingCalls,
}

impl DeepSeekAdapter {
    pub fn new(client: LlmClient) -> Self {
        Self {
            client,
            pending: PendingCalls::default(),
        }
    }

    /// Call the chat completions endpoint and map the result to the common
    /// shape.
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
            .map_err(|e| Error::llm(Provider::DeepSeek, e))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::llm(Provider::DeepSeek, e))?;
        if !status.is_success() {
            return Err(Error::llm(
                Provider::DeepSeek,
                format!("HTTP {status}: {text}"),
            ));
        }

        tracing::trace!("response: {text}");
        let raw: RawResponse = serde_json::from_str(&text)
            .map_err(|e| Error::llm(Provider::DeepSeek, format!("malformed response: {e}")))?;
        Ok(self.to_response(raw, &req.model))
    }

    fn build_body(&self, req: &UniversalRequest) -> Value {
        let mut messages = self.render_messages(&req.input);
        if !req.images.is_empty() {
            attach_images(&mut messages, &req.images);
        }

        let mut body = json!({
            "model": req.model,
            "messages": messages,
        });

        if !req.tools.is_empty() {
            body["tools"] = req
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        },
                    })
                })
                .collect();
            if let Some(choice) = render_tool_choice(&req.tool_choice) {
                body["tool_choice"] = choice;
            }
        }

        if let Some(hint) = req.text.as_ref() {
            if let Some(max_tokens) = hint.get("max_tokens").and_then(Value::as_u64) {
                body["max_tokens"] = json!(max_tokens);
            }
            if let Some(temperature) = hint.get("temperature").and_then(Value::as_f64) {
                body["temperature"] = json!(temperature);
            }
            if let Some(top_p) = hint.get("top_p").and_then(Value::as_f64) {
                body["top_p"] = json!(top_p);
            }
        }

        body
    }

    /// Render universal input in chat-completions message format.
    fn render_messages(&self, input: &[InputItem]) -> Vec<Value> {
        let mut messages = Vec::with_capacity(input.len());

        for item in input {
            match item {
                InputItem::Message(turn) => {
                    let role = match turn.role {
                        Role::System => "system",
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    };
                    messages.push(json!({
                        "role": role,
                        "content": render_content(&turn.content),
                    }));
                }
                InputItem::FunctionCallOutput(out) => {
                    if let Some(prior) = self.pending.get(&out.call_id) {
                        messages.push(json!({
                            "role": "assistant",
                            "content": Value::Null,
                            "tool_calls": [{
                                "id": out.call_id,
                                "type": "function",
                                "function": {
                                    "name": prior.name,
                                    "arguments": prior.input.to_string(),
                                },
                            }],
                        }));
                        messages.push(json!({
                            "role": "tool",
                            "tool_call_id": out.call_id,
                            "content": serialize_tool_output(&out.output),
                        }));
                    } else {
                        tracing::warn!(
                            call_id = %out.call_id,
                            "no recorded tool call for call id, sending tool output as plain text"
                        );
                        messages.push(json!({
                            "role": "user",
                            "content": format!(
                                "Tool result:\n{}",
                                serialize_tool_output(&out.output)
                            ),
                        }));
                    }
                }
            }
        }

        messages
    }

    fn to_response(&self, raw: RawResponse, model: &str) -> LLMResponse {
        let mut output_text = String::new();
        let mut tool_calls = Vec::new();
        let mut reasoning_content = String::new();
        let mut finish_reason = String::new();

        if let Some(choice) = raw.choices.into_iter().next() {
            finish_reason = choice.finish_reason;
            if let Some(content) = choice.message.content {
                output_text = content;
            }
            if let Some(reasoning) = choice.message.reasoning_content {
                reasoning_content = reasoning;
            }
            for call in choice.message.tool_calls {
                self.pending.record(
                    &call.id,
                    call.function.name.clone(),
                    tool_input_object(&call.function.arguments),
                );
                tool_calls.push(ToolCall::new(
                    call.id,
                    call.function.name,
                    encode_tool_arguments(&call.function.arguments),
                ));
            }
        }

        let status = if !tool_calls.is_empty() || finish_reason == "tool_calls" {
            ResponseStatus::ToolCalls
        } else if finish_reason.is_empty() || finish_reason == "stop" || finish_reason == "length" {
            ResponseStatus::Completed
        } else {
            ResponseStatus::Failed
        };

        let content_parts = if output_text.is_empty() {
            Vec::new()
        } else {
            vec![ContentBlock::Text {
                text: output_text.clone(),
            }]
        };

        LLMResponse {
            id: raw.id,
            model: if raw.model.is_empty() {
                CompactString::from(model)
            } else {
                raw.model
            },
            status,
            output_text,
            output: tool_calls,
            usage: raw.usage.map(Usage::from).unwrap_or_default(),
            reasoning_content,
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
                    "type": "image_url",
                    "image_url": { "url": format!("data:{media_type};base64,{data}") },
                }),
            })
            .collect(),
    }
}

fn render_tool_choice(choice: &ToolChoice) -> Option<Value> {
    match choice {
        ToolChoice::Auto => None,
        ToolChoice::Required => Some(json!("required")),
        ToolChoice::None => Some(json!("none")),
        ToolChoice::Tool(name) => Some(json!({
            "type": "function",
            "function": { "name": name },
        })),
    }
}

/// Append data-URI image parts to the last user message. With no user
/// message the input is left unchanged. String content is lifted into a
/// text part first.
fn attach_images(messages: &mut [Value], images: &[ImageAttachment]) {
    let Some(target) = messages.iter_mut().rev().find(|m| m["role"] == "user") else {
        return;
    };

    let mut parts = match target["content"].take() {
        Value::String(text) => vec![json!({ "type": "text", "text": text })],
        Value::Array(parts) => parts,
        _ => Vec::new(),
    };
    for img in images {
        parts.push(json!({
            "type": "image_url",
            "image_url": { "url": img.data_uri() },
        }));
    }
    target["content"] = Value::Array(parts);
}

#[derive(Deserialize)]
struct RawResponse {
    #[serde(default)]
    id: CompactString,
    #[serde(default)]
    model: CompactString,
    #[serde(default)]
    choices: Vec<RawChoice>,
    #[serde(default)]
    usage: Option<RawUsage>,
}

#[derive(Deserialize)]
struct RawChoice {
    message: RawMessage,
    #[serde(default)]
    finish_reason: String,
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<RawToolCall>,
}

#[derive(Deserialize)]
struct RawToolCall {
    #[serde(default)]
    id: CompactString,
    function: RawFunction,
}

#[derive(Deserialize)]
struct RawFunction {
    #[serde(default)]
    name: CompactString,
    /// A JSON string in the wire format, but tolerated as a native value.
    #[serde(default)]
    arguments: Value,
}

#[derive(Deserialize, Default)]
struct RawUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl From<RawUsage> for Usage {
    fn from(raw: RawUsage) -> Self {
        Usage::new(raw.prompt_tokens, raw.completion_tokens, raw.total_tokens)
    }
}
