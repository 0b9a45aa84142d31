//! OpenAI Responses API adapter.
//!
//! Also serves xAI, whose endpoint is Responses-compatible. The Responses
//! API correlates tool calls natively (`previous_response_id` +
//! `function_call_output` items), so this adapter needs no pending-call
//! registry.

use crate::LlmClient;
use compact_str::CompactString;
use manta_core::{
    Content, ContentPart, Error, ImageAttachment, InputItem, LLMResponse, Provider,
    ResponseStatus, ToolCall, ToolChoice, UniversalRequest, Usage, encode_tool_arguments,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::adapter::serialize_tool_output;

/// Adapter for the OpenAI Responses API family.
#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    client: LlmClient,
    provider: Provider,
}

impl OpenAiAdapter {
    pub fn new(client: LlmClient, provider: Provider) -> Self {
        Self { client, provider }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Call the Responses API and map the result to the common shape.
    pub async fn create_response(&self, req: &UniversalRequest) -> Result<LLMResponse, Error> {
        let body = build_body(req);
        tracing::trace!("request: {body}");

        let resp = self
            .client
            .http
            .post(&self.client.endpoint)
            .headers(self.client.headers.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::llm(self.provider, e))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::llm(self.provider, e))?;
        if !status.is_success() {
            return Err(Error::llm(
                self.provider,
                format!("HTTP {status}: {text}"),
            ));
        }

        tracing::trace!("response: {text}");
        let raw: RawResponse = serde_json::from_str(&text)
            .map_err(|e| Error::llm(self.provider, format!("malformed response: {e}")))?;
        Ok(to_response(raw))
    }
}

fn build_body(req: &UniversalRequest) -> Value {
    let mut body = json!({
        "model": req.model,
        "input": render_input(&req.input, &req.images),
    });

    if let Some(id) = &req.previous_response_id {
        body["previous_response_id"] = json!(id);
    }
    if !req.tools.is_empty() {
        body["tools"] = req
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                })
            })
            .collect();
        if let Some(choice) = render_tool_choice(&req.tool_choice) {
            body["tool_choice"] = choice;
        }
    }
    if let Some(text) = &req.text {
        body["text"] = text.clone();
    }
    if let Some(reasoning) = &req.reasoning {
        body["reasoning"] = reasoning.clone();
    }

    body
}

fn render_tool_choice(choice: &ToolChoice) -> Option<Value> {
    match choice {
        // The API default; omitted like the other optional parameters.
        ToolChoice::Auto => None,
        ToolChoice::Required => Some(json!("required")),
        ToolChoice::None => Some(json!("none")),
        ToolChoice::Tool(name) => Some(json!({ "type": "function", "name": name })),
    }
}

/// Render universal input items in Responses API shape, splicing image
/// attachments into the last end-user turn. With no user turn the input is
/// left unchanged.
fn render_input(input: &[InputItem], images: &[ImageAttachment]) -> Vec<Value> {
    let splice_at = if images.is_empty() {
        None
    } else {
        input.iter().rposition(InputItem::is_user_message)
    };

    input
        .iter()
        .enumerate()
        .map(|(idx, item)| match item {
            InputItem::FunctionCallOutput(out) => json!({
                "type": "function_call_output",
                "call_id": out.call_id,
                "output": serialize_tool_output(&out.output),
            }),
            InputItem::Message(turn) => {
                let role = match turn.role {
                    manta_core::Role::System => "system",
                    manta_core::Role::User => "user",
                    manta_core::Role::Assistant => "assistant",
                };
                if splice_at == Some(idx) {
                    json!({ "role": role, "content": multimodal_parts(&turn.content, images) })
                } else {
                    json!({ "role": role, "content": render_content(&turn.content) })
                }
            }
        })
        .collect()
}

fn render_content(content: &Content) -> Value {
    match content {
        Content::Text(text) => json!(text),
        Content::Parts(parts) => parts.iter().map(render_part).collect(),
    }
}

fn render_part(part: &ContentPart) -> Value {
    match part {
        ContentPart::Text { text } => json!({ "type": "input_text", "text": text }),
        ContentPart::Image { media_type, data } => json!({
            "type": "input_image",
            "image_url": format!("data:{media_type};base64,{data}"),
        }),
    }
}

/// Original text first (when present), then one image part per attachment.
fn multimodal_parts(content: &Content, images: &[ImageAttachment]) -> Vec<Value> {
    let mut parts = Vec::with_capacity(images.len() + 1);
    let text = content.text();
    if !text.is_empty() {
        parts.push(json!({ "type": "input_text", "text": text }));
    }
    for img in images {
        parts.push(json!({
            "type": "input_image",
            "image_url": img.data_uri(),
        }));
    }
    parts
}

#[derive(Deserialize)]
struct RawResponse {
    #[serde(default)]
    id: CompactString,
    #[serde(default)]
    model: CompactString,
    #[serde(default)]
    status: String,
    #[serde(default)]
    output: Vec<RawOutputItem>,
    #[serde(default)]
    usage: Option<RawUsage>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawOutputItem {
    Message {
        #[serde(default)]
        content: Vec<RawMessagePart>,
    },
    FunctionCall {
        #[serde(default)]
        call_id: CompactString,
        #[serde(default)]
        name: CompactString,
        #[serde(default)]
        arguments: Value,
    },
    Reasoning {
        #[serde(default)]
        summary: Vec<RawFragment>,
        #[serde(default)]
        content: Vec<RawFragment>,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct RawMessagePart {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct RawFragment {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct RawUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

fn to_response(raw: RawResponse) -> LLMResponse {
    let mut output_text = String::new();
    let mut tool_calls = Vec::new();
    let mut content_parts = Vec::new();
    let mut reasoning_summary: Vec<String> = Vec::new();
    let mut reasoning_inline: Vec<String> = Vec::new();

    for item in raw.output {
        match item {
            RawOutputItem::Message { content } => {
                for part in content {
                    if part.kind == "output_text" && !part.text.is_empty() {
                        output_text.push_str(&part.text);
                        content_parts.push(manta_core::ContentBlock::Text { text: part.text });
                    }
                }
            }
            RawOutputItem::FunctionCall {
                call_id,
                name,
                arguments,
            } => {
                tool_calls.push(ToolCall::new(
                    call_id,
                    name,
                    encode_tool_arguments(&arguments),
                ));
            }
            RawOutputItem::Reasoning { summary, content } => {
                reasoning_summary.extend(
                    summary
                        .into_iter()
                        .filter(|f| !f.text.trim().is_empty())
                        .map(|f| f.text.trim().to_owned()),
                );
                reasoning_inline.extend(
                    content
                        .into_iter()
                        .filter(|f| !f.text.trim().is_empty())
                        .map(|f| f.text.trim().to_owned()),
                );
            }
            RawOutputItem::Other => {}
        }
    }

    // Structured summaries are preferred; inline fragments are the fallback.
    let reasoning_content = if reasoning_summary.is_empty() {
        reasoning_inline.join("\n")
    } else {
        reasoning_summary.join("\n")
    };

    let status = if !tool_calls.is_empty() {
        ResponseStatus::ToolCalls
    } else if raw.status == "completed" {
        ResponseStatus::Completed
    } else {
        ResponseStatus::Failed
    };

    let usage = raw
        .usage
        .map(|u| Usage::new(u.input_tokens, u.output_tokens, u.total_tokens))
        .unwrap_or_default();

    LLMResponse {
        id: raw.id,
        model: raw.model,
        status,
        output_text,
        output: tool_calls,
        usage,
        reasoning_content,
        content_parts,
    }
}
