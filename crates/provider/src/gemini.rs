//! Google Gemini generateContent adapter.
//!
//! Gemini emits no call ids of its own, so this adapter synthesizes one per
//! function call and keeps a pending-call registry to rebuild the
//! `functionCall`/`functionResponse` turn pair when the tool result comes
//! back. Responses carry no id either; one is synthesized per call.

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
use ulid::Ulid;

/// Adapter for the Gemini generateContent API.
#[derive(Debug, Clone)]
pub struct GeminiAdapter {
    client: LlmClient,
    pending: PendingCalls,
}

impl GeminiAdapter {
    pub fn new(client: LlmClient) -> Self {
        Self {
            client,
            pending: PendingCalls::default(),
        }
    }

    /// Call generateContent and map the result to the common shape.
    pub async fn create_response(&self, req: &UniversalRequest) -> Result<LLMResponse, Error> {
        let body = self.build_body(req);
        let url = format!(
            "{}/models/{}:generateContent",
            self.client.endpoint, req.model
        );
        tracing::trace!("request: {body}");

        let resp = self
            .client
            .http
            .post(&url)
            .headers(self.client.headers.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::llm(Provider::Gemini, e))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::llm(Provider::Gemini, e))?;
        if !status.is_success() {
            return Err(Error::llm(
                Provider::Gemini,
                format!("HTTP {status}: {text}"),
            ));
        }

        tracing::trace!("response: {text}");
        let raw: RawResponse = serde_json::from_str(&text)
            .map_err(|e| Error::llm(Provider::Gemini, format!("malformed response: {e}")))?;
        Ok(self.to_response(raw, &req.model))
    }

    fn build_body(&self, req: &UniversalRequest) -> Value {
        let (system_parts, mut contents) = self.render_contents(&req.input);
        if !req.images.is_empty() {
            attach_images(&mut contents, &req.images);
        }

        let mut body = json!({ "contents": contents });

        if !system_parts.is_empty() {
            body["systemInstruction"] = json!({
                "parts": system_parts
                    .iter()
                    .map(|text| json!({ "text": text }))
                    .collect::<Vec<_>>(),
            });
        }

        if !req.tools.is_empty() {
            body["tools"] = json!([{
                "functionDeclarations": req
                    .tools
                    .iter()
                    .map(|tool| json!({
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    }))
                    .collect::<Vec<_>>(),
            }]);
            body["toolConfig"] = json!({
                "functionCallingConfig": render_tool_choice(&req.tool_choice),
            });
        }

        if let Some(config) = generation_config(req.text.as_ref()) {
            body["generationConfig"] = config;
        }

        body
    }

    /// Render universal input in Gemini `contents` format, splitting system
    /// turns out for `systemInstruction`.
    fn render_contents(&self, input: &[InputItem]) -> (Vec<String>, Vec<Value>) {
        let mut system_parts: Vec<String> = Vec::new();
        let mut contents: Vec<Value> = Vec::new();

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
                        _ => "model",
                    };
                    contents.push(json!({
                        "role": role,
                        "parts": render_parts(&turn.content),
                    }));
                }
                InputItem::FunctionCallOutput(out) => {
                    if let Some(prior) = self.pending.get(&out.call_id) {
                        contents.push(json!({
                            "role": "model",
                            "parts": [{
                                "functionCall": { "name": prior.name, "args": prior.input },
                            }],
                        }));
                        contents.push(json!({
                            "role": "user",
                            "parts": [{
                                "functionResponse": {
                                    "name": prior.name,
                                    "response": response_object(&out.output),
                                },
                            }],
                        }));
                    } else {
                        tracing::warn!(
                            call_id = %out.call_id,
                            "no recorded functionCall for call id, sending tool output as plain text"
                        );
                        contents.push(json!({
                            "role": "user",
                            "parts": [{
                                "text": format!("Tool result:\n{}", serialize_tool_output(&out.output)),
                            }],
                        }));
                    }
                }
            }
        }

        (system_parts, contents)
    }

    fn to_response(&self, raw: RawResponse, model: &str) -> LLMResponse {
        let mut output_text = String::new();
        let mut tool_calls = Vec::new();
        let mut content_parts = Vec::new();
        let mut finish_reason = String::new();

        if let Some(candidate) = raw.candidates.into_iter().next() {
            finish_reason = candidate.finish_reason;
            for part in candidate.content.parts {
                if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                    if !output_text.is_empty() {
                        output_text.push('\n');
                    }
                    output_text.push_str(&text);
                    content_parts.push(ContentBlock::Text { text });
                }
                if let Some(call) = part.function_call {
                    // Gemini has no native call ids; synthesize one.
                    let call_id = CompactString::from(format!("gemini_call_{}", Ulid::new()));
                    self.pending
                        .record(&call_id, call.name.clone(), tool_input_object(&call.args));
                    tool_calls.push(ToolCall::new(
                        call_id,
                        call.name,
                        encode_tool_arguments(&call.args),
                    ));
                }
                if let Some(inline) = part.inline_data {
                    if !inline.data.is_empty() {
                        content_parts.push(ContentBlock::Image {
                            media_type: inline.mime_type,
                            data: inline.data,
                        });
                    }
                }
            }
        }

        let status = if !tool_calls.is_empty() {
            ResponseStatus::ToolCalls
        } else if finish_reason.is_empty() || finish_reason == "STOP" || finish_reason == "MAX_TOKENS"
        {
            ResponseStatus::Completed
        } else {
            ResponseStatus::Failed
        };

        let usage = raw
            .usage_metadata
            .map(|u| {
                Usage::new(
                    u.prompt_token_count,
                    u.candidates_token_count,
                    u.total_token_count,
                )
            })
            .unwrap_or_default();

        LLMResponse {
            id: CompactString::from(format!("gemini_{}", Ulid::new())),
            model: CompactString::from(model),
            status,
            output_text,
            output: tool_calls,
            usage,
            reasoning_content: String::new(),
            content_parts,
        }
    }
}

fn render_parts(content: &Content) -> Vec<Value> {
    match content {
        Content::Text(text) => vec![json!({ "text": text })],
        Content::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => json!({ "text": text }),
                ContentPart::Image { media_type, data } => json!({
                    "inlineData": { "mimeType": media_type, "data": data },
                }),
            })
            .collect(),
    }
}

fn render_tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!({ "mode": "AUTO" }),
        ToolChoice::Required => json!({ "mode": "ANY" }),
        ToolChoice::None => json!({ "mode": "NONE" }),
        ToolChoice::Tool(name) => json!({
            "mode": "ANY",
            "allowedFunctionNames": [name],
        }),
    }
}

/// `functionResponse.response` must be an object.
fn response_object(output: &Value) -> Value {
    match output {
        Value::Object(_) => output.clone(),
        other => json!({ "result": other }),
    }
}

fn generation_config(hint: Option<&Value>) -> Option<Value> {
    let hint = hint?;
    let mut config = serde_json::Map::new();
    if let Some(temperature) = hint.get("temperature").and_then(Value::as_f64) {
        config.insert("temperature".into(), json!(temperature));
    }
    if let Some(top_p) = hint.get("top_p").and_then(Value::as_f64) {
        config.insert("topP".into(), json!(top_p));
    }
    if let Some(max_tokens) = hint.get("max_tokens").and_then(Value::as_u64) {
        config.insert("maxOutputTokens".into(), json!(max_tokens));
    }
    if config.is_empty() {
        None
    } else {
        Some(Value::Object(config))
    }
}

/// Append inline image parts to the last user content entry. With no user
/// entry the contents are left unchanged.
fn attach_images(contents: &mut [Value], images: &[ImageAttachment]) {
    let Some(target) = contents.iter_mut().rev().find(|c| c["role"] == "user") else {
        return;
    };
    let Some(parts) = target["parts"].as_array_mut() else {
        return;
    };
    for img in images {
        parts.push(json!({
            "inlineData": { "mimeType": guess_mime(&img.name), "data": img.base64 },
        }));
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResponse {
    #[serde(default)]
    candidates: Vec<RawCandidate>,
    #[serde(default)]
    usage_metadata: Option<RawUsage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCandidate {
    #[serde(default)]
    content: RawContent,
    #[serde(default)]
    finish_reason: String,
}

#[derive(Deserialize, Default)]
struct RawContent {
    #[serde(default)]
    parts: Vec<RawPart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    function_call: Option<RawFunctionCall>,
    #[serde(default)]
    inline_data: Option<RawInlineData>,
}

#[derive(Deserialize)]
struct RawFunctionCall {
    #[serde(default)]
    name: CompactString,
    #[serde(default)]
    args: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInlineData {
    #[serde(default)]
    mime_type: CompactString,
    #[serde(default)]
    data: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawUsage {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    total_token_count: u64,
}
