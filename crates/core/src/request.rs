//! The universal request contract.
//!
//! A [`UniversalRequest`] is not a stored entity; it is the call contract
//! between the conversation-orchestration layer and the gateway. Each
//! provider adapter translates it into the vendor's wire format.

use compact_str::CompactString;
use schemars::Schema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The role of a message turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    /// Some vendors call this role "model"; accepted as an alias.
    #[serde(alias = "model")]
    Assistant,
}

/// A typed content part inside a multimodal message turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image { media_type: CompactString, data: String },
}

/// Message content: plain text or a list of typed parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Content {
    /// Flatten the content to plain text. Text parts are joined with
    /// newlines; non-text parts are dropped.
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } if !text.is_empty() => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Parts(parts) => parts.is_empty(),
        }
    }
}

impl Default for Content {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<&str> for Content {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Content {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// An ordinary message turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageTurn {
    pub role: Role,
    #[serde(default)]
    pub content: Content,
}

/// A pseudo-turn carrying the result of a tool the model previously
/// requested, keyed by the vendor call id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename = "function_call_output")]
pub struct ToolOutput {
    pub call_id: CompactString,
    pub output: Value,
}

/// One turn of universal input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputItem {
    FunctionCallOutput(ToolOutput),
    Message(MessageTurn),
}

impl InputItem {
    pub fn system(content: impl Into<Content>) -> Self {
        Self::Message(MessageTurn {
            role: Role::System,
            content: content.into(),
        })
    }

    pub fn user(content: impl Into<Content>) -> Self {
        Self::Message(MessageTurn {
            role: Role::User,
            content: content.into(),
        })
    }

    pub fn assistant(content: impl Into<Content>) -> Self {
        Self::Message(MessageTurn {
            role: Role::Assistant,
            content: content.into(),
        })
    }

    pub fn function_call_output(call_id: impl Into<CompactString>, output: Value) -> Self {
        Self::FunctionCallOutput(ToolOutput {
            call_id: call_id.into(),
            output,
        })
    }

    /// Whether this is a message turn authored by the end user.
    pub fn is_user_message(&self) -> bool {
        matches!(
            self,
            Self::Message(MessageTurn {
                role: Role::User,
                ..
            })
        )
    }
}

/// A tool schema advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: CompactString,
    pub description: String,
    /// JSON schema for the tool's parameters.
    pub parameters: Schema,
}

/// Controls which tool is called by the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    #[default]
    Auto,
    Required,
    None,
    /// The model must call the named tool.
    #[serde(untagged)]
    Tool(CompactString),
}

/// An inline image attachment to splice into the last user turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAttachment {
    /// Filename, used for MIME type guessing.
    pub name: String,
    /// Base64-encoded image data, without a data-URI prefix.
    pub base64: String,
}

impl ImageAttachment {
    /// Best-guess MIME type from the attachment filename.
    pub fn mime_type(&self) -> &'static str {
        guess_mime(&self.name)
    }

    /// The attachment rendered as a `data:` URI.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type(), self.base64)
    }
}

/// Best-guess MIME type from a filename extension, defaulting to JPEG.
pub fn guess_mime(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        _ => "image/jpeg",
    }
}

/// The universal call contract accepted by the gateway and every adapter.
///
/// Invariant on the caller: for `server_side` history models, send only the
/// incremental turn plus `previous_response_id`; for `client_side` models,
/// send the full transcript every call. The gateway does not enforce this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniversalRequest {
    pub model: String,
    /// Ordered message turns (and tool-output pseudo-turns).
    pub input: Vec<InputItem>,
    /// Only meaningful for server-side history models.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSchema>,
    #[serde(default)]
    pub tool_choice: ToolChoice,
    /// Opaque provider hint (max tokens, temperature, output format).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<Value>,
    /// Opaque provider hint for reasoning behavior.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageAttachment>,
}

impl UniversalRequest {
    pub fn new(model: impl Into<String>, input: Vec<InputItem>) -> Self {
        Self {
            model: model.into(),
            input,
            previous_response_id: None,
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
            text: None,
            reasoning: None,
            images: Vec::new(),
        }
    }

    pub fn with_previous_response_id(mut self, id: impl Into<String>) -> Self {
        self.previous_response_id = Some(id.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = choice;
        self
    }

    pub fn with_text(mut self, text: Value) -> Self {
        self.text = Some(text);
        self
    }

    pub fn with_reasoning(mut self, reasoning: Value) -> Self {
        self.reasoning = Some(reasoning);
        self
    }

    pub fn with_images(mut self, images: Vec<ImageAttachment>) -> Self {
        self.images = images;
        self
    }

    /// Index of the last turn authored by the end user, if any.
    pub fn last_user_turn(&self) -> Option<usize> {
        self.input.iter().rposition(InputItem::is_user_message)
    }
}
