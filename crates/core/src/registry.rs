//! Model name → provider resolution.
//!
//! The rules are literal, ordered pattern tables (data, not code) so the
//! rule set stays auditable and testable independent of adapter logic.
//! First match wins; patterns are not mutually exclusive.

use serde::{Deserialize, Serialize};

/// An upstream LLM vendor API family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI Responses API.
    OpenAi,
    /// Google Gemini generateContent API.
    Gemini,
    /// DeepSeek chat completions API.
    DeepSeek,
    /// xAI Grok (Responses-compatible API).
    Xai,
    /// Anthropic Messages API.
    Anthropic,
    /// No rule matched the model name.
    Unknown,
}

impl Provider {
    /// The lowercase key used in configuration and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::DeepSeek => "deepseek",
            Self::Xai => "xai",
            Self::Anthropic => "anthropic",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether conversation continuation is server-managed via an opaque id or
/// requires resending the full transcript each call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryType {
    /// The vendor API exposes a "continue this response" identifier.
    ServerSide,
    /// The caller resends the full transcript each call.
    ClientSide,
}

impl HistoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServerSide => "server_side",
            Self::ClientSide => "client_side",
        }
    }
}

impl std::fmt::Display for HistoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static metadata for a logical family of models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelMetadata {
    pub provider: Provider,
    pub history_type: HistoryType,
}

/// Ordered substring rules. First match wins, so the order here is part of
/// the contract.
const PROVIDER_RULES: &[(Provider, &[&str])] = &[
    (Provider::OpenAi, &["gpt"]),
    (Provider::Gemini, &["gemini"]),
    (Provider::DeepSeek, &["deepseek"]),
    (Provider::Xai, &["grok"]),
    (Provider::Anthropic, &["claude"]),
];

/// Maps model names to providers and history strategies.
///
/// Pure lookup over static rules; always returns a value, worst case
/// [`Provider::Unknown`] / [`HistoryType::ClientSide`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelRegistry;

impl ModelRegistry {
    pub fn new() -> Self {
        Self
    }

    /// The logical provider for a model name.
    ///
    /// Matching is case-insensitive substring search over the ordered rule
    /// table. An empty or unmatched name resolves to [`Provider::Unknown`].
    pub fn get_provider(&self, model: &str) -> Provider {
        if model.is_empty() {
            return Provider::Unknown;
        }

        let lower = model.to_lowercase();
        for (provider, patterns) in PROVIDER_RULES {
            if patterns.iter().any(|pat| lower.contains(pat)) {
                return *provider;
            }
        }

        Provider::Unknown
    }

    /// The history strategy for a model.
    ///
    /// Providers whose API exposes an opaque continuation id are
    /// server-side; everything else, including unknown providers, defaults
    /// to client-side (fail-safe: resend full history rather than risk
    /// losing context).
    pub fn get_history_type(&self, model: &str) -> HistoryType {
        match self.get_provider(model) {
            Provider::OpenAi | Provider::Xai => HistoryType::ServerSide,
            Provider::Gemini | Provider::DeepSeek | Provider::Anthropic | Provider::Unknown => {
                HistoryType::ClientSide
            }
        }
    }

    /// Provider and history strategy as one immutable pair.
    pub fn metadata(&self, model: &str) -> ModelMetadata {
        ModelMetadata {
            provider: self.get_provider(model),
            history_type: self.get_history_type(model),
        }
    }
}
