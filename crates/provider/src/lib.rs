//! LLM vendor adapters and the provider gateway.
//!
//! The [`Gateway`] is the single entry point: it resolves the provider for a
//! model via the registry, resolves per-tenant credentials, caches low-level
//! vendor clients process-wide, and routes the universal call contract to
//! one of the per-vendor adapters.

pub use adapter::Adapter;
pub use anthropic::AnthropicAdapter;
pub use client::{ClientCache, LlmClient, endpoint};
pub use deepseek::DeepSeekAdapter;
pub use gateway::Gateway;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;

mod adapter;
mod anthropic;
mod client;
mod deepseek;
mod gateway;
mod gemini;
mod openai;
