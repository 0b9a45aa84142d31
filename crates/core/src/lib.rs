//! Shared types for the manta multi-tenant LLM gateway.
//!
//! This crate provides the universal call contract used across all provider
//! adapters: [`UniversalRequest`], [`LLMResponse`], [`ToolCall`], the
//! [`ModelRegistry`] that maps model names to providers, the domain [`Error`]
//! taxonomy, and the traits for external collaborators (secret resolution,
//! tenant configuration, SQL registration).

pub use config::{EnvSecrets, SecretResolver, SqlRegistrar, TenantConfigReader, resolve_secret};
pub use error::Error;
pub use registry::{HistoryType, ModelMetadata, ModelRegistry, Provider};
pub use request::{
    Content, ContentPart, ImageAttachment, InputItem, MessageTurn, Role, ToolChoice, ToolOutput,
    ToolSchema, UniversalRequest, guess_mime,
};
pub use response::{
    ContentBlock, LLMResponse, ResponseStatus, ToolCall, Usage, encode_tool_arguments,
};

mod config;
mod error;
mod registry;
mod request;
mod response;

/// Result alias over the domain [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
