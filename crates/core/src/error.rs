//! Domain error taxonomy.
//!
//! Three kinds cover the gateway and dispatcher surface: configuration
//! failures (fail fast, not retryable), vendor-call failures (caller may
//! retry per its own policy; this layer never retries), and unclassified
//! tool failures. Vendor SDK and HTTP error types never escape an adapter.

use crate::registry::Provider;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or invalid tenant/provider setup.
    #[error("configuration error for tenant '{tenant}': {message}")]
    Configuration { tenant: String, message: String },

    /// A vendor call failed (network, auth, malformed request, rate limit).
    #[error("{provider} API error: {message}")]
    Llm { provider: Provider, message: String },

    /// A tool invocation failed for a reason the dispatcher could not
    /// classify. Carries the original message, not the original type.
    #[error("external call '{function}' failed for tenant '{tenant}': {message}")]
    ExternalCall {
        tenant: String,
        function: String,
        message: String,
    },
}

impl Error {
    pub fn configuration(tenant: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            tenant: tenant.into(),
            message: message.into(),
        }
    }

    pub fn llm(provider: Provider, message: impl std::fmt::Display) -> Self {
        Self::Llm {
            provider,
            message: message.to_string(),
        }
    }

    pub fn external(
        tenant: impl Into<String>,
        function: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ExternalCall {
            tenant: tenant.into(),
            function: function.into(),
            message: message.into(),
        }
    }
}
