//! Handler traits at the dispatch seam.

use async_trait::async_trait;
use serde_json::Value;

/// A tenant's single polymorphic capability.
///
/// The dispatcher routes every non-system tool call for the tenant here;
/// the handler decides what the action means. Returning a domain
/// [`manta_core::Error`] (inside the `anyhow` error) passes it through to
/// the caller unchanged; any other failure is wrapped by the dispatcher.
#[async_trait]
pub trait TenantHandler: Send + Sync {
    async fn handle_request(&self, action: &str, args: Value) -> anyhow::Result<Value>;
}

/// Handler for one system tool, invoked with the calling tenant's key.
#[async_trait]
pub trait SystemToolHandler: Send + Sync {
    async fn invoke(&self, tenant: &str, args: Value) -> anyhow::Result<Value>;
}
