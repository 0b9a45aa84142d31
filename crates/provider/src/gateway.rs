//! The provider gateway: model routing, credential resolution, and adapter
//! caching in front of the vendor APIs.

use crate::adapter::Adapter;
use crate::client::{ClientCache, LlmClient};
use manta_core::{
    Error, LLMResponse, ModelMetadata, ModelRegistry, Provider, SecretResolver,
    TenantConfigReader, UniversalRequest, resolve_secret,
};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// The `llm` section of a tenant's configuration.
///
/// Values are secret references, not the credentials themselves; the
/// gateway resolves them through the injected [`SecretResolver`].
#[derive(Debug, Clone, Default, Deserialize)]
struct LlmSection {
    /// Per-provider secret references, keyed by the provider's lowercase name.
    #[serde(default)]
    provider_api_keys: HashMap<String, String>,
    /// Legacy single-key fallback used when no per-provider entry exists.
    #[serde(default, rename = "api-key")]
    api_key: Option<String>,
}

/// Routes universal requests to the adapter for the model's provider.
///
/// Holds two caches: the process-wide [`ClientCache`] of configured HTTP
/// clients, and a per-gateway adapter cache keyed by `(provider, api_key)`
/// so adapter-local state (pending tool calls) survives across turns while
/// tenants with different credentials never share an adapter.
pub struct Gateway {
    registry: ModelRegistry,
    config: Arc<dyn TenantConfigReader>,
    secrets: Arc<dyn SecretResolver>,
    clients: ClientCache,
    adapters: Mutex<HashMap<(Provider, String), Adapter>>,
}

impl Gateway {
    /// Build a gateway over the process-wide client cache.
    pub fn new(config: Arc<dyn TenantConfigReader>, secrets: Arc<dyn SecretResolver>) -> Self {
        Self::with_client_cache(config, secrets, ClientCache::global().clone())
    }

    /// Build a gateway over an explicit client cache. Tests use this to
    /// isolate cache state.
    pub fn with_client_cache(
        config: Arc<dyn TenantConfigReader>,
        secrets: Arc<dyn SecretResolver>,
        clients: ClientCache,
    ) -> Self {
        Self {
            registry: ModelRegistry::new(),
            config,
            secrets,
            clients,
            adapters: Mutex::new(HashMap::new()),
        }
    }

    /// Provider and history strategy for a model name.
    pub fn metadata(&self, model: &str) -> ModelMetadata {
        self.registry.metadata(model)
    }

    /// Route the request to the adapter for its model's provider and return
    /// the normalized response.
    pub async fn create_response(
        &self,
        tenant: &str,
        req: &UniversalRequest,
    ) -> Result<LLMResponse, Error> {
        let adapter = self.resolve_adapter(tenant, &req.model)?;
        tracing::debug!(
            tenant,
            model = %req.model,
            provider = %adapter.provider(),
            "dispatching model request"
        );
        adapter.create_response(req).await
    }

    /// Resolve the adapter serving a tenant's model, constructing and
    /// caching it on first use. Fails before any vendor traffic when the
    /// model is unroutable or the tenant has no credential for the provider.
    pub fn resolve_adapter(&self, tenant: &str, model: &str) -> Result<Adapter, Error> {
        let provider = self.registry.get_provider(model);
        if provider == Provider::Unknown {
            return Err(Error::configuration(
                tenant,
                format!("no provider rule matches model '{model}'"),
            ));
        }

        let api_key = self.resolve_api_key(tenant, provider)?;

        let mut adapters = self.adapters.lock();
        if let Some(adapter) = adapters.get(&(provider, api_key.clone())) {
            return Ok(adapter.clone());
        }

        let client = self.clients.get_or_create(provider, &api_key, || {
            LlmClient::for_provider(provider, &api_key)
        })?;
        let adapter = Adapter::for_provider(provider, client)?;
        adapters.insert((provider, api_key), adapter.clone());
        Ok(adapter)
    }

    /// Resolve the tenant's API key for a provider. Missing configuration or
    /// an unresolvable secret reference is a hard failure; no vendor call is
    /// attempted with absent credentials.
    fn resolve_api_key(&self, tenant: &str, provider: Provider) -> Result<String, Error> {
        let section: LlmSection = self
            .config
            .get_configuration(tenant, "llm")
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| Error::configuration(tenant, format!("malformed llm section: {e}")))?
            .unwrap_or_default();

        let secret_ref = section
            .provider_api_keys
            .get(provider.as_str())
            .or(section.api_key.as_ref())
            .ok_or_else(|| {
                Error::configuration(
                    tenant,
                    format!("no API key configured for provider '{provider}'"),
                )
            })?;

        resolve_secret(self.secrets.as_ref(), tenant, secret_ref).ok_or_else(|| {
            Error::configuration(
                tenant,
                format!("secret reference '{secret_ref}' for provider '{provider}' did not resolve"),
            )
        })
    }

    /// Drop every cached adapter. Pending tool-call state goes with them;
    /// clients stay cached.
    pub fn clear_runtime_cache(&self) {
        self.adapters.lock().clear();
        tracing::info!("adapter cache cleared");
    }

    /// Drop every cached low-level client, forcing reconnection on next use.
    pub fn clear_low_level_clients_cache(&self) {
        self.clients.clear();
        tracing::info!("low-level client cache cleared");
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("clients", &self.clients)
            .field("adapters", &self.adapters.lock().len())
            .finish()
    }
}
