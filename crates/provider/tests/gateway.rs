//! Gateway routing, credential resolution, and cache behavior.

use manta_core::{Error, SecretResolver, TenantConfigReader};
use manta_provider::{Adapter, ClientCache, Gateway};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

/// In-memory tenant configuration keyed by `(tenant, section)`.
#[derive(Default)]
struct FakeConfig {
    sections: HashMap<(String, String), Value>,
}

impl FakeConfig {
    fn with_llm(tenant: &str, section: Value) -> Self {
        let mut sections = HashMap::new();
        sections.insert((tenant.to_owned(), "llm".to_owned()), section);
        Self { sections }
    }
}

impl TenantConfigReader for FakeConfig {
    fn get_configuration(&self, tenant: &str, section: &str) -> Option<Value> {
        self.sections
            .get(&(tenant.to_owned(), section.to_owned()))
            .cloned()
    }
}

/// In-memory secret store ignoring the tenant scope.
struct FakeSecrets {
    values: HashMap<String, String>,
}

impl FakeSecrets {
    fn with(entries: &[(&str, &str)]) -> Self {
        Self {
            values: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl SecretResolver for FakeSecrets {
    fn get_secret(&self, _tenant: &str, key: &str) -> Option<String> {
        self.values.get(key).cloned().filter(|v| !v.is_empty())
    }
}

fn gateway(config: FakeConfig, secrets: FakeSecrets) -> Gateway {
    Gateway::with_client_cache(Arc::new(config), Arc::new(secrets), ClientCache::new())
}

#[test]
fn models_route_to_their_providers() {
    let config = FakeConfig::with_llm(
        "acme",
        json!({
            "provider_api_keys": {
                "openai": "OPENAI_KEY",
                "anthropic": "ANTHROPIC_KEY",
                "gemini": "GEMINI_KEY",
                "deepseek": "DEEPSEEK_KEY",
                "xai": "XAI_KEY",
            }
        }),
    );
    let secrets = FakeSecrets::with(&[
        ("OPENAI_KEY", "sk-1"),
        ("ANTHROPIC_KEY", "sk-2"),
        ("GEMINI_KEY", "sk-3"),
        ("DEEPSEEK_KEY", "sk-4"),
        ("XAI_KEY", "sk-5"),
    ]);
    let gw = gateway(config, secrets);

    assert!(matches!(
        gw.resolve_adapter("acme", "gpt-5.2").unwrap(),
        Adapter::OpenAi(_)
    ));
    assert!(matches!(
        gw.resolve_adapter("acme", "claude-sonnet-4-5").unwrap(),
        Adapter::Anthropic(_)
    ));
    assert!(matches!(
        gw.resolve_adapter("acme", "gemini-2.5-pro").unwrap(),
        Adapter::Gemini(_)
    ));
    assert!(matches!(
        gw.resolve_adapter("acme", "deepseek-chat").unwrap(),
        Adapter::DeepSeek(_)
    ));
    // Grok rides the OpenAI-compatible adapter.
    assert!(matches!(
        gw.resolve_adapter("acme", "grok-4").unwrap(),
        Adapter::OpenAi(_)
    ));
}

#[test]
fn unroutable_model_is_a_configuration_error() {
    let config = FakeConfig::with_llm("acme", json!({ "api-key": "DEFAULT_KEY" }));
    let secrets = FakeSecrets::with(&[("DEFAULT_KEY", "sk-1")]);
    let gw = gateway(config, secrets);

    let err = gw.resolve_adapter("acme", "mystery-model-v1").unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
    assert!(err.to_string().contains("mystery-model-v1"));
}

#[test]
fn missing_credential_fails_closed() {
    // Tenant has an llm section but no key for anthropic and no fallback.
    let config = FakeConfig::with_llm(
        "acme",
        json!({ "provider_api_keys": { "openai": "OPENAI_KEY" } }),
    );
    let secrets = FakeSecrets::with(&[("OPENAI_KEY", "sk-1")]);
    let gw = gateway(config, secrets);

    let err = gw
        .resolve_adapter("acme", "claude-sonnet-4-5")
        .unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
    assert!(err.to_string().contains("anthropic"));
}

#[test]
fn unresolvable_secret_reference_fails_closed() {
    let config = FakeConfig::with_llm(
        "acme",
        json!({ "provider_api_keys": { "openai": "KEY_NOBODY_SET" } }),
    );
    let gw = gateway(config, FakeSecrets::with(&[]));

    let err = gw.resolve_adapter("acme", "gpt-5.2").unwrap_err();
    assert!(err.to_string().contains("KEY_NOBODY_SET"));
}

#[test]
fn missing_llm_section_fails_closed() {
    let gw = gateway(FakeConfig::default(), FakeSecrets::with(&[]));

    let err = gw.resolve_adapter("ghost", "gpt-5.2").unwrap_err();
    assert!(matches!(err, Error::Configuration { ref tenant, .. } if tenant == "ghost"));
}

#[test]
fn fallback_api_key_serves_every_provider() {
    let config = FakeConfig::with_llm("acme", json!({ "api-key": "SHARED_KEY" }));
    let secrets = FakeSecrets::with(&[("SHARED_KEY", "sk-shared")]);
    let gw = gateway(config, secrets);

    assert!(gw.resolve_adapter("acme", "gpt-5.2").is_ok());
    assert!(gw.resolve_adapter("acme", "claude-sonnet-4-5").is_ok());
}

#[test]
fn repeated_resolution_reuses_the_cached_client() {
    let config = FakeConfig::with_llm(
        "acme",
        json!({ "provider_api_keys": { "openai": "OPENAI_KEY" } }),
    );
    let secrets = FakeSecrets::with(&[("OPENAI_KEY", "sk-1")]);
    let cache = ClientCache::new();
    let gw = Gateway::with_client_cache(
        Arc::new(config),
        Arc::new(secrets),
        cache.clone(),
    );

    gw.resolve_adapter("acme", "gpt-5.2").unwrap();
    assert_eq!(cache.len(), 1);
    gw.resolve_adapter("acme", "gpt-5.2-mini").unwrap();
    // Same provider and key: still one client.
    assert_eq!(cache.len(), 1);
}

#[test]
fn distinct_keys_get_distinct_clients() {
    let mut sections = HashMap::new();
    sections.insert(
        ("acme".to_owned(), "llm".to_owned()),
        json!({ "provider_api_keys": { "openai": "ACME_KEY" } }),
    );
    sections.insert(
        ("globex".to_owned(), "llm".to_owned()),
        json!({ "provider_api_keys": { "openai": "GLOBEX_KEY" } }),
    );
    let config = FakeConfig { sections };
    let secrets = FakeSecrets::with(&[("ACME_KEY", "sk-a"), ("GLOBEX_KEY", "sk-g")]);
    let cache = ClientCache::new();
    let gw = Gateway::with_client_cache(
        Arc::new(config),
        Arc::new(secrets),
        cache.clone(),
    );

    gw.resolve_adapter("acme", "gpt-5.2").unwrap();
    gw.resolve_adapter("globex", "gpt-5.2").unwrap();
    assert_eq!(cache.len(), 2);
}

#[test]
fn clearing_the_client_cache_forces_reconstruction() {
    let config = FakeConfig::with_llm(
        "acme",
        json!({ "provider_api_keys": { "openai": "OPENAI_KEY" } }),
    );
    let secrets = FakeSecrets::with(&[("OPENAI_KEY", "sk-1")]);
    let cache = ClientCache::new();
    let gw = Gateway::with_client_cache(
        Arc::new(config),
        Arc::new(secrets),
        cache.clone(),
    );

    gw.resolve_adapter("acme", "gpt-5.2").unwrap();
    assert_eq!(cache.len(), 1);

    gw.clear_low_level_clients_cache();
    assert!(cache.is_empty());

    gw.clear_runtime_cache();
    gw.resolve_adapter("acme", "gpt-5.2").unwrap();
    assert_eq!(cache.len(), 1);
}
