//! External collaborator interfaces.
//!
//! The gateway and dispatcher consume these as injected dependencies; the
//! implementations (tenant configuration loading, secret stores, SQL access)
//! live outside this core.

use serde_json::Value;

/// Resolves named secrets for a tenant.
pub trait SecretResolver: Send + Sync {
    /// Resolve a secret reference. `None` when the reference does not exist
    /// or resolves to an empty value.
    fn get_secret(&self, tenant: &str, key: &str) -> Option<String>;
}

/// The default resolver: plain environment-variable lookup, ignoring the
/// tenant scope.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecrets;

impl SecretResolver for EnvSecrets {
    fn get_secret(&self, _tenant: &str, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|value| !value.is_empty())
    }
}

/// Resolve a secret reference, treating blank references as unset rather
/// than passing them to the resolver.
pub fn resolve_secret(
    resolver: &dyn SecretResolver,
    tenant: &str,
    secret_ref: &str,
) -> Option<String> {
    let normalized = secret_ref.trim();
    if normalized.is_empty() {
        return None;
    }
    resolver.get_secret(tenant, normalized)
}

/// Read-only access to a tenant's configuration sections.
pub trait TenantConfigReader: Send + Sync {
    /// A named configuration section for a tenant, or `None` when the tenant
    /// or section does not exist.
    fn get_configuration(&self, tenant: &str, section: &str) -> Option<Value>;
}

/// Registers named database connections with a central SQL-access service.
pub trait SqlRegistrar: Send + Sync {
    fn register_database(&self, uri: &str, name: &str, schema: Option<&str>)
    -> anyhow::Result<()>;
}
