//! The tool dispatcher.

use crate::catalog::{SystemPromptTemplate, ToolCatalog, validate_definitions};
use crate::tenant::{SystemToolHandler, TenantHandler};
use compact_str::CompactString;
use manta_core::{Error, SecretResolver, SqlRegistrar, TenantConfigReader, ToolSchema};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Wrapped error messages are bounded; the full chain goes to the log, not
/// to the caller.
const MAX_WRAPPED_MESSAGE: usize = 500;

/// A tenant's `data_sources` configuration section.
#[derive(Debug, Clone, Default, Deserialize)]
struct DataSources {
    #[serde(default)]
    sql: Vec<SqlSource>,
}

#[derive(Debug, Clone, Deserialize)]
struct SqlSource {
    database: String,
    #[serde(default = "default_schema")]
    schema: String,
    #[serde(default)]
    connection_string_env: Option<String>,
}

fn default_schema() -> String {
    "public".to_owned()
}

/// Routes a resolved tool call to its handler.
///
/// System tools always win: a tenant handler can never shadow a `sys_*`
/// name. Tenant lookup is case-insensitive over registered lowercase keys.
pub struct Dispatcher {
    catalog: Arc<dyn ToolCatalog>,
    /// Every catalog-advertised tool name. These can never delegate to a
    /// tenant handler, registered system handler or not.
    catalog_names: HashSet<CompactString>,
    /// Tool name → handler key, from the catalog's routing hints.
    routing: HashMap<CompactString, CompactString>,
    system_handlers: HashMap<CompactString, Arc<dyn SystemToolHandler>>,
    tenants: HashMap<String, Arc<dyn TenantHandler>>,
    config: Arc<dyn TenantConfigReader>,
    secrets: Arc<dyn SecretResolver>,
    sql: Arc<dyn SqlRegistrar>,
    prompt_templates: Mutex<Vec<SystemPromptTemplate>>,
    /// Held for the whole of [`Dispatcher::load_tenant_configs`] so
    /// concurrent callers serialize behind the first registration.
    configured: Mutex<bool>,
}

impl Dispatcher {
    pub fn new(
        catalog: Arc<dyn ToolCatalog>,
        config: Arc<dyn TenantConfigReader>,
        secrets: Arc<dyn SecretResolver>,
        sql: Arc<dyn SqlRegistrar>,
    ) -> Self {
        let definitions = catalog.definitions();
        let catalog_names = definitions.iter().map(|def| def.name.clone()).collect();
        let routing = definitions
            .into_iter()
            .filter_map(|def| def.routing.map(|key| (def.name, key)))
            .collect();
        Self {
            catalog,
            catalog_names,
            routing,
            system_handlers: HashMap::new(),
            tenants: HashMap::new(),
            config,
            secrets,
            sql,
            prompt_templates: Mutex::new(Vec::new()),
            configured: Mutex::new(false),
        }
    }

    /// Register the handler for a system tool. The name must exist in the
    /// catalog by the time [`Dispatcher::load_tenant_configs`] runs.
    pub fn register_system_tool(
        mut self,
        name: impl Into<CompactString>,
        handler: Arc<dyn SystemToolHandler>,
    ) -> Self {
        self.system_handlers.insert(name.into(), handler);
        self
    }

    /// Register a tenant's capability handler under its short name. The key
    /// is stored lowercase; lookup is case-insensitive.
    pub fn register_tenant(
        mut self,
        short_name: impl AsRef<str>,
        handler: Arc<dyn TenantHandler>,
    ) -> Self {
        self.tenants
            .insert(short_name.as_ref().to_lowercase(), handler);
        self
    }

    /// Known tenant keys, sorted for stable diagnostics.
    pub fn known_tenants(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.tenants.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Every catalog definition in the shape adapters advertise to models.
    pub fn advertised_tools(&self) -> Vec<ToolSchema> {
        self.catalog
            .definitions()
            .iter()
            .map(|def| def.to_tool_schema())
            .collect()
    }

    /// A registered system prompt template by name, once
    /// [`Dispatcher::load_tenant_configs`] has run.
    pub fn prompt_template(&self, name: &str) -> Option<String> {
        self.prompt_templates
            .lock()
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.template.clone())
    }

    /// Route one tool call.
    ///
    /// Unknown tenants fail before any handler runs, with the known tenant
    /// keys in the message. System tools take precedence over the tenant's
    /// own handler; everything else delegates to the tenant.
    pub async fn dispatch(
        &self,
        tenant: &str,
        function: &str,
        args: Value,
    ) -> Result<Value, Error> {
        let key = tenant.to_lowercase();
        let Some(handler) = self.tenants.get(&key) else {
            return Err(Error::configuration(
                tenant,
                format!(
                    "tenant '{tenant}' not configured; known tenants: {:?}",
                    self.known_tenants()
                ),
            ));
        };

        let handler_key = self
            .routing
            .get(function)
            .map(CompactString::as_str)
            .unwrap_or(function);
        if self.catalog_names.contains(function) || self.system_handlers.contains_key(handler_key)
        {
            let Some(system) = self.system_handlers.get(handler_key) else {
                return Err(Error::configuration(
                    key.as_str(),
                    format!("no handler registered for system tool '{function}'"),
                ));
            };
            tracing::debug!(tenant = %key, function, "dispatching system tool");
            let result = system.invoke(&key, args).await;
            return self.normalize(&key, function, result);
        }

        tracing::debug!(tenant = %key, function, "dispatching tenant tool");
        let result = handler.handle_request(function, args).await;
        self.normalize(&key, function, result)
    }

    /// Domain errors pass through unchanged so upstream layers keep their
    /// specific kind; anything else is logged in full and wrapped, keeping
    /// the message but discarding the type.
    fn normalize(
        &self,
        tenant: &str,
        function: &str,
        result: anyhow::Result<Value>,
    ) -> Result<Value, Error> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => match err.downcast::<Error>() {
                Ok(domain) => Err(domain),
                Err(other) => {
                    tracing::error!(tenant, function, "tool call failed: {other:#}");
                    let mut message = other.to_string();
                    message.truncate(MAX_WRAPPED_MESSAGE);
                    Err(Error::external(tenant, function, message))
                }
            },
        }
    }

    /// Startup registration: validate and install the catalog once, then
    /// register each tenant's declared SQL data sources. Safe to call more
    /// than once, including concurrently; later callers wait for the first
    /// registration to finish and then no-op.
    ///
    /// Every catalog tool must have a registered handler (under its routing
    /// key when set), so an advertised tool can never silently fall through
    /// to a tenant handler at dispatch time. A data source whose connection
    /// string does not resolve is skipped and logged rather than aborting
    /// the whole startup.
    pub fn load_tenant_configs(&self) -> Result<bool, Error> {
        let mut configured = self.configured.lock();
        if *configured {
            return Ok(true);
        }

        let definitions = self.catalog.definitions();
        validate_definitions(&definitions)
            .map_err(|reason| Error::configuration("system", reason))?;
        for def in &definitions {
            let handler_key = def.routing.as_deref().unwrap_or(def.name.as_str());
            if !self.system_handlers.contains_key(handler_key) {
                return Err(Error::configuration(
                    "system",
                    format!("system tool '{}' has no registered handler '{handler_key}'", def.name),
                ));
            }
        }
        tracing::info!(count = definitions.len(), "system tool catalog registered");
        *self.prompt_templates.lock() = self.catalog.prompt_templates();

        let mut tenants: Vec<&String> = self.tenants.keys().collect();
        tenants.sort_unstable();
        for tenant in tenants {
            self.register_data_sources(tenant)?;
        }

        *configured = true;
        Ok(true)
    }

    fn register_data_sources(&self, tenant: &str) -> Result<(), Error> {
        let sources: DataSources = self
            .config
            .get_configuration(tenant, "data_sources")
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| {
                Error::configuration(tenant, format!("malformed data_sources section: {e}"))
            })?
            .unwrap_or_default();

        if sources.sql.is_empty() {
            return Ok(());
        }
        tracing::info!(tenant, count = sources.sql.len(), "registering databases");

        for source in &sources.sql {
            let uri = source
                .connection_string_env
                .as_deref()
                .and_then(|env| manta_core::resolve_secret(self.secrets.as_ref(), tenant, env));

            let Some(uri) = uri else {
                tracing::error!(
                    tenant,
                    database = %source.database,
                    env = source.connection_string_env.as_deref().unwrap_or(""),
                    "skipping database: no resolvable connection string"
                );
                continue;
            };

            self.sql
                .register_database(&uri, &source.database, Some(&source.schema))
                .map_err(|e| {
                    Error::configuration(
                        tenant,
                        format!("registering database '{}' failed: {e}", source.database),
                    )
                })?;
        }

        Ok(())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("system_tools", &self.system_handlers.len())
            .field("tenants", &self.known_tenants())
            .field("configured", &*self.configured.lock())
            .finish()
    }
}
