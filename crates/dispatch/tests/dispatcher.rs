//! Dispatch routing, error normalization, and startup registration.

use async_trait::async_trait;
use manta_core::{Error, SecretResolver, SqlRegistrar, TenantConfigReader};
use manta_dispatch::{
    BuiltinCatalog, Dispatcher, SystemToolDefinition, SystemToolHandler, TenantHandler,
    ToolCatalog,
};
use parking_lot::Mutex;
use schemars::json_schema;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct FakeConfig {
    sections: HashMap<(String, String), Value>,
}

impl TenantConfigReader for FakeConfig {
    fn get_configuration(&self, tenant: &str, section: &str) -> Option<Value> {
        self.sections
            .get(&(tenant.to_owned(), section.to_owned()))
            .cloned()
    }
}

#[derive(Default)]
struct FakeSecrets {
    values: HashMap<String, String>,
}

impl SecretResolver for FakeSecrets {
    fn get_secret(&self, _tenant: &str, key: &str) -> Option<String> {
        self.values.get(key).cloned().filter(|v| !v.is_empty())
    }
}

/// Records every registration so tests can assert on them.
#[derive(Default)]
struct RecordingRegistrar {
    registered: Mutex<Vec<(String, String, Option<String>)>>,
}

impl SqlRegistrar for RecordingRegistrar {
    fn register_database(
        &self,
        uri: &str,
        name: &str,
        schema: Option<&str>,
    ) -> anyhow::Result<()> {
        self.registered.lock().push((
            uri.to_owned(),
            name.to_owned(),
            schema.map(str::to_owned),
        ));
        Ok(())
    }
}

/// Tenant handler echoing the action it was called with, or failing on
/// demand.
struct EchoTenant;

#[async_trait]
impl TenantHandler for EchoTenant {
    async fn handle_request(&self, action: &str, args: Value) -> anyhow::Result<Value> {
        match action {
            "fail_plain" => Err(anyhow::anyhow!("backend exploded")),
            "fail_domain" => Err(anyhow::Error::new(Error::configuration(
                "acme",
                "missing widget config",
            ))),
            _ => Ok(json!({ "action": action, "args": args })),
        }
    }
}

struct MarkerSystemTool;

#[async_trait]
impl SystemToolHandler for MarkerSystemTool {
    async fn invoke(&self, tenant: &str, _args: Value) -> anyhow::Result<Value> {
        Ok(json!({ "handled_by": "system", "tenant": tenant }))
    }
}

fn dispatcher() -> Dispatcher {
    dispatcher_with(FakeConfig::default(), FakeSecrets::default(), Arc::default())
}

fn dispatcher_with(
    config: FakeConfig,
    secrets: FakeSecrets,
    sql: Arc<RecordingRegistrar>,
) -> Dispatcher {
    let mut d = Dispatcher::new(
        Arc::new(BuiltinCatalog::new()),
        Arc::new(config),
        Arc::new(secrets),
        sql,
    );
    for def in BuiltinCatalog::new().definitions() {
        d = d.register_system_tool(def.name, Arc::new(MarkerSystemTool));
    }
    d.register_tenant("acme", Arc::new(EchoTenant))
}

#[tokio::test]
async fn tenant_tools_delegate_to_the_tenant_handler() {
    let d = dispatcher();
    let result = d
        .dispatch("acme", "list_invoices", json!({ "year": 2026 }))
        .await
        .unwrap();
    assert_eq!(result["action"], "list_invoices");
    assert_eq!(result["args"]["year"], 2026);
}

#[tokio::test]
async fn tenant_lookup_is_case_insensitive() {
    let d = dispatcher();
    assert!(d.dispatch("ACME", "ping", json!({})).await.is_ok());
}

#[tokio::test]
async fn unknown_tenant_error_names_the_known_tenants() {
    let d = dispatcher();
    let err = d
        .dispatch("nonexistent", "ping", json!({}))
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("nonexistent"));
    assert!(message.contains("acme"));
}

#[tokio::test]
async fn system_tools_cannot_be_shadowed_by_tenants() {
    // EchoTenant would happily answer "sys_web_search"; the system handler
    // must win anyway.
    let d = dispatcher();
    let result = d
        .dispatch("acme", "sys_web_search", json!({ "query": "manta" }))
        .await
        .unwrap();
    assert_eq!(result["handled_by"], "system");
    assert_eq!(result["tenant"], "acme");
}

#[tokio::test]
async fn domain_errors_pass_through_unchanged() {
    let d = dispatcher();
    let err = d.dispatch("acme", "fail_domain", json!({})).await.unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
    assert!(err.to_string().contains("missing widget config"));
}

#[tokio::test]
async fn unclassified_errors_wrap_as_external_call() {
    let d = dispatcher();
    let err = d.dispatch("acme", "fail_plain", json!({})).await.unwrap_err();
    match err {
        Error::ExternalCall {
            tenant,
            function,
            message,
        } => {
            assert_eq!(tenant, "acme");
            assert_eq!(function, "fail_plain");
            assert!(message.contains("backend exploded"));
        }
        other => panic!("expected ExternalCall, got {other}"),
    }
}

#[tokio::test]
async fn data_sources_register_and_missing_uris_are_skipped() {
    let mut config = FakeConfig::default();
    config.sections.insert(
        ("acme".to_owned(), "data_sources".to_owned()),
        json!({
            "sql": [
                { "database": "sales", "schema": "crm",
                  "connection_string_env": "SALES_DB_URI" },
                { "database": "ghost",
                  "connection_string_env": "NOBODY_SET_THIS" },
                { "database": "no_env_at_all" }
            ]
        }),
    );
    let mut secrets = FakeSecrets::default();
    secrets.values.insert(
        "SALES_DB_URI".to_owned(),
        "postgresql://sales".to_owned(),
    );
    let sql = Arc::new(RecordingRegistrar::default());
    let d = dispatcher_with(config, secrets, sql.clone());

    assert!(d.load_tenant_configs().unwrap());

    let registered = sql.registered.lock();
    assert_eq!(registered.len(), 1);
    assert_eq!(
        registered[0],
        (
            "postgresql://sales".to_owned(),
            "sales".to_owned(),
            Some("crm".to_owned())
        )
    );
}

#[tokio::test]
async fn schema_defaults_to_public() {
    let mut config = FakeConfig::default();
    config.sections.insert(
        ("acme".to_owned(), "data_sources".to_owned()),
        json!({
            "sql": [{ "database": "main", "connection_string_env": "MAIN_URI" }]
        }),
    );
    let mut secrets = FakeSecrets::default();
    secrets
        .values
        .insert("MAIN_URI".to_owned(), "postgresql://main".to_owned());
    let sql = Arc::new(RecordingRegistrar::default());
    let d = dispatcher_with(config, secrets, sql.clone());

    d.load_tenant_configs().unwrap();
    assert_eq!(sql.registered.lock()[0].2.as_deref(), Some("public"));
}

#[tokio::test]
async fn startup_is_idempotent() {
    let mut config = FakeConfig::default();
    config.sections.insert(
        ("acme".to_owned(), "data_sources".to_owned()),
        json!({
            "sql": [{ "database": "main", "connection_string_env": "MAIN_URI" }]
        }),
    );
    let mut secrets = FakeSecrets::default();
    secrets
        .values
        .insert("MAIN_URI".to_owned(), "postgresql://main".to_owned());
    let sql = Arc::new(RecordingRegistrar::default());
    let d = dispatcher_with(config, secrets, sql.clone());

    assert!(d.load_tenant_configs().unwrap());
    assert!(d.load_tenant_configs().unwrap());
    assert_eq!(sql.registered.lock().len(), 1);
}

#[tokio::test]
async fn duplicate_catalog_names_fail_startup() {
    struct BrokenCatalog;
    impl ToolCatalog for BrokenCatalog {
        fn definitions(&self) -> Vec<SystemToolDefinition> {
            let dup = SystemToolDefinition::new(
                "sys_dup",
                "dup",
                json_schema!({ "type": "object" }),
            );
            vec![dup.clone(), dup]
        }
    }

    let d = Dispatcher::new(
        Arc::new(BrokenCatalog),
        Arc::new(FakeConfig::default()),
        Arc::new(FakeSecrets::default()),
        Arc::new(RecordingRegistrar::default()),
    );
    let err = d.load_tenant_configs().unwrap_err();
    assert!(err.to_string().contains("sys_dup"));
}

#[tokio::test]
async fn advertised_tool_without_handler_is_rejected_not_delegated() {
    // EchoTenant would answer "sys_sql_query", but a catalog-advertised
    // name must never reach a tenant handler.
    let d = Dispatcher::new(
        Arc::new(BuiltinCatalog::new()),
        Arc::new(FakeConfig::default()),
        Arc::new(FakeSecrets::default()),
        Arc::new(RecordingRegistrar::default()),
    )
    .register_tenant("acme", Arc::new(EchoTenant));

    let err = d
        .dispatch("acme", "sys_sql_query", json!({ "query": "select 1" }))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
    assert!(err.to_string().contains("sys_sql_query"));
}

#[tokio::test]
async fn startup_requires_a_handler_for_every_catalog_tool() {
    let d = Dispatcher::new(
        Arc::new(BuiltinCatalog::new()),
        Arc::new(FakeConfig::default()),
        Arc::new(FakeSecrets::default()),
        Arc::new(RecordingRegistrar::default()),
    )
    .register_system_tool("sys_web_search", Arc::new(MarkerSystemTool))
    .register_tenant("acme", Arc::new(EchoTenant));

    let err = d.load_tenant_configs().unwrap_err();
    assert!(err.to_string().contains("has no registered handler"));
}

#[test]
fn concurrent_startup_registers_once() {
    let mut config = FakeConfig::default();
    config.sections.insert(
        ("acme".to_owned(), "data_sources".to_owned()),
        json!({
            "sql": [{ "database": "main", "connection_string_env": "MAIN_URI" }]
        }),
    );
    let mut secrets = FakeSecrets::default();
    secrets
        .values
        .insert("MAIN_URI".to_owned(), "postgresql://main".to_owned());
    let sql = Arc::new(RecordingRegistrar::default());
    let d = Arc::new(dispatcher_with(config, secrets, sql.clone()));

    let threads: Vec<_> = (0..4)
        .map(|_| {
            let d = d.clone();
            std::thread::spawn(move || d.load_tenant_configs().unwrap())
        })
        .collect();
    for t in threads {
        assert!(t.join().unwrap());
    }
    assert_eq!(sql.registered.lock().len(), 1);
}

#[tokio::test]
async fn routing_hints_share_one_handler_across_tools() {
    struct RoutedCatalog;
    impl ToolCatalog for RoutedCatalog {
        fn definitions(&self) -> Vec<SystemToolDefinition> {
            vec![
                SystemToolDefinition::new(
                    "sys_document_search",
                    "doc search",
                    json_schema!({ "type": "object" }),
                )
                .with_routing("search"),
                SystemToolDefinition::new(
                    "sys_image_search",
                    "image search",
                    json_schema!({ "type": "object" }),
                )
                .with_routing("search"),
            ]
        }
    }

    let d = Dispatcher::new(
        Arc::new(RoutedCatalog),
        Arc::new(FakeConfig::default()),
        Arc::new(FakeSecrets::default()),
        Arc::new(RecordingRegistrar::default()),
    )
    .register_system_tool("search", Arc::new(MarkerSystemTool))
    .register_tenant("acme", Arc::new(EchoTenant));

    let doc = d
        .dispatch("acme", "sys_document_search", json!({ "query": "q" }))
        .await
        .unwrap();
    let img = d
        .dispatch("acme", "sys_image_search", json!({ "query": "q" }))
        .await
        .unwrap();
    assert_eq!(doc["handled_by"], "system");
    assert_eq!(img["handled_by"], "system");
}

#[tokio::test]
async fn advertised_tools_and_prompt_templates_are_exposed() {
    let d = dispatcher();
    let tools = d.advertised_tools();
    assert!(tools.iter().any(|t| t.name == "sys_sql_query"));

    assert!(d.prompt_template("tool_usage").is_none());
    d.load_tenant_configs().unwrap();
    assert!(d.prompt_template("tool_usage").is_some());
}
