//! The system-tool catalog.
//!
//! System tools are cross-tenant platform capabilities, advertised to every
//! model under reserved `sys_*` names. The catalog only carries their
//! definitions; the handlers are registered on the [`crate::Dispatcher`].

use compact_str::CompactString;
use manta_core::ToolSchema;
use schemars::{Schema, json_schema};

/// Definition of one system tool: its reserved name and the schema
/// advertised to the model.
#[derive(Debug, Clone)]
pub struct SystemToolDefinition {
    pub name: CompactString,
    pub description: String,
    pub parameters: Schema,
    /// Optional handler key. Several tools can route to one registered
    /// handler; `None` routes by tool name.
    pub routing: Option<CompactString>,
}

impl SystemToolDefinition {
    pub fn new(
        name: impl Into<CompactString>,
        description: impl Into<String>,
        parameters: Schema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            routing: None,
        }
    }

    pub fn with_routing(mut self, key: impl Into<CompactString>) -> Self {
        self.routing = Some(key.into());
        self
    }

    /// The definition in the shape adapters advertise to models.
    pub fn to_tool_schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

/// A named system prompt fragment registered once at startup.
#[derive(Debug, Clone)]
pub struct SystemPromptTemplate {
    pub name: CompactString,
    pub template: String,
}

/// Source of system-tool definitions and prompt templates.
pub trait ToolCatalog: Send + Sync {
    fn definitions(&self) -> Vec<SystemToolDefinition>;

    fn prompt_templates(&self) -> Vec<SystemPromptTemplate> {
        Vec::new()
    }
}

/// Reject catalogs with empty or duplicate tool names.
pub(crate) fn validate_definitions(defs: &[SystemToolDefinition]) -> Result<(), String> {
    let mut seen = std::collections::HashSet::new();
    for def in defs {
        if def.name.is_empty() {
            return Err("system tool with empty name".to_owned());
        }
        if !seen.insert(def.name.as_str()) {
            return Err(format!("duplicate system tool name '{}'", def.name));
        }
    }
    Ok(())
}

/// The built-in platform tool set.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinCatalog;

impl BuiltinCatalog {
    pub fn new() -> Self {
        Self
    }
}

impl ToolCatalog for BuiltinCatalog {
    fn definitions(&self) -> Vec<SystemToolDefinition> {
        vec![
            SystemToolDefinition::new(
                "sys_generate_excel",
                "Generates an .xlsx spreadsheet from a list of row objects and \
                 stores it; returns the filename and a retrieval token.",
                json_schema!({
                    "type": "object",
                    "properties": {
                        "filename": {
                            "type": "string",
                            "description": "Output filename, e.g. 'report.xlsx'",
                            "pattern": "^.+\\.xlsx?$"
                        },
                        "sheet_name": {
                            "type": "string",
                            "minLength": 1
                        },
                        "data": {
                            "type": "array",
                            "description": "One object per row.",
                            "minItems": 1,
                            "items": {
                                "type": "object",
                                "additionalProperties": {
                                    "anyOf": [
                                        { "type": "string" },
                                        { "type": "number" },
                                        { "type": "boolean" },
                                        { "type": "null" }
                                    ]
                                }
                            }
                        }
                    },
                    "required": ["filename", "sheet_name", "data"]
                }),
            ),
            SystemToolDefinition::new(
                "sys_send_email",
                "Sends an email on the user's request, with optional base64 attachments.",
                json_schema!({
                    "type": "object",
                    "properties": {
                        "recipient": { "type": "string", "description": "Recipient address" },
                        "subject": { "type": "string" },
                        "body": { "type": "string", "description": "HTML body" },
                        "attachments": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "filename": { "type": "string" },
                                    "content": { "type": "string", "description": "Base64 file content" }
                                },
                                "required": ["filename", "content"],
                                "additionalProperties": false
                            }
                        }
                    },
                    "required": ["recipient", "subject", "body"]
                }),
            ),
            SystemToolDefinition::new(
                "sys_sql_query",
                "Runs a SQL query against one of the tenant's registered databases. \
                 All database access goes through this tool.",
                json_schema!({
                    "type": "object",
                    "properties": {
                        "database_key": {
                            "type": "string",
                            "description": "Name of the registered database to query."
                        },
                        "query": { "type": "string", "description": "The SQL statement." }
                    },
                    "required": ["database_key", "query"]
                }),
            ),
            SystemToolDefinition::new(
                "sys_document_search",
                "Semantic search over the documents of a collection.",
                json_schema!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "Text or question to search for." },
                        "collection": {
                            "type": "string",
                            "description": "Optional collection name to search in."
                        }
                    },
                    "required": ["query"]
                }),
            ),
            SystemToolDefinition::new(
                "sys_web_search",
                "Runs an external web search for current public information.",
                json_schema!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "Search text." }
                    },
                    "required": ["query"]
                }),
            ),
        ]
    }

    fn prompt_templates(&self) -> Vec<SystemPromptTemplate> {
        vec![SystemPromptTemplate {
            name: CompactString::const_new("tool_usage"),
            template: "When a task needs external data or side effects, call the \
                       matching tool instead of guessing. Report tool failures to \
                       the user plainly."
                .to_owned(),
        }]
    }
}
