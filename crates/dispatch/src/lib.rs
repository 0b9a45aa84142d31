//! Tool dispatch: the system-tool catalog, per-tenant capability handlers,
//! and the [`Dispatcher`] that routes a model-requested tool call to the
//! right handler.

pub use catalog::{BuiltinCatalog, SystemPromptTemplate, SystemToolDefinition, ToolCatalog};
pub use dispatcher::Dispatcher;
pub use tenant::{SystemToolHandler, TenantHandler};

mod catalog;
mod dispatcher;
mod tenant;
