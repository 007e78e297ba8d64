//! MCP tool implementations.
//!
//! This module contains the database tool handlers and the registry that
//! serves them:
//! - `pg_query`: Execute a validated SQL statement
//! - `pg_list_tables`: List tables, views and materialized views
//! - `pg_describe_table`: Get columns, constraints and indexes of a table
//!
//! Tools are registered once at startup. Each input schema is compiled when the
//! tool is registered, and arguments are checked against it before a handler
//! ever sees them.

pub mod describe;
pub mod query;
pub mod tables;

pub use describe::DescribeTableTool;
pub use query::QueryTool;
pub use tables::ListTablesTool;

use crate::db::ConnectionManager;
use crate::error::{DbError, DbResult};
use crate::security::SecurityValidator;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Name, description and argument schema of a tool, as listed to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: JsonValue,
}

impl ToolDefinition {
    /// Build a definition whose input schema is derived from `T`.
    pub fn for_input<T: JsonSchema>(name: &str, description: &str) -> Self {
        let schema = schemars::schema_for!(T);
        let mut input_schema = serde_json::to_value(&schema).unwrap_or(JsonValue::Null);
        // Clients read the schema inline; the meta-schema and title add nothing.
        if let Some(object) = input_schema.as_object_mut() {
            object.remove("$schema");
            object.remove("title");
        }
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

/// Result of a successful tool call.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// One-line human readable summary
    pub summary: String,
    /// Structured result
    pub data: JsonValue,
}

impl ToolOutput {
    pub fn new(summary: impl Into<String>, data: &impl Serialize) -> DbResult<Self> {
        let data = serde_json::to_value(data)
            .map_err(|e| DbError::internal(format!("Failed to serialize tool output: {}", e)))?;
        Ok(Self {
            summary: summary.into(),
            data,
        })
    }
}

/// A tool the dispatcher can call.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Run the tool. `arguments` has already passed schema validation.
    async fn call(&self, arguments: JsonValue) -> DbResult<ToolOutput>;
}

/// Shared dependencies handed to every database tool.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub pool: ConnectionManager,
    pub validator: Arc<SecurityValidator>,
    /// Server-wide cap on rows returned by one query
    pub max_query_rows: usize,
}

impl ToolContext {
    pub fn new(pool: ConnectionManager, validator: Arc<SecurityValidator>, max_query_rows: usize) -> Self {
        Self {
            pool,
            validator,
            max_query_rows,
        }
    }

    /// Lease a connection using the pool's configured acquire timeout.
    pub async fn lease(&self) -> DbResult<crate::db::Lease> {
        self.pool.acquire(self.pool.settings().acquire_timeout).await
    }
}

/// Decode validated arguments into a typed input.
pub fn parse_arguments<T: DeserializeOwned>(arguments: JsonValue) -> DbResult<T> {
    serde_json::from_value(arguments).map_err(|e| DbError::invalid_arguments(e.to_string()))
}

struct RegisteredTool {
    definition: ToolDefinition,
    validator: jsonschema::Validator,
    handler: Arc<dyn ToolHandler>,
}

/// Collects tools before the registry is frozen.
#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: Vec<RegisteredTool>,
}

impl std::fmt::Debug for ToolRegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistryBuilder")
            .field(
                "tools",
                &self.tools.iter().map(|t| &t.definition.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ToolRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. Duplicate names and uncompilable schemas are rejected.
    pub fn register(mut self, handler: impl ToolHandler + 'static) -> DbResult<Self> {
        let definition = handler.definition();
        if self.tools.iter().any(|t| t.definition.name == definition.name) {
            return Err(DbError::internal(format!(
                "Tool '{}' is already registered",
                definition.name
            )));
        }

        let validator = jsonschema::validator_for(&definition.input_schema).map_err(|e| {
            DbError::internal(format!(
                "Input schema of tool '{}' does not compile: {}",
                definition.name, e
            ))
        })?;

        debug!(tool = %definition.name, "Registered tool");
        self.tools.push(RegisteredTool {
            definition,
            validator,
            handler: Arc::new(handler),
        });
        Ok(self)
    }

    pub fn build(self) -> ToolRegistry {
        let index = self
            .tools
            .iter()
            .enumerate()
            .map(|(i, t)| (t.definition.name.clone(), i))
            .collect();
        ToolRegistry {
            tools: self.tools,
            index,
        }
    }
}

/// Immutable catalogue of tools, in registration order.
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.index.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::new()
    }

    /// The three database tools over one pool and validator.
    pub fn with_database_tools(context: ToolContext) -> DbResult<Self> {
        Ok(Self::builder()
            .register(QueryTool::new(context.clone()))?
            .register(ListTablesTool::new(context.clone()))?
            .register(DescribeTableTool::new(context))?
            .build())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.index
            .get(name)
            .map(|&i| Arc::clone(&self.tools[i].handler))
    }

    pub fn list(&self) -> Vec<&ToolDefinition> {
        self.tools.iter().map(|t| &t.definition).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Check `arguments` against the tool's input schema, reporting every violation.
    pub fn validate(&self, name: &str, arguments: &JsonValue) -> DbResult<()> {
        let tool = self
            .index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| DbError::unknown_tool(name))?;

        let violations: Vec<String> = tool
            .validator
            .iter_errors(arguments)
            .map(|error| {
                let path = error.instance_path().to_string();
                if path.is_empty() {
                    error.to_string()
                } else {
                    format!("{}: {}", path, error)
                }
            })
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(DbError::invalid_arguments(violations.join("; ")))
        }
    }
}
