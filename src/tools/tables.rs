//! Table listing tool.
//!
//! This module implements the `pg_list_tables` MCP tool.

use crate::db::SchemaInspector;
use crate::error::DbResult;
use crate::models::TableInfo;
use crate::tools::{ToolContext, ToolDefinition, ToolHandler, ToolOutput, parse_arguments};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info};

pub const TOOL_NAME: &str = "pg_list_tables";

/// Input for the list tables tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ListTablesInput {
    /// Optional schema name to filter tables
    #[serde(default)]
    pub schema: Option<String>,
    /// Include system tables in results. Ignored unless the server permits
    /// system catalog access. Default: false
    #[serde(default)]
    pub include_system_tables: bool,
}

/// Output from the list tables tool.
#[derive(Debug, Clone, Serialize)]
pub struct ListTablesOutput {
    pub tables: Vec<TableInfo>,
    pub count: usize,
}

/// Handler for `pg_list_tables`.
pub struct ListTablesTool {
    context: ToolContext,
}

impl ListTablesTool {
    pub fn new(context: ToolContext) -> Self {
        Self { context }
    }

    pub async fn list_tables(&self, input: ListTablesInput) -> DbResult<ListTablesOutput> {
        let validator = &self.context.validator;
        let include_system =
            input.include_system_tables && validator.policy().allow_system_catalogs;
        if input.include_system_tables && !include_system {
            debug!("System tables requested but system catalog access is disabled");
        }

        let mut lease = self.context.lease().await?;
        let tables =
            SchemaInspector::list_tables(&mut lease, input.schema.as_deref(), include_system)
                .await?;
        lease.release();

        let tables: Vec<TableInfo> = tables
            .into_iter()
            .filter(|t| validator.table_visible(&t.schema, &t.name))
            .collect();

        info!(
            count = tables.len(),
            schema = input.schema.as_deref().unwrap_or("*"),
            "Listed tables"
        );
        Ok(ListTablesOutput {
            count: tables.len(),
            tables,
        })
    }
}

#[async_trait]
impl ToolHandler for ListTablesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::for_input::<ListTablesInput>(
            TOOL_NAME,
            "List all tables, views and materialized views in the database with optional schema filtering",
        )
    }

    async fn call(&self, arguments: JsonValue) -> DbResult<ToolOutput> {
        let output = self.list_tables(parse_arguments(arguments)?).await?;
        let summary = match output.count {
            1 => "Found 1 table".to_string(),
            n => format!("Found {} tables", n),
        };
        ToolOutput::new(summary, &output)
    }
}
