//! Table description tool.
//!
//! This module implements the `pg_describe_table` MCP tool.

use crate::db::SchemaInspector;
use crate::error::{DbError, DbResult};
use crate::models::TableDescription;
use crate::resources::ResourceUri;
use crate::tools::{ToolContext, ToolDefinition, ToolHandler, ToolOutput, parse_arguments};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::info;

pub const TOOL_NAME: &str = "pg_describe_table";

/// Input for the describe table tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DescribeTableInput {
    /// Table name
    #[schemars(length(min = 1))]
    pub table: String,
    /// Schema name. Default: public (main on SQLite)
    #[serde(default)]
    pub schema: Option<String>,
}

/// Handler for `pg_describe_table`.
pub struct DescribeTableTool {
    context: ToolContext,
}

impl DescribeTableTool {
    pub fn new(context: ToolContext) -> Self {
        Self { context }
    }

    pub async fn describe_table(&self, input: DescribeTableInput) -> DbResult<TableDescription> {
        let schema = input
            .schema
            .unwrap_or_else(|| self.context.pool.database_type().default_schema().to_string());
        self.context.validator.check_table(&schema, &input.table)?;

        let mut lease = self.context.lease().await?;
        let description = SchemaInspector::describe_table(&mut lease, &schema, &input.table).await?;
        lease.release();

        let description = description.ok_or_else(|| {
            DbError::resource_not_found(
                ResourceUri::Table {
                    schema: schema.clone(),
                    table: input.table.clone(),
                }
                .to_string(),
            )
        })?;

        info!(
            table = %description.table.qualified_name(),
            columns = description.columns.len(),
            indexes = description.indexes.len(),
            "Described table"
        );
        Ok(description)
    }
}

#[async_trait]
impl ToolHandler for DescribeTableTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::for_input::<DescribeTableInput>(
            TOOL_NAME,
            "Get detailed information about table structure including columns, constraints, and indexes",
        )
    }

    async fn call(&self, arguments: JsonValue) -> DbResult<ToolOutput> {
        let description = self.describe_table(parse_arguments(arguments)?).await?;
        let summary = format!(
            "Table '{}' has {} column(s)",
            description.table.qualified_name(),
            description.columns.len()
        );
        ToolOutput::new(summary, &description)
    }
}
