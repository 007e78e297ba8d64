//! Query execution tool.
//!
//! This module implements the `pg_query` MCP tool. Every statement goes through
//! the security validator first; what the policy permits is then run on a
//! leased connection. Row-returning statements are streamed and cut off at the
//! effective limit, other statements report the affected row count.

use crate::db::{ColumnInfo, QueryParam};
use crate::error::DbResult;
use crate::security::StatementKind;
use crate::tools::{ToolContext, ToolDefinition, ToolHandler, ToolOutput, parse_arguments};
use async_trait::async_trait;
use schemars::{JsonSchema, Schema};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Instant;
use tracing::{debug, info};

pub const TOOL_NAME: &str = "pg_query";

/// Default row limit for query results.
pub const DEFAULT_ROW_LIMIT: u32 = 100;

/// Maximum row limit a caller may request.
pub const MAX_ROW_LIMIT: u32 = 1000;

/// Input for the query tool.
///
/// The statement may be passed as `query` or `sql`, never both.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[schemars(transform = accept_sql_alias)]
pub struct QueryInput {
    /// SQL statement to execute. Only one statement is allowed; comments are rejected.
    #[serde(alias = "sql")]
    #[schemars(length(min = 1))]
    pub query: String,
    /// Positional parameters for parameterized queries ($1, $2... on PostgreSQL, ? on SQLite)
    #[serde(default)]
    pub parameters: Vec<JsonValue>,
    /// Maximum rows to return. Default: 100, max: 1000
    #[serde(default)]
    #[schemars(range(min = 1, max = 1000))]
    pub limit: Option<u32>,
}

/// Add `sql` as an alternative property name for `query`.
fn accept_sql_alias(schema: &mut Schema) {
    let Some(object) = schema.as_object_mut() else {
        return;
    };
    if let Some(properties) = object.get_mut("properties").and_then(JsonValue::as_object_mut) {
        if let Some(query) = properties.get("query").cloned() {
            properties.insert("sql".to_string(), query);
        }
    }
    if let Some(required) = object.get_mut("required").and_then(JsonValue::as_array_mut) {
        required.retain(|name| name.as_str() != Some("query"));
        if required.is_empty() {
            object.remove("required");
        }
    }
    object.insert(
        "oneOf".to_string(),
        serde_json::json!([{"required": ["query"]}, {"required": ["sql"]}]),
    );
}

/// Output from the query tool.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutput {
    /// Classification of the executed statement
    pub kind: StatementKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<ColumnInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    /// Number of rows returned
    pub row_count: usize,
    /// True if more rows were available than the effective limit
    pub truncated: bool,
    /// Rows changed by a write statement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    /// Query execution time in milliseconds
    pub execution_time_ms: u64,
}

impl QueryOutput {
    fn summary(&self) -> String {
        match self.rows_affected {
            Some(affected) => format!(
                "{} statement affected {} row(s) in {} ms",
                self.kind, affected, self.execution_time_ms
            ),
            None => {
                let truncated = if self.truncated { " (truncated)" } else { "" };
                format!(
                    "Query returned {} row(s){} in {} ms",
                    self.row_count, truncated, self.execution_time_ms
                )
            }
        }
    }
}

/// Handler for `pg_query`.
pub struct QueryTool {
    context: ToolContext,
}

impl QueryTool {
    pub fn new(context: ToolContext) -> Self {
        Self { context }
    }

    /// Rows to return: the requested limit, bounded by the server-wide cap.
    fn effective_limit(&self, requested: Option<u32>) -> usize {
        let requested = requested
            .unwrap_or(DEFAULT_ROW_LIMIT)
            .clamp(1, MAX_ROW_LIMIT) as usize;
        requested.min(self.context.max_query_rows.max(1))
    }

    pub async fn query(&self, input: QueryInput) -> DbResult<QueryOutput> {
        let statement = self.context.validator.validate(&input.query)?;
        let params: Vec<QueryParam> = input.parameters.iter().map(QueryParam::from_json).collect();
        let limit = self.effective_limit(input.limit);
        debug!(
            kind = %statement.kind(),
            tables = ?statement.classification().tables,
            param_types = ?params.iter().map(QueryParam::type_name).collect::<Vec<_>>(),
            limit,
            "Running validated statement"
        );

        let mut lease = self.context.lease().await?;
        let start = Instant::now();

        let output = if statement.returns_rows() {
            let set = lease.query(&statement, &params, limit).await?;
            QueryOutput {
                kind: statement.kind(),
                row_count: set.len(),
                truncated: set.truncated,
                columns: set.columns,
                rows: set.rows,
                rows_affected: None,
                execution_time_ms: start.elapsed().as_millis() as u64,
            }
        } else {
            let affected = lease.execute(&statement, &params).await?;
            QueryOutput {
                kind: statement.kind(),
                columns: Vec::new(),
                rows: Vec::new(),
                row_count: 0,
                truncated: false,
                rows_affected: Some(affected),
                execution_time_ms: start.elapsed().as_millis() as u64,
            }
        };
        lease.release();

        info!(
            kind = %output.kind,
            row_count = output.row_count,
            rows_affected = output.rows_affected,
            truncated = output.truncated,
            execution_time_ms = output.execution_time_ms,
            "Query executed"
        );
        Ok(output)
    }
}

#[async_trait]
impl ToolHandler for QueryTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::for_input::<QueryInput>(
            TOOL_NAME,
            "Execute a single SQL statement against the database. Read-only unless the server \
             enables writes; dangerous statements are always rejected.",
        )
    }

    async fn call(&self, arguments: JsonValue) -> DbResult<ToolOutput> {
        let output = self.query(parse_arguments(arguments)?).await?;
        ToolOutput::new(output.summary(), &output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PoolSettings, SecurityPolicy};
    use crate::db::{ConnectionManager, DatabaseType, SqlxConnector};
    use crate::error::DbError;
    use crate::security::SecurityValidator;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn tool(policy: SecurityPolicy, max_query_rows: usize) -> QueryTool {
        let connector =
            SqlxConnector::new("sqlite::memory:", Duration::from_secs(5), false).unwrap();
        let settings = PoolSettings {
            max_pool_size: 1,
            ..PoolSettings::default()
        };
        let pool = ConnectionManager::new(Arc::new(connector), settings);
        let validator = Arc::new(SecurityValidator::new(policy, DatabaseType::SQLite));
        QueryTool::new(ToolContext::new(pool, validator, max_query_rows))
    }

    #[test]
    fn test_query_input_deserialization() {
        let input: QueryInput = serde_json::from_value(json!({
            "query": "SELECT * FROM users WHERE id = $1",
            "parameters": [42],
            "limit": 10
        }))
        .unwrap();
        assert_eq!(input.parameters, vec![json!(42)]);
        assert_eq!(input.limit, Some(10));

        let input: QueryInput = serde_json::from_value(json!({"sql": "SELECT 1"})).unwrap();
        assert_eq!(input.query, "SELECT 1");

        let err = serde_json::from_value::<QueryInput>(json!({"query": "SELECT 1", "sql": "x"}));
        assert!(err.is_err());
        let err = serde_json::from_value::<QueryInput>(json!({"statement": "SELECT 1"}));
        assert!(err.is_err());
    }

    #[test]
    fn test_schema_accepts_query_or_sql() {
        let definition = tool(SecurityPolicy::read_only(), 100).definition();
        let validator = jsonschema::validator_for(&definition.input_schema).unwrap();
        assert!(validator.is_valid(&json!({"query": "SELECT 1"})));
        assert!(validator.is_valid(&json!({"sql": "SELECT 1", "limit": 5})));
        assert!(!validator.is_valid(&json!({"query": "SELECT 1", "sql": "SELECT 2"})));
        assert!(!validator.is_valid(&json!({"limit": 5})));
        assert!(!validator.is_valid(&json!({"sql": ""})));
    }

    #[test]
    fn test_effective_limit_respects_server_cap() {
        assert_eq!(tool(SecurityPolicy::read_only(), 1000).effective_limit(None), 100);
        assert_eq!(tool(SecurityPolicy::read_only(), 1000).effective_limit(Some(5000)), 1000);
        assert_eq!(tool(SecurityPolicy::read_only(), 20).effective_limit(Some(500)), 20);
    }

    #[tokio::test]
    async fn test_select_one_returns_one_row() {
        let tool = tool(SecurityPolicy::read_only(), 1000);
        let output = tool
            .call(json!({"query": "SELECT 1 AS one"}))
            .await
            .unwrap();
        assert_eq!(output.data["row_count"], 1);
        assert_eq!(output.data["rows"][0]["one"], 1);
        assert_eq!(output.data["kind"], "read");
        assert!(output.summary.starts_with("Query returned 1 row(s)"));
    }

    #[tokio::test]
    async fn test_parameters_are_bound() {
        let tool = tool(SecurityPolicy::read_only(), 1000);
        let output = tool
            .call(json!({"query": "SELECT ? AS a, ? AS b", "parameters": ["x", 2]}))
            .await
            .unwrap();
        assert_eq!(output.data["rows"][0]["a"], "x");
        assert_eq!(output.data["rows"][0]["b"], 2);
    }

    #[tokio::test]
    async fn test_rows_are_truncated_at_limit() {
        let tool = tool(SecurityPolicy::read_only(), 1000);
        let output = tool
            .call(json!({
                "query": "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 50) SELECT x FROM n",
                "limit": 10
            }))
            .await
            .unwrap();
        assert_eq!(output.data["row_count"], 10);
        assert_eq!(output.data["truncated"], true);
    }

    #[tokio::test]
    async fn test_ddl_denied_in_read_only_mode() {
        let tool = tool(SecurityPolicy::read_only(), 1000);
        let err = tool
            .call(json!({"query": "DROP TABLE users"}))
            .await
            .unwrap_err();
        match err {
            DbError::PolicyDenied { kind, reason } => {
                assert_eq!(kind, "ddl");
                assert!(reason.contains("ddl"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_writes_report_rows_affected_when_permitted() {
        let tool = tool(SecurityPolicy::read_write(), 1000);
        tool.call(json!({"query": "CREATE TABLE t (id INTEGER)"}))
            .await
            .unwrap();
        let output = tool
            .call(json!({"query": "INSERT INTO t (id) VALUES (1), (2)"}))
            .await
            .unwrap();
        assert_eq!(output.data["rows_affected"], 2);
        assert_eq!(output.data["kind"], "write");
    }
}
