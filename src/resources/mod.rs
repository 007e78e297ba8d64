//! MCP resources derived from live database metadata.
//!
//! Three URI shapes are served:
//! - `schema://<schema>`: tables and views in one schema
//! - `table://<schema>/<table>`: structure plus a few sample rows
//! - `stats://database`: server version, size, object counts and pool state
//!
//! Nothing is cached; every list or read queries the catalogue again.

use crate::db::schema::SAMPLE_ROW_LIMIT;
use crate::db::{ConnectionManager, PoolStats, RowSet, SchemaInspector};
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseStats, TableDescription, TableInfo};
use crate::security::SecurityValidator;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

pub const JSON_MIME_TYPE: &str = "application/json";

/// Parsed resource URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceUri {
    Schema(String),
    Table { schema: String, table: String },
    Stats,
}

impl FromStr for ResourceUri {
    type Err = DbError;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| DbError::invalid_resource(uri, reason);

        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| invalid("expected <scheme>://<path>"))?;

        match scheme {
            "schema" => {
                if rest.is_empty() || rest.contains('/') {
                    return Err(invalid("expected schema://<schema>"));
                }
                Ok(Self::Schema(rest.to_string()))
            }
            "table" => match rest.split_once('/') {
                Some((schema, table)) if !schema.is_empty() && !table.is_empty() => {
                    Ok(Self::Table {
                        schema: schema.to_string(),
                        table: table.to_string(),
                    })
                }
                _ => Err(invalid("expected table://<schema>/<table>")),
            },
            "stats" if rest == "database" => Ok(Self::Stats),
            "stats" => Err(invalid("the only stats resource is stats://database")),
            _ => Err(invalid("unknown scheme; expected schema, table or stats")),
        }
    }
}

impl fmt::Display for ResourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schema(schema) => write!(f, "schema://{}", schema),
            Self::Table { schema, table } => write!(f, "table://{}/{}", schema, table),
            Self::Stats => write!(f, "stats://database"),
        }
    }
}

/// Entry in a `resources/list` response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    pub uri: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

impl Resource {
    fn json(uri: &ResourceUri, name: String, description: String) -> Self {
        Self {
            uri: uri.to_string(),
            name,
            description,
            mime_type: JSON_MIME_TYPE.to_string(),
        }
    }
}

/// Body of a `resources/read` response entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceContent {
    pub uri: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
struct SchemaContent {
    schema: String,
    tables: Vec<TableInfo>,
    count: usize,
}

#[derive(Debug, Serialize)]
struct TableContent {
    #[serde(flatten)]
    description: TableDescription,
    sample_rows: Vec<serde_json::Map<String, JsonValue>>,
}

#[derive(Debug, Serialize)]
struct StatsContent {
    database_type: crate::db::DatabaseType,
    #[serde(flatten)]
    stats: DatabaseStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_formatted: Option<String>,
    pool: PoolStats,
    generated_at: String,
}

/// Format bytes as human-readable size string.
///
/// Uses binary units (1 KB = 1024 bytes) consistent with database tools.
///
/// ```
/// use secure_db_mcp::resources::format_size;
///
/// assert_eq!(format_size(512), "512 B");
/// assert_eq!(format_size(1048576), "1 MB");
/// ```
pub fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::WINDOWS)
}

/// Serves schema, table and stats resources.
#[derive(Debug, Clone)]
pub struct ResourceManager {
    pool: ConnectionManager,
    validator: Arc<SecurityValidator>,
}

impl ResourceManager {
    pub fn new(pool: ConnectionManager, validator: Arc<SecurityValidator>) -> Self {
        Self { pool, validator }
    }

    async fn lease(&self) -> DbResult<crate::db::Lease> {
        self.pool.acquire(self.pool.settings().acquire_timeout).await
    }

    /// Every schema, every visible table, and the stats resource.
    pub async fn list(&self) -> DbResult<Vec<Resource>> {
        let mut lease = self.lease().await?;
        let schemas = SchemaInspector::list_schemas(&mut lease).await?;
        let tables = SchemaInspector::list_tables(&mut lease, None, false).await?;
        lease.release();

        let mut resources = Vec::with_capacity(schemas.len() + tables.len() + 1);
        for schema in schemas {
            resources.push(Resource::json(
                &ResourceUri::Schema(schema.clone()),
                format!("Schema: {}", schema),
                "Database schema containing tables and views".to_string(),
            ));
        }
        for table in tables
            .into_iter()
            .filter(|t| self.validator.table_visible(&t.schema, &t.name))
        {
            let uri = ResourceUri::Table {
                schema: table.schema.clone(),
                table: table.name.clone(),
            };
            let description = table
                .comment
                .clone()
                .unwrap_or_else(|| format!("{} {}", table.table_type, table.qualified_name()));
            resources.push(Resource::json(
                &uri,
                format!("Table: {}", table.qualified_name()),
                description,
            ));
        }
        resources.push(Resource::json(
            &ResourceUri::Stats,
            "Database Statistics".to_string(),
            "General database statistics and information".to_string(),
        ));

        debug!(count = resources.len(), "Listed resources");
        Ok(resources)
    }

    /// Read one resource. Malformed URIs are `InvalidResource`, missing objects
    /// `ResourceNotFound`.
    pub async fn read(&self, uri: &str) -> DbResult<ResourceContent> {
        let parsed: ResourceUri = uri.parse()?;
        let body = match &parsed {
            ResourceUri::Schema(schema) => self.read_schema(&parsed, schema).await?,
            ResourceUri::Table { schema, table } => self.read_table(&parsed, schema, table).await?,
            ResourceUri::Stats => self.read_stats().await?,
        };

        let text = serde_json::to_string_pretty(&body)
            .map_err(|e| DbError::internal(format!("Failed to serialize resource: {}", e)))?;
        Ok(ResourceContent {
            uri: parsed.to_string(),
            mime_type: JSON_MIME_TYPE.to_string(),
            text,
        })
    }

    async fn read_schema(&self, uri: &ResourceUri, schema: &str) -> DbResult<JsonValue> {
        let mut lease = self.lease().await?;
        let schemas = SchemaInspector::list_schemas(&mut lease).await?;
        if !schemas.iter().any(|s| s == schema) {
            return Err(DbError::resource_not_found(uri.to_string()));
        }
        let tables = SchemaInspector::list_tables(&mut lease, Some(schema), false).await?;
        lease.release();

        let tables: Vec<TableInfo> = tables
            .into_iter()
            .filter(|t| self.validator.table_visible(&t.schema, &t.name))
            .collect();
        to_json(&SchemaContent {
            schema: schema.to_string(),
            count: tables.len(),
            tables,
        })
    }

    async fn read_table(&self, uri: &ResourceUri, schema: &str, table: &str) -> DbResult<JsonValue> {
        self.validator.check_table(schema, table)?;

        let mut lease = self.lease().await?;
        let Some(description) = SchemaInspector::describe_table(&mut lease, schema, table).await?
        else {
            return Err(DbError::resource_not_found(uri.to_string()));
        };
        let sample = match SchemaInspector::sample_rows(&mut lease, schema, table, SAMPLE_ROW_LIMIT).await {
            Ok(rows) => rows,
            Err(e @ DbError::Database { .. }) => {
                // Dropped after the catalog lookup.
                if SchemaInspector::table_info(&mut lease, schema, table)
                    .await?
                    .is_none()
                {
                    return Err(DbError::resource_not_found(uri.to_string()));
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        lease.release();

        let RowSet { rows, .. } = sample;
        to_json(&TableContent {
            description,
            sample_rows: rows,
        })
    }

    async fn read_stats(&self) -> DbResult<JsonValue> {
        let mut lease = self.lease().await?;
        let stats = SchemaInspector::database_stats(&mut lease).await?;
        lease.release();

        to_json(&StatsContent {
            database_type: self.pool.database_type(),
            size_formatted: stats.size_bytes.map(format_size),
            stats,
            pool: self.pool.stats(),
            generated_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

fn to_json(value: &impl Serialize) -> DbResult<JsonValue> {
    serde_json::to_value(value)
        .map_err(|e| DbError::internal(format!("Failed to serialize resource: {}", e)))
}
