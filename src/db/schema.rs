//! Schema introspection module.
//!
//! Catalog SQL is authored here and nowhere else. It travels to the connection
//! as a [`CatalogQuery`], a type only this crate can construct, so the security
//! validator's untrusted-SQL path and the catalog path never mix.
//!
//! # Architecture
//!
//! SQL queries are organized in the `queries` submodule with constants for each
//! database type. Database-specific implementations are in their respective
//! submodules (postgres, sqlite), each providing the same interface.

use crate::db::pool::Lease;
use crate::db::types::RowSet;
use crate::db::{DatabaseType, QueryParam};
use crate::error::DbResult;
use crate::models::{DatabaseStats, TableDescription, TableInfo, TableType};
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

/// Upper bound on rows read from any catalog query.
const CATALOG_ROW_LIMIT: usize = 10_000;

/// Rows returned for a table resource preview.
pub const SAMPLE_ROW_LIMIT: usize = 5;

/// Server-authored SQL with its bound parameters.
#[derive(Debug, Clone)]
pub struct CatalogQuery {
    sql: String,
    params: Vec<QueryParam>,
}

impl CatalogQuery {
    pub(crate) fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub(crate) fn bind(mut self, param: QueryParam) -> Self {
        self.params.push(param);
        self
    }

    pub(crate) fn bind_str(self, value: &str) -> Self {
        self.bind(QueryParam::String(value.to_string()))
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[QueryParam] {
        &self.params
    }
}

/// Quote an identifier for interpolation into catalog SQL.
///
/// Both backends use double quotes; embedded quotes are doubled.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Schema inspector for database introspection.
pub struct SchemaInspector;

impl SchemaInspector {
    /// List user schemas (PostgreSQL) or attached databases (SQLite).
    pub async fn list_schemas(lease: &mut Lease) -> DbResult<Vec<String>> {
        let sql = match lease.database_type() {
            DatabaseType::Postgres => queries::postgres::LIST_SCHEMAS,
            DatabaseType::SQLite => queries::sqlite::LIST_SCHEMAS,
        };
        let rows = lease
            .catalog(&CatalogQuery::new(sql), CATALOG_ROW_LIMIT)
            .await?;
        Ok(rows.strings("schema_name"))
    }

    /// List tables, views and materialized views, optionally within one schema.
    ///
    /// System schemas (and SQLite internal tables) are excluded unless
    /// `include_system` is set.
    pub async fn list_tables(
        lease: &mut Lease,
        schema: Option<&str>,
        include_system: bool,
    ) -> DbResult<Vec<TableInfo>> {
        let query = match lease.database_type() {
            DatabaseType::Postgres => CatalogQuery::new(queries::postgres::LIST_TABLES),
            DatabaseType::SQLite => CatalogQuery::new(queries::sqlite::LIST_TABLES),
        };
        let query = query
            .bind(schema.map_or(QueryParam::Null, |s| QueryParam::String(s.to_string())))
            .bind(QueryParam::Bool(include_system));

        let rows = lease.catalog(&query, CATALOG_ROW_LIMIT).await?;
        let tables: Vec<TableInfo> = rows.rows.iter().filter_map(table_from_row).collect();

        debug!(
            count = tables.len(),
            schema = schema.unwrap_or("*"),
            "Listed tables"
        );
        Ok(tables)
    }

    /// Look up one table-like object. `None` when it does not exist.
    pub async fn table_info(
        lease: &mut Lease,
        schema: &str,
        table: &str,
    ) -> DbResult<Option<TableInfo>> {
        let sql = match lease.database_type() {
            DatabaseType::Postgres => queries::postgres::TABLE_INFO,
            DatabaseType::SQLite => queries::sqlite::TABLE_INFO,
        };
        let query = CatalogQuery::new(sql).bind_str(schema).bind_str(table);
        let rows = lease.catalog(&query, 1).await?;
        Ok(rows.rows.first().and_then(table_from_row))
    }

    /// Describe columns, constraints, indexes and row estimate of a table.
    /// `None` when the table does not exist.
    pub async fn describe_table(
        lease: &mut Lease,
        schema: &str,
        table: &str,
    ) -> DbResult<Option<TableDescription>> {
        let Some(info) = Self::table_info(lease, schema, table).await? else {
            return Ok(None);
        };

        let description = match lease.database_type() {
            DatabaseType::Postgres => postgres::describe_table(lease, info).await?,
            DatabaseType::SQLite => sqlite::describe_table(lease, info).await?,
        };

        debug!(
            table = %description.table.qualified_name(),
            columns = description.columns.len(),
            "Described table"
        );
        Ok(Some(description))
    }

    /// First rows of a table, with both identifiers quoted.
    pub async fn sample_rows(
        lease: &mut Lease,
        schema: &str,
        table: &str,
        limit: usize,
    ) -> DbResult<RowSet> {
        let sql = format!(
            "SELECT * FROM {}.{} LIMIT {}",
            quote_identifier(schema),
            quote_identifier(table),
            limit
        );
        lease.catalog(&CatalogQuery::new(sql), limit).await
    }

    /// Database-wide statistics for the stats resource.
    pub async fn database_stats(lease: &mut Lease) -> DbResult<DatabaseStats> {
        let server_version = lease.server_version().await?;
        let sql = match lease.database_type() {
            DatabaseType::Postgres => queries::postgres::DATABASE_STATS,
            DatabaseType::SQLite => queries::sqlite::DATABASE_STATS,
        };
        let rows = lease.catalog(&CatalogQuery::new(sql), 1).await?;
        let row = rows.rows.first();

        Ok(DatabaseStats {
            server_version,
            size_bytes: row
                .and_then(|r| int(r, "size_bytes"))
                .map(|v| v.max(0) as u64),
            table_count: row.and_then(|r| int(r, "table_count")).unwrap_or(0),
            view_count: row.and_then(|r| int(r, "view_count")).unwrap_or(0),
            active_connections: row.and_then(|r| int(r, "active_connections")),
        })
    }
}

// =============================================================================
// Row helpers
// =============================================================================

type CatalogRow = Map<String, JsonValue>;

fn text(row: &CatalogRow, column: &str) -> Option<String> {
    match row.get(column)? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Null => None,
        other => Some(other.to_string()),
    }
}

fn int(row: &CatalogRow, column: &str) -> Option<i64> {
    match row.get(column)? {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        JsonValue::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// SQLite reports booleans as integers.
fn flag(row: &CatalogRow, column: &str) -> bool {
    match row.get(column) {
        Some(JsonValue::Bool(b)) => *b,
        Some(JsonValue::Number(n)) => n.as_i64().is_some_and(|v| v != 0),
        Some(JsonValue::String(s)) => matches!(s.as_str(), "t" | "true" | "1"),
        _ => false,
    }
}

/// A JSON array column. SQLite's `json_group_array` arrives as text.
fn string_list(row: &CatalogRow, column: &str) -> Vec<String> {
    let value = match row.get(column) {
        Some(JsonValue::String(s)) => serde_json::from_str(s).unwrap_or(JsonValue::Null),
        Some(v) => v.clone(),
        None => JsonValue::Null,
    };
    match value {
        JsonValue::Array(items) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

fn table_from_row(row: &CatalogRow) -> Option<TableInfo> {
    let schema = text(row, "table_schema")?;
    let name = text(row, "table_name")?;
    let table_type = TableType::parse(&text(row, "table_type").unwrap_or_default());

    let mut table = TableInfo::new(schema, name, table_type);
    if let Some(comment) = text(row, "comment") {
        table = table.with_comment(comment);
    }
    if let Some(rows) = int(row, "row_estimate") {
        table = table.with_row_estimate(rows);
    }
    if let Some(size) = int(row, "total_size") {
        table = table.with_total_size(size.max(0) as u64);
    }
    Some(table)
}

// =============================================================================
// SQL Query Templates
// =============================================================================
//
// Centralized SQL queries for schema introspection. Each database has its own
// submodule with queries adapted to its specific system catalogs.

mod queries {
    pub mod postgres {
        pub const LIST_SCHEMAS: &str = r#"
            SELECT n.nspname AS schema_name
            FROM pg_namespace n
            WHERE n.nspname NOT IN ('information_schema', 'pg_catalog', 'pg_toast')
            AND n.nspname NOT LIKE 'pg_temp_%'
            AND n.nspname NOT LIKE 'pg_toast_temp_%'
            ORDER BY n.nspname
            "#;

        pub const LIST_TABLES: &str = r#"
            SELECT
                n.nspname AS table_schema,
                c.relname AS table_name,
                CASE c.relkind
                    WHEN 'v' THEN 'view'
                    WHEN 'm' THEN 'materialized view'
                    WHEN 'f' THEN 'foreign table'
                    ELSE 'table'
                END AS table_type,
                obj_description(c.oid, 'pg_class') AS comment,
                CASE WHEN c.reltuples < 0 THEN NULL ELSE c.reltuples::bigint END AS row_estimate,
                CASE WHEN c.relkind IN ('r', 'p', 'm') THEN pg_total_relation_size(c.oid) END AS total_size
            FROM pg_class c
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE c.relkind IN ('r', 'p', 'v', 'm', 'f')
            AND ($1::text IS NULL OR n.nspname = $1::text)
            AND ($2::boolean OR (
                n.nspname NOT IN ('information_schema', 'pg_catalog', 'pg_toast')
                AND n.nspname NOT LIKE 'pg_temp_%'
                AND n.nspname NOT LIKE 'pg_toast_temp_%'
            ))
            ORDER BY n.nspname, c.relname
            "#;

        pub const TABLE_INFO: &str = r#"
            SELECT
                n.nspname AS table_schema,
                c.relname AS table_name,
                CASE c.relkind
                    WHEN 'v' THEN 'view'
                    WHEN 'm' THEN 'materialized view'
                    WHEN 'f' THEN 'foreign table'
                    ELSE 'table'
                END AS table_type,
                obj_description(c.oid, 'pg_class') AS comment,
                CASE WHEN c.reltuples < 0 THEN NULL ELSE c.reltuples::bigint END AS row_estimate,
                CASE WHEN c.relkind IN ('r', 'p', 'm') THEN pg_total_relation_size(c.oid) END AS total_size
            FROM pg_class c
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE c.relkind IN ('r', 'p', 'v', 'm', 'f')
            AND n.nspname = $1
            AND c.relname = $2
            "#;

        pub const DESCRIBE_COLUMNS: &str = r#"
            SELECT
                a.attname AS column_name,
                format_type(a.atttypid, a.atttypmod) AS data_type,
                NOT a.attnotnull AS is_nullable,
                pg_get_expr(d.adbin, d.adrelid) AS column_default,
                a.attnum::int AS ordinal_position,
                col_description(c.oid, a.attnum) AS comment,
                EXISTS (
                    SELECT 1 FROM pg_index ix
                    WHERE ix.indrelid = c.oid
                    AND ix.indisprimary
                    AND a.attnum = ANY(ix.indkey)
                ) AS is_primary_key
            FROM pg_attribute a
            JOIN pg_class c ON c.oid = a.attrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
            WHERE n.nspname = $1
            AND c.relname = $2
            AND a.attnum > 0
            AND NOT a.attisdropped
            ORDER BY a.attnum
            "#;

        pub const DESCRIBE_CONSTRAINTS: &str = r#"
            SELECT
                con.conname AS constraint_name,
                con.contype::text AS constraint_type,
                COALESCE((
                    SELECT json_agg(a.attname ORDER BY k.ord)
                    FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
                    JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
                ), '[]'::json) AS columns,
                CASE WHEN con.contype = 'f' THEN fn.nspname || '.' || ft.relname END AS foreign_table,
                COALESCE((
                    SELECT json_agg(a.attname ORDER BY k.ord)
                    FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord)
                    JOIN pg_attribute a ON a.attrelid = con.confrelid AND a.attnum = k.attnum
                ), '[]'::json) AS foreign_columns,
                CASE con.confdeltype
                    WHEN 'c' THEN 'CASCADE'
                    WHEN 'n' THEN 'SET NULL'
                    WHEN 'd' THEN 'SET DEFAULT'
                    WHEN 'r' THEN 'RESTRICT'
                    ELSE 'NO ACTION'
                END AS on_delete,
                CASE con.confupdtype
                    WHEN 'c' THEN 'CASCADE'
                    WHEN 'n' THEN 'SET NULL'
                    WHEN 'd' THEN 'SET DEFAULT'
                    WHEN 'r' THEN 'RESTRICT'
                    ELSE 'NO ACTION'
                END AS on_update,
                pg_get_constraintdef(con.oid) AS definition
            FROM pg_constraint con
            JOIN pg_class c ON c.oid = con.conrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            LEFT JOIN pg_class ft ON ft.oid = con.confrelid
            LEFT JOIN pg_namespace fn ON fn.oid = ft.relnamespace
            WHERE n.nspname = $1
            AND c.relname = $2
            ORDER BY con.conname
            "#;

        pub const DESCRIBE_INDEXES: &str = r#"
            SELECT
                i.relname AS index_name,
                COALESCE((
                    SELECT json_agg(a.attname ORDER BY k.ord)
                    FROM unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
                    JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
                ), '[]'::json) AS columns,
                ix.indisunique AS is_unique,
                ix.indisprimary AS is_primary,
                am.amname AS index_algorithm
            FROM pg_index ix
            JOIN pg_class i ON i.oid = ix.indexrelid
            JOIN pg_class t ON t.oid = ix.indrelid
            JOIN pg_namespace n ON n.oid = t.relnamespace
            LEFT JOIN pg_am am ON am.oid = i.relam
            WHERE n.nspname = $1
            AND t.relname = $2
            ORDER BY i.relname
            "#;

        pub const DATABASE_STATS: &str = r#"
            SELECT
                pg_database_size(current_database()) AS size_bytes,
                (
                    SELECT count(*) FROM pg_class c
                    JOIN pg_namespace n ON n.oid = c.relnamespace
                    WHERE c.relkind IN ('r', 'p')
                    AND n.nspname NOT IN ('information_schema', 'pg_catalog', 'pg_toast')
                    AND n.nspname NOT LIKE 'pg_temp_%'
                ) AS table_count,
                (
                    SELECT count(*) FROM pg_class c
                    JOIN pg_namespace n ON n.oid = c.relnamespace
                    WHERE c.relkind IN ('v', 'm')
                    AND n.nspname NOT IN ('information_schema', 'pg_catalog', 'pg_toast')
                ) AS view_count,
                (
                    SELECT count(*) FROM pg_stat_activity
                    WHERE datname = current_database()
                ) AS active_connections
            "#;
    }

    pub mod sqlite {
        pub const LIST_SCHEMAS: &str = r#"
            SELECT name AS schema_name
            FROM pragma_database_list
            WHERE name <> 'temp'
            ORDER BY seq
            "#;

        pub const LIST_TABLES: &str = r#"
            SELECT
                schema AS table_schema,
                name AS table_name,
                type AS table_type,
                NULL AS comment
            FROM pragma_table_list
            WHERE type IN ('table', 'view')
            AND schema <> 'temp'
            AND (?1 IS NULL OR schema = ?1)
            AND (?2 OR name NOT LIKE 'sqlite_%')
            ORDER BY schema, name
            "#;

        pub const TABLE_INFO: &str = r#"
            SELECT
                schema AS table_schema,
                name AS table_name,
                type AS table_type,
                NULL AS comment
            FROM pragma_table_list
            WHERE type IN ('table', 'view')
            AND schema = ?1
            AND name = ?2
            "#;

        /// Arguments: table, schema.
        pub const DESCRIBE_COLUMNS: &str = r#"
            SELECT
                name AS column_name,
                type AS data_type,
                "notnull" AS not_null,
                dflt_value AS column_default,
                cid + 1 AS ordinal_position,
                pk AS pk_position
            FROM pragma_table_info(?1, ?2)
            ORDER BY cid
            "#;

        /// Arguments: table, schema.
        pub const DESCRIBE_FOREIGN_KEYS: &str = r#"
            SELECT
                id,
                "table" AS foreign_table,
                "from" AS column_name,
                "to" AS foreign_column,
                on_update,
                on_delete
            FROM pragma_foreign_key_list(?1, ?2)
            ORDER BY id, seq
            "#;

        /// Arguments: table, schema.
        pub const DESCRIBE_INDEXES: &str = r#"
            SELECT
                il.name AS index_name,
                il."unique" AS is_unique,
                il.origin AS origin,
                (
                    SELECT json_group_array(name) FROM (
                        SELECT ii.name FROM pragma_index_info(il.name, ?2) ii
                        ORDER BY ii.seqno
                    )
                ) AS columns
            FROM pragma_index_list(?1, ?2) il
            ORDER BY il.name
            "#;

        pub const DATABASE_STATS: &str = r#"
            SELECT
                (SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()) AS size_bytes,
                (SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%') AS table_count,
                (SELECT count(*) FROM sqlite_master WHERE type = 'view') AS view_count
            "#;
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod postgres {
    use super::*;
    use crate::models::{
        ColumnDefinition, ConstraintInfo, ConstraintType, ForeignKeyAction, IndexInfo,
    };

    pub async fn describe_table(lease: &mut Lease, table: TableInfo) -> DbResult<TableDescription> {
        let columns = fetch_columns(lease, &table).await?;
        let primary_key = columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.clone())
            .collect();
        let constraints = fetch_constraints(lease, &table).await?;
        let indexes = fetch_indexes(lease, &table).await?;

        Ok(TableDescription {
            table,
            columns,
            primary_key,
            constraints,
            indexes,
        })
    }

    fn scoped(sql: &str, table: &TableInfo) -> CatalogQuery {
        CatalogQuery::new(sql)
            .bind_str(&table.schema)
            .bind_str(&table.name)
    }

    async fn fetch_columns(lease: &mut Lease, table: &TableInfo) -> DbResult<Vec<ColumnDefinition>> {
        let query = scoped(queries::postgres::DESCRIBE_COLUMNS, table);
        let rows = lease.catalog(&query, CATALOG_ROW_LIMIT).await?;

        Ok(rows
            .rows
            .iter()
            .filter_map(|row| {
                let name = text(row, "column_name")?;
                let data_type = text(row, "data_type").unwrap_or_default();
                let position = int(row, "ordinal_position").unwrap_or(0);
                let mut col = ColumnDefinition::new(name, data_type, flag(row, "is_nullable"), position)
                    .with_primary_key(flag(row, "is_primary_key"));
                if let Some(default) = text(row, "column_default") {
                    col = col.with_default_str(&default);
                }
                if let Some(comment) = text(row, "comment") {
                    col = col.with_comment(comment);
                }
                Some(col)
            })
            .collect())
    }

    async fn fetch_constraints(
        lease: &mut Lease,
        table: &TableInfo,
    ) -> DbResult<Vec<ConstraintInfo>> {
        let query = scoped(queries::postgres::DESCRIBE_CONSTRAINTS, table);
        let rows = lease.catalog(&query, CATALOG_ROW_LIMIT).await?;

        Ok(rows
            .rows
            .iter()
            .filter_map(|row| {
                let name = text(row, "constraint_name")?;
                // NOT NULL and trigger constraints are reported elsewhere or not at all.
                let kind = ConstraintType::parse(&text(row, "constraint_type")?)?;
                let mut constraint = ConstraintInfo::new(name, kind, string_list(row, "columns"));
                if kind == ConstraintType::ForeignKey {
                    if let Some(foreign) = text(row, "foreign_table") {
                        constraint =
                            constraint.with_reference(foreign, string_list(row, "foreign_columns"));
                    }
                    constraint = constraint.with_actions(
                        ForeignKeyAction::parse(&text(row, "on_delete").unwrap_or_default()),
                        ForeignKeyAction::parse(&text(row, "on_update").unwrap_or_default()),
                    );
                }
                if let Some(definition) = text(row, "definition") {
                    constraint = constraint.with_definition(definition);
                }
                Some(constraint)
            })
            .collect())
    }

    async fn fetch_indexes(lease: &mut Lease, table: &TableInfo) -> DbResult<Vec<IndexInfo>> {
        let query = scoped(queries::postgres::DESCRIBE_INDEXES, table);
        let rows = lease.catalog(&query, CATALOG_ROW_LIMIT).await?;

        Ok(rows
            .rows
            .iter()
            .filter_map(|row| {
                let name = text(row, "index_name")?;
                let mut idx = IndexInfo::new(name, string_list(row, "columns"))
                    .with_unique(flag(row, "is_unique"))
                    .with_primary(flag(row, "is_primary"));
                if let Some(algorithm) = text(row, "index_algorithm") {
                    idx = idx.with_algorithm(algorithm);
                }
                Some(idx)
            })
            .collect())
    }
}

mod sqlite {
    use super::*;
    use crate::models::{
        ColumnDefinition, ConstraintInfo, ConstraintType, ForeignKeyAction, IndexInfo,
    };

    pub async fn describe_table(lease: &mut Lease, table: TableInfo) -> DbResult<TableDescription> {
        let (columns, primary_key) = fetch_columns(lease, &table).await?;
        let indexes = fetch_indexes(lease, &table).await?;

        let mut constraints = Vec::new();
        if !primary_key.is_empty() {
            constraints.push(ConstraintInfo::new(
                format!("{}_pkey", table.name),
                ConstraintType::PrimaryKey,
                primary_key.clone(),
            ));
        }
        constraints.extend(
            indexes
                .iter()
                .filter(|idx| idx.is_unique && !idx.is_primary && idx.name.starts_with("sqlite_autoindex_"))
                .map(|idx| ConstraintInfo::new(&idx.name, ConstraintType::Unique, idx.columns.clone())),
        );
        constraints.extend(fetch_foreign_keys(lease, &table).await?);

        let mut table = table;
        if !table.table_type.is_view() {
            let count_sql = format!(
                "SELECT count(*) AS row_count FROM {}.{}",
                quote_identifier(&table.schema),
                quote_identifier(&table.name)
            );
            let count = lease.catalog(&CatalogQuery::new(count_sql), 1).await?;
            if let Some(rows) = count.rows.first().and_then(|r| int(r, "row_count")) {
                table = table.with_row_estimate(rows);
            }
        }

        Ok(TableDescription {
            table,
            columns,
            primary_key,
            constraints,
            indexes,
        })
    }

    /// Pragma functions take the table first, then the schema.
    fn pragma(sql: &str, table: &TableInfo) -> CatalogQuery {
        CatalogQuery::new(sql)
            .bind_str(&table.name)
            .bind_str(&table.schema)
    }

    async fn fetch_columns(
        lease: &mut Lease,
        table: &TableInfo,
    ) -> DbResult<(Vec<ColumnDefinition>, Vec<String>)> {
        let query = pragma(queries::sqlite::DESCRIBE_COLUMNS, table);
        let rows = lease.catalog(&query, CATALOG_ROW_LIMIT).await?;

        let mut pk: Vec<(i64, String)> = Vec::new();
        let columns = rows
            .rows
            .iter()
            .filter_map(|row| {
                let name = text(row, "column_name")?;
                let pk_position = int(row, "pk_position").unwrap_or(0);
                if pk_position > 0 {
                    pk.push((pk_position, name.clone()));
                }
                let data_type = text(row, "data_type").unwrap_or_default();
                let position = int(row, "ordinal_position").unwrap_or(0);
                let mut col = ColumnDefinition::new(name, data_type, !flag(row, "not_null"), position)
                    .with_primary_key(pk_position > 0);
                if let Some(default) = text(row, "column_default") {
                    col = col.with_default_str(&default);
                }
                Some(col)
            })
            .collect();

        pk.sort_by_key(|(position, _)| *position);
        Ok((columns, pk.into_iter().map(|(_, name)| name).collect()))
    }

    async fn fetch_foreign_keys(
        lease: &mut Lease,
        table: &TableInfo,
    ) -> DbResult<Vec<ConstraintInfo>> {
        let query = pragma(queries::sqlite::DESCRIBE_FOREIGN_KEYS, table);
        let rows = lease.catalog(&query, CATALOG_ROW_LIMIT).await?;

        // One row per column; multi-column keys share an id.
        let mut keys: Vec<(i64, ConstraintInfo)> = Vec::new();
        for row in &rows.rows {
            let id = int(row, "id").unwrap_or(0);
            let column = text(row, "column_name").unwrap_or_default();
            let foreign_column = text(row, "foreign_column");

            match keys.iter_mut().find(|(key_id, _)| *key_id == id) {
                Some((_, key)) => {
                    key.columns.push(column);
                    key.references_columns.extend(foreign_column);
                }
                None => {
                    let foreign_table = text(row, "foreign_table").unwrap_or_default();
                    let key = ConstraintInfo::new(
                        format!("{}_fk_{}", table.name, id),
                        ConstraintType::ForeignKey,
                        vec![column],
                    )
                    .with_reference(foreign_table, foreign_column.into_iter().collect())
                    .with_actions(
                        ForeignKeyAction::parse(&text(row, "on_delete").unwrap_or_default()),
                        ForeignKeyAction::parse(&text(row, "on_update").unwrap_or_default()),
                    );
                    keys.push((id, key));
                }
            }
        }
        Ok(keys.into_iter().map(|(_, key)| key).collect())
    }

    async fn fetch_indexes(lease: &mut Lease, table: &TableInfo) -> DbResult<Vec<IndexInfo>> {
        let query = pragma(queries::sqlite::DESCRIBE_INDEXES, table);
        let rows = lease.catalog(&query, CATALOG_ROW_LIMIT).await?;

        Ok(rows
            .rows
            .iter()
            .filter_map(|row| {
                let name = text(row, "index_name")?;
                let is_primary = text(row, "origin").as_deref() == Some("pk");
                Some(
                    IndexInfo::new(name, string_list(row, "columns"))
                        .with_unique(flag(row, "is_unique"))
                        .with_primary(is_primary)
                        .with_algorithm("btree"),
                )
            })
            .collect())
    }
}
