//! Schema-related data models.
//!
//! This module defines the catalog shapes returned by the table tools and the
//! schema/table/stats resources.

use serde::Serialize;
use serde_json::Value as JsonValue;

/// One table-like object in a schema listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
    pub table_type: TableType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Planner estimate (PostgreSQL) or exact count (SQLite)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_estimate: Option<i64>,
    /// Bytes (data + indexes + toast)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_size: Option<u64>,
}

impl TableInfo {
    pub fn new(
        schema: impl Into<String>,
        name: impl Into<String>,
        table_type: TableType,
    ) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            table_type,
            comment: None,
            row_estimate: None,
            total_size: None,
        }
    }

    /// Set the table comment. Empty comments are ignored.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        let comment = comment.into();
        if !comment.is_empty() {
            self.comment = Some(comment);
        }
        self
    }

    pub fn with_row_estimate(mut self, rows: i64) -> Self {
        self.row_estimate = Some(rows);
        self
    }

    pub fn with_total_size(mut self, bytes: u64) -> Self {
        self.total_size = Some(bytes);
        self
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// Type of database table object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    Table,
    View,
    MaterializedView,
    ForeignTable,
}

impl TableType {
    /// Parse table type from database-specific string.
    pub fn parse(s: &str) -> Self {
        let lower = s.to_lowercase();
        match lower.as_str() {
            "view" => Self::View,
            "materialized view" | "matview" => Self::MaterializedView,
            "foreign table" | "foreign" => Self::ForeignTable,
            _ => Self::Table,
        }
    }

    pub fn is_view(&self) -> bool {
        matches!(self, Self::View | Self::MaterializedView)
    }
}

impl std::fmt::Display for TableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::View => write!(f, "view"),
            Self::MaterializedView => write!(f, "materialized_view"),
            Self::ForeignTable => write!(f, "foreign_table"),
        }
    }
}

/// Full structure of one table, as returned by `pg_describe_table`.
#[derive(Debug, Clone, Serialize)]
pub struct TableDescription {
    #[serde(flatten)]
    pub table: TableInfo,
    pub columns: Vec<ColumnDefinition>,
    pub primary_key: Vec<String>,
    pub constraints: Vec<ConstraintInfo>,
    pub indexes: Vec<IndexInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDefinition {
    pub name: String,
    /// Full type (e.g., `character varying(30)`, `integer`)
    pub data_type: String,
    pub nullable: bool,
    /// Default value with appropriate JSON type based on column data type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<JsonValue>,
    pub is_primary_key: bool,
    pub ordinal_position: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ColumnDefinition {
    pub fn new(
        name: impl Into<String>,
        data_type: impl Into<String>,
        nullable: bool,
        ordinal_position: i64,
    ) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            default_value: None,
            is_primary_key: false,
            ordinal_position,
            comment: None,
        }
    }

    pub fn with_primary_key(mut self, is_pk: bool) -> Self {
        self.is_primary_key = is_pk;
        self
    }

    /// Set the default value from its SQL text, converting to an appropriate
    /// JSON type based on the column's data type.
    pub fn with_default_str(mut self, default_str: &str) -> Self {
        self.default_value = Some(parse_default_value(default_str, &self.data_type));
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        let comment = comment.into();
        if !comment.is_empty() {
            self.comment = Some(comment);
        }
        self
    }
}

/// Kind of table constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintType {
    PrimaryKey,
    ForeignKey,
    Unique,
    Check,
    Exclusion,
}

impl ConstraintType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PRIMARY KEY" | "P" | "PK" => Some(Self::PrimaryKey),
            "FOREIGN KEY" | "F" => Some(Self::ForeignKey),
            "UNIQUE" | "U" => Some(Self::Unique),
            "CHECK" | "C" => Some(Self::Check),
            "EXCLUDE" | "X" => Some(Self::Exclusion),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstraintInfo {
    pub name: String,
    pub constraint_type: ConstraintType,
    pub columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references_table: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub references_columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<ForeignKeyAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_update: Option<ForeignKeyAction>,
    /// Server-rendered definition, e.g. `CHECK ((price > 0))`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
}

impl ConstraintInfo {
    pub fn new(
        name: impl Into<String>,
        constraint_type: ConstraintType,
        columns: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            constraint_type,
            columns,
            references_table: None,
            references_columns: Vec::new(),
            on_delete: None,
            on_update: None,
            definition: None,
        }
    }

    pub fn with_reference(mut self, table: impl Into<String>, columns: Vec<String>) -> Self {
        self.references_table = Some(table.into());
        self.references_columns = columns;
        self
    }

    pub fn with_actions(mut self, on_delete: ForeignKeyAction, on_update: ForeignKeyAction) -> Self {
        self.on_delete = Some(on_delete);
        self.on_update = Some(on_update);
        self
    }

    pub fn with_definition(mut self, definition: impl Into<String>) -> Self {
        self.definition = Some(definition.into());
        self
    }
}

/// Foreign key referential action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    /// No action (error if referenced)
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ForeignKeyAction {
    /// Parse from database-specific string.
    pub fn parse(s: &str) -> Self {
        let upper = s.to_uppercase();
        match upper.as_str() {
            "CASCADE" => Self::Cascade,
            "SET NULL" => Self::SetNull,
            "SET DEFAULT" => Self::SetDefault,
            "RESTRICT" => Self::Restrict,
            _ => Self::NoAction,
        }
    }
}

impl std::fmt::Display for ForeignKeyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAction => write!(f, "NO ACTION"),
            Self::Restrict => write!(f, "RESTRICT"),
            Self::Cascade => write!(f, "CASCADE"),
            Self::SetNull => write!(f, "SET NULL"),
            Self::SetDefault => write!(f, "SET DEFAULT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub is_unique: bool,
    pub is_primary: bool,
    /// btree, hash, gin, gist, etc.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_algorithm: Option<String>,
}

impl IndexInfo {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            is_unique: false,
            is_primary: false,
            index_algorithm: None,
        }
    }

    pub fn with_unique(mut self, is_unique: bool) -> Self {
        self.is_unique = is_unique;
        self
    }

    /// Set whether this is the primary key index.
    pub fn with_primary(mut self, is_primary: bool) -> Self {
        self.is_primary = is_primary;
        if is_primary {
            self.is_unique = true;
        }
        self
    }

    pub fn with_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.index_algorithm = Some(algorithm.into());
        self
    }
}

/// Database-wide figures for the stats resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseStats {
    pub server_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    pub table_count: i64,
    pub view_count: i64,
    /// PostgreSQL only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_connections: Option<i64>,
}

/// Parse a default value string into the appropriate JSON type based on column data type.
///
/// PostgreSQL renders literal defaults with a cast (`'draft'::text`); the cast is
/// stripped before conversion. Expressions (`now()`, `nextval(...)`) stay strings.
pub fn parse_default_value(default_str: &str, data_type: &str) -> JsonValue {
    let dt_lower = data_type.to_lowercase();
    let literal = strip_cast(default_str.trim());
    let quoted = unquote(literal);
    let text = quoted.as_deref().unwrap_or(literal);

    if (dt_lower.contains("int") && !dt_lower.contains("interval")) || dt_lower.contains("serial")
    {
        if let Ok(n) = text.parse::<i64>() {
            return JsonValue::Number(n.into());
        }
    }

    if dt_lower.contains("float") || dt_lower.contains("double") || dt_lower == "real" {
        if let Some(num) = text
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
        {
            return JsonValue::Number(num);
        }
    }

    if dt_lower.contains("bool") {
        match text.to_lowercase().as_str() {
            "true" | "1" | "t" => return JsonValue::Bool(true),
            "false" | "0" | "f" => return JsonValue::Bool(false),
            _ => {}
        }
    }

    if dt_lower == "json" || dt_lower == "jsonb" {
        if let Ok(parsed) = serde_json::from_str(text) {
            return parsed;
        }
    }

    // Decimal/numeric, text, expressions, etc.
    JsonValue::String(text.to_string())
}

/// `'x'::text` -> `'x'`; leaves expressions such as `nextval('s'::regclass)` alone.
fn strip_cast(s: &str) -> &str {
    if s.starts_with('\'') {
        if let Some(pos) = s.rfind("'::") {
            return &s[..=pos];
        }
    }
    s
}

/// Remove SQL single quotes and undo doubled-quote escaping.
fn unquote(s: &str) -> Option<String> {
    let inner = s.strip_prefix('\'')?.strip_suffix('\'')?;
    Some(inner.replace("''", "'"))
}
