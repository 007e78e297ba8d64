//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Connection seam (`Connector` / `Connection`) with the sqlx implementation
//! - Bounded connection pool with leases
//! - Catalog queries for schema introspection
//! - Row decoding and parameter binding

pub mod connection;
pub mod params;
pub mod pool;
pub mod schema;
pub mod types;

pub use connection::{Connection, Connector, SqlxConnector};
pub use params::QueryParam;
pub use pool::{ConnectionManager, Lease, PoolStats};
pub use schema::{CatalogQuery, SchemaInspector};
pub use types::{ColumnInfo, RowSet};

/// Database backend selected from the connection URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum DatabaseType {
    #[serde(rename = "postgresql")]
    Postgres,
    #[serde(rename = "sqlite")]
    SQLite,
}

impl DatabaseType {
    /// Parse database type from a connection string.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.trim().to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::Postgres)
        } else if lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Postgres => "PostgreSQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Schema used when a caller does not name one.
    pub fn default_schema(&self) -> &'static str {
        match self {
            Self::Postgres => "public",
            Self::SQLite => "main",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
