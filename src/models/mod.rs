//! Data models for the secure database MCP server.
//!
//! This module re-exports the catalog types shared by tools and resources.

pub mod schema;

pub use schema::{
    ColumnDefinition, ConstraintInfo, ConstraintType, DatabaseStats, ForeignKeyAction, IndexInfo,
    TableDescription, TableInfo, TableType,
};
