//! Secure DB MCP Server Library
//!
//! This library provides a guarded MCP (Model Context Protocol) server that
//! lets AI assistants query SQL databases (PostgreSQL, SQLite). Every
//! statement is classified and authorized before it reaches a pooled
//! connection.

pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod resources;
pub mod security;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::{DbError, DbResult};
pub use mcp::Dispatcher;
