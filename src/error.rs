//! Error types for the secure DB MCP server.
//!
//! Every failure that can reach a client is a [`DbError`] variant. Each variant
//! maps to a stable protocol code (see [`codes`]) so clients can branch on the
//! code instead of parsing messages. Only a failed startup is allowed to end the
//! process; everything else is converted into an error response at the
//! dispatcher boundary.

use crate::mcp::protocol::{ErrorObject, codes};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Connection unavailable after {attempts} attempt(s): {message}")]
    ConnectionUnavailable { attempts: u32, message: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Statement denied ({kind}): {reason}")]
    PolicyDenied { kind: String, reason: String },

    #[error("Connection pool exhausted: no connection became available within {waited_ms}ms")]
    PoolExhausted { waited_ms: u64 },

    #[error("Statement timeout: {operation} exceeded {limit_ms}ms")]
    StatementTimeout { operation: String, limit_ms: u64 },

    #[error("Invalid arguments: {message}")]
    InvalidArguments { message: String },

    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Resource not found: {uri}")]
    ResourceNotFound { uri: String },

    #[error("Invalid resource URI '{uri}': {reason}")]
    InvalidResource { uri: String, reason: String },

    #[error("Tool execution failed: {message}")]
    ToolExecution { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an error for a connect loop that ran out of attempts.
    pub fn connection_unavailable(attempts: u32, message: impl Into<String>) -> Self {
        Self::ConnectionUnavailable {
            attempts,
            message: message.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a policy denial. `kind` names the statement classification.
    pub fn policy_denied(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PolicyDenied {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    pub fn pool_exhausted(waited_ms: u64) -> Self {
        Self::PoolExhausted { waited_ms }
    }

    pub fn statement_timeout(operation: impl Into<String>, limit_ms: u64) -> Self {
        Self::StatementTimeout {
            operation: operation.into(),
            limit_ms,
        }
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }

    pub fn unknown_tool(name: impl Into<String>) -> Self {
        Self::UnknownTool { name: name.into() }
    }

    pub fn resource_not_found(uri: impl Into<String>) -> Self {
        Self::ResourceNotFound { uri: uri.into() }
    }

    pub fn invalid_resource(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResource {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    pub fn tool_execution(message: impl Into<String>) -> Self {
        Self::ToolExecution {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable name of the error kind, exposed to clients in `error.data.kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } | Self::ConnectionUnavailable { .. } => "ConnectionUnavailable",
            Self::Database { .. } | Self::ToolExecution { .. } => "ToolExecutionError",
            Self::PolicyDenied { .. } => "PolicyDenied",
            Self::PoolExhausted { .. } => "PoolExhausted",
            Self::StatementTimeout { .. } => "StatementTimeout",
            Self::InvalidArguments { .. } => "InvalidArguments",
            Self::UnknownTool { .. } => "UnknownTool",
            Self::ResourceNotFound { .. } => "ResourceNotFound",
            Self::InvalidResource { .. } => "InvalidResource",
            Self::Internal { .. } => "InternalError",
        }
    }

    /// Stable protocol error code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Self::Connection { .. } | Self::ConnectionUnavailable { .. } => {
                codes::CONNECTION_UNAVAILABLE
            }
            Self::Database { .. } | Self::ToolExecution { .. } => codes::TOOL_EXECUTION_ERROR,
            Self::PolicyDenied { .. } => codes::POLICY_DENIED,
            Self::PoolExhausted { .. } => codes::POOL_EXHAUSTED,
            Self::StatementTimeout { .. } => codes::STATEMENT_TIMEOUT,
            Self::InvalidArguments { .. } => codes::INVALID_PARAMS,
            Self::UnknownTool { .. } => codes::UNKNOWN_TOOL,
            Self::ResourceNotFound { .. } => codes::RESOURCE_NOT_FOUND,
            Self::InvalidResource { .. } => codes::INVALID_RESOURCE,
            Self::Internal { .. } => codes::INTERNAL_ERROR,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::PoolExhausted { .. } => {
                Some("All pooled connections are busy. Back off and retry the call.")
            }
            Self::StatementTimeout { .. } => {
                Some("Narrow the query or add a LIMIT; the connection was recycled.")
            }
            Self::ConnectionUnavailable { .. } => {
                Some("The database could not be reached. Retry later.")
            }
            Self::UnknownTool { .. } => Some("Call tools/list to see the available tools."),
            Self::ResourceNotFound { .. } => {
                Some("Call resources/list to see the resources that currently exist.")
            }
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionUnavailable { .. }
                | Self::PoolExhausted { .. }
                | Self::StatementTimeout { .. }
        )
    }

    /// Convert into the protocol error object.
    ///
    /// `include_detail` adds the debug representation of the error; it is only
    /// enabled when the server runs with `--debug-errors`.
    pub fn to_error_object(&self, include_detail: bool) -> ErrorObject {
        let mut data = json!({
            "kind": self.kind(),
            "retryable": self.is_retryable(),
        });

        if let Some(suggestion) = self.suggestion() {
            data["suggestion"] = json!(suggestion);
        }
        match self {
            Self::PolicyDenied { kind, reason } => {
                data["classification"] = json!(kind);
                data["reason"] = json!(reason);
            }
            Self::Database {
                sql_state: Some(code),
                ..
            } => {
                data["sql_state"] = json!(code);
            }
            Self::ToolExecution { message } => {
                data["message"] = json!(message);
            }
            _ => {}
        }
        if include_detail {
            data["detail"] = json!(format!("{:?}", self));
        }

        ErrorObject::new(self.code(), self.to_string()).with_data(data)
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
