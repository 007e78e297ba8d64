//! Request dispatch.
//!
//! The dispatcher turns one decoded request into at most one response. It
//! never returns an error and never lets a panic escape: handler failures
//! become error responses, a panic in any method handler becomes a
//! `ToolExecution` error.

use crate::config::DispatcherSettings;
use crate::error::{DbError, DbResult};
use crate::mcp::protocol::{
    CallToolParams, ErrorObject, PROTOCOL_VERSION, ReadResourceParams, Request, RequestId,
    Response,
};
use crate::resources::ResourceManager;
use crate::tools::ToolRegistry;
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const SERVER_INSTRUCTIONS: &str = "Database access server. Use pg_list_tables to discover \
tables, pg_describe_table to inspect a table's structure, and pg_query to run a single SQL \
statement. Statements are checked against the server's security policy before they run; \
denied statements return an error explaining the classification.";

/// Routes protocol methods to the tool registry and resource manager.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tools: Arc<ToolRegistry>,
    resources: ResourceManager,
    settings: DispatcherSettings,
}

impl Dispatcher {
    pub fn new(tools: Arc<ToolRegistry>, resources: ResourceManager, settings: DispatcherSettings) -> Self {
        Self {
            tools,
            resources,
            settings,
        }
    }

    /// Decode one raw message and handle it.
    ///
    /// Malformed JSON is logged and dropped. A JSON value that is not a valid
    /// request gets an `InvalidRequest` response only when it carries an id.
    pub async fn handle_message(&self, raw: &str) -> Option<Response> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, bytes = raw.len(), "Dropping malformed message");
                return None;
            }
        };

        match serde_json::from_value::<Request>(value.clone()) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                let id = value
                    .get("id")
                    .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());
                match id {
                    Some(id) => {
                        warn!(id = %id, error = %e, "Invalid request");
                        Some(Response::error(
                            Some(id),
                            ErrorObject::invalid_request(format!("Invalid request: {}", e)),
                        ))
                    }
                    None => {
                        warn!(error = %e, "Dropping invalid message without id");
                        None
                    }
                }
            }
        }
    }

    /// Handle one request. Notifications never produce a response.
    pub async fn handle(&self, request: Request) -> Option<Response> {
        let Some(id) = request.id.clone() else {
            self.handle_notification(&request);
            return None;
        };

        let start = Instant::now();
        let routed = AssertUnwindSafe(self.route(&request.method, request.params))
            .catch_unwind()
            .await;
        let result = match routed {
            Ok(Some(result)) => result,
            Ok(None) => {
                debug!(id = %id, method = %request.method, "Unknown method");
                return Some(Response::error(
                    Some(id),
                    ErrorObject::method_not_found(&request.method),
                ));
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(id = %id, method = %request.method, panic = %message, "Handler panicked");
                Err(DbError::tool_execution(format!(
                    "{} handler panicked: {}",
                    request.method, message
                )))
            }
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        Some(match result {
            Ok(result) => {
                debug!(id = %id, method = %request.method, elapsed_ms, "Request handled");
                Response::success(Some(id), result)
            }
            Err(e) => {
                warn!(
                    id = %id,
                    method = %request.method,
                    kind = e.kind(),
                    code = e.code(),
                    elapsed_ms,
                    error = %e,
                    "Request failed"
                );
                Response::error(Some(id), e.to_error_object(self.settings.debug_errors))
            }
        })
    }

    /// Run the handler for `method`, or `None` when no handler exists.
    async fn route(&self, method: &str, params: Option<Value>) -> Option<DbResult<Value>> {
        let result = match method {
            "initialize" => Ok(self.initialize()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.list_tools()),
            "tools/call" => self.call_tool(params).await,
            "resources/list" => Ok(self.list_resources().await),
            "resources/templates/list" => Ok(resource_templates()),
            "resources/read" => self.read_resource(params).await,
            _ => return None,
        };
        Some(result)
    }

    fn handle_notification(&self, request: &Request) {
        match request.method.as_str() {
            "initialized" | "notifications/initialized" => info!("Client initialized"),
            "notifications/cancelled" => debug!(params = ?request.params, "Client cancelled a request"),
            method => debug!(method, "Ignoring notification"),
        }
    }

    fn initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {},
                "resources": {},
            },
            "serverInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
            "instructions": SERVER_INSTRUCTIONS,
        })
    }

    fn list_tools(&self) -> Value {
        json!({ "tools": self.tools.list() })
    }

    async fn call_tool(&self, params: Option<Value>) -> DbResult<Value> {
        let params: CallToolParams = parse_params(params)?;
        let arguments = params.arguments.unwrap_or_else(|| json!({}));

        let handler = self
            .tools
            .get(&params.name)
            .ok_or_else(|| DbError::unknown_tool(&params.name))?;
        self.tools.validate(&params.name, &arguments)?;

        let limit = self.settings.tool_timeout;
        let output = match tokio::time::timeout(limit, handler.call(arguments)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(DbError::statement_timeout(
                    format!("tool '{}'", params.name),
                    limit.as_millis() as u64,
                ));
            }
        };

        let pretty = serde_json::to_string_pretty(&output.data)
            .map_err(|e| DbError::internal(format!("Failed to serialize tool output: {}", e)))?;
        Ok(json!({
            "content": [
                { "type": "text", "text": output.summary },
                { "type": "text", "text": pretty },
            ],
            "structuredContent": output.data,
            "isError": false,
        }))
    }

    /// Listing failures degrade to an empty list.
    async fn list_resources(&self) -> Value {
        match self.resources.list().await {
            Ok(resources) => json!({ "resources": resources }),
            Err(e) => {
                warn!(error = %e, "Failed to list resources");
                json!({ "resources": [] })
            }
        }
    }

    async fn read_resource(&self, params: Option<Value>) -> DbResult<Value> {
        let params: ReadResourceParams = parse_params(params)?;
        let content = self.resources.read(&params.uri).await?;
        Ok(json!({ "contents": [content] }))
    }
}

fn resource_templates() -> Value {
    json!({
        "resourceTemplates": [
            {
                "uriTemplate": "schema://{schema}",
                "name": "Schema",
                "description": "Tables and views in one schema",
                "mimeType": crate::resources::JSON_MIME_TYPE,
            },
            {
                "uriTemplate": "table://{schema}/{table}",
                "name": "Table",
                "description": "Columns, constraints, indexes and sample rows of one table",
                "mimeType": crate::resources::JSON_MIME_TYPE,
            },
        ]
    })
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> DbResult<T> {
    serde_json::from_value(params.unwrap_or_else(|| json!({})))
        .map_err(|e| DbError::invalid_arguments(format!("Invalid params: {}", e)))
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
