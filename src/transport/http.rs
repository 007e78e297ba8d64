//! HTTP transport for the MCP server.
//!
//! Each POST to the endpoint carries one JSON-RPC message. Requests are
//! answered with `200` and the response body; notifications with
//! `202 Accepted` and no body.

use crate::error::{DbError, DbResult};
use crate::mcp::protocol::{ErrorObject, codes};
use crate::mcp::{Dispatcher, Response};
use crate::transport::{Transport, wait_for_signal};
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// HTTP transport implementation.
pub struct HttpTransport {
    dispatcher: Dispatcher,
    /// Host to bind to
    host: String,
    /// Port to bind to
    port: u16,
    /// MCP endpoint path
    endpoint: String,
    /// How long open connections may finish after shutdown starts
    grace: Duration,
}

impl HttpTransport {
    pub fn new(
        dispatcher: Dispatcher,
        host: impl Into<String>,
        port: u16,
        endpoint: impl Into<String>,
        grace: Duration,
    ) -> Self {
        Self {
            dispatcher,
            host: host.into(),
            port,
            endpoint: endpoint.into(),
            grace,
        }
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the MCP endpoint path.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Router with the single POST endpoint.
    pub fn router(&self) -> axum::Router {
        axum::Router::new()
            .route(&self.endpoint, post(handle_post))
            .with_state(self.dispatcher.clone())
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve<S>(&self, listener: TcpListener, shutdown: S) -> DbResult<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let notify = shutdown_notify.clone();
        let shutdown_signal = async move {
            shutdown.await;
            notify.notify_one();
        };

        let server = axum::serve(listener, self.router()).with_graceful_shutdown(shutdown_signal);

        // Keep-alive connections can hold the server open; give up after the grace period.
        tokio::select! {
            result = server => {
                match result {
                    Ok(()) => info!("HTTP server stopped"),
                    Err(e) => {
                        error!(error = %e, "HTTP server error");
                        return Err(DbError::internal(format!("HTTP server error: {}", e)));
                    }
                }
            }
            _ = async {
                shutdown_notify.notified().await;
                info!(
                    grace_secs = self.grace.as_secs(),
                    "Waiting for connections to close"
                );
                tokio::time::sleep(self.grace).await;
            } => {
                warn!("Grace period elapsed, dropping open connections");
            }
        }
        Ok(())
    }
}

async fn handle_post(State(dispatcher): State<Dispatcher>, body: String) -> axum::response::Response {
    if let Err(e) = serde_json::from_str::<serde_json::Value>(&body) {
        warn!(error = %e, "Rejecting malformed HTTP message");
        let error = ErrorObject::new(codes::PARSE_ERROR, format!("Parse error: {}", e));
        return (StatusCode::BAD_REQUEST, Json(Response::error(None, error))).into_response();
    }

    match dispatcher.handle_message(&body).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

impl Transport for HttpTransport {
    async fn run(&self) -> DbResult<()> {
        let bind_addr = self.bind_addr();
        info!("Starting MCP server with HTTP transport on {}", bind_addr);

        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            DbError::connection(
                format!("Failed to bind to {}: {}", bind_addr, e),
                "Check that the port is available",
            )
        })?;

        info!(endpoint = %self.endpoint, "MCP endpoint ready");
        self.serve(listener, wait_for_signal()).await
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DispatcherSettings, PoolSettings, SecurityPolicy};
    use crate::db::{ConnectionManager, DatabaseType, SqlxConnector};
    use crate::resources::ResourceManager;
    use crate::security::SecurityValidator;
    use crate::tools::{ToolContext, ToolRegistry};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn transport(endpoint: &str) -> HttpTransport {
        let connector =
            SqlxConnector::new("sqlite::memory:", Duration::from_secs(5), false).unwrap();
        let settings = PoolSettings {
            max_pool_size: 1,
            ..PoolSettings::default()
        };
        let pool = ConnectionManager::new(Arc::new(connector), settings);
        let validator = Arc::new(SecurityValidator::new(
            SecurityPolicy::read_only(),
            DatabaseType::SQLite,
        ));
        let tools =
            ToolRegistry::with_database_tools(ToolContext::new(pool.clone(), validator.clone(), 100))
                .unwrap();
        let dispatcher = Dispatcher::new(
            Arc::new(tools),
            ResourceManager::new(pool, validator),
            DispatcherSettings::default(),
        );
        HttpTransport::new(dispatcher, "127.0.0.1", 0, endpoint, Duration::from_secs(1))
    }

    /// Send one raw HTTP/1.1 POST and return the full response text.
    async fn post(addr: std::net::SocketAddr, path: &str, body: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "POST {} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n{}",
            path,
            body.len(),
            body
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn test_http_transport_bind_addr() {
        let transport = transport("/mcp");
        assert_eq!(transport.name(), "http");
        assert_eq!(transport.bind_addr(), "127.0.0.1:0");
        assert_eq!(transport.endpoint(), "/mcp");
    }

    #[tokio::test]
    async fn test_post_round_trip() {
        let transport = Arc::new(transport("/mcp"));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = {
            let transport = transport.clone();
            tokio::spawn(async move {
                transport
                    .serve(listener, async {
                        let _ = stop_rx.await;
                    })
                    .await
            })
        };

        let response = post(addr, "/mcp", r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).await;
        assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
        assert!(response.contains(r#""result":{}"#));

        let response = post(addr, "/mcp", r#"{"jsonrpc":"2.0","method":"initialized"}"#).await;
        assert!(response.starts_with("HTTP/1.1 202"), "{}", response);

        let response = post(addr, "/mcp", "{oops").await;
        assert!(response.starts_with("HTTP/1.1 400"), "{}", response);
        assert!(response.contains("-32700"));

        let response = post(addr, "/other", "{}").await;
        assert!(response.starts_with("HTTP/1.1 404"), "{}", response);

        stop_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
