//! Secure DB MCP Server - Main entry point.
//!
//! Startup fails closed: an invalid configuration or an unreachable database
//! exits with status 1 before any request is read.

use secure_db_mcp::config::{Config, TransportMode};
use secure_db_mcp::db::{ConnectionManager, SqlxConnector};
use secure_db_mcp::mcp::Dispatcher;
use secure_db_mcp::resources::ResourceManager;
use secure_db_mcp::security::SecurityValidator;
use secure_db_mcp::tools::{ToolContext, ToolRegistry};
use secure_db_mcp::transport::{HttpTransport, StdioTransport, Transport};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs always go to stderr; stdout carries protocol messages only.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .init();
    }
}

#[tokio::main]
async fn main() {
    let config = Config::parse_args();
    init_tracing(&config);

    if let Err(message) = config.validate() {
        error!(error = %message, "Invalid configuration");
        eprintln!("Error: {}", message);
        std::process::exit(1);
    }

    let code = match run(config).await {
        Ok(()) => {
            info!("Server shutdown complete");
            0
        }
        Err(e) => {
            error!(error = %e, "Server error");
            1
        }
    };

    // A blocking stdin read would otherwise keep the runtime alive.
    std::process::exit(code);
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let policy = config.security_policy();
    let database_type = config.database_type()?;

    info!(
        transport = %config.transport,
        database = %config.redacted_database_url(),
        database_type = %database_type,
        read_only = policy.is_read_only(),
        "Starting Secure DB MCP Server v{}",
        env!("CARGO_PKG_VERSION")
    );
    if policy.allow_write || policy.allow_ddl {
        warn!(
            allow_write = policy.allow_write,
            allow_ddl = policy.allow_ddl,
            "Write operations are enabled"
        );
    }

    let pool_settings = config.pool_settings();
    let connector = SqlxConnector::new(
        &config.database_url,
        pool_settings.statement_timeout,
        policy.is_read_only(),
    )?;
    let pool = ConnectionManager::new(Arc::new(connector), pool_settings);

    if let Err(e) = pool.test_connection().await {
        error!(error = %e, "Database is unreachable, refusing to start");
        return Err(e.into());
    }
    pool.start_idle_reaper();

    let validator = Arc::new(SecurityValidator::new(policy, database_type));
    let tools = ToolRegistry::with_database_tools(ToolContext::new(
        pool.clone(),
        Arc::clone(&validator),
        config.max_query_rows as usize,
    ))?;
    info!(tools = tools.len(), "Tool registry ready");

    let dispatcher = Dispatcher::new(
        Arc::new(tools),
        ResourceManager::new(pool.clone(), validator),
        config.dispatcher_settings(),
    );

    let grace = config.shutdown_grace();
    let result = match config.transport {
        TransportMode::Stdio => {
            let transport = StdioTransport::new(dispatcher, grace);
            transport.run().await
        }
        TransportMode::Http => {
            info!(
                host = %config.http_host,
                port = config.http_port,
                endpoint = %config.mcp_endpoint,
                "Using HTTP transport"
            );
            let transport = HttpTransport::new(
                dispatcher,
                &config.http_host,
                config.http_port,
                &config.mcp_endpoint,
                grace,
            );
            transport.run().await
        }
    };

    info!("Closing database connections");
    pool.close(grace).await;

    result.map_err(Into::into)
}
