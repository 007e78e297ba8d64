//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use async_trait::async_trait;
use secure_db_mcp::config::{DispatcherSettings, PoolSettings, SecurityPolicy};
use secure_db_mcp::db::{
    Connection, ConnectionManager, Connector, DatabaseType, QueryParam, RowSet, SqlxConnector,
};
use secure_db_mcp::error::DbResult;
use secure_db_mcp::mcp::{Dispatcher, Request, Response};
use secure_db_mcp::resources::ResourceManager;
use secure_db_mcp::security::SecurityValidator;
use secure_db_mcp::tools::{ToolContext, ToolRegistry};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A temp SQLite database with a `users` and an `orders` table.
pub struct Fixture {
    pub dir: tempfile::TempDir,
}

impl Fixture {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let fixture = Self { dir };
        fixture
            .run(&[
                "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL UNIQUE, name TEXT)",
                "CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id INTEGER NOT NULL REFERENCES users(id), total REAL DEFAULT 0)",
                "CREATE INDEX idx_orders_user ON orders (user_id)",
                "INSERT INTO users (email, name) VALUES ('ada@example.com', 'Ada'), ('alan@example.com', 'Alan')",
                "INSERT INTO orders (user_id, total) VALUES (1, 9.5), (1, 20.0), (2, 3.25)",
            ])
            .await;
        fixture
    }

    pub fn path(&self) -> std::path::PathBuf {
        self.dir.path().join("fixture.db")
    }

    pub fn url(&self) -> String {
        format!("sqlite:{}", self.path().display())
    }

    /// Run setup statements through `pg_query` on a read-write dispatcher.
    pub async fn run(&self, statements: &[&str]) {
        let pool = sqlite_pool(&self.path(), false, 1);
        let dispatcher = dispatcher_over(pool.clone(), SecurityPolicy::read_write());
        for (id, sql) in statements.iter().enumerate() {
            let response = call_tool(&dispatcher, id as i64, "pg_query", json!({ "query": sql })).await;
            assert!(!response.is_error(), "{}: {:?}", sql, response);
        }
        pool.close(Duration::from_secs(1)).await;
    }

    /// A dispatcher over this database with the given policy.
    pub fn dispatcher(&self, policy: SecurityPolicy) -> Dispatcher {
        let pool = sqlite_pool(&self.path(), policy.is_read_only(), 2);
        dispatcher_over(pool, policy)
    }
}

pub fn sqlite_pool(path: &Path, read_only: bool, max_pool_size: u32) -> ConnectionManager {
    let url = format!("sqlite:{}", path.display());
    let connector = SqlxConnector::new(&url, Duration::from_secs(5), read_only).unwrap();
    let settings = PoolSettings {
        max_pool_size,
        acquire_timeout: Duration::from_millis(500),
        ..PoolSettings::default()
    };
    ConnectionManager::new(Arc::new(connector), settings)
}

pub fn dispatcher_over(pool: ConnectionManager, policy: SecurityPolicy) -> Dispatcher {
    let validator = Arc::new(SecurityValidator::new(policy, pool.database_type()));
    let tools = ToolRegistry::with_database_tools(ToolContext::new(
        pool.clone(),
        Arc::clone(&validator),
        1000,
    ))
    .unwrap();
    Dispatcher::new(
        Arc::new(tools),
        ResourceManager::new(pool, validator),
        DispatcherSettings::default(),
    )
}

pub async fn call_tool(dispatcher: &Dispatcher, id: i64, name: &str, arguments: Value) -> Response {
    dispatcher
        .handle(Request::new(id, "tools/call").with_params(json!({
            "name": name,
            "arguments": arguments,
        })))
        .await
        .expect("requests with an id always get a response")
}

pub async fn read_resource(dispatcher: &Dispatcher, id: i64, uri: &str) -> Response {
    dispatcher
        .handle(Request::new(id, "resources/read").with_params(json!({ "uri": uri })))
        .await
        .expect("requests with an id always get a response")
}

/// Connector whose connections answer every statement with an empty row set.
#[derive(Default)]
pub struct MockConnector {
    pub connects: AtomicUsize,
}

struct MockConnection;

#[async_trait]
impl Connection for MockConnection {
    async fn ping(&mut self) -> DbResult<()> {
        Ok(())
    }

    async fn server_version(&mut self) -> DbResult<String> {
        Ok("mock 1.0".to_string())
    }

    async fn fetch(
        &mut self,
        _sql: &str,
        _params: &[QueryParam],
        _max_rows: usize,
    ) -> DbResult<RowSet> {
        Ok(RowSet::default())
    }

    async fn execute(&mut self, _sql: &str, _params: &[QueryParam]) -> DbResult<u64> {
        Ok(0)
    }

    async fn close(self: Box<Self>) {}
}

#[async_trait]
impl Connector for MockConnector {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Postgres
    }

    async fn connect(&self) -> DbResult<Box<dyn Connection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection))
    }
}
