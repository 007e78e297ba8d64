//! End-to-end scenarios through the dispatcher against a temp SQLite database.

mod common;

use common::{Fixture, MockConnector, call_tool, read_resource};
use secure_db_mcp::config::{PoolSettings, SecurityPolicy};
use secure_db_mcp::db::ConnectionManager;
use secure_db_mcp::error::DbError;
use secure_db_mcp::mcp::protocol::codes;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_select_one_under_read_only() {
    let fixture = Fixture::new().await;
    let dispatcher = fixture.dispatcher(SecurityPolicy::read_only());

    let response = call_tool(&dispatcher, 1, "pg_query", json!({"query": "SELECT 1"})).await;
    let result = response.result().expect("success");
    assert_eq!(result["structuredContent"]["row_count"], 1);
    assert_eq!(result["structuredContent"]["rows"].as_array().unwrap().len(), 1);
    assert_eq!(result["isError"], false);
}

#[tokio::test]
async fn test_select_one_with_sql_argument() {
    let fixture = Fixture::new().await;
    let dispatcher = fixture.dispatcher(SecurityPolicy::read_only());

    let response = call_tool(&dispatcher, 1, "pg_query", json!({"sql": "SELECT 1"})).await;
    let result = response.result().expect("success");
    assert_eq!(result["structuredContent"]["row_count"], 1);

    let response = call_tool(&dispatcher, 2, "pg_query", json!({"sql": "DROP TABLE users"})).await;
    assert_eq!(response.error_object().unwrap().code, codes::POLICY_DENIED);
}

#[tokio::test]
async fn test_drop_table_is_denied_as_ddl() {
    let fixture = Fixture::new().await;
    let dispatcher = fixture.dispatcher(SecurityPolicy::read_only());

    let response =
        call_tool(&dispatcher, 2, "pg_query", json!({"query": "DROP TABLE users"})).await;
    let error = response.error_object().expect("error");
    assert_eq!(error.code, codes::POLICY_DENIED);
    assert!(error.message.to_lowercase().contains("ddl"), "{}", error.message);

    // The table is still there.
    let response = call_tool(
        &dispatcher,
        3,
        "pg_query",
        json!({"query": "SELECT count(*) AS n FROM users"}),
    )
    .await;
    assert_eq!(response.result().unwrap()["structuredContent"]["rows"][0]["n"], 2);
}

#[tokio::test]
async fn test_stacked_statements_denied_under_every_policy() {
    let fixture = Fixture::new().await;
    let permissive = SecurityPolicy {
        allow_system_catalogs: true,
        ..SecurityPolicy::read_write()
    };

    for policy in [SecurityPolicy::read_only(), SecurityPolicy::read_write(), permissive] {
        let dispatcher = fixture.dispatcher(policy);
        let response = call_tool(
            &dispatcher,
            4,
            "pg_query",
            json!({"query": "SELECT 1; DELETE FROM users WHERE id = 1"}),
        )
        .await;
        let error = response.error_object().expect("error");
        assert_eq!(error.code, codes::POLICY_DENIED);
        assert_eq!(error.data.as_ref().unwrap()["classification"], "dangerous");
    }

    let dispatcher = fixture.dispatcher(SecurityPolicy::read_only());
    let response = call_tool(
        &dispatcher,
        5,
        "pg_query",
        json!({"query": "SELECT count(*) AS n FROM users"}),
    )
    .await;
    assert_eq!(response.result().unwrap()["structuredContent"]["rows"][0]["n"], 2);
}

#[tokio::test]
async fn test_pool_bound_with_never_releasing_holder() {
    let settings = PoolSettings {
        max_pool_size: 2,
        acquire_timeout: Duration::from_millis(100),
        ..PoolSettings::default()
    };
    let pool = ConnectionManager::new(Arc::new(MockConnector::default()), settings);

    let mut held = Vec::new();
    for _ in 0..2 {
        held.push(pool.acquire(Duration::from_millis(100)).await.unwrap());
    }
    assert_eq!(pool.stats().in_use, 2);

    let started = Instant::now();
    let err = pool.acquire(Duration::from_millis(100)).await.unwrap_err();
    let waited = started.elapsed();
    assert!(matches!(err, DbError::PoolExhausted { .. }), "{:?}", err);
    assert!(err.is_retryable());
    assert!(waited >= Duration::from_millis(90), "{:?}", waited);
    assert!(waited < Duration::from_secs(2), "{:?}", waited);

    drop(held);
    assert!(pool.acquire(Duration::from_millis(100)).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_bound_under_concurrent_acquires() {
    const SLOTS: u32 = 3;
    const CALLERS: usize = 24;

    let settings = PoolSettings {
        max_pool_size: SLOTS,
        ..PoolSettings::default()
    };
    let pool = ConnectionManager::new(Arc::new(MockConnector::default()), settings);
    let holding = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut callers = tokio::task::JoinSet::new();
    for _ in 0..CALLERS {
        let pool = pool.clone();
        let holding = Arc::clone(&holding);
        let peak = Arc::clone(&peak);
        callers.spawn(async move {
            let lease = pool.acquire(Duration::from_secs(10)).await.unwrap();
            let now = holding.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            assert!(pool.stats().in_use <= SLOTS as usize);
            tokio::time::sleep(Duration::from_millis(10)).await;
            holding.fetch_sub(1, Ordering::SeqCst);
            drop(lease);
        });
    }

    let mut completed = 0;
    while let Some(joined) = callers.join_next().await {
        joined.unwrap();
        completed += 1;
    }
    assert_eq!(completed, CALLERS);
    assert!(peak.load(Ordering::SeqCst) <= SLOTS as usize);
    assert!(peak.load(Ordering::SeqCst) >= 1);
    assert_eq!(pool.stats().in_use, 0);
    assert_eq!(pool.stats().available, SLOTS as usize);
}

#[tokio::test]
async fn test_dropped_table_resource_is_not_found() {
    let fixture = Fixture::new().await;
    fixture.run(&["CREATE TABLE scratch (id INTEGER)"]).await;
    let dispatcher = fixture.dispatcher(SecurityPolicy::read_only());

    let response = read_resource(&dispatcher, 6, "table://main/scratch").await;
    assert!(response.result().is_some(), "{:?}", response);

    fixture.run(&["DROP TABLE scratch"]).await;

    let response = read_resource(&dispatcher, 7, "table://main/scratch").await;
    let error = response.error_object().expect("error");
    assert_eq!(error.code, codes::RESOURCE_NOT_FOUND);
    assert_eq!(error.data.as_ref().unwrap()["kind"], "ResourceNotFound");
}

#[tokio::test]
async fn test_table_resource_contents() {
    let fixture = Fixture::new().await;
    let dispatcher = fixture.dispatcher(SecurityPolicy::read_only());

    let response = read_resource(&dispatcher, 8, "table://main/orders").await;
    let content = &response.result().unwrap()["contents"][0];
    let body: Value = serde_json::from_str(content["text"].as_str().unwrap()).unwrap();

    assert_eq!(body["name"], "orders");
    assert_eq!(body["columns"].as_array().unwrap().len(), 3);
    assert_eq!(body["sample_rows"].as_array().unwrap().len(), 3);
    let fk = body["constraints"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["constraint_type"] == "foreign_key")
        .expect("foreign key");
    assert_eq!(fk["references_table"], "users");
    assert!(
        body["indexes"]
            .as_array()
            .unwrap()
            .iter()
            .any(|i| i["name"] == "idx_orders_user")
    );
}

#[tokio::test]
async fn test_resource_listing_respects_blocked_tables() {
    let fixture = Fixture::new().await;
    let policy = SecurityPolicy {
        blocked_tables: ["orders".to_string()].into_iter().collect(),
        ..SecurityPolicy::read_only()
    };
    let dispatcher = fixture.dispatcher(policy);

    let response = dispatcher
        .handle(secure_db_mcp::mcp::Request::new(9, "resources/list"))
        .await
        .unwrap();
    let uris: Vec<String> = response.result().unwrap()["resources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["uri"].as_str().unwrap().to_string())
        .collect();
    assert!(uris.contains(&"table://main/users".to_string()));
    assert!(!uris.contains(&"table://main/orders".to_string()));

    let response = read_resource(&dispatcher, 10, "table://main/orders").await;
    assert_eq!(response.error_object().unwrap().code, codes::POLICY_DENIED);
}

#[tokio::test]
async fn test_writes_need_allow_write() {
    let fixture = Fixture::new().await;
    let insert = json!({"query": "INSERT INTO users (email) VALUES ('x@example.com')"});

    let read_only = fixture.dispatcher(SecurityPolicy::read_only());
    let response = call_tool(&read_only, 11, "pg_query", insert.clone()).await;
    assert_eq!(response.error_object().unwrap().code, codes::POLICY_DENIED);

    let read_write = fixture.dispatcher(SecurityPolicy::read_write());
    let response = call_tool(&read_write, 12, "pg_query", insert).await;
    assert_eq!(
        response.result().unwrap()["structuredContent"]["rows_affected"],
        1
    );
}
