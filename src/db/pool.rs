//! Connection pool management.
//!
//! A [`tokio::sync::Semaphore`] with `max_pool_size` permits bounds the number
//! of live leases; it is the only concurrency limiter in the server. Idle
//! connections are kept in a LIFO stack, probed before reuse and reaped once
//! they exceed the idle timeout.
//!
//! # Lease lifecycle
//!
//! A [`Lease`] holds one permit and one connection. Dropping it returns the
//! connection to the idle stack, except when:
//! - a statement was in flight (the caller was cancelled mid-statement)
//! - a statement hit the statement timeout or a connection-level error
//! - the pool is closed
//!
//! In those cases the connection is closed instead of reused. Those closes run
//! in the background; [`ConnectionManager::close`] waits for them.

use crate::config::PoolSettings;
use crate::db::connection::{Connection, Connector};
use crate::db::schema::CatalogQuery;
use crate::db::types::RowSet;
use crate::db::{DatabaseType, QueryParam};
use crate::error::{DbError, DbResult};
use crate::security::ValidatedStatement;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// Upper bound for the exponential connect backoff.
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(5);

struct IdleConnection {
    conn: Box<dyn Connection>,
    idle_since: Instant,
}

struct PoolInner {
    connector: Arc<dyn Connector>,
    settings: PoolSettings,
    semaphore: Arc<Semaphore>,
    idle: Mutex<VecDeque<IdleConnection>>,
    closed: AtomicBool,
    in_use: AtomicUsize,
    opened_total: AtomicU64,
    recycled_total: AtomicU64,
    reaper_handle: Mutex<Option<JoinHandle<()>>>,
    /// Background closes of recycled connections.
    closing: Mutex<JoinSet<()>>,
}

impl PoolInner {
    fn idle(&self) -> MutexGuard<'_, VecDeque<IdleConnection>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn closing(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.closing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Close `conn` on `handle` without blocking the caller.
    fn close_in_background(&self, conn: Box<dyn Connection>, handle: &Handle) {
        let mut closing = self.closing();
        while closing.try_join_next().is_some() {}
        closing.spawn_on(conn.close(), handle);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Pop idle connections older than the idle timeout.
    fn take_expired(&self) -> Vec<Box<dyn Connection>> {
        let idle_timeout = self.settings.idle_timeout;
        let mut idle = self.idle();
        let mut expired = Vec::new();
        let mut kept = VecDeque::with_capacity(idle.len());
        while let Some(entry) = idle.pop_front() {
            if entry.idle_since.elapsed() >= idle_timeout {
                expired.push(entry.conn);
            } else {
                kept.push_back(entry);
            }
        }
        *idle = kept;
        expired
    }
}

/// Snapshot of pool counters, exposed through `stats://database`.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub max_size: u32,
    pub in_use: usize,
    pub idle: usize,
    pub available: usize,
    pub opened_total: u64,
    pub recycled_total: u64,
    pub closed: bool,
}

/// Bounded pool of database connections.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("database_type", &self.inner.connector.database_type())
            .field("stats", &self.stats())
            .finish()
    }
}

impl ConnectionManager {
    /// Create a pool. Connections are opened lazily on first acquire.
    pub fn new(connector: Arc<dyn Connector>, settings: PoolSettings) -> Self {
        let permits = settings.max_pool_size.max(1) as usize;
        Self {
            inner: Arc::new(PoolInner {
                connector,
                semaphore: Arc::new(Semaphore::new(permits)),
                idle: Mutex::new(VecDeque::with_capacity(permits)),
                closed: AtomicBool::new(false),
                in_use: AtomicUsize::new(0),
                opened_total: AtomicU64::new(0),
                recycled_total: AtomicU64::new(0),
                reaper_handle: Mutex::new(None),
                closing: Mutex::new(JoinSet::new()),
                settings,
            }),
        }
    }

    pub fn database_type(&self) -> DatabaseType {
        self.inner.connector.database_type()
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.inner.settings
    }

    /// Lease a connection, waiting at most `timeout` for a free slot.
    ///
    /// Returns `PoolExhausted` when no slot frees up in time and
    /// `ConnectionUnavailable` when the database cannot be reached.
    pub async fn acquire(&self, timeout: Duration) -> DbResult<Lease> {
        if self.inner.is_closed() {
            return Err(DbError::connection_unavailable(0, "connection pool is closed"));
        }

        let started = Instant::now();
        let semaphore = Arc::clone(&self.inner.semaphore);
        let permit = match tokio::time::timeout(timeout, semaphore.acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(DbError::connection_unavailable(0, "connection pool is closed"));
            }
            Err(_) => {
                let waited_ms = started.elapsed().as_millis() as u64;
                warn!(
                    waited_ms = waited_ms,
                    max_pool_size = self.inner.settings.max_pool_size,
                    "Connection pool exhausted"
                );
                return Err(DbError::pool_exhausted(waited_ms));
            }
        };

        if self.inner.is_closed() {
            return Err(DbError::connection_unavailable(0, "connection pool is closed"));
        }

        let conn = self.checkout().await?;
        self.inner.in_use.fetch_add(1, Ordering::AcqRel);
        debug!(
            waited_ms = started.elapsed().as_millis() as u64,
            in_use = self.inner.in_use.load(Ordering::Acquire),
            "Connection leased"
        );

        Ok(Lease {
            conn: Some(conn),
            permit: Some(permit),
            pool: Arc::clone(&self.inner),
            in_statement: false,
            broken: false,
        })
    }

    /// Reuse the most recently returned idle connection that passes a probe,
    /// otherwise open a new one.
    async fn checkout(&self) -> DbResult<Box<dyn Connection>> {
        loop {
            let candidate = self.inner.idle().pop_back();
            let Some(entry) = candidate else {
                break;
            };

            if entry.idle_since.elapsed() >= self.inner.settings.idle_timeout {
                debug!("Closing idle connection past idle timeout");
                self.inner.recycled_total.fetch_add(1, Ordering::Relaxed);
                entry.conn.close().await;
                continue;
            }

            let mut conn = entry.conn;
            match conn.ping().await {
                Ok(()) => return Ok(conn),
                Err(e) => {
                    warn!(error = %e, "Discarding connection that failed liveness probe");
                    self.inner.recycled_total.fetch_add(1, Ordering::Relaxed);
                    conn.close().await;
                }
            }
        }

        self.connect_with_retry().await
    }

    /// Open a connection with capped exponential backoff between attempts.
    async fn connect_with_retry(&self) -> DbResult<Box<dyn Connection>> {
        let attempts = self.inner.settings.connect_retries.max(1);
        let mut backoff = self.inner.settings.retry_backoff;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.inner.connector.connect().await {
                Ok(conn) => {
                    self.inner.opened_total.fetch_add(1, Ordering::Relaxed);
                    return Ok(conn);
                }
                Err(e) => {
                    warn!(
                        attempt = attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Database connection attempt failed"
                    );
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_RETRY_BACKOFF);
                    }
                }
            }
        }

        Err(DbError::connection_unavailable(attempts, last_error))
    }

    /// Open (or reuse) a connection, probe it and report the server version.
    pub async fn test_connection(&self) -> DbResult<String> {
        let mut lease = self.acquire(self.inner.settings.acquire_timeout).await?;
        let version = lease.server_version().await?;
        lease.release();
        info!(server_version = %version, "Database connection verified");
        Ok(version)
    }

    /// Close idle connections older than the idle timeout. Returns how many were closed.
    pub async fn reap_idle(&self) -> usize {
        let expired = self.inner.take_expired();
        let count = expired.len();
        for conn in expired {
            conn.close().await;
        }
        if count > 0 {
            self.inner
                .recycled_total
                .fetch_add(count as u64, Ordering::Relaxed);
            debug!(closed = count, "Reaped idle connections");
        }
        count
    }

    /// Spawn the background idle reaper.
    ///
    /// The task holds a weak reference and exits once the pool is dropped or closed.
    pub fn start_idle_reaper(&self) {
        let weak = Arc::downgrade(&self.inner);
        let interval = self.inner.settings.reaper_interval;
        let handle = tokio::spawn(Self::reaper_task(weak, interval));

        let mut slot = self
            .inner
            .reaper_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    async fn reaper_task(weak: Weak<PoolInner>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let Some(inner) = weak.upgrade() else {
                debug!("Connection pool dropped, idle reaper exiting");
                return;
            };
            if inner.is_closed() {
                return;
            }

            ConnectionManager { inner }.reap_idle().await;
        }
    }

    /// Refuse new acquires, wait up to `grace` for outstanding leases, then close
    /// every idle connection and wait for recycled connections still closing.
    /// Leases returned after this point are closed on drop.
    pub async fn close(&self, grace: Duration) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(handle) = self
            .inner
            .reaper_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }

        let in_use = self.inner.in_use.load(Ordering::Acquire);
        if in_use > 0 {
            info!(in_use = in_use, grace_ms = grace.as_millis() as u64, "Waiting for leases");
            let all = self.inner.settings.max_pool_size.max(1);
            let semaphore = Arc::clone(&self.inner.semaphore);
            match tokio::time::timeout(grace, semaphore.acquire_many_owned(all)).await {
                Ok(Ok(permits)) => drop(permits),
                _ => warn!(
                    in_use = self.inner.in_use.load(Ordering::Acquire),
                    "Grace period expired, force-closing remaining connections"
                ),
            }
        }
        self.inner.semaphore.close();

        let idle: Vec<IdleConnection> = self.inner.idle().drain(..).collect();
        let count = idle.len();
        for entry in idle {
            entry.conn.close().await;
        }

        let mut closing = std::mem::take(&mut *self.inner.closing());
        let pending = closing.len();
        if pending > 0 {
            let drained = tokio::time::timeout(grace, async {
                while closing.join_next().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                warn!(pending = closing.len(), "Recycled connections did not close in time");
                closing.abort_all();
            }
        }
        info!(closed = count + pending, "Connection pool closed");
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            max_size: self.inner.settings.max_pool_size,
            in_use: self.inner.in_use.load(Ordering::Acquire),
            idle: self.inner.idle().len(),
            available: self.inner.semaphore.available_permits(),
            opened_total: self.inner.opened_total.load(Ordering::Relaxed),
            recycled_total: self.inner.recycled_total.load(Ordering::Relaxed),
            closed: self.inner.is_closed(),
        }
    }
}

/// Exclusive use of one pooled connection.
///
/// Handlers only see leases, never the pool or raw connections. Untrusted SQL
/// runs through [`Lease::query`] / [`Lease::execute`], which only accept a
/// [`ValidatedStatement`]; server-authored SQL runs through [`Lease::catalog`].
pub struct Lease {
    conn: Option<Box<dyn Connection>>,
    permit: Option<OwnedSemaphorePermit>,
    pool: Arc<PoolInner>,
    in_statement: bool,
    broken: bool,
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("in_statement", &self.in_statement)
            .field("broken", &self.broken)
            .finish_non_exhaustive()
    }
}

impl Lease {
    pub fn database_type(&self) -> DatabaseType {
        self.pool.connector.database_type()
    }

    fn connection(&mut self) -> DbResult<&mut Box<dyn Connection>> {
        self.conn
            .as_mut()
            .ok_or_else(|| DbError::internal("lease has already been released"))
    }

    /// Run a validated row-returning statement.
    pub async fn query(
        &mut self,
        statement: &ValidatedStatement,
        params: &[QueryParam],
        max_rows: usize,
    ) -> DbResult<RowSet> {
        let limit = self.pool.settings.statement_timeout;
        self.in_statement = true;
        let conn = self.connection()?;
        let outcome = tokio::time::timeout(limit, conn.fetch(statement.sql(), params, max_rows)).await;
        self.settle(outcome, "query", limit)
    }

    /// Run a validated statement and return the affected row count.
    pub async fn execute(
        &mut self,
        statement: &ValidatedStatement,
        params: &[QueryParam],
    ) -> DbResult<u64> {
        let limit = self.pool.settings.statement_timeout;
        self.in_statement = true;
        let conn = self.connection()?;
        let outcome = tokio::time::timeout(limit, conn.execute(statement.sql(), params)).await;
        self.settle(outcome, "execute", limit)
    }

    /// Run a server-authored catalog query.
    pub async fn catalog(&mut self, query: &CatalogQuery, max_rows: usize) -> DbResult<RowSet> {
        let limit = self.pool.settings.statement_timeout;
        self.in_statement = true;
        let conn = self.connection()?;
        let outcome =
            tokio::time::timeout(limit, conn.fetch(query.sql(), query.params(), max_rows)).await;
        self.settle(outcome, "catalog query", limit)
    }

    pub async fn server_version(&mut self) -> DbResult<String> {
        let limit = self.pool.settings.statement_timeout;
        self.in_statement = true;
        let conn = self.connection()?;
        let outcome = tokio::time::timeout(limit, conn.server_version()).await;
        self.settle(outcome, "server version", limit)
    }

    fn settle<T>(
        &mut self,
        outcome: Result<DbResult<T>, tokio::time::error::Elapsed>,
        operation: &str,
        limit: Duration,
    ) -> DbResult<T> {
        self.in_statement = false;
        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                if matches!(e, DbError::Connection { .. }) {
                    self.broken = true;
                }
                Err(e)
            }
            Err(_) => {
                self.broken = true;
                let limit_ms = limit.as_millis() as u64;
                warn!(
                    operation = operation,
                    limit_ms = limit_ms,
                    "Statement timed out, connection will be recycled"
                );
                Err(DbError::statement_timeout(operation, limit_ms))
            }
        }
    }

    /// Return the connection to the pool.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        self.pool.in_use.fetch_sub(1, Ordering::AcqRel);

        if self.in_statement || self.broken || self.pool.is_closed() {
            if self.in_statement {
                warn!("Lease dropped mid-statement, recycling connection");
            }
            self.pool.recycled_total.fetch_add(1, Ordering::Relaxed);
            match Handle::try_current() {
                Ok(handle) => self.pool.close_in_background(conn, &handle),
                Err(_) => drop(conn),
            }
        } else {
            self.pool.idle().push_back(IdleConnection {
                conn,
                idle_since: Instant::now(),
            });
        }

        // Release the slot only after the connection is back on the idle stack.
        drop(self.permit.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    /// Connection whose statements sleep for a configurable time.
    struct ScriptedConnection {
        delay: Duration,
        healthy: Arc<AtomicBool>,
        closed: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Connection for ScriptedConnection {
        async fn ping(&mut self) -> DbResult<()> {
            if self.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(DbError::connection("probe failed", "reconnect"))
            }
        }

        async fn server_version(&mut self) -> DbResult<String> {
            Ok("scripted 1.0".to_string())
        }

        async fn fetch(
            &mut self,
            _sql: &str,
            _params: &[QueryParam],
            _max_rows: usize,
        ) -> DbResult<RowSet> {
            tokio::time::sleep(self.delay).await;
            Ok(RowSet::default())
        }

        async fn execute(&mut self, _sql: &str, _params: &[QueryParam]) -> DbResult<u64> {
            tokio::time::sleep(self.delay).await;
            Ok(0)
        }

        async fn close(self: Box<Self>) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct ScriptedConnector {
        delay: Duration,
        failures_left: AtomicU32,
        connects: AtomicU32,
        healthy: Arc<AtomicBool>,
        closed: Arc<AtomicU32>,
    }

    impl ScriptedConnector {
        fn new(delay: Duration, failures: u32) -> Arc<Self> {
            Arc::new(Self {
                delay,
                failures_left: AtomicU32::new(failures),
                connects: AtomicU32::new(0),
                healthy: Arc::new(AtomicBool::new(true)),
                closed: Arc::new(AtomicU32::new(0)),
            })
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        fn database_type(&self) -> DatabaseType {
            DatabaseType::SQLite
        }

        async fn connect(&self) -> DbResult<Box<dyn Connection>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(DbError::connection("refused", "start the server"));
            }
            Ok(Box::new(ScriptedConnection {
                delay: self.delay,
                healthy: Arc::clone(&self.healthy),
                closed: Arc::clone(&self.closed),
            }))
        }
    }

    fn settings(max: u32) -> PoolSettings {
        PoolSettings {
            max_pool_size: max,
            acquire_timeout: Duration::from_millis(100),
            statement_timeout: Duration::from_millis(50),
            idle_timeout: Duration::from_secs(30),
            connect_retries: 3,
            retry_backoff: Duration::from_millis(1),
            reaper_interval: Duration::from_secs(60),
        }
    }

    fn statement(sql: &str) -> ValidatedStatement {
        crate::security::SecurityValidator::new(
            crate::config::SecurityPolicy::read_write(),
            DatabaseType::SQLite,
        )
        .validate(sql)
        .unwrap()
    }

    #[tokio::test]
    async fn test_released_connection_is_reused() {
        let connector = ScriptedConnector::new(Duration::ZERO, 0);
        let pool = ConnectionManager::new(connector.clone(), settings(2));

        let lease = pool.acquire(Duration::from_millis(100)).await.unwrap();
        lease.release();
        let lease = pool.acquire(Duration::from_millis(100)).await.unwrap();
        drop(lease);

        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().idle, 1);
        assert_eq!(pool.stats().in_use, 0);
    }

    #[tokio::test]
    async fn test_acquire_times_out_when_exhausted() {
        let connector = ScriptedConnector::new(Duration::ZERO, 0);
        let pool = ConnectionManager::new(connector, settings(1));

        let _held = pool.acquire(Duration::from_millis(100)).await.unwrap();
        let started = Instant::now();
        let err = pool.acquire(Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(err, DbError::PoolExhausted { .. }));
        assert!(started.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_connect_retries_then_succeeds() {
        let connector = ScriptedConnector::new(Duration::ZERO, 2);
        let pool = ConnectionManager::new(connector.clone(), settings(1));

        let lease = pool.acquire(Duration::from_millis(100)).await;
        assert!(lease.is_ok());
        assert_eq!(connector.connects.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_connect_retries_exhausted() {
        let connector = ScriptedConnector::new(Duration::ZERO, 10);
        let pool = ConnectionManager::new(connector.clone(), settings(1));

        let err = pool.acquire(Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::ConnectionUnavailable { attempts: 3, .. }
        ));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 3);
        // The permit was returned on failure.
        assert_eq!(pool.stats().available, 1);
    }

    #[tokio::test]
    async fn test_failed_probe_discards_idle_connection() {
        let connector = ScriptedConnector::new(Duration::ZERO, 0);
        let pool = ConnectionManager::new(connector.clone(), settings(1));

        pool.acquire(Duration::from_millis(100)).await.unwrap().release();
        connector.healthy.store(false, Ordering::SeqCst);

        let _lease = pool.acquire(Duration::from_millis(100)).await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        assert_eq!(connector.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_statement_timeout_recycles_connection() {
        let connector = ScriptedConnector::new(Duration::from_millis(500), 0);
        let pool = ConnectionManager::new(connector.clone(), settings(1));

        let mut lease = pool.acquire(Duration::from_millis(100)).await.unwrap();
        let err = lease
            .query(&statement("SELECT 1"), &[], 10)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::StatementTimeout { .. }));
        drop(lease);

        assert_eq!(pool.stats().idle, 0);
        assert_eq!(pool.stats().recycled_total, 1);
    }

    #[tokio::test]
    async fn test_cancelled_statement_recycles_connection() {
        let connector = ScriptedConnector::new(Duration::from_millis(500), 0);
        let mut settings = settings(1);
        settings.statement_timeout = Duration::from_secs(5);
        let pool = ConnectionManager::new(connector, settings);

        let mut lease = pool.acquire(Duration::from_millis(100)).await.unwrap();
        let stmt = statement("SELECT 1");
        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), lease.query(&stmt, &[], 10)).await;
        assert!(cancelled.is_err());
        drop(lease);

        assert_eq!(pool.stats().idle, 0);
        assert_eq!(pool.stats().in_use, 0);
    }

    #[tokio::test]
    async fn test_close_rejects_new_acquires() {
        let connector = ScriptedConnector::new(Duration::ZERO, 0);
        let pool = ConnectionManager::new(connector.clone(), settings(2));
        pool.acquire(Duration::from_millis(100)).await.unwrap().release();

        pool.close(Duration::from_millis(50)).await;
        assert!(pool.stats().closed);
        assert_eq!(pool.stats().idle, 0);
        assert_eq!(connector.closed.load(Ordering::SeqCst), 1);

        let err = pool.acquire(Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(err, DbError::ConnectionUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_close_waits_for_recycled_connections() {
        let connector = ScriptedConnector::new(Duration::from_millis(500), 0);
        let mut settings = settings(2);
        settings.statement_timeout = Duration::from_secs(5);
        let pool = ConnectionManager::new(connector.clone(), settings);

        let mut lease = pool.acquire(Duration::from_millis(100)).await.unwrap();
        let stmt = statement("SELECT 1");
        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), lease.query(&stmt, &[], 10)).await;
        assert!(cancelled.is_err());
        drop(lease);

        pool.close(Duration::from_secs(1)).await;
        assert_eq!(connector.closed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().in_use, 0);
    }

    #[tokio::test]
    async fn test_reap_idle_closes_expired_connections() {
        let connector = ScriptedConnector::new(Duration::ZERO, 0);
        let mut settings = settings(2);
        settings.idle_timeout = Duration::from_millis(10);
        let pool = ConnectionManager::new(connector.clone(), settings);

        pool.acquire(Duration::from_millis(100)).await.unwrap().release();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(pool.reap_idle().await, 1);
        assert_eq!(pool.stats().idle, 0);
    }

    #[tokio::test]
    async fn test_test_connection_reports_version() {
        let connector = ScriptedConnector::new(Duration::ZERO, 0);
        let pool = ConnectionManager::new(connector, settings(1));
        assert_eq!(pool.test_connection().await.unwrap(), "scripted 1.0");
        assert_eq!(pool.stats().idle, 1);
    }
}
