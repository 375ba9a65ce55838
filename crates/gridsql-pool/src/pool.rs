//! A bounded blocking connection pool.

use std::collections::VecDeque;
use std::fmt;
use std::ops::Deref;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use gridsql_core::error::PoolErrorKind;
use gridsql_core::{Connection, IsolationLevel, Result, Row, Value};

use crate::producer::{ConnectionProducer, TransactionProbe};
use crate::{PoolConfig, PoolStats, factory_error, limit, pool_error};

/// Statement used to validate idle connections before reuse.
const VALIDATION_QUERY: &str = "SELECT 1";

/// A connection owned by a [`Pool`].
#[derive(Debug)]
pub struct PooledConnection<C> {
    conn: C,
    created: Instant,
}

impl<C> PooledConnection<C> {
    fn new(conn: C) -> Self {
        Self {
            conn,
            created: Instant::now(),
        }
    }

    /// Time since the connection was opened.
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    /// Get the inner connection.
    pub fn into_inner(self) -> C {
        self.conn
    }
}

impl<C> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl<C: Connection> Connection for PooledConnection<C> {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.conn.query(sql, params)
    }

    fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        self.conn.query_one(sql, params)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.conn.execute(sql, params)
    }

    fn auto_commit(&self) -> Result<bool> {
        self.conn.auto_commit()
    }

    fn set_auto_commit(&self, enabled: bool) -> Result<()> {
        self.conn.set_auto_commit(enabled)
    }

    fn commit(&self) -> Result<()> {
        self.conn.commit()
    }

    fn rollback(&self) -> Result<()> {
        self.conn.rollback()
    }

    fn is_read_only(&self) -> Result<bool> {
        self.conn.is_read_only()
    }

    fn set_read_only(&self, read_only: bool) -> Result<()> {
        self.conn.set_read_only(read_only)
    }

    fn isolation_level(&self) -> Result<IsolationLevel> {
        self.conn.isolation_level()
    }

    fn set_isolation_level(&self, level: IsolationLevel) -> Result<()> {
        self.conn.set_isolation_level(level)
    }

    fn supports_isolation_level(&self, level: IsolationLevel) -> Result<bool> {
        self.conn.supports_isolation_level(level)
    }

    fn supports_transactions(&self) -> Result<bool> {
        self.conn.supports_transactions()
    }
}

struct IdleConnection<C> {
    conn: PooledConnection<C>,
    since: Instant,
}

struct PoolState<C> {
    idle: VecDeque<IdleConnection<C>>,
    total: usize,
    pending: usize,
    closed: bool,
}

/// Keeps up to `max_connections` connections and lends them out.
///
/// A checkout takes an idle connection, opens a new one while below the
/// limit, or waits until a connection is checked in. Waiting longer than
/// `acquire_timeout_ms` fails with [`PoolErrorKind::Timeout`].
pub struct Pool<C, F> {
    config: PoolConfig,
    factory: F,
    state: Mutex<PoolState<C>>,
    available: Condvar,
    probe: TransactionProbe,
}

impl<C, F> Pool<C, F>
where
    C: Connection,
    F: Fn() -> Result<C> + Send + Sync,
{
    /// Create a new connection pool. No connection is opened yet.
    pub fn new(config: PoolConfig, factory: F) -> Self {
        Self {
            config,
            factory,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                total: 0,
                pending: 0,
                closed: false,
            }),
            available: Condvar::new(),
            probe: TransactionProbe::new(),
        }
    }

    /// Get the pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, PoolState<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the current pool statistics.
    pub fn stats(&self) -> PoolStats {
        let state = self.lock();
        PoolStats {
            total_connections: state.total,
            idle_connections: state.idle.len(),
            active_connections: state.total - state.idle.len(),
            pending_requests: state.pending,
        }
    }

    /// Check if the pool is at capacity.
    pub fn at_capacity(&self) -> bool {
        self.lock().total >= self.config.max_connections
    }

    /// Open connections until `min_connections` exist. Returns how many
    /// were opened.
    pub fn warm_up(&self) -> Result<usize> {
        let mut opened = 0;
        loop {
            {
                let mut state = self.lock();
                if state.closed
                    || state.total >= self.config.min_connections.min(self.config.max_connections)
                {
                    return Ok(opened);
                }
                state.total += 1;
            }
            let conn = self.open().inspect_err(|_| self.forget_one())?;
            self.lock().idle.push_back(IdleConnection {
                conn,
                since: Instant::now(),
            });
            self.available.notify_one();
            opened += 1;
        }
    }

    /// Close every idle connection and refuse further checkouts.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        let idle = state.idle.len();
        state.idle.clear();
        state.total -= idle;
        drop(state);
        self.available.notify_all();
        tracing::debug!(closed = idle, "pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn open(&self) -> Result<PooledConnection<C>> {
        let conn = (self.factory)().map_err(factory_error)?;
        self.probe.check(&conn);
        tracing::debug!("pool connection opened");
        Ok(PooledConnection::new(conn))
    }

    /// Give back a slot whose connection is gone.
    fn forget_one(&self) {
        let mut state = self.lock();
        state.total = state.total.saturating_sub(1);
        drop(state);
        self.available.notify_one();
    }

    fn is_stale(&self, idle: &IdleConnection<C>) -> bool {
        limit(self.config.max_lifetime_ms).is_some_and(|max| idle.conn.age() > max)
            || limit(self.config.idle_timeout_ms).is_some_and(|max| idle.since.elapsed() > max)
    }
}

impl<C, F> ConnectionProducer for Pool<C, F>
where
    C: Connection,
    F: Fn() -> Result<C> + Send + Sync,
{
    type Conn = PooledConnection<C>;

    fn checkout(&self) -> Result<PooledConnection<C>> {
        let deadline =
            limit(self.config.acquire_timeout_ms).map(|timeout| Instant::now() + timeout);
        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(pool_error(PoolErrorKind::Closed, "pool is closed"));
            }

            if let Some(idle) = state.idle.pop_front() {
                if self.is_stale(&idle) {
                    state.total -= 1;
                    tracing::debug!("dropping stale pool connection");
                    continue;
                }
                if !self.config.test_on_checkout {
                    return Ok(idle.conn);
                }
                drop(state);
                match idle.conn.query(VALIDATION_QUERY, &[]) {
                    Ok(_) => return Ok(idle.conn),
                    Err(e) => {
                        tracing::warn!(error = %e, "discarding pool connection that failed validation");
                        drop(idle);
                        state = self.lock();
                        state.total = state.total.saturating_sub(1);
                        continue;
                    }
                }
            }

            if state.total < self.config.max_connections {
                state.total += 1;
                drop(state);
                return self.open().inspect_err(|_| self.forget_one());
            }

            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(pool_error(
                            PoolErrorKind::Timeout,
                            format!(
                                "no connection available within {} ms",
                                self.config.acquire_timeout_ms
                            ),
                        ));
                    }
                    Some(deadline - now)
                }
                None => None,
            };
            state.pending += 1;
            state = match wait {
                Some(wait) => {
                    self.available
                        .wait_timeout(state, wait)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
            state.pending -= 1;
        }
    }

    fn checkin(&self, conn: PooledConnection<C>) -> Result<()> {
        let expired = limit(self.config.max_lifetime_ms).is_some_and(|max| conn.age() > max);
        let mut state = self.lock();
        if state.closed || expired {
            state.total = state.total.saturating_sub(1);
            drop(state);
            drop(conn);
            tracing::debug!(expired, "pool connection closed on checkin");
        } else {
            state.idle.push_back(IdleConnection {
                conn,
                since: Instant::now(),
            });
            drop(state);
        }
        self.available.notify_one();
        Ok(())
    }

    fn transaction_probe(&self) -> &TransactionProbe {
        &self.probe
    }
}

impl<C, F> fmt::Debug for Pool<C, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.config)
            .field("probe", &self.probe)
            .finish_non_exhaustive()
    }
}
