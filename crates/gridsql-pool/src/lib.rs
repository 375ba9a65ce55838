//! Connection producers for gridsql.
//!
//! A producer hands out connections through a [`ConnectionHandle`] and takes
//! them back when the handle is released. Two producers are provided:
//!
//! - [`SingleConnectionProducer`] shares one physical connection between the
//!   handles of one thread at a time and reconnects once it is idle and older
//!   than its lifetime.
//! - [`Pool`] keeps a bounded set of connections and blocks checkouts until
//!   one is free or the acquire timeout runs out.
//!
//! Both cache whether the database supports transactions in a
//! [`TransactionProbe`], so the question is asked once per producer.

use std::time::Duration;

use gridsql_core::Error;
use gridsql_core::error::{PoolError, PoolErrorKind};

pub mod pool;
pub mod producer;
pub mod single;

pub use pool::{Pool, PooledConnection};
pub use producer::{ConnectionHandle, ConnectionProducer, TransactionProbe};
pub use single::SingleConnectionProducer;

/// Sizing and timing of a [`Pool`]. Durations are milliseconds.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Connections opened by [`Pool::warm_up`]
    pub min_connections: usize,
    /// Upper bound on open connections, idle or checked out
    pub max_connections: usize,
    /// Idle connections older than this are closed on checkout (0 = never)
    pub idle_timeout_ms: u64,
    /// How long a checkout may block once the pool is full (0 = forever)
    pub acquire_timeout_ms: u64,
    /// Age after which a connection is retired at its next checkin or checkout (0 = never)
    pub max_lifetime_ms: u64,
    /// Run `SELECT 1` on an idle connection before reusing it
    pub test_on_checkout: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 10,
            idle_timeout_ms: 10 * 60 * 1000,
            acquire_timeout_ms: 30 * 1000,
            max_lifetime_ms: 30 * 60 * 1000,
            test_on_checkout: true,
        }
    }
}

impl PoolConfig {
    /// Defaults with at most `max_connections` open.
    pub fn new(max_connections: usize) -> Self {
        Self {
            max_connections,
            ..Default::default()
        }
    }

    pub fn min_connections(mut self, n: usize) -> Self {
        self.min_connections = n;
        self
    }

    pub fn idle_timeout(mut self, ms: u64) -> Self {
        self.idle_timeout_ms = ms;
        self
    }

    pub fn acquire_timeout(mut self, ms: u64) -> Self {
        self.acquire_timeout_ms = ms;
        self
    }

    pub fn max_lifetime(mut self, ms: u64) -> Self {
        self.max_lifetime_ms = ms;
        self
    }

    pub fn test_on_checkout(mut self, enabled: bool) -> Self {
        self.test_on_checkout = enabled;
        self
    }
}

/// Configuration of a [`SingleConnectionProducer`].
#[derive(Debug, Clone)]
pub struct SingleConnectionConfig {
    /// Once no handle holds the connection and it is older than this, it is
    /// closed and the next checkout reconnects (0 = never)
    pub max_lifetime_ms: u64,
    /// How long a checkout from another thread waits for the owner to check
    /// the connection back in (0 = forever)
    pub acquire_timeout_ms: u64,
    /// Skip the transaction probe and use this answer instead
    pub transactions_supported: Option<bool>,
}

impl Default for SingleConnectionConfig {
    fn default() -> Self {
        Self {
            max_lifetime_ms: 10 * 60 * 1000,
            acquire_timeout_ms: 30 * 1000,
            transactions_supported: None,
        }
    }
}

impl SingleConnectionConfig {
    pub fn max_lifetime(mut self, ms: u64) -> Self {
        self.max_lifetime_ms = ms;
        self
    }

    pub fn acquire_timeout(mut self, ms: u64) -> Self {
        self.acquire_timeout_ms = ms;
        self
    }

    pub fn transactions_supported(mut self, supported: bool) -> Self {
        self.transactions_supported = Some(supported);
        self
    }
}

/// Snapshot of a pool's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Open connections, `idle + active`
    pub total_connections: usize,
    pub idle_connections: usize,
    /// Checked out right now
    pub active_connections: usize,
    /// Checkouts blocked waiting for a connection
    pub pending_requests: usize,
}

/// `None` for a zero duration.
pub(crate) fn limit(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

pub(crate) fn pool_error(kind: PoolErrorKind, message: impl Into<String>) -> Error {
    Error::Pool(PoolError {
        kind,
        message: message.into(),
        source: None,
    })
}

pub(crate) fn factory_error(err: Error) -> Error {
    Error::Pool(PoolError {
        kind: PoolErrorKind::Factory,
        message: format!("opening a connection failed: {err}"),
        source: Some(Box::new(err)),
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use gridsql_core::{Connection, Error, IsolationLevel, Result, Row, Value};

    #[derive(Debug, Default)]
    pub(crate) struct MockState {
        pub opened: AtomicUsize,
        pub closed: AtomicUsize,
        pub probes: AtomicUsize,
        pub broken: Mutex<bool>,
        pub fail_probe: Mutex<bool>,
    }

    impl MockState {
        pub fn opened(&self) -> usize {
            self.opened.load(Ordering::SeqCst)
        }

        pub fn closed(&self) -> usize {
            self.closed.load(Ordering::SeqCst)
        }

        pub fn probes(&self) -> usize {
            self.probes.load(Ordering::SeqCst)
        }

        pub fn open(self: &Arc<Self>) -> Result<MockConnection> {
            let id = self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(MockConnection {
                id,
                state: Arc::clone(self),
            })
        }
    }

    #[derive(Debug)]
    pub(crate) struct MockConnection {
        pub id: usize,
        pub state: Arc<MockState>,
    }

    impl Drop for MockConnection {
        fn drop(&mut self) {
            self.state.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Connection for MockConnection {
        fn query(&self, _sql: &str, _params: &[Value]) -> Result<Vec<Row>> {
            if *self.state.broken.lock().unwrap() {
                return Err(Error::Custom("connection reset".into()));
            }
            Ok(Vec::new())
        }

        fn execute(&self, _sql: &str, _params: &[Value]) -> Result<u64> {
            Ok(0)
        }

        fn auto_commit(&self) -> Result<bool> {
            Ok(true)
        }

        fn set_auto_commit(&self, _enabled: bool) -> Result<()> {
            Ok(())
        }

        fn commit(&self) -> Result<()> {
            Ok(())
        }

        fn rollback(&self) -> Result<()> {
            Ok(())
        }

        fn is_read_only(&self) -> Result<bool> {
            Ok(false)
        }

        fn set_read_only(&self, _read_only: bool) -> Result<()> {
            Ok(())
        }

        fn isolation_level(&self) -> Result<IsolationLevel> {
            Ok(IsolationLevel::ReadCommitted)
        }

        fn set_isolation_level(&self, _level: IsolationLevel) -> Result<()> {
            Ok(())
        }

        fn supports_isolation_level(&self, _level: IsolationLevel) -> Result<bool> {
            Ok(true)
        }

        fn supports_transactions(&self) -> Result<bool> {
            self.state.probes.fetch_add(1, Ordering::SeqCst);
            if *self.state.fail_probe.lock().unwrap() {
                return Err(Error::Custom("metadata unavailable".into()));
            }
            Ok(true)
        }
    }
}
