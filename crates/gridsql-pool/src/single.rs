//! A producer that shares one physical connection.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Instant;

use gridsql_core::error::PoolErrorKind;
use gridsql_core::{Connection, Result};

use crate::producer::{ConnectionProducer, TransactionProbe};
use crate::{SingleConnectionConfig, factory_error, limit, pool_error};

struct SingleState<C> {
    conn: Option<Arc<C>>,
    opened_at: Instant,
    outstanding: usize,
    owner: Option<ThreadId>,
}

impl<C> SingleState<C> {
    fn usable_by(&self, thread: ThreadId) -> bool {
        self.outstanding == 0 || self.owner == Some(thread)
    }
}

/// Every handle gets the same connection.
///
/// The connection belongs to one thread at a time. Handles on the owning
/// thread share it; a checkout from any other thread blocks until every
/// handle of the owner is checked in, or fails with
/// [`PoolErrorKind::Timeout`] after `acquire_timeout_ms`.
///
/// When the count of outstanding checkouts drops back to zero and the
/// connection has outlived `max_lifetime_ms`, it is closed; the next
/// checkout opens a fresh one.
pub struct SingleConnectionProducer<C, F> {
    config: SingleConnectionConfig,
    factory: F,
    state: Mutex<SingleState<C>>,
    released: Condvar,
    probe: TransactionProbe,
}

impl<C, F> SingleConnectionProducer<C, F>
where
    C: Connection + Sync,
    F: Fn() -> Result<C> + Send + Sync,
{
    pub fn new(config: SingleConnectionConfig, factory: F) -> Self {
        let probe = config
            .transactions_supported
            .map_or_else(TransactionProbe::new, TransactionProbe::preset);
        Self {
            config,
            factory,
            state: Mutex::new(SingleState {
                conn: None,
                opened_at: Instant::now(),
                outstanding: 0,
                owner: None,
            }),
            released: Condvar::new(),
            probe,
        }
    }

    pub fn config(&self) -> &SingleConnectionConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, SingleState<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of checkouts not yet checked back in.
    pub fn outstanding(&self) -> usize {
        self.lock().outstanding
    }

    /// Whether the physical connection is currently open.
    pub fn is_connected(&self) -> bool {
        self.lock().conn.is_some()
    }

    /// Close the connection if no handle holds it. Returns whether it closed.
    pub fn close(&self) -> bool {
        let mut state = self.lock();
        if state.outstanding > 0 {
            return false;
        }
        let closed = state.conn.take().is_some();
        if closed {
            tracing::debug!("single connection closed");
        }
        closed
    }
}

impl<C, F> ConnectionProducer for SingleConnectionProducer<C, F>
where
    C: Connection + Sync,
    F: Fn() -> Result<C> + Send + Sync,
{
    type Conn = Arc<C>;

    fn checkout(&self) -> Result<Arc<C>> {
        let me = thread::current().id();
        let deadline =
            limit(self.config.acquire_timeout_ms).map(|timeout| Instant::now() + timeout);
        let mut state = self.lock();
        while !state.usable_by(me) {
            tracing::trace!("waiting for the single connection");
            state = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(pool_error(
                            PoolErrorKind::Timeout,
                            format!(
                                "connection held by another thread for more than {} ms",
                                self.config.acquire_timeout_ms
                            ),
                        ));
                    }
                    self.released
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .released
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
        let conn = if let Some(conn) = &state.conn {
            Arc::clone(conn)
        } else {
            let conn = Arc::new((self.factory)().map_err(factory_error)?);
            self.probe.check(conn.as_ref());
            state.opened_at = Instant::now();
            state.conn = Some(Arc::clone(&conn));
            tracing::debug!("single connection opened");
            conn
        };
        state.outstanding += 1;
        state.owner = Some(me);
        Ok(conn)
    }

    fn checkin(&self, conn: Arc<C>) -> Result<()> {
        let mut state = self.lock();
        let ours = state
            .conn
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &conn));
        if !ours {
            return Err(pool_error(
                PoolErrorKind::Foreign,
                "connection was not produced by this producer",
            ));
        }
        drop(conn);
        state.outstanding = state.outstanding.saturating_sub(1);
        if state.outstanding > 0 {
            return Ok(());
        }
        state.owner = None;
        let expired = limit(self.config.max_lifetime_ms)
            .is_some_and(|max| state.opened_at.elapsed() > max);
        if expired {
            state.conn = None;
            tracing::debug!("single connection expired and closed");
        }
        drop(state);
        self.released.notify_all();
        Ok(())
    }

    fn transaction_probe(&self) -> &TransactionProbe {
        &self.probe
    }
}

impl<C, F> fmt::Debug for SingleConnectionProducer<C, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleConnectionProducer")
            .field("config", &self.config)
            .field("probe", &self.probe)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockConnection, MockState};
    use gridsql_core::Error;
    use std::thread;
    use std::time::Duration;

    fn single(
        state: &Arc<MockState>,
        config: SingleConnectionConfig,
    ) -> SingleConnectionProducer<MockConnection, impl Fn() -> Result<MockConnection> + use<>> {
        let state = Arc::clone(state);
        SingleConnectionProducer::new(config, move || state.open())
    }

    #[test]
    fn test_handles_share_one_connection() {
        let state = Arc::new(MockState::default());
        let producer = single(&state, SingleConnectionConfig::default());
        let mut a = producer.acquire();
        let mut b = producer.acquire();
        let first = Arc::clone(a.connection().unwrap());
        let second = Arc::clone(b.connection().unwrap());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(producer.outstanding(), 2);
        assert_eq!(state.opened(), 1);
        drop(a);
        drop(b);
        assert_eq!(producer.outstanding(), 0);
        assert!(producer.is_connected());
    }

    #[test]
    fn test_expired_connection_reopens_after_last_release() {
        let state = Arc::new(MockState::default());
        let producer = single(&state, SingleConnectionConfig::default().max_lifetime(1));
        let mut a = producer.acquire();
        a.connection().unwrap();
        let mut b = producer.acquire();
        b.connection().unwrap();
        thread::sleep(Duration::from_millis(5));

        a.release().unwrap();
        assert!(producer.is_connected(), "still held by another handle");
        b.release().unwrap();
        assert!(!producer.is_connected());
        assert_eq!(state.closed(), 1);

        let mut c = producer.acquire();
        assert_eq!(c.connection().unwrap().id, 1);
        assert_eq!(state.opened(), 2);
    }

    #[test]
    fn test_other_thread_waits_for_owner() {
        let state = Arc::new(MockState::default());
        let producer = single(&state, SingleConnectionConfig::default().acquire_timeout(5_000));
        let mut held = producer.acquire();
        held.connection().unwrap();

        thread::scope(|s| {
            let waiter = s.spawn(|| producer.function_connection(|c| Ok(c.id)));
            thread::sleep(Duration::from_millis(50));
            assert!(!waiter.is_finished());
            assert_eq!(producer.outstanding(), 1);
            held.release().unwrap();
            assert_eq!(waiter.join().unwrap().unwrap(), 0);
        });
        assert_eq!(producer.outstanding(), 0);
        assert_eq!(state.opened(), 1);
    }

    #[test]
    fn test_other_thread_times_out() {
        let state = Arc::new(MockState::default());
        let producer = single(&state, SingleConnectionConfig::default().acquire_timeout(20));
        let mut held = producer.acquire();
        held.connection().unwrap();

        let result = thread::scope(|s| s.spawn(|| producer.checkout()).join().unwrap());
        match result {
            Err(Error::Pool(e)) => assert_eq!(e.kind, PoolErrorKind::Timeout),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(producer.outstanding(), 1);
    }

    #[test]
    fn test_foreign_connection_is_rejected() {
        let state = Arc::new(MockState::default());
        let producer = single(&state, SingleConnectionConfig::default());
        let stranger = Arc::new(state.open().unwrap());
        match producer.checkin(stranger) {
            Err(Error::Pool(e)) => assert_eq!(e.kind, PoolErrorKind::Foreign),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_factory_failure_is_pool_error() {
        let producer = SingleConnectionProducer::new(SingleConnectionConfig::default(), || {
            Err::<MockConnection, _>(Error::Custom("refused".into()))
        });
        let mut handle = producer.acquire();
        match handle.connection() {
            Err(Error::Pool(e)) => {
                assert_eq!(e.kind, PoolErrorKind::Factory);
                assert!(e.message.contains("refused"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(producer.outstanding(), 0);
    }

    #[test]
    fn test_preset_skips_probe() {
        let state = Arc::new(MockState::default());
        let producer = single(
            &state,
            SingleConnectionConfig::default().transactions_supported(false),
        );
        assert!(!producer.is_transaction_supported().unwrap());
        assert_eq!(state.probes(), 0);
    }

    #[test]
    fn test_close_only_when_idle() {
        let state = Arc::new(MockState::default());
        let producer = single(&state, SingleConnectionConfig::default());
        let mut handle = producer.acquire();
        handle.connection().unwrap();
        assert!(!producer.close());
        handle.release().unwrap();
        assert!(producer.close());
        assert!(!producer.is_connected());
    }
}
