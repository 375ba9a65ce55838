//! Transaction demarcation around a unit of work.
//!
//! A unit of work receives the connection and a [`TransactionContext`] and
//! returns `Ok(true)` to commit or `Ok(false)` to roll back. An error rolls
//! back and is returned unchanged; a failure of that rollback is only
//! logged so it never hides the original error.

use std::sync::Arc;

use gridsql_core::{Connection, Error, IsolationLevel, Result};
use gridsql_pool::ConnectionProducer;

use crate::context::TransactionContext;
use crate::registry::ThreadRegistry;

/// Agent behaviour switches.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Reject a second transaction on the same thread. When off, the clash
    /// is logged and the nested work runs unguarded.
    pub fail_on_concurrent: bool,
    /// Isolation level used by read-only runs when the backend supports it.
    pub read_only_isolation: IsolationLevel,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            fail_on_concurrent: true,
            read_only_isolation: IsolationLevel::ReadUncommitted,
        }
    }
}

impl AgentConfig {
    pub fn fail_on_concurrent(mut self, fail: bool) -> Self {
        self.fail_on_concurrent = fail;
        self
    }

    pub fn read_only_isolation(mut self, level: IsolationLevel) -> Self {
        self.read_only_isolation = level;
        self
    }
}

/// Runs units of work against connections from a producer.
#[derive(Debug)]
pub struct TransactionAgent<P> {
    producer: Arc<P>,
    registry: Arc<ThreadRegistry>,
    config: AgentConfig,
}

impl<P> Clone for TransactionAgent<P> {
    fn clone(&self) -> Self {
        Self {
            producer: Arc::clone(&self.producer),
            registry: Arc::clone(&self.registry),
            config: self.config.clone(),
        }
    }
}

impl<P: ConnectionProducer> TransactionAgent<P> {
    /// An agent guarded by the process-wide [`ThreadRegistry`].
    pub fn new(producer: Arc<P>) -> Self {
        Self {
            producer,
            registry: ThreadRegistry::global(),
            config: AgentConfig::default(),
        }
    }

    pub fn with_registry(mut self, registry: Arc<ThreadRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn producer(&self) -> &Arc<P> {
        &self.producer
    }

    pub fn registry(&self) -> &ThreadRegistry {
        &self.registry
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn is_transaction_supported(&self) -> Result<bool> {
        self.producer.is_transaction_supported()
    }

    /// Run `work` in a transaction, or directly when the database has no
    /// transactions. Returns whether the work asked to commit.
    pub fn run_now<F>(&self, work: F) -> Result<bool>
    where
        F: FnOnce(&P::Conn, &mut TransactionContext) -> Result<bool>,
    {
        self.run_now_in(&mut TransactionContext::new(), work)
    }

    /// [`run_now`](Self::run_now) with a caller-provided context.
    #[tracing::instrument(level = "debug", skip(self, ctx, work))]
    pub fn run_now_in<F>(&self, ctx: &mut TransactionContext, work: F) -> Result<bool>
    where
        F: FnOnce(&P::Conn, &mut TransactionContext) -> Result<bool>,
    {
        self.producer.function_connection(|conn| {
            if self.producer.transaction_probe().check(conn) {
                self.run_transaction(conn, ctx, work)
            } else {
                self.run_simple(conn, ctx, work)
            }
        })
    }

    /// Run `work` on a read-only connection without an explicit transaction.
    pub fn run_read_only<F>(&self, work: F) -> Result<bool>
    where
        F: FnOnce(&P::Conn, &mut TransactionContext) -> Result<bool>,
    {
        self.run_read_only_in(&mut TransactionContext::new(), work)
    }

    #[tracing::instrument(level = "debug", skip(self, ctx, work))]
    pub fn run_read_only_in<F>(&self, ctx: &mut TransactionContext, work: F) -> Result<bool>
    where
        F: FnOnce(&P::Conn, &mut TransactionContext) -> Result<bool>,
    {
        self.producer
            .function_connection(|conn| self.run_read_only_on(conn, ctx, work))
    }

    /// Run `work` in a transaction on `conn`.
    ///
    /// The thread registry entry is removed as soon as `work` returns, before
    /// the commit or rollback is issued. Auto-commit is restored to its
    /// previous state on every path.
    pub fn run_transaction<C, F>(
        &self,
        conn: &C,
        ctx: &mut TransactionContext,
        work: F,
    ) -> Result<bool>
    where
        C: Connection + ?Sized,
        F: FnOnce(&C, &mut TransactionContext) -> Result<bool>,
    {
        let guarded = match self.registry.check() {
            Ok(()) => true,
            Err(e) if self.config.fail_on_concurrent => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "running nested transaction without guard");
                false
            }
        };

        let previous = conn.auto_commit()?;
        let result = self.transact(conn, ctx, guarded, work);
        let restored = conn.set_auto_commit(previous);
        finish(result, restored, "restoring auto-commit failed")
    }

    fn transact<C, F>(
        &self,
        conn: &C,
        ctx: &mut TransactionContext,
        guarded: bool,
        work: F,
    ) -> Result<bool>
    where
        C: Connection + ?Sized,
        F: FnOnce(&C, &mut TransactionContext) -> Result<bool>,
    {
        let decided = conn.set_auto_commit(false).and_then(|()| {
            let registration = if guarded {
                Some(self.registry.enter()?)
            } else {
                None
            };
            ctx.begin(true, false);
            if let Some(registration) = &registration {
                ctx.started_at = registration.started_at();
            }
            tracing::debug!("transaction begun");
            let decided = work(conn, ctx);
            drop(registration);
            decided
        });

        let result = decided.and_then(|commit| {
            if commit {
                conn.commit()?;
                tracing::debug!("transaction committed");
            } else {
                conn.rollback()?;
                tracing::debug!("transaction rolled back");
            }
            Ok(commit)
        });

        match result {
            Ok(commit) => {
                ctx.executed = commit;
                Ok(commit)
            }
            Err(e) => {
                ctx.executed = false;
                match conn.rollback() {
                    Ok(()) => tracing::debug!(error = %e, "transaction rolled back after error"),
                    Err(rollback_error) => tracing::warn!(
                        error = %rollback_error,
                        cause = %e,
                        "rollback after failed unit of work also failed"
                    ),
                }
                Err(e)
            }
        }
    }

    /// Run `work` on `conn` with no transaction demarcation at all.
    pub fn run_simple<C, F>(&self, conn: &C, ctx: &mut TransactionContext, work: F) -> Result<bool>
    where
        C: Connection + ?Sized,
        F: FnOnce(&C, &mut TransactionContext) -> Result<bool>,
    {
        ctx.begin(false, false);
        let executed = work(conn, ctx)?;
        ctx.executed = executed;
        Ok(executed)
    }

    /// Run `work` with `conn` switched to read-only and, when supported, to
    /// the configured read isolation level. Both settings are restored
    /// afterwards.
    pub fn run_read_only_on<C, F>(
        &self,
        conn: &C,
        ctx: &mut TransactionContext,
        work: F,
    ) -> Result<bool>
    where
        C: Connection + ?Sized,
        F: FnOnce(&C, &mut TransactionContext) -> Result<bool>,
    {
        let saved_read_only = conn.is_read_only()?;
        let mut saved_isolation = None;
        let result = self.read_only_body(conn, ctx, &mut saved_isolation, work);

        let restored = conn.set_read_only(saved_read_only).and_then(|()| {
            saved_isolation.map_or(Ok(()), |level| conn.set_isolation_level(level))
        });
        finish(result, restored, "restoring read-only settings failed")
    }

    fn read_only_body<C, F>(
        &self,
        conn: &C,
        ctx: &mut TransactionContext,
        saved_isolation: &mut Option<IsolationLevel>,
        work: F,
    ) -> Result<bool>
    where
        C: Connection + ?Sized,
        F: FnOnce(&C, &mut TransactionContext) -> Result<bool>,
    {
        conn.set_read_only(true)?;
        let level = self.config.read_only_isolation;
        if conn.supports_isolation_level(level)? {
            *saved_isolation = Some(conn.isolation_level()?);
            conn.set_isolation_level(level)?;
        }
        ctx.begin(false, true);
        let executed = work(conn, ctx)?;
        ctx.executed = executed;
        Ok(executed)
    }

    /// Run `f` in a transaction that always commits, returning the context.
    pub fn execute<F>(&self, f: F) -> Result<TransactionContext>
    where
        F: FnOnce(&P::Conn, &mut TransactionContext) -> Result<()>,
    {
        self.execute_with(TransactionContext::new(), f)
    }

    /// [`execute`](Self::execute) starting from a seeded context.
    pub fn execute_with<F>(&self, mut ctx: TransactionContext, f: F) -> Result<TransactionContext>
    where
        F: FnOnce(&P::Conn, &mut TransactionContext) -> Result<()>,
    {
        self.run_now_in(&mut ctx, |conn, ctx| f(conn, ctx).map(|()| true))?;
        Ok(ctx)
    }

    /// Run `f` in a transaction that always commits and return its value.
    pub fn execute_return<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&P::Conn) -> Result<T>,
    {
        let mut out = None;
        self.run_now(|conn, _| {
            out = Some(f(conn)?);
            Ok(true)
        })?;
        out.ok_or_else(no_value)
    }

    pub fn execute_read_only<F>(&self, f: F) -> Result<TransactionContext>
    where
        F: FnOnce(&P::Conn, &mut TransactionContext) -> Result<()>,
    {
        let mut ctx = TransactionContext::new();
        self.run_read_only_in(&mut ctx, |conn, ctx| f(conn, ctx).map(|()| true))?;
        Ok(ctx)
    }

    pub fn execute_return_read_only<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&P::Conn) -> Result<T>,
    {
        let mut out = None;
        self.run_read_only(|conn, _| {
            out = Some(f(conn)?);
            Ok(true)
        })?;
        out.ok_or_else(no_value)
    }

    /// Run `f` in a transaction on a connection the caller already holds.
    pub fn execute_on<C, F>(&self, conn: &C, f: F) -> Result<TransactionContext>
    where
        C: Connection + ?Sized,
        F: FnOnce(&mut TransactionContext) -> Result<()>,
    {
        let mut ctx = TransactionContext::new();
        self.run_transaction(conn, &mut ctx, |_, ctx| f(ctx).map(|()| true))?;
        Ok(ctx)
    }

    pub fn execute_return_on<C, T, F>(&self, conn: &C, f: F) -> Result<T>
    where
        C: Connection + ?Sized,
        F: FnOnce() -> Result<T>,
    {
        let mut out = None;
        self.run_transaction(conn, &mut TransactionContext::new(), |_, _| {
            out = Some(f()?);
            Ok(true)
        })?;
        out.ok_or_else(no_value)
    }
}

fn no_value() -> Error {
    Error::Custom("unit of work finished without producing a value".to_string())
}

/// The primary result wins; a cleanup failure is returned only when the
/// work itself succeeded.
fn finish<T>(result: Result<T>, cleanup: Result<()>, what: &str) -> Result<T> {
    match (result, cleanup) {
        (result, Ok(())) => result,
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Err(cleanup_error)) => {
            tracing::warn!(error = %cleanup_error, "{what}");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsql_core::{Row, Value};
    use gridsql_pool::{Pool, PoolConfig, SingleConnectionConfig, SingleConnectionProducer};
    use gridsql_sqlite::SqliteConnection;
    use std::sync::mpsc;
    use std::thread;

    type Agent = TransactionAgent<
        SingleConnectionProducer<SqliteConnection, fn() -> Result<SqliteConnection>>,
    >;

    fn agent() -> Agent {
        let producer = SingleConnectionProducer::new(
            SingleConnectionConfig::default(),
            SqliteConnection::open_memory as fn() -> Result<SqliteConnection>,
        );
        let agent = TransactionAgent::new(Arc::new(producer))
            .with_registry(Arc::new(ThreadRegistry::new()));
        agent
            .execute(|conn, _| conn.execute_raw("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)"))
            .unwrap();
        agent
    }

    fn count(agent: &Agent) -> i64 {
        agent
            .execute_return(|conn| {
                let rows: Vec<Row> = conn.query("SELECT COUNT(*) AS n FROM t", &[])?;
                rows[0].get_named::<i64>("n")
            })
            .unwrap()
    }

    #[test]
    fn test_commit_and_rollback_follow_return_value() {
        let agent = agent();
        let committed = agent
            .run_now(|conn, ctx| {
                assert!(ctx.transactions_supported());
                conn.execute("INSERT INTO t (v) VALUES ('a')", &[])?;
                Ok(true)
            })
            .unwrap();
        assert!(committed);

        let committed = agent
            .run_now(|conn, _| {
                conn.execute("INSERT INTO t (v) VALUES ('b')", &[])?;
                Ok(false)
            })
            .unwrap();
        assert!(!committed);
        assert_eq!(count(&agent), 1);
    }

    #[test]
    fn test_error_rolls_back_and_propagates() {
        let agent = agent();
        let err = agent
            .run_now(|conn, _| {
                conn.execute("INSERT INTO t (v) VALUES ('a')", &[])?;
                Err(Error::Custom("stop".into()))
            })
            .unwrap_err();
        assert!(matches!(err, Error::Custom(ref m) if m == "stop"));
        assert_eq!(count(&agent), 0);
        assert!(agent.registry().is_empty());
    }

    #[test]
    fn test_reentry_on_same_thread_is_rejected() {
        let agent = agent();
        let inner_agent = agent.clone();
        let mut outer_start = None;
        let err = agent
            .run_now(|_, ctx| {
                outer_start = Some(ctx.started_at());
                inner_agent.run_now(|_, _| Ok(true)).map(|_| true)
            })
            .unwrap_err();
        match err {
            Error::ConcurrentTransaction(e) => assert_eq!(Some(e.started_at), outer_start),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(agent.registry().is_empty());
    }

    #[test]
    fn test_reentry_tolerated_when_configured() {
        let agent = agent().with_config(AgentConfig::default().fail_on_concurrent(false));
        let inner = agent.clone();
        let ok = agent
            .run_now(|_, _| {
                inner.run_now(|conn, _| {
                    conn.execute("INSERT INTO t (v) VALUES ('x')", &[])?;
                    Ok(true)
                })
            })
            .unwrap();
        assert!(ok);
        assert_eq!(count(&agent), 1);
    }

    #[test]
    fn test_read_only_restores_settings() {
        let agent = agent();
        let executed = agent
            .run_read_only(|conn, ctx| {
                assert!(ctx.readonly());
                assert!(!ctx.transactions_supported());
                assert!(conn.is_read_only()?);
                assert_eq!(conn.isolation_level()?, IsolationLevel::ReadUncommitted);
                assert!(conn.execute("INSERT INTO t (v) VALUES ('z')", &[]).is_err());
                Ok(true)
            })
            .unwrap();
        assert!(executed);
        agent
            .producer()
            .run_connection(|conn| {
                assert!(!conn.is_read_only()?);
                assert_eq!(conn.isolation_level()?, IsolationLevel::Serializable);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_execute_helpers() {
        let agent = agent();
        let ctx = agent
            .execute_with(
                TransactionContext::new().with_params(vec![Value::Text("p".into())]),
                |conn, ctx| {
                    let v = ctx.params()[0].clone();
                    conn.execute("INSERT INTO t (v) VALUES (?)", &[v])?;
                    ctx.insert("rowid", conn.last_insert_rowid());
                    Ok(())
                },
            )
            .unwrap();
        assert!(ctx.executed());
        assert_eq!(ctx.get("rowid"), Some(&Value::BigInt(1)));

        let v: String = agent
            .execute_return_read_only(|conn| {
                conn.query_one("SELECT v FROM t", &[])?
                    .map_or_else(|| Ok(String::new()), |row| row.get_named("v"))
            })
            .unwrap();
        assert_eq!(v, "p");

        let ctx = agent.execute_read_only(|_, ctx| {
            ctx.insert("seen", true);
            Ok(())
        });
        assert_eq!(ctx.unwrap().get("seen"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_unsupported_transactions_run_simple() {
        let producer = SingleConnectionProducer::new(
            SingleConnectionConfig::default().transactions_supported(false),
            SqliteConnection::open_memory,
        );
        let agent = TransactionAgent::new(Arc::new(producer))
            .with_registry(Arc::new(ThreadRegistry::new()));
        let executed = agent
            .run_now(|conn, ctx| {
                assert!(!ctx.transactions_supported());
                assert!(conn.auto_commit()?);
                assert!(agent.registry().is_empty());
                Ok(false)
            })
            .unwrap();
        assert!(!executed);
    }

    #[test]
    fn test_pooled_threads_get_separate_transactions() {
        let path = std::env::temp_dir()
            .join(format!("gridsql_agent_pool_{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let db = path.to_string_lossy().into_owned();
        let pool = Pool::new(PoolConfig::new(2), move || SqliteConnection::open_file(db.clone()));
        let agent = TransactionAgent::new(Arc::new(pool))
            .with_registry(Arc::new(ThreadRegistry::new()));
        agent
            .execute(|conn, _| conn.execute_raw("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)"))
            .unwrap();

        let (inserted_tx, inserted_rx) = mpsc::channel();
        let (aborted_tx, aborted_rx) = mpsc::channel();
        let agent = &agent;
        thread::scope(|s| {
            let writer = s.spawn(move || {
                agent.run_now(|conn, _| {
                    conn.execute("INSERT INTO t (v) VALUES ('a')", &[])?;
                    inserted_tx.send(()).unwrap();
                    aborted_rx.recv().unwrap();
                    Ok(true)
                })
            });
            let aborter = s.spawn(move || {
                inserted_rx.recv().unwrap();
                let result = agent.run_now(|conn, _| {
                    let seen: i64 = conn
                        .query_one("SELECT COUNT(*) AS n FROM t", &[])?
                        .unwrap()
                        .get_named("n")?;
                    assert_eq!(seen, 0, "uncommitted insert leaked");
                    Ok(false)
                });
                aborted_tx.send(()).unwrap();
                result
            });
            assert!(!aborter.join().unwrap().unwrap());
            assert!(writer.join().unwrap().unwrap());
        });

        let n: i64 = agent
            .execute_return_read_only(|conn| {
                conn.query_one("SELECT COUNT(*) AS n FROM t", &[])?
                    .unwrap()
                    .get_named("n")
            })
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(agent.producer().stats().total_connections, 2);
        assert!(agent.registry().is_empty());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_shared_connection_waits_for_other_thread() {
        let agent = agent();
        let (inserted_tx, inserted_rx) = mpsc::channel();
        let agent = &agent;
        thread::scope(|s| {
            let writer = s.spawn(move || {
                agent.run_now(|conn, _| {
                    conn.execute("INSERT INTO t (v) VALUES ('a')", &[])?;
                    inserted_tx.send(()).unwrap();
                    thread::sleep(std::time::Duration::from_millis(100));
                    Ok(true)
                })
            });
            let aborter = s.spawn(move || {
                inserted_rx.recv().unwrap();
                agent.run_now(|_, _| Ok(false))
            });
            assert!(writer.join().unwrap().unwrap());
            assert!(!aborter.join().unwrap().unwrap());
        });
        assert_eq!(count(agent), 1);
        assert_eq!(agent.producer().outstanding(), 0);
    }
}
