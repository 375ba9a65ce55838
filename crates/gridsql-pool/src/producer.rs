//! The producer contract shared by every connection source.

use std::fmt;
use std::sync::OnceLock;

use gridsql_core::{Connection, Result};

/// Hands out connections and takes them back.
///
/// Callers normally go through [`acquire`](Self::acquire), which returns a
/// handle that checks a connection out lazily and checks it back in when
/// released or dropped.
pub trait ConnectionProducer: Send + Sync {
    type Conn: Connection;

    /// Take a connection out of the producer.
    fn checkout(&self) -> Result<Self::Conn>;

    /// Give back a connection obtained from [`checkout`](Self::checkout).
    fn checkin(&self, conn: Self::Conn) -> Result<()>;

    /// The cached answer to "does this database support transactions".
    fn transaction_probe(&self) -> &TransactionProbe;

    /// A handle that checks a connection out on first use.
    fn acquire(&self) -> ConnectionHandle<'_, Self> {
        ConnectionHandle::new(self)
    }

    /// Release a handle; later releases of the same handle do nothing.
    fn release(&self, handle: &mut ConnectionHandle<'_, Self>) -> Result<()> {
        handle.release()
    }

    /// Whether the database supports transactions, probed once.
    fn is_transaction_supported(&self) -> Result<bool> {
        if let Some(supported) = self.transaction_probe().cached() {
            return Ok(supported);
        }
        let mut handle = self.acquire();
        let supported = self.transaction_probe().check(handle.connection()?);
        handle.release()?;
        Ok(supported)
    }

    /// Run `f` with a connection, releasing it afterwards.
    fn run_connection<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&Self::Conn) -> Result<()>,
    {
        self.function_connection(f)
    }

    /// Run `f` with a connection and return its result, releasing the
    /// connection afterwards.
    fn function_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self::Conn) -> Result<T>,
    {
        let mut handle = self.acquire();
        let result = handle.connection().and_then(f);
        let released = handle.release();
        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(release_error)) => {
                tracing::warn!(error = %release_error, "releasing connection failed");
                Err(e)
            }
        }
    }
}

/// A lazily checked-out connection.
///
/// Dropping an unreleased handle releases it; a failure at that point can
/// only be logged.
pub struct ConnectionHandle<'p, P: ConnectionProducer + ?Sized> {
    producer: &'p P,
    conn: Option<P::Conn>,
}

impl<'p, P: ConnectionProducer + ?Sized> ConnectionHandle<'p, P> {
    pub fn new(producer: &'p P) -> Self {
        Self {
            producer,
            conn: None,
        }
    }

    /// The connection, checking it out on first call.
    pub fn connection(&mut self) -> Result<&P::Conn> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => self.producer.checkout()?,
        };
        Ok(self.conn.insert(conn))
    }

    /// Whether a connection is currently checked out.
    pub fn is_checked_out(&self) -> bool {
        self.conn.is_some()
    }

    /// Check the connection back in. Idempotent.
    pub fn release(&mut self) -> Result<()> {
        match self.conn.take() {
            Some(conn) => self.producer.checkin(conn),
            None => Ok(()),
        }
    }
}

impl<P: ConnectionProducer + ?Sized> fmt::Debug for ConnectionHandle<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("checked_out", &self.is_checked_out())
            .finish()
    }
}

impl<P: ConnectionProducer + ?Sized> Drop for ConnectionHandle<'_, P> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "releasing connection on drop failed");
        }
    }
}

/// Caches whether a database supports transactions.
///
/// The first [`check`](Self::check) asks the connection; every later call
/// returns the cached answer. A probe that fails counts as "unsupported".
#[derive(Debug, Default)]
pub struct TransactionProbe {
    supported: OnceLock<bool>,
}

impl TransactionProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// A probe whose answer is already known.
    pub fn preset(supported: bool) -> Self {
        Self {
            supported: OnceLock::from(supported),
        }
    }

    pub fn cached(&self) -> Option<bool> {
        self.supported.get().copied()
    }

    pub fn check<C: Connection + ?Sized>(&self, conn: &C) -> bool {
        *self
            .supported
            .get_or_init(|| match conn.supports_transactions() {
                Ok(supported) => {
                    tracing::debug!(supported, "probed transaction support");
                    supported
                }
                Err(e) => {
                    tracing::warn!(error = %e, "transaction probe failed, assuming unsupported");
                    false
                }
            })
    }
}
