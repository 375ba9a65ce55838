//! The connection contract the agent and producers are written against.
//!
//! The contract is synchronous: every call blocks the calling thread for
//! the duration of the database round-trip.

use crate::error::Result;
use crate::row::Row;
use crate::value::Value;
use std::sync::Arc;

/// Isolation levels, ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Read uncommitted: the lowest level, dirty reads are allowed.
    /// Read-only work runs at this level when the backend supports it.
    ReadUncommitted,

    /// Read committed: only committed changes from others are visible.
    #[default]
    ReadCommitted,

    /// Repeatable read: a consistent snapshot for the whole transaction.
    RepeatableRead,

    /// Serializable: transactions appear to execute one after another.
    Serializable,
}

impl IsolationLevel {
    /// Keyword form used in `SET TRANSACTION ISOLATION LEVEL`.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// A blocking database connection.
///
/// Transaction handling follows the auto-commit model: while auto-commit
/// is on every statement commits on its own; turning it off makes the next
/// statement open a transaction that lasts until [`commit`](Self::commit)
/// or [`rollback`](Self::rollback). Re-enabling auto-commit with a
/// transaction open commits it.
pub trait Connection: Send {
    /// Run a row-returning statement with positional `?` parameters.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    /// Execute a statement and return the number of affected rows.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Current auto-commit mode.
    fn auto_commit(&self) -> Result<bool>;

    /// Change auto-commit mode.
    fn set_auto_commit(&self, enabled: bool) -> Result<()>;

    /// Commit the open transaction; a no-op when none is open.
    fn commit(&self) -> Result<()>;

    /// Roll back the open transaction; a no-op when none is open.
    fn rollback(&self) -> Result<()>;

    /// Whether the connection currently refuses writes.
    fn is_read_only(&self) -> Result<bool>;

    /// Switch the connection in or out of read-only mode.
    fn set_read_only(&self, read_only: bool) -> Result<()>;

    /// Current transaction isolation level.
    fn isolation_level(&self) -> Result<IsolationLevel>;

    /// Change the transaction isolation level.
    fn set_isolation_level(&self, level: IsolationLevel) -> Result<()>;

    /// Whether the backend can run at the given isolation level.
    fn supports_isolation_level(&self, level: IsolationLevel) -> Result<bool>;

    /// Whether the backend supports transactions at all.
    ///
    /// Producers call this once and cache the answer.
    fn supports_transactions(&self) -> Result<bool>;
}

impl<C: Connection + Sync + ?Sized> Connection for Arc<C> {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        (**self).query(sql, params)
    }

    fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        (**self).query_one(sql, params)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        (**self).execute(sql, params)
    }

    fn auto_commit(&self) -> Result<bool> {
        (**self).auto_commit()
    }

    fn set_auto_commit(&self, enabled: bool) -> Result<()> {
        (**self).set_auto_commit(enabled)
    }

    fn commit(&self) -> Result<()> {
        (**self).commit()
    }

    fn rollback(&self) -> Result<()> {
        (**self).rollback()
    }

    fn is_read_only(&self) -> Result<bool> {
        (**self).is_read_only()
    }

    fn set_read_only(&self, read_only: bool) -> Result<()> {
        (**self).set_read_only(read_only)
    }

    fn isolation_level(&self) -> Result<IsolationLevel> {
        (**self).isolation_level()
    }

    fn set_isolation_level(&self, level: IsolationLevel) -> Result<()> {
        (**self).set_isolation_level(level)
    }

    fn supports_isolation_level(&self, level: IsolationLevel) -> Result<bool> {
        (**self).supports_isolation_level(level)
    }

    fn supports_transactions(&self) -> Result<bool> {
        (**self).supports_transactions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolation_level_default() {
        assert_eq!(IsolationLevel::default(), IsolationLevel::ReadCommitted);
    }

    #[test]
    fn test_isolation_level_as_sql() {
        assert_eq!(IsolationLevel::ReadUncommitted.as_sql(), "READ UNCOMMITTED");
        assert_eq!(IsolationLevel::ReadCommitted.as_sql(), "READ COMMITTED");
        assert_eq!(IsolationLevel::RepeatableRead.as_sql(), "REPEATABLE READ");
        assert_eq!(IsolationLevel::Serializable.as_sql(), "SERIALIZABLE");
    }
}
