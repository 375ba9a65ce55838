//! Error types for gridsql operations.

use std::fmt;
use std::time::SystemTime;

use crate::datetime;

/// Every fallible gridsql operation returns this error.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors (open, close, lost)
    Connection(ConnectionError),
    /// Query execution errors reported by the backend
    Query(QueryError),
    /// Type conversion errors
    Type(TypeError),
    /// Transaction demarcation errors
    Transaction(TransactionError),
    /// The calling thread already owns an active transaction
    ConcurrentTransaction(ConcurrentTransactionError),
    /// A backend constraint violation translated into a user-facing message
    Constraint(ConstraintViolation),
    /// Connection producer errors
    Pool(PoolError),
    /// Configuration errors
    Config(ConfigError),
    /// Macro resolution errors
    Macro(MacroError),
    /// The requested operation cannot be performed with the given input
    Unsupported(String),
    Io(std::io::Error),
    Serde(String),
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    Connect,
    /// Connection was closed or lost
    Disconnected,
    /// Setting a connection property failed
    Property,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub sqlstate: Option<String>,
    /// Backend-native error code (e.g. SQLite extended result code, MySQL errno).
    pub code: Option<i32>,
    pub message: String,
    pub detail: Option<String>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Unique, foreign key, NOT NULL or CHECK
    Constraint,
    /// Table or column not found
    NotFound,
    /// Permission denied or read-only connection
    Permission,
    /// Data too large for column
    DataTruncation,
    /// Lock contention
    Busy,
    /// Interrupted
    Cancelled,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// A transaction is already open on the connection
    AlreadyActive,
    /// No transaction is open on the connection
    NotActive,
    /// The backend refused to commit
    Commit,
    /// The backend refused to roll back
    Rollback,
}

/// Raised when a thread tries to open a second transaction before its
/// first one has finished.
#[derive(Debug, Clone)]
pub struct ConcurrentTransactionError {
    pub thread_id: String,
    pub thread_name: Option<String>,
    /// When the transaction already owned by the thread was started.
    pub started_at: SystemTime,
}

/// A unique or referential constraint violation with the offending
/// fields and values extracted from the backend message.
#[derive(Debug)]
pub struct ConstraintViolation {
    pub kind: ConstraintKind,
    pub fields: String,
    pub values: String,
    pub message: String,
    pub source: Option<QueryError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// Duplicate key
    Unique,
    /// Foreign key
    ForeignKey,
}

#[derive(Debug)]
pub struct PoolError {
    pub kind: PoolErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolErrorKind {
    /// Checkout timed out waiting for a free connection
    Timeout,
    /// Producer has been closed
    Closed,
    /// Connection factory failed
    Factory,
    /// A connection was checked in to a producer that did not hand it out
    Foreign,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone)]
pub struct MacroError {
    pub kind: MacroErrorKind,
    pub name: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroErrorKind {
    /// No column or field with the referenced name
    MissingColumn,
    /// The row accessor has no current record
    MissingRow,
}

impl Error {
    /// SQLSTATE of the backend error, looking through translated
    /// constraint violations.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sqlstate.as_deref(),
            Error::Constraint(c) => c.source.as_ref().and_then(|q| q.sqlstate.as_deref()),
            _ => None,
        }
    }

    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }

    /// Is this the reentrancy guard rejecting a second transaction?
    pub fn is_concurrent_transaction(&self) -> bool {
        matches!(self, Error::ConcurrentTransaction(_))
    }

    /// Is this a translated constraint violation meant for end users?
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Error::Constraint(_))
    }

    /// Shorthand for [`Error::Unsupported`].
    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::Unsupported(message.into())
    }
}

impl QueryError {
    /// Build a query error with only a kind and a message.
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            sql: None,
            sqlstate: None,
            code: None,
            message: message.into(),
            detail: None,
            source: None,
        }
    }

    /// SQLSTATE 23505.
    pub fn is_unique_violation(&self) -> bool {
        self.sqlstate.as_deref() == Some("23505")
    }

    /// SQLSTATE 23503.
    pub fn is_foreign_key_violation(&self) -> bool {
        self.sqlstate.as_deref() == Some("23503")
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "connection: {e}"),
            Error::Query(e) => write!(f, "query failed: {e}"),
            Error::Type(e) => write!(f, "type mismatch: {e}"),
            Error::Transaction(e) => write!(f, "transaction: {e}"),
            Error::ConcurrentTransaction(e) => fmt::Display::fmt(e, f),
            Error::Constraint(e) => fmt::Display::fmt(e, f),
            Error::Pool(e) => write!(f, "connection producer: {e}"),
            Error::Config(e) => write!(f, "invalid configuration: {e}"),
            Error::Macro(e) => write!(f, "macro `{}`: {e}", e.name),
            Error::Unsupported(msg) => write!(f, "unsupported: {msg}"),
            Error::Io(e) => write!(f, "io: {e}"),
            Error::Serde(msg) => write!(f, "serialization: {msg}"),
            Error::Custom(msg) => f.write_str(msg),
        }
    }
}

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

fn as_source(source: Option<&BoxedSource>) -> Option<&(dyn std::error::Error + 'static)> {
    source.map(|err| &**err as &(dyn std::error::Error + 'static))
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => as_source(e.source.as_ref()),
            Error::Query(e) => as_source(e.source.as_ref()),
            Error::Pool(e) => as_source(e.source.as_ref()),
            Error::Config(e) => as_source(e.source.as_ref()),
            Error::Constraint(e) => e.source.as_ref().map(|q| q as &(dyn std::error::Error + 'static)),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        as_source(self.source.as_ref())
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.sqlstate, self.code) {
            (Some(state), _) => write!(f, "[{state}] {}", self.message),
            (None, Some(code)) => write!(f, "[code {code}] {}", self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wanted {}, got {}", self.expected, self.actual)?;
        if let Some(column) = &self.column {
            write!(f, " in column `{column}`")?;
        }
        Ok(())
    }
}

impl fmt::Display for ConcurrentTransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "thread {} ({}) already owns a transaction, begun {}",
            self.thread_id,
            self.thread_name.as_deref().unwrap_or("unnamed"),
            datetime::format_system_time(self.started_at)
        )
    }
}

// Payloads whose display is their message.
macro_rules! display_message {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.message)
                }
            }
        )+
    };
}

display_message!(ConnectionError, TransactionError, ConstraintViolation, PoolError, ConfigError, MacroError);

macro_rules! from_payload {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$ty> for Error {
                fn from(err: $ty) -> Self {
                    Error::$variant(err)
                }
            }
        )+
    };
}

from_payload! {
    ConnectionError => Connection,
    QueryError => Query,
    TypeError => Type,
    TransactionError => Transaction,
    ConcurrentTransactionError => ConcurrentTransaction,
    ConstraintViolation => Constraint,
    PoolError => Pool,
    ConfigError => Config,
    MacroError => Macro,
    std::io::Error => Io,
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn sqlstate_helpers() {
        let mut query = QueryError::new(QueryErrorKind::Constraint, "unique violation");
        query.sql = Some("INSERT INTO t VALUES (1)".to_string());
        query.sqlstate = Some("23505".to_string());

        assert!(query.is_unique_violation());
        assert!(!query.is_foreign_key_violation());

        let err = Error::Query(query);
        assert_eq!(err.sqlstate(), Some("23505"));
        assert_eq!(err.sql(), Some("INSERT INTO t VALUES (1)"));
        assert_eq!(err.to_string(), "query failed: [23505] unique violation");

        let mut native = QueryError::new(QueryErrorKind::Busy, "database is locked");
        native.code = Some(5);
        assert_eq!(native.to_string(), "[code 5] database is locked");
    }

    #[test]
    fn constraint_keeps_original_sqlstate() {
        let mut query = QueryError::new(QueryErrorKind::Constraint, "fk");
        query.sqlstate = Some("23503".to_string());
        let err = Error::Constraint(ConstraintViolation {
            kind: ConstraintKind::ForeignKey,
            fields: "owner".to_string(),
            values: "7".to_string(),
            message: "value of field owner is constrained: 7 is not a valid value".to_string(),
            source: Some(query),
        });

        assert!(err.is_constraint_violation());
        assert_eq!(err.sqlstate(), Some("23503"));
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(
            err.to_string(),
            "value of field owner is constrained: 7 is not a valid value"
        );
    }

    #[test]
    fn concurrent_transaction_message() {
        let err = Error::from(ConcurrentTransactionError {
            thread_id: "ThreadId(7)".to_string(),
            thread_name: Some("worker-1".to_string()),
            started_at: UNIX_EPOCH + Duration::from_millis(1_500),
        });

        assert!(err.is_concurrent_transaction());
        assert_eq!(
            err.to_string(),
            "thread ThreadId(7) (worker-1) already owns a transaction, begun 1970-01-01 00:00:01.500"
        );
    }

    #[test]
    fn payload_display() {
        let err = TypeError {
            expected: "i64",
            actual: "TEXT".to_string(),
            column: Some("id".to_string()),
        };
        assert_eq!(err.to_string(), "wanted i64, got TEXT in column `id`");
        let macro_err = Error::from(MacroError {
            kind: MacroErrorKind::MissingColumn,
            name: "#owner".to_string(),
            message: "no column named owner".to_string(),
        });
        assert_eq!(macro_err.to_string(), "macro `#owner`: no column named owner");
    }
}
