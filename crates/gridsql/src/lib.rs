//! gridsql - dialect-aware query construction and transactional execution
//! for paginated, filterable table views.
//!
//! gridsql builds the SQL behind a table view and runs it safely:
//!
//! - A [`QuerySpec`] describes one logical query; a [`Dialect`] renders it
//!   for PostgreSQL, MySQL, SQLite or SQL Server, with typed [`Filter`]
//!   predicates applied on an outer query and native pagination.
//! - A [`TransactionAgent`] runs units of work on connections from a
//!   [`ConnectionProducer`], refusing a second transaction on a thread that
//!   already owns one.
//! - A [`ChunkedFetcher`] streams large results page by page, and
//!   [`export_json_lines`] builds a bounded-memory export on top of it.
//!
//! # Quick Start
//!
//! ```ignore
//! use gridsql::prelude::*;
//! use gridsql_sqlite::SqliteConnection;
//! use std::sync::Arc;
//!
//! let producer = Pool::new(PoolConfig::new(4), || SqliteConnection::open_file("app.db"));
//! let agent = TransactionAgent::new(Arc::new(producer));
//!
//! let mut filter = Filter::new();
//! filter.add_where("code", Operator::Equal, "a1", ValueKind::String)?;
//! let spec = QuerySpec::new("*", "items")
//!     .filter(filter)
//!     .ignore_case(true)
//!     .limit(10);
//!
//! let dialect = DialectKind::Sqlite.dialect();
//! let rows = agent.execute_return_read_only(|conn| {
//!     conn.query(&spec.render(dialect, RenderMode::FetchRows)?, &[])
//! })?;
//! ```

pub mod export;

pub use export::export_json_lines;

pub use gridsql_core::error::{
    ConcurrentTransactionError, ConfigError, ConnectionError, ConnectionErrorKind, ConstraintKind,
    ConstraintViolation, MacroError, MacroErrorKind, PoolError, PoolErrorKind, QueryError,
    QueryErrorKind, TransactionError, TransactionErrorKind, TypeError,
};
pub use gridsql_core::{
    ColumnInfo, Connection, Error, FromValue, IsolationLevel, Result, Row, Value, datetime,
};

pub use gridsql_query::{
    Assignment, Between, ConstraintTranslator, CurrentRow, DerbyDialect, Dialect, DialectKind,
    Filter, MacroResolver, MssqlDialect, MysqlDialect, Operator, OracleDialect, OrderTerm,
    PostgresDialect, Predicate, QuerySpec, RenderMode, RowAccessor, SortDirection, SqliteDialect,
    ValueKind, quote_text,
};

pub use gridsql_pool::{
    ConnectionHandle, ConnectionProducer, Pool, PoolConfig, PoolStats, PooledConnection,
    SingleConnectionConfig, SingleConnectionProducer, TransactionProbe,
};

pub use gridsql_session::{
    AgentConfig, ChunkedFetcher, FetchConfig, FetchStats, Registration, ThreadRegistry,
    TransactionAgent, TransactionContext,
};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use gridsql::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // Core
        Connection,
        Error,
        IsolationLevel,
        Result,
        Row,
        Value,
        // Query building
        Dialect,
        DialectKind,
        Filter,
        Operator,
        QuerySpec,
        RenderMode,
        SortDirection,
        ValueKind,
        // Producers
        ConnectionProducer,
        Pool,
        PoolConfig,
        SingleConnectionConfig,
        SingleConnectionProducer,
        // Transactions and fetching
        ChunkedFetcher,
        FetchConfig,
        TransactionAgent,
        TransactionContext,
        export_json_lines,
    };
}
