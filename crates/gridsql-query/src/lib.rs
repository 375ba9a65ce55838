//! Dialect-aware SQL query construction for gridsql.
//!
//! `gridsql-query` turns a [`QuerySpec`] plus an optional [`Filter`] into SQL
//! text for one database family:
//!
//! - **Dialects**: [`Dialect`] adapters for PostgreSQL, MySQL, SQLite,
//!   SQL Server, Oracle and Derby render fields, literals, pagination and
//!   counts.
//! - **Filters**: typed predicates that escape their values by [`ValueKind`].
//! - **Macros**: `#column` / `@field` references resolved against a row
//!   before anything is rendered.
//! - **Error translation**: backend constraint failures become
//!   user-facing [`ConstraintViolation`](gridsql_core::error::ConstraintViolation)s.

pub mod builder;
pub mod derby;
pub mod dialect;
pub mod filter;
pub mod kind;
pub mod mssql;
pub mod mysql;
pub mod oracle;
pub mod postgres;
pub mod resolve;
pub mod sqlite;
pub mod translate;

pub use builder::{QuerySpec, RenderMode};
pub use derby::DerbyDialect;
pub use dialect::{Dialect, DialectKind, quote_text};
pub use filter::{Assignment, Between, Filter, Operator, OrderTerm, Predicate, SortDirection};
pub use kind::ValueKind;
pub use mssql::MssqlDialect;
pub use mysql::MysqlDialect;
pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;
pub use resolve::{CurrentRow, MacroResolver, RowAccessor};
pub use sqlite::SqliteDialect;
pub use translate::ConstraintTranslator;
