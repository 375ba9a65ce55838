//! Core types and traits for gridsql.
//!
//! This crate provides the foundations shared by the query builder, the
//! connection producers and the transaction agent:
//!
//! - `Value` and `Row` for dynamically typed data
//! - `Connection`, a blocking auto-commit style connection contract
//! - `Error`, the single error type used across the workspace
//! - `datetime` helpers for calendar formatting

pub mod connection;
pub mod datetime;
pub mod error;
pub mod row;
pub mod value;

pub use connection::{Connection, IsolationLevel};
pub use error::{Error, Result};
pub use row::{ColumnInfo, FromValue, Row};
pub use value::Value;
