//! Blocking SQLite driver for gridsql.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! Implements [`gridsql_core::Connection`] on top of libsqlite3. SQLite has
//! no session auto-commit switch, so the driver emulates one: with
//! auto-commit off the first statement opens a deferred transaction that
//! lasts until commit or rollback.
//!
//! # Type Mapping
//!
//! | Value | SQLite storage |
//! |-------|----------------|
//! | `Bool` | INTEGER (0/1) |
//! | `Int`, `BigInt` | INTEGER |
//! | `Float`, `Double` | REAL |
//! | `Decimal`, `Text` | TEXT |
//! | `Bytes` | BLOB |
//! | `Date`, `Time`, `Timestamp` | TEXT (ISO-8601) |
//! | `Array` | TEXT (JSON) |
//!
//! # Thread Safety
//!
//! `SqliteConnection` is `Send` and `Sync`; the raw handle sits behind a
//! mutex so one connection can be shared through `Arc`.

pub mod connection;
pub mod ffi;
pub mod types;

pub use connection::{OpenFlags, SqliteConfig, SqliteConnection};

/// Get the SQLite library version.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}

/// Get the SQLite library version number.
pub fn sqlite_version_number() -> i32 {
    ffi::version_number()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(sqlite_version().starts_with('3'));
        assert!(sqlite_version_number() >= 3_000_000);
    }
}
