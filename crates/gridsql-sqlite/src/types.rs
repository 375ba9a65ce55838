//! Value binding and column decoding.
//!
//! Temporal values are stored as ISO-8601 text (`yyyy-MM-dd`,
//! `HH:mm:ss[.SSS]`, `yyyy-MM-dd HH:mm:ss[.SSS]`) so SQLite's date functions
//! can work on them. Arrays are stored as JSON text.

#![allow(clippy::cast_possible_truncation)]

use std::ffi::{CStr, c_int};

use gridsql_core::{Value, datetime};

use crate::ffi;

unsafe fn bind_text(stmt: *mut ffi::sqlite3_stmt, index: c_int, text: &str) -> c_int {
    let bytes = text.as_bytes();
    // SAFETY: caller guarantees stmt/index; SQLITE_TRANSIENT makes SQLite copy the bytes
    unsafe {
        ffi::sqlite3_bind_text(
            stmt,
            index,
            bytes.as_ptr().cast(),
            bytes.len() as c_int,
            ffi::transient(),
        )
    }
}

/// Bind `value` to parameter `index` (1-based). Returns the SQLite result code.
///
/// # Safety
/// `stmt` is a live prepared statement and `index` is within its parameter count.
pub unsafe fn bind_value(stmt: *mut ffi::sqlite3_stmt, index: c_int, value: &Value) -> c_int {
    // SAFETY: forwarded from the caller
    unsafe {
        match value {
            Value::Null => ffi::sqlite3_bind_null(stmt, index),
            Value::Bool(b) => ffi::sqlite3_bind_int(stmt, index, c_int::from(*b)),
            Value::Int(v) => ffi::sqlite3_bind_int(stmt, index, *v),
            Value::BigInt(v) => ffi::sqlite3_bind_int64(stmt, index, *v),
            Value::Float(v) => ffi::sqlite3_bind_double(stmt, index, f64::from(*v)),
            Value::Double(v) => ffi::sqlite3_bind_double(stmt, index, *v),
            Value::Decimal(s) | Value::Text(s) => bind_text(stmt, index, s),
            Value::Bytes(b) => ffi::sqlite3_bind_blob(
                stmt,
                index,
                b.as_ptr().cast(),
                b.len() as c_int,
                ffi::transient(),
            ),
            Value::Date(days) => bind_text(stmt, index, &datetime::format_date(*days)),
            Value::Time(micros) => bind_text(stmt, index, &datetime::format_time_millis(*micros)),
            Value::Timestamp(micros) => {
                bind_text(stmt, index, &datetime::format_timestamp_millis(*micros))
            }
            Value::Array(_) => bind_text(stmt, index, &value.to_json().to_string()),
        }
    }
}

/// Decode column `index` (0-based) of the current row. Text stays text:
/// temporal columns come back as strings because SQLite has no date type.
///
/// # Safety
/// The last `sqlite3_step` on `stmt` returned `SQLITE_ROW` and `index` is in range.
pub unsafe fn read_column(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Value {
    // SAFETY: forwarded from the caller; pointers returned by SQLite stay
    // valid until the next step/finalize and are copied out immediately
    unsafe {
        match ffi::sqlite3_column_type(stmt, index) {
            ffi::SQLITE_INTEGER => {
                let v = ffi::sqlite3_column_int64(stmt, index);
                i32::try_from(v).map_or(Value::BigInt(v), Value::Int)
            }
            ffi::SQLITE_FLOAT => Value::Double(ffi::sqlite3_column_double(stmt, index)),
            ffi::SQLITE_TEXT => {
                let ptr = ffi::sqlite3_column_text(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                if ptr.is_null() {
                    Value::Null
                } else {
                    let slice = std::slice::from_raw_parts(ptr, usize::try_from(len).unwrap_or(0));
                    Value::Text(String::from_utf8_lossy(slice).into_owned())
                }
            }
            ffi::SQLITE_BLOB => {
                let ptr = ffi::sqlite3_column_blob(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                if ptr.is_null() || len <= 0 {
                    Value::Bytes(Vec::new())
                } else {
                    let slice =
                        std::slice::from_raw_parts(ptr.cast::<u8>(), usize::try_from(len).unwrap_or(0));
                    Value::Bytes(slice.to_vec())
                }
            }
            _ => Value::Null,
        }
    }
}

/// # Safety
/// `stmt` is a live prepared statement and `index` is in range.
pub unsafe fn column_name(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    // SAFETY: forwarded from the caller
    let ptr = unsafe { ffi::sqlite3_column_name(stmt, index) };
    if ptr.is_null() {
        None
    } else {
        // SAFETY: non-null names are NUL-terminated and owned by the statement
        unsafe { CStr::from_ptr(ptr) }.to_str().ok().map(String::from)
    }
}
