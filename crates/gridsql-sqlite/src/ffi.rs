//! Raw SQLite API.
//!
//! The declarations come from `libsqlite3-sys`, which also compiles and links
//! the bundled amalgamation. This module adds the few safe helpers the
//! driver needs on top.

#![allow(non_camel_case_types)]

use std::ffi::{CStr, c_int};

pub use libsqlite3_sys::*;

// Not exposed by the pregenerated bindings; the bundled library exports it.
unsafe extern "C" {
    pub fn sqlite3_close_v2(db: *mut sqlite3) -> c_int;
}

/// Destructor telling SQLite to copy bound text and blobs.
pub fn transient() -> sqlite3_destructor_type {
    SQLITE_TRANSIENT()
}

/// Get the SQLite library version as a string.
pub fn version() -> &'static str {
    // SAFETY: sqlite3_libversion returns a static string
    unsafe {
        let ptr = sqlite3_libversion();
        CStr::from_ptr(ptr).to_str().unwrap_or("unknown")
    }
}

/// Get the SQLite library version as a number.
pub fn version_number() -> i32 {
    // SAFETY: sqlite3_libversion_number is always safe to call
    unsafe { sqlite3_libversion_number() }
}

/// Convert an SQLite result code to a human-readable string.
pub fn error_string(code: c_int) -> &'static str {
    // SAFETY: sqlite3_errstr returns a static string
    unsafe {
        let ptr = sqlite3_errstr(code);
        CStr::from_ptr(ptr).to_str().unwrap_or("unknown error")
    }
}
