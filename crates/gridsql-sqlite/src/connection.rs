//! SQLite connection implementation.
//!
//! SQLite has no session-level auto-commit switch, so it is emulated: while
//! auto-commit is off, the first statement runs `BEGIN DEFERRED` and the
//! transaction stays open until `commit`, `rollback` or auto-commit is
//! turned back on. Read-only mode maps to `PRAGMA query_only` and
//! `ReadUncommitted` to `PRAGMA read_uncommitted`.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::borrow_as_ptr)]

use std::ffi::{CStr, CString, c_int};
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use gridsql_core::error::{ConnectionError, ConnectionErrorKind, QueryError, QueryErrorKind};
use gridsql_core::row::ColumnInfo;
use gridsql_core::{Connection, Error, IsolationLevel, Result, Row, Value};

use crate::ffi;
use crate::types;

/// Where and how to open a database.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// File path, `:memory:`, or a `file:` URI when `flags.uri` is set.
    pub path: String,
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
    /// Enforce foreign keys (`PRAGMA foreign_keys`).
    pub foreign_keys: bool,
}

/// Subset of the `SQLITE_OPEN_*` flags the driver exposes.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    pub read_only: bool,
    pub read_write: bool,
    /// Only meaningful together with `read_write`.
    pub create: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
    pub shared_cache: bool,
}

impl OpenFlags {
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    fn to_sqlite_flags(self) -> c_int {
        let mut flags = 0;
        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        if self.shared_cache {
            flags |= ffi::SQLITE_OPEN_SHAREDCACHE;
        }
        // neither mode requested: read-write, creating the file
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }
        // Connections move between pool threads but are never used concurrently.
        flags | ffi::SQLITE_OPEN_FULLMUTEX
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
            foreign_keys: true,
        }
    }
}

impl SqliteConfig {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn memory() -> Self {
        Self::default()
    }

    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }
}

/// Mutable connection state, guarded by the connection mutex.
struct SqliteInner {
    db: *mut ffi::sqlite3,
    auto_commit: bool,
    read_only: bool,
    isolation: IsolationLevel,
}

// SAFETY: the handle is opened in serialized mode and every access goes
// through the Mutex in SqliteConnection.
unsafe impl Send for SqliteInner {}

impl SqliteInner {
    /// Whether SQLite currently has a transaction open.
    fn in_transaction(&self) -> bool {
        // SAFETY: db is valid for the lifetime of the connection
        unsafe { ffi::sqlite3_get_autocommit(self.db) == 0 }
    }

    /// Open the implicit transaction when auto-commit is off.
    fn ensure_transaction(&self) -> Result<()> {
        if !self.auto_commit && !self.in_transaction() {
            exec_raw(self.db, "BEGIN DEFERRED")?;
            tracing::debug!("SQLite transaction begun");
        }
        Ok(())
    }

    fn end_transaction(&self, sql: &str) -> Result<()> {
        if self.in_transaction() {
            exec_raw(self.db, sql)?;
            tracing::debug!(statement = sql, "SQLite transaction ended");
        }
        Ok(())
    }
}

/// A connection to a SQLite database.
///
/// The handle is wrapped in a mutex so the connection is `Send + Sync` and
/// can be shared through `Arc` by a single-connection producer.
pub struct SqliteConnection {
    inner: Mutex<SqliteInner>,
    path: String,
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteConnection {
    /// Open a connection; foreign-key enforcement is switched on when
    /// the config asks for it.
    #[tracing::instrument(level = "debug", skip(config), fields(path = %config.path))]
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: "database path contains a NUL byte".to_string(),
                source: None,
            })
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = config.flags.to_sqlite_flags();

        // SAFETY: c_path outlives the call and db is only used on success
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let msg = if db.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: db is valid, errmsg returns a valid C string
                unsafe {
                    let msg = errmsg(db);
                    ffi::sqlite3_close(db);
                    msg
                }
            };
            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: format!("cannot open {}: {msg}", config.path),
                source: None,
            }));
        }

        if config.busy_timeout_ms > 0 {
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(db, config.busy_timeout_ms as c_int);
            }
        }

        let conn = Self {
            inner: Mutex::new(SqliteInner {
                db,
                auto_commit: true,
                read_only: config.flags.read_only,
                isolation: IsolationLevel::Serializable,
            }),
            path: config.path.clone(),
        };
        if config.foreign_keys {
            conn.execute_raw("PRAGMA foreign_keys = ON")?;
        }
        tracing::debug!(version = ffi::version(), "SQLite connection opened");
        Ok(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database.
    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&SqliteConfig::file(path))
    }

    /// Open a connection behind an `Arc`, as producers hand them out.
    pub fn open_shared(config: &SqliteConfig) -> Result<Arc<Self>> {
        Self::open(config).map(Arc::new)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, SqliteInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Execute SQL directly without preparing (DDL, multiple statements).
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        let inner = self.lock();
        inner.ensure_transaction()?;
        exec_raw(inner.db, sql)
    }

    /// Get the last insert rowid.
    pub fn last_insert_rowid(&self) -> i64 {
        let inner = self.lock();
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_last_insert_rowid(inner.db) }
    }

    /// Whether SQLite currently has a transaction open.
    pub fn in_transaction(&self) -> bool {
        self.lock().in_transaction()
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !inner.db.is_null() {
            // SAFETY: db is valid and no statement outlives a call
            unsafe {
                ffi::sqlite3_close_v2(inner.db);
            }
            inner.db = ptr::null_mut();
        }
    }
}

impl Connection for SqliteConnection {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        tracing::trace!(sql = %sql, params = params.len(), "sqlite query");
        let inner = self.lock();
        inner.ensure_transaction()?;
        let stmt = Statement::prepare(inner.db, sql)?;
        stmt.bind_all(params)?;

        // SAFETY: stmt is valid
        let col_count = unsafe { ffi::sqlite3_column_count(stmt.raw) };
        let names = (0..col_count)
            // SAFETY: index is within column_count
            .map(|i| unsafe { types::column_name(stmt.raw, i) }.unwrap_or_else(|| format!("col{i}")))
            .collect();
        let columns = Arc::new(ColumnInfo::new(names));

        let mut rows = Vec::new();
        loop {
            // SAFETY: stmt is valid
            match unsafe { ffi::sqlite3_step(stmt.raw) } {
                ffi::SQLITE_ROW => {
                    let values = (0..col_count)
                        // SAFETY: the statement just returned SQLITE_ROW
                        .map(|i| unsafe { types::read_column(stmt.raw, i) })
                        .collect();
                    rows.push(Row::with_columns(Arc::clone(&columns), values));
                }
                ffi::SQLITE_DONE => break,
                _ => return Err(query_error(inner.db, sql)),
            }
        }
        Ok(rows)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        tracing::trace!(sql = %sql, params = params.len(), "sqlite execute");
        let inner = self.lock();
        inner.ensure_transaction()?;
        let stmt = Statement::prepare(inner.db, sql)?;
        stmt.bind_all(params)?;

        // SAFETY: stmt is valid
        match unsafe { ffi::sqlite3_step(stmt.raw) } {
            ffi::SQLITE_DONE | ffi::SQLITE_ROW => {
                // SAFETY: db is valid
                let changes = unsafe { ffi::sqlite3_changes(inner.db) };
                Ok(u64::try_from(changes).unwrap_or(0))
            }
            _ => Err(query_error(inner.db, sql)),
        }
    }

    fn auto_commit(&self) -> Result<bool> {
        Ok(self.lock().auto_commit)
    }

    fn set_auto_commit(&self, enabled: bool) -> Result<()> {
        let mut inner = self.lock();
        if enabled && !inner.auto_commit {
            inner.end_transaction("COMMIT")?;
        }
        inner.auto_commit = enabled;
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.lock().end_transaction("COMMIT")
    }

    fn rollback(&self) -> Result<()> {
        self.lock().end_transaction("ROLLBACK")
    }

    fn is_read_only(&self) -> Result<bool> {
        Ok(self.lock().read_only)
    }

    fn set_read_only(&self, read_only: bool) -> Result<()> {
        let mut inner = self.lock();
        let pragma = if read_only {
            "PRAGMA query_only = ON"
        } else {
            "PRAGMA query_only = OFF"
        };
        exec_raw(inner.db, pragma)?;
        inner.read_only = read_only;
        Ok(())
    }

    fn isolation_level(&self) -> Result<IsolationLevel> {
        Ok(self.lock().isolation)
    }

    fn set_isolation_level(&self, level: IsolationLevel) -> Result<()> {
        let pragma = match level {
            IsolationLevel::ReadUncommitted => "PRAGMA read_uncommitted = 1",
            IsolationLevel::Serializable => "PRAGMA read_uncommitted = 0",
            other => {
                return Err(Error::unsupported(format!(
                    "SQLite cannot run at {}",
                    other.as_sql()
                )));
            }
        };
        let mut inner = self.lock();
        exec_raw(inner.db, pragma)?;
        inner.isolation = level;
        Ok(())
    }

    fn supports_isolation_level(&self, level: IsolationLevel) -> Result<bool> {
        Ok(matches!(
            level,
            IsolationLevel::ReadUncommitted | IsolationLevel::Serializable
        ))
    }

    fn supports_transactions(&self) -> Result<bool> {
        Ok(true)
    }
}

/// A prepared statement finalized on drop.
struct Statement {
    raw: *mut ffi::sqlite3_stmt,
    db: *mut ffi::sqlite3,
    sql: String,
}

impl Statement {
    fn prepare(db: *mut ffi::sqlite3, sql: &str) -> Result<Self> {
        let c_sql = CString::new(sql).map_err(|_| {
            let mut err = QueryError::new(QueryErrorKind::Syntax, "SQL contains null byte");
            err.sql = Some(sql.to_string());
            Error::Query(err)
        })?;

        let mut raw: *mut ffi::sqlite3_stmt = ptr::null_mut();
        // SAFETY: All pointers are valid
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(
                db,
                c_sql.as_ptr(),
                c_sql.as_bytes().len() as c_int,
                &mut raw,
                ptr::null_mut(),
            )
        };
        if rc != ffi::SQLITE_OK {
            return Err(query_error(db, sql));
        }
        if raw.is_null() {
            let mut err = QueryError::new(QueryErrorKind::Syntax, "empty statement");
            err.sql = Some(sql.to_string());
            return Err(Error::Query(err));
        }
        Ok(Self {
            raw,
            db,
            sql: sql.to_string(),
        })
    }

    fn bind_all(&self, params: &[Value]) -> Result<()> {
        for (i, param) in params.iter().enumerate() {
            // SAFETY: stmt is valid, index is 1-based
            let rc = unsafe { types::bind_value(self.raw, (i + 1) as c_int, param) };
            if rc != ffi::SQLITE_OK {
                let mut err = QueryError::new(
                    QueryErrorKind::Database,
                    format!(
                        "Failed to bind parameter {}: {}",
                        i + 1,
                        // SAFETY: db is valid
                        unsafe { errmsg(self.db) }
                    ),
                );
                err.sql = Some(self.sql.clone());
                err.code = Some(rc);
                return Err(Error::Query(err));
            }
        }
        Ok(())
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        // SAFETY: raw is a valid statement not yet finalized
        unsafe {
            ffi::sqlite3_finalize(self.raw);
        }
    }
}

/// # Safety
/// `db` must be a valid connection handle.
unsafe fn errmsg(db: *mut ffi::sqlite3) -> String {
    // SAFETY: errmsg returns a valid C string owned by SQLite
    unsafe { CStr::from_ptr(ffi::sqlite3_errmsg(db)) }
        .to_string_lossy()
        .into_owned()
}

fn exec_raw(db: *mut ffi::sqlite3, sql: &str) -> Result<()> {
    let c_sql = CString::new(sql).map_err(|_| {
        let mut err = QueryError::new(QueryErrorKind::Syntax, "SQL contains null byte");
        err.sql = Some(sql.to_string());
        Error::Query(err)
    })?;

    // SAFETY: All pointers are valid
    let rc = unsafe {
        ffi::sqlite3_exec(db, c_sql.as_ptr(), None, ptr::null_mut(), ptr::null_mut())
    };
    if rc != ffi::SQLITE_OK {
        return Err(query_error(db, sql));
    }
    Ok(())
}

fn query_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    // SAFETY: db is valid
    let (message, code) = unsafe { (errmsg(db), ffi::sqlite3_extended_errcode(db)) };
    let mut err = QueryError::new(error_code_to_kind(code & 0xff), message);
    err.sql = Some(sql.to_string());
    err.code = Some(code);
    err.sqlstate = sqlstate_for(code).map(str::to_string);
    Error::Query(err)
}

fn error_code_to_kind(code: c_int) -> QueryErrorKind {
    match code {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Busy,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH | ffi::SQLITE_READONLY => QueryErrorKind::Permission,
        ffi::SQLITE_NOTFOUND => QueryErrorKind::NotFound,
        ffi::SQLITE_TOOBIG => QueryErrorKind::DataTruncation,
        ffi::SQLITE_INTERRUPT => QueryErrorKind::Cancelled,
        ffi::SQLITE_ERROR => QueryErrorKind::Syntax,
        _ => QueryErrorKind::Database,
    }
}

/// SQLSTATE equivalents of SQLite's extended constraint codes.
fn sqlstate_for(code: c_int) -> Option<&'static str> {
    match code {
        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => Some("23505"),
        ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Some("23503"),
        ffi::SQLITE_CONSTRAINT_NOTNULL => Some("23502"),
        ffi::SQLITE_CONSTRAINT_CHECK => Some("23514"),
        _ => None,
    }
}
