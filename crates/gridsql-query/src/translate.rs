//! Translation of backend constraint errors into user-facing violations.
//!
//! Only duplicate-key and foreign-key failures are translated; every other
//! error passes through untouched so nothing is silently swallowed.

use std::sync::OnceLock;

use gridsql_core::error::{ConstraintKind, ConstraintViolation, QueryError};
use gridsql_core::Error;
use regex::Regex;

use crate::dialect::DialectKind;

/// PostgreSQL SQLSTATE for a unique violation.
pub const PG_UNIQUE_VIOLATION: &str = "23505";
/// PostgreSQL SQLSTATE for a foreign key violation.
pub const PG_FOREIGN_KEY_VIOLATION: &str = "23503";

const MYSQL_DUP_ENTRY: i32 = 1062;
const MYSQL_NO_REFERENCED_ROW: i32 = 1452;

const SQLITE_CONSTRAINT_FOREIGNKEY: i32 = 787;
const SQLITE_CONSTRAINT_PRIMARYKEY: i32 = 1555;
const SQLITE_CONSTRAINT_UNIQUE: i32 = 2067;

const UNKNOWN: &str = "?";

fn key_pair_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i) ?\((.+)\)=\((.+)\)").ok())
        .as_ref()
}

fn mysql_duplicate_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)entry '(.*)' for key '([^']+)'").ok())
        .as_ref()
}

fn mysql_foreign_key_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)foreign key \(([^)]+)\)").ok())
        .as_ref()
}

/// Build the violation for a constraint kind with its user message.
pub fn violation(
    kind: ConstraintKind,
    fields: impl Into<String>,
    values: impl Into<String>,
    source: Option<QueryError>,
) -> ConstraintViolation {
    let fields = fields.into();
    let values = values.into();
    let message = match kind {
        ConstraintKind::Unique => {
            format!("value of field {fields} cannot be duplicated: {values} already in use")
        }
        ConstraintKind::ForeignKey => {
            format!("value of field {fields} is constrained: {values} is not a valid value")
        }
    };
    ConstraintViolation {
        kind,
        fields,
        values,
        message,
        source,
    }
}

/// Maps native constraint failures of one backend to [`ConstraintViolation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstraintTranslator {
    backend: DialectKind,
}

impl ConstraintTranslator {
    pub const fn new(backend: DialectKind) -> Self {
        Self { backend }
    }

    pub const fn backend(&self) -> DialectKind {
        self.backend
    }

    /// Translate `error`, or return it unchanged when it is not a
    /// recognized constraint failure.
    pub fn translate(&self, error: Error) -> Error {
        let query = match error {
            Error::Query(query) => query,
            other => return other,
        };
        let recognized = match self.backend {
            DialectKind::Postgres => Self::postgres(&query),
            DialectKind::Mysql => Self::mysql(&query),
            DialectKind::Sqlite => Self::sqlite(&query),
            DialectKind::Mssql | DialectKind::Oracle | DialectKind::Derby => None,
        };
        match recognized {
            Some((kind, fields, values)) => {
                tracing::debug!(
                    backend = %self.backend,
                    fields = %fields,
                    "Translated constraint violation"
                );
                Error::Constraint(violation(kind, fields, values, Some(query)))
            }
            None => Error::Query(query),
        }
    }

    fn postgres(query: &QueryError) -> Option<(ConstraintKind, String, String)> {
        let kind = match query.sqlstate.as_deref()? {
            PG_UNIQUE_VIOLATION => ConstraintKind::Unique,
            PG_FOREIGN_KEY_VIOLATION => ConstraintKind::ForeignKey,
            _ => return None,
        };
        let pattern = key_pair_pattern()?;
        let caps = query
            .detail
            .as_deref()
            .and_then(|d| pattern.captures(d))
            .or_else(|| pattern.captures(&query.message))?;
        Some((kind, caps[1].to_string(), caps[2].to_string()))
    }

    fn mysql(query: &QueryError) -> Option<(ConstraintKind, String, String)> {
        match query.code? {
            MYSQL_DUP_ENTRY => {
                let caps = mysql_duplicate_pattern()?.captures(&query.message)?;
                Some((ConstraintKind::Unique, caps[2].to_string(), caps[1].to_string()))
            }
            MYSQL_NO_REFERENCED_ROW => {
                let caps = mysql_foreign_key_pattern()?.captures(&query.message)?;
                let fields = caps[1].replace('`', "");
                Some((ConstraintKind::ForeignKey, fields, UNKNOWN.to_string()))
            }
            _ => None,
        }
    }

    fn sqlite(query: &QueryError) -> Option<(ConstraintKind, String, String)> {
        match query.code? {
            SQLITE_CONSTRAINT_UNIQUE | SQLITE_CONSTRAINT_PRIMARYKEY => {
                // "UNIQUE constraint failed: t.a, t.b"
                let (_, columns) = query.message.split_once("failed:")?;
                let fields = columns
                    .split(',')
                    .map(|c| {
                        let c = c.trim();
                        c.rsplit_once('.').map_or(c, |(_, col)| col)
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                Some((ConstraintKind::Unique, fields, UNKNOWN.to_string()))
            }
            SQLITE_CONSTRAINT_FOREIGNKEY => Some((
                ConstraintKind::ForeignKey,
                UNKNOWN.to_string(),
                UNKNOWN.to_string(),
            )),
            _ => None,
        }
    }
}
