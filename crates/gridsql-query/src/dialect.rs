//! The dialect adapter: database-specific rendering of fields, literals and
//! the few clauses whose syntax differs between database families.
//!
//! A [`Dialect`] is a stateless strategy object. Callers normally obtain one
//! through [`DialectKind::dialect`] once per connection producer and reuse it
//! for every render against that connection.

use std::fmt;

use gridsql_core::datetime::{self, MICROS_PER_DAY};
use gridsql_core::error::TypeError;
use gridsql_core::{Error, Result, Value};
use serde::{Deserialize, Serialize};

use crate::derby::DerbyDialect;
use crate::filter::Operator;
use crate::kind::ValueKind;
use crate::mssql::MssqlDialect;
use crate::mysql::MysqlDialect;
use crate::oracle::OracleDialect;
use crate::postgres::PostgresDialect;
use crate::sqlite::SqliteDialect;

/// Database families with a dialect adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DialectKind {
    Postgres,
    Mysql,
    Sqlite,
    Mssql,
    Oracle,
    Derby,
}

impl DialectKind {
    /// Look a dialect up by the names drivers and configuration files use.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pgsql" => Some(DialectKind::Postgres),
            "mysql" | "mariadb" => Some(DialectKind::Mysql),
            "sqlite" | "sqlite3" => Some(DialectKind::Sqlite),
            "mssql" | "sqlserver" => Some(DialectKind::Mssql),
            "oracle" => Some(DialectKind::Oracle),
            "derby" | "javadb" => Some(DialectKind::Derby),
            _ => None,
        }
    }

    /// Canonical lowercase name.
    pub const fn name(self) -> &'static str {
        match self {
            DialectKind::Postgres => "postgres",
            DialectKind::Mysql => "mysql",
            DialectKind::Sqlite => "sqlite",
            DialectKind::Mssql => "mssql",
            DialectKind::Oracle => "oracle",
            DialectKind::Derby => "derby",
        }
    }

    /// The shared adapter instance for this family.
    pub fn dialect(self) -> &'static dyn Dialect {
        match self {
            DialectKind::Postgres => &PostgresDialect,
            DialectKind::Mysql => &MysqlDialect,
            DialectKind::Sqlite => &SqliteDialect,
            DialectKind::Mssql => &MssqlDialect,
            DialectKind::Oracle => &OracleDialect,
            DialectKind::Derby => &DerbyDialect,
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Database-specific SQL rendering.
///
/// Every method is a pure function of its arguments. Implementors supply
/// [`kind`](Self::kind) and [`truncate_field`](Self::truncate_field) and
/// override the provided methods where their syntax departs from the
/// common `LIMIT`/`UPPER` family.
pub trait Dialect: Send + Sync + fmt::Debug {
    /// Which family this adapter renders for.
    fn kind(&self) -> DialectKind;

    /// Render a temporal field at the compare precision of `kind`.
    fn truncate_field(&self, kind: ValueKind, field: &str) -> String;

    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Case-fold an expression.
    fn fold_case(&self, expr: &str) -> String {
        format!("UPPER({expr})")
    }

    /// Literal for a boolean.
    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "1" } else { "0" }
    }

    /// Render the field side of a comparison.
    ///
    /// String fields are case-folded when `ignore_case` is set, temporal
    /// fields go through [`truncate_field`](Self::truncate_field), and
    /// everything else is the trimmed name.
    fn adj_field(&self, kind: ValueKind, field: &str, ignore_case: bool) -> String {
        let field = field.trim();
        if kind.is_string() && ignore_case {
            self.fold_case(field)
        } else if kind.is_temporal() {
            self.truncate_field(kind, field)
        } else {
            field.to_string()
        }
    }

    /// Render a value as a literal of the given kind.
    fn adj_value(&self, kind: ValueKind, value: &Value, ignore_case: bool) -> Result<String> {
        literal(self, kind, value, ignore_case)
    }

    /// Render a complete predicate: `field`, operator and value.
    fn adj_field_value(
        &self,
        kind: ValueKind,
        field: &str,
        op: Operator,
        value: &Value,
        ignore_case: bool,
    ) -> Result<String> {
        match op {
            Operator::IsNull | Operator::IsNotNull => Ok(format!("{}{}", field.trim(), op.as_sql())),
            Operator::Like => self.adj_like(field, value, ignore_case),
            Operator::ILike => self.adj_like(field, value, true),
            Operator::In | Operator::NotIn => {
                let items = match value {
                    Value::Array(items) => items.as_slice(),
                    single => std::slice::from_ref(single),
                };
                if items.is_empty() {
                    return Err(Error::unsupported(format!(
                        "empty value list for{}on {}",
                        op.as_sql(),
                        field.trim()
                    )));
                }
                let rendered = items
                    .iter()
                    .map(|v| self.adj_value(kind, v, ignore_case))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!(
                    "{}{}({})",
                    self.adj_field(kind, field, ignore_case),
                    op.as_sql(),
                    rendered.join(",")
                ))
            }
            _ => Ok(format!(
                "{}{}{}",
                self.adj_field(kind, field, ignore_case),
                op.as_sql(),
                self.adj_value(kind, value, ignore_case)?
            )),
        }
    }

    /// Render a substring match of `field` against `value`.
    fn adj_like(&self, field: &str, value: &Value, ignore_case: bool) -> Result<String> {
        let pattern = like_pattern(value)?;
        if ignore_case {
            Ok(format!(
                "{} LIKE {}",
                self.fold_case(field.trim()),
                quote_text(&pattern.to_uppercase())?
            ))
        } else {
            Ok(format!("{} LIKE {}", field.trim(), quote_text(&pattern)?))
        }
    }

    /// Wrap a query so it returns its row count.
    fn count_query(&self, sql: &str) -> String {
        format!("SELECT COUNT(*) FROM ({sql}) AS FOO")
    }

    /// Alias given to a query exposed as a view.
    fn view_alias(&self) -> &'static str {
        "foo"
    }

    /// Expose `sql` as a derived table named `alias`.
    fn derived_table(&self, sql: &str, alias: &str) -> String {
        format!("({sql}) AS {alias}")
    }

    /// Append pagination.
    fn add_native_offset(&self, sql: &str, offset: u64, limit: u64) -> String {
        format!("{sql} LIMIT {limit} OFFSET {offset}")
    }

    /// Append pagination when the caller already knows whether the outer
    /// query of `sql` has an ORDER BY.
    fn paginate(&self, sql: &str, offset: u64, limit: u64, _ordered: bool) -> String {
        self.add_native_offset(sql, offset, limit)
    }

    /// Whether a derived table may keep its own ORDER BY.
    fn orders_derived_tables(&self) -> bool {
        true
    }

    /// Restrict a query to at most one row.
    fn limit_to_one(&self, sql: &str) -> String {
        format!("{sql} LIMIT 1")
    }

    /// Translate a backend error into a domain error.
    ///
    /// Errors the dialect does not recognize come back unchanged.
    fn translate_error(&self, error: Error) -> Error {
        error
    }

    /// SQL returning the next value of a sequence.
    fn sequence_next_value(&self, name: &str) -> Result<String> {
        Err(Error::unsupported(format!(
            "{} has no sequences (requested {})",
            self.name(),
            name
        )))
    }

    /// SQL returning the identifier of the current transaction, if the
    /// backend exposes one.
    fn transaction_id_query(&self) -> Option<&'static str> {
        None
    }
}

/// Literal rendering shared by every dialect: `NULL`, the dialect's boolean
/// literal, validated numbers, quoted ISO temporal text, or quoted text.
pub(crate) fn literal<D: Dialect + ?Sized>(
    dialect: &D,
    kind: ValueKind,
    value: &Value,
    ignore_case: bool,
) -> Result<String> {
    if value.is_null() {
        return Ok("NULL".to_string());
    }
    match kind {
        ValueKind::Boolean => value
            .as_bool()
            .map(|b| dialect.bool_literal(b).to_string())
            .ok_or_else(|| type_error("boolean", value)),
        k if k.is_numeric() => numeric_literal(value),
        k if k.is_temporal() => temporal_literal(k, value),
        _ => {
            let text = plain_text(value)?;
            if ignore_case {
                quote_text(&text.to_uppercase())
            } else {
                quote_text(&text)
            }
        }
    }
}

pub(crate) fn type_error(expected: &'static str, value: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: value.type_name().to_string(),
        column: None,
    })
}

/// Quote text as a SQL string literal.
///
/// The text is trimmed and single quotes are doubled. NUL bytes cannot be
/// represented safely and are rejected.
pub fn quote_text(text: &str) -> Result<String> {
    if text.contains('\0') {
        return Err(Error::Type(TypeError {
            expected: "text without NUL bytes",
            actual: "text containing NUL".to_string(),
            column: None,
        }));
    }
    Ok(format!("'{}'", text.trim().replace('\'', "''")))
}

fn plain_text(value: &Value) -> Result<String> {
    match value {
        Value::Array(_) | Value::Bytes(_) => Err(type_error("text", value)),
        other => Ok(other.to_string()),
    }
}

pub(crate) fn like_pattern(value: &Value) -> Result<String> {
    if value.is_null() {
        return Err(type_error("text", value));
    }
    Ok(format!("%{}%", plain_text(value)?.trim()))
}

/// Whether text is a plain decimal number (no `NaN`, no `inf`).
pub(crate) fn is_numeric_text(text: &str) -> bool {
    !text.is_empty()
        && text
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'))
        && text.parse::<f64>().is_ok()
}

fn numeric_literal(value: &Value) -> Result<String> {
    match value {
        Value::Int(v) => Ok(v.to_string()),
        Value::BigInt(v) => Ok(v.to_string()),
        Value::Float(v) if v.is_finite() => Ok(v.to_string()),
        Value::Double(v) if v.is_finite() => Ok(v.to_string()),
        Value::Decimal(s) | Value::Text(s) if is_numeric_text(s.trim()) => {
            Ok(s.trim().to_string())
        }
        other => Err(type_error("number", other)),
    }
}

fn temporal_literal(kind: ValueKind, value: &Value) -> Result<String> {
    Ok(format!("'{}'", temporal_text(kind, value)?))
}

/// Unquoted text of a temporal value at the compare precision of `kind`:
/// `yyyy-MM-dd`, `HH:mm:ss`, `yyyy-MM-dd HH:mm` or `yyyy-MM-dd HH:mm:ss`.
pub(crate) fn temporal_text(kind: ValueKind, value: &Value) -> Result<String> {
    let time_only = matches!(kind, ValueKind::Time | ValueKind::TimestampCmpHourOnly);
    let micros = match value {
        Value::Date(days) => i64::from(*days) * MICROS_PER_DAY,
        Value::Timestamp(ts) => *ts,
        Value::Time(t) if time_only => *t,
        Value::Text(s) if time_only => datetime::parse_time(s)
            .or_else(|| datetime::parse_timestamp(s))
            .ok_or_else(|| type_error("time", value))?,
        Value::Text(s) => datetime::parse_timestamp(s).ok_or_else(|| type_error("timestamp", value))?,
        other => return Err(type_error("date/time", other)),
    };
    let text = match kind {
        ValueKind::Date | ValueKind::TimestampCmpDateOnly => {
            let days = i32::try_from(micros.div_euclid(MICROS_PER_DAY))
                .map_err(|_| type_error("date", value))?;
            datetime::format_date(days)
        }
        ValueKind::Time | ValueKind::TimestampCmpHourOnly => datetime::format_time(micros),
        ValueKind::TimestampCmpToMin => datetime::format_timestamp_minutes(micros),
        _ => datetime::format_timestamp(micros),
    };
    Ok(text)
}

/// Whether `name` is a plain, optionally schema-qualified identifier.
pub(crate) fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}
