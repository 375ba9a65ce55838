//! Microsoft SQL Server dialect.

use gridsql_core::{Error, Result};

use crate::dialect::{Dialect, DialectKind, is_identifier};
use crate::kind::ValueKind;

/// SQL Server rendering: `OFFSET .. FETCH` pagination and `TOP 1`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlDialect;

/// Whether `sql` has an ORDER BY at its top level. Text inside parentheses,
/// quotes and brackets does not count.
fn has_order_by(sql: &str) -> bool {
    let mut depth = 0usize;
    let mut quote = None;
    let mut top = String::with_capacity(sql.len());
    for c in sql.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    top.push(' ');
                }
                '[' => {
                    quote = Some(']');
                    top.push(' ');
                }
                '(' => {
                    depth += 1;
                    top.push(' ');
                }
                ')' => depth = depth.saturating_sub(1),
                _ if depth == 0 => top.push(c.to_ascii_uppercase()),
                _ => {}
            },
        }
    }
    top.split_whitespace()
        .collect::<Vec<_>>()
        .windows(2)
        .any(|w| w == ["ORDER", "BY"])
}

fn offset_fetch(sql: &str, offset: u64, limit: u64, ordered: bool) -> String {
    let order = if ordered { "" } else { " ORDER BY (SELECT NULL)" };
    format!("{sql}{order} OFFSET {offset} ROWS FETCH NEXT {limit} ROWS ONLY")
}

impl Dialect for MssqlDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Mssql
    }

    fn truncate_field(&self, kind: ValueKind, field: &str) -> String {
        match kind {
            ValueKind::TimestampCmpDateOnly => format!("CAST({field} AS DATE)"),
            ValueKind::Time | ValueKind::TimestampCmpHourOnly => format!("CAST({field} AS TIME)"),
            ValueKind::TimestampCmpToSec => format!("CAST({field} AS DATETIME2(0))"),
            ValueKind::TimestampCmpToMin => format!("CONVERT(VARCHAR(16), {field}, 120)"),
            _ => field.to_string(),
        }
    }

    /// `OFFSET .. FETCH` needs an ORDER BY; a neutral one is added if missing.
    fn add_native_offset(&self, sql: &str, offset: u64, limit: u64) -> String {
        offset_fetch(sql, offset, limit, has_order_by(sql))
    }

    fn paginate(&self, sql: &str, offset: u64, limit: u64, ordered: bool) -> String {
        offset_fetch(sql, offset, limit, ordered)
    }

    /// T-SQL rejects ORDER BY in a derived table without TOP.
    fn orders_derived_tables(&self) -> bool {
        false
    }

    fn limit_to_one(&self, sql: &str) -> String {
        let trimmed = sql.trim_start();
        let upper = trimmed.to_ascii_uppercase();
        if upper.starts_with("SELECT DISTINCT ") {
            format!("SELECT DISTINCT TOP 1 {}", &trimmed["SELECT DISTINCT ".len()..])
        } else if upper.starts_with("SELECT ") {
            format!("SELECT TOP 1 {}", &trimmed["SELECT ".len()..])
        } else {
            format!("SELECT TOP 1 * FROM {}", self.derived_table(sql, self.view_alias()))
        }
    }

    fn sequence_next_value(&self, name: &str) -> Result<String> {
        if !is_identifier(name) {
            return Err(Error::unsupported(format!("invalid sequence name: {name}")));
        }
        Ok(format!("SELECT NEXT VALUE FOR {name}"))
    }

    fn transaction_id_query(&self) -> Option<&'static str> {
        Some("SELECT CURRENT_TRANSACTION_ID()")
    }
}
