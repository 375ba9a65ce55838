//! PostgreSQL dialect.

use gridsql_core::{Error, Result, Value};

use crate::dialect::{Dialect, DialectKind, like_pattern, quote_text};
use crate::kind::ValueKind;
use crate::translate::ConstraintTranslator;

/// PostgreSQL rendering: `ILIKE`, `date_trunc` precision and `'t'`/`'f'` booleans.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn truncate_field(&self, kind: ValueKind, field: &str) -> String {
        match kind {
            ValueKind::TimestampCmpDateOnly => format!("date_trunc('day', {field})"),
            ValueKind::Time | ValueKind::TimestampCmpHourOnly => {
                format!("to_char({field}, 'HH24:MI:SS')")
            }
            ValueKind::TimestampCmpToSec => format!("date_trunc('second', {field})"),
            ValueKind::TimestampCmpToMin => format!("date_trunc('minute', {field})"),
            _ => field.to_string(),
        }
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "'t'" } else { "'f'" }
    }

    fn adj_like(&self, field: &str, value: &Value, ignore_case: bool) -> Result<String> {
        let pattern = quote_text(&like_pattern(value)?)?;
        let op = if ignore_case { "ILIKE" } else { "LIKE" };
        Ok(format!("{} {op} {pattern}", field.trim()))
    }

    fn translate_error(&self, error: Error) -> Error {
        ConstraintTranslator::new(DialectKind::Postgres).translate(error)
    }

    fn sequence_next_value(&self, name: &str) -> Result<String> {
        Ok(format!("SELECT nextval({})", quote_text(name)?))
    }

    fn transaction_id_query(&self) -> Option<&'static str> {
        Some("SELECT txid_current()")
    }
}
