//! SQLite dialect.
//!
//! Temporal columns are stored as ISO-8601 text, so reduced-precision
//! comparisons reformat the stored text with SQLite's date functions.

use gridsql_core::Error;

use crate::dialect::{Dialect, DialectKind};
use crate::kind::ValueKind;
use crate::translate::ConstraintTranslator;

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn truncate_field(&self, kind: ValueKind, field: &str) -> String {
        match kind {
            ValueKind::TimestampCmpDateOnly => format!("date({field})"),
            ValueKind::Time | ValueKind::TimestampCmpHourOnly => format!("time({field})"),
            ValueKind::TimestampCmpToSec => format!("strftime('%Y-%m-%d %H:%M:%S', {field})"),
            ValueKind::TimestampCmpToMin => format!("strftime('%Y-%m-%d %H:%M', {field})"),
            _ => field.to_string(),
        }
    }

    fn translate_error(&self, error: Error) -> Error {
        ConstraintTranslator::new(DialectKind::Sqlite).translate(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_temporal_fields() {
        let d = SqliteDialect;
        assert_eq!(d.adj_field(ValueKind::TimestampCmpDateOnly, "ts", false), "date(ts)");
        assert_eq!(
            d.adj_field(ValueKind::TimestampCmpToMin, "ts", false),
            "strftime('%Y-%m-%d %H:%M', ts)"
        );
        assert_eq!(d.adj_field(ValueKind::Date, "d", false), "d");
        assert!(d.transaction_id_query().is_none());
    }
}
