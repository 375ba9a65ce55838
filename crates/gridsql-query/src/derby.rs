//! Apache Derby dialect.

use gridsql_core::{Error, Result};

use crate::dialect::{Dialect, DialectKind, is_identifier};
use crate::kind::ValueKind;

/// Derby rendering: `UCASE`, SQL:2008 `OFFSET .. FETCH` and `TRUE`/`FALSE`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DerbyDialect;

impl Dialect for DerbyDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Derby
    }

    /// `CHAR(timestamp)` is `yyyy-mm-dd hh:mm:ss.ffffff`, so a prefix of it
    /// compares against the ISO literal at the requested precision.
    fn truncate_field(&self, kind: ValueKind, field: &str) -> String {
        match kind {
            ValueKind::TimestampCmpDateOnly => format!("DATE({field})"),
            ValueKind::Time | ValueKind::TimestampCmpHourOnly => format!("TIME({field})"),
            ValueKind::TimestampCmpToSec => format!("SUBSTR(CHAR({field}), 1, 19)"),
            ValueKind::TimestampCmpToMin => format!("SUBSTR(CHAR({field}), 1, 16)"),
            _ => field.to_string(),
        }
    }

    fn fold_case(&self, expr: &str) -> String {
        format!("UCASE({expr})")
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "TRUE" } else { "FALSE" }
    }

    fn count_query(&self, sql: &str) -> String {
        format!("SELECT COUNT(*) FROM ({sql}) FOO")
    }

    fn add_native_offset(&self, sql: &str, offset: u64, limit: u64) -> String {
        format!("{sql} OFFSET {offset} ROWS FETCH NEXT {limit} ROWS ONLY")
    }

    fn limit_to_one(&self, sql: &str) -> String {
        format!("{sql} FETCH FIRST 1 ROWS ONLY")
    }

    fn sequence_next_value(&self, name: &str) -> Result<String> {
        if !is_identifier(name) {
            return Err(Error::unsupported(format!("invalid sequence name: {name}")));
        }
        Ok(format!("VALUES NEXT VALUE FOR {name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{QuerySpec, RenderMode};
    use gridsql_core::Value;

    #[test]
    fn test_case_folding_and_booleans() {
        let d = DerbyDialect;
        assert_eq!(d.adj_field(ValueKind::String, "name", true), "UCASE(name)");
        assert_eq!(d.adj_like("name", &"ab".into(), true).unwrap(), "UCASE(name) LIKE '%AB%'");
        assert_eq!(d.adj_value(ValueKind::Boolean, &Value::Bool(false), false).unwrap(), "FALSE");
    }

    #[test]
    fn test_temporal_fields() {
        let d = DerbyDialect;
        assert_eq!(d.adj_field(ValueKind::TimestampCmpDateOnly, "ts", false), "DATE(ts)");
        assert_eq!(d.adj_field(ValueKind::TimestampCmpToMin, "ts", false), "SUBSTR(CHAR(ts), 1, 16)");
        assert_eq!(
            d.adj_value(ValueKind::TimestampCmpToMin, &"2024-03-15 13:45:30".into(), false)
                .unwrap(),
            "'2024-03-15 13:45'"
        );
    }

    #[test]
    fn test_pagination_and_single_row() {
        let spec = QuerySpec::new("a", "t").order_by("a").limit(10).offset(20);
        assert_eq!(
            spec.render(&DerbyDialect, RenderMode::FetchRows).unwrap(),
            "SELECT a FROM t ORDER BY a OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
        );
        assert_eq!(
            spec.render(&DerbyDialect, RenderMode::SingleRow).unwrap(),
            "SELECT a FROM t FETCH FIRST 1 ROWS ONLY"
        );
        assert_eq!(DerbyDialect.count_query("VALUES 1"), "SELECT COUNT(*) FROM (VALUES 1) FOO");
    }

    #[test]
    fn test_sequences() {
        let d = DerbyDialect;
        assert_eq!(d.sequence_next_value("seq_id").unwrap(), "VALUES NEXT VALUE FOR seq_id");
        assert!(d.sequence_next_value("").is_err());
        assert!(d.transaction_id_query().is_none());
    }
}
