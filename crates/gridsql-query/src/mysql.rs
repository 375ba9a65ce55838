//! MySQL / MariaDB dialect.

use gridsql_core::Error;

use crate::dialect::{Dialect, DialectKind};
use crate::kind::ValueKind;
use crate::translate::ConstraintTranslator;

#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDialect;

impl Dialect for MysqlDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Mysql
    }

    fn truncate_field(&self, kind: ValueKind, field: &str) -> String {
        match kind {
            ValueKind::TimestampCmpDateOnly => format!("DATE({field})"),
            ValueKind::Time | ValueKind::TimestampCmpHourOnly => format!("TIME({field})"),
            ValueKind::TimestampCmpToMin => format!("DATE_FORMAT({field},'%Y-%m-%d %H:%i')"),
            _ => field.to_string(),
        }
    }

    fn fold_case(&self, expr: &str) -> String {
        format!("UCASE({expr})")
    }

    fn count_query(&self, sql: &str) -> String {
        format!("SELECT COUNT(*) FROM ({sql}) FOO")
    }

    fn translate_error(&self, error: Error) -> Error {
        ConstraintTranslator::new(DialectKind::Mysql).translate(error)
    }

    fn transaction_id_query(&self) -> Option<&'static str> {
        Some(
            "SELECT trx_id FROM information_schema.innodb_trx \
             WHERE trx_mysql_thread_id = CONNECTION_ID()",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsql_core::Value;

    #[test]
    fn test_mysql_rendering() {
        let d = MysqlDialect;
        assert_eq!(d.adj_field(ValueKind::String, "code", true), "UCASE(code)");
        assert_eq!(d.adj_like("code", &"x".into(), true).unwrap(), "UCASE(code) LIKE '%X%'");
        assert_eq!(d.adj_field(ValueKind::TimestampCmpDateOnly, "ts", false), "DATE(ts)");
        assert_eq!(d.adj_value(ValueKind::Boolean, &Value::Bool(false), false).unwrap(), "0");
        assert_eq!(d.count_query("SELECT 1"), "SELECT COUNT(*) FROM (SELECT 1) FOO");
        assert_eq!(d.add_native_offset("SELECT 1", 0, 5), "SELECT 1 LIMIT 5 OFFSET 0");
        assert!(d.sequence_next_value("s").is_err());
    }
}
