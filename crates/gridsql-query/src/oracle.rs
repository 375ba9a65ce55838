//! Oracle dialect.
//!
//! Derived tables take their alias without `AS`, and pages are cut with
//! `ROWNUM` so the SQL also runs on releases without `OFFSET .. FETCH`.

use gridsql_core::{Error, Result, Value};

use crate::dialect::{Dialect, DialectKind, is_identifier, literal, temporal_text};
use crate::kind::ValueKind;

#[derive(Debug, Clone, Copy, Default)]
pub struct OracleDialect;

impl Dialect for OracleDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Oracle
    }

    fn truncate_field(&self, kind: ValueKind, field: &str) -> String {
        match kind {
            ValueKind::TimestampCmpDateOnly => format!("TRUNC({field})"),
            ValueKind::Time | ValueKind::TimestampCmpHourOnly => {
                format!("TO_CHAR({field}, 'HH24:MI:SS')")
            }
            ValueKind::TimestampCmpToSec => format!("CAST({field} AS DATE)"),
            ValueKind::TimestampCmpToMin => format!("TRUNC({field}, 'MI')"),
            _ => field.to_string(),
        }
    }

    /// Dates and timestamps become `TO_DATE` calls with an explicit mask so
    /// the session's `NLS_DATE_FORMAT` never matters.
    fn adj_value(&self, kind: ValueKind, value: &Value, ignore_case: bool) -> Result<String> {
        let mask = match kind {
            ValueKind::Date | ValueKind::TimestampCmpDateOnly => "YYYY-MM-DD",
            ValueKind::Timestamp | ValueKind::TimestampCmpToSec => "YYYY-MM-DD HH24:MI:SS",
            ValueKind::TimestampCmpToMin => "YYYY-MM-DD HH24:MI",
            _ => return literal(self, kind, value, ignore_case),
        };
        if value.is_null() {
            return Ok("NULL".to_string());
        }
        Ok(format!("TO_DATE('{}', '{mask}')", temporal_text(kind, value)?))
    }

    fn count_query(&self, sql: &str) -> String {
        format!("SELECT COUNT(*) FROM ({sql}) FOO")
    }

    fn derived_table(&self, sql: &str, alias: &str) -> String {
        format!("({sql}) {alias}")
    }

    fn add_native_offset(&self, sql: &str, offset: u64, limit: u64) -> String {
        format!(
            "SELECT * FROM (SELECT page_.*, ROWNUM rnum_ FROM ({sql}) page_ WHERE ROWNUM <= {}) \
             WHERE rnum_ > {offset}",
            offset.saturating_add(limit)
        )
    }

    fn limit_to_one(&self, sql: &str) -> String {
        format!("SELECT * FROM ({sql}) WHERE ROWNUM <= 1")
    }

    fn sequence_next_value(&self, name: &str) -> Result<String> {
        if !is_identifier(name) {
            return Err(Error::unsupported(format!("invalid sequence name: {name}")));
        }
        Ok(format!("SELECT {name}.NEXTVAL FROM DUAL"))
    }

    fn transaction_id_query(&self) -> Option<&'static str> {
        Some(
            "SELECT RAWTOHEX(tx.xid) FROM v$transaction tx \
             JOIN v$session s ON tx.ses_addr = s.saddr \
             WHERE s.sid = SYS_CONTEXT('USERENV', 'SID')",
        )
    }
}
