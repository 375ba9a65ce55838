//! The filter model: typed predicates, ranges, ordering and assignments
//! that render into SQL fragments through a [`Dialect`].

use gridsql_core::{Error, Result, Value};
use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::kind::ValueKind;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Like,
    ILike,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl Operator {
    /// SQL text placed between the field and the value.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Operator::Equal => "=",
            Operator::NotEqual => "<>",
            Operator::Less => "<",
            Operator::LessEqual => "<=",
            Operator::Greater => ">",
            Operator::GreaterEqual => ">=",
            Operator::Like => " LIKE ",
            Operator::ILike => " ILIKE ",
            Operator::In => " IN ",
            Operator::NotIn => " NOT IN ",
            Operator::IsNull => " IS NULL",
            Operator::IsNotNull => " IS NOT NULL",
        }
    }

    /// NULL tests take no value.
    pub const fn is_null_test(self) -> bool {
        matches!(self, Operator::IsNull | Operator::IsNotNull)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub const fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// One typed comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub field: String,
    pub op: Operator,
    pub value: Value,
    pub kind: ValueKind,
}

/// An inclusive range; a NULL bound leaves that side open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Between {
    pub field: String,
    pub low: Value,
    pub high: Value,
    pub kind: ValueKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTerm {
    pub field: String,
    pub direction: SortDirection,
}

/// A `field = value` pair for INSERT and UPDATE statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub field: String,
    pub value: Value,
    pub kind: ValueKind,
}

/// A structured set of clauses layered over a query.
///
/// Each part renders independently; empty parts render as `None` so the
/// caller can decide whether a keyword is needed at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub select: Vec<String>,
    pub predicates: Vec<Predicate>,
    pub between: Vec<Between>,
    pub free_where: Vec<String>,
    pub order_by: Vec<OrderTerm>,
    pub updates: Vec<Assignment>,
    pub inserts: Vec<Assignment>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a comparison.
    ///
    /// NULL tests ignore `value`; every other operator needs a non-NULL value.
    pub fn add_where(
        &mut self,
        field: impl Into<String>,
        op: Operator,
        value: impl Into<Value>,
        kind: ValueKind,
    ) -> Result<&mut Self> {
        let field = field.into();
        let value = if op.is_null_test() {
            Value::Null
        } else {
            value.into()
        };
        if value.is_null() && !op.is_null_test() {
            return Err(Error::unsupported(format!(
                "predicate on {field} with{}needs a value",
                op.as_sql()
            )));
        }
        self.predicates.push(Predicate {
            field,
            op,
            value,
            kind,
        });
        Ok(self)
    }

    /// Add an inclusive range; if both bounds are NULL nothing is rendered.
    pub fn add_between(
        &mut self,
        field: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
        kind: ValueKind,
    ) -> &mut Self {
        self.between.push(Between {
            field: field.into(),
            low: low.into(),
            high: high.into(),
            kind,
        });
        self
    }

    /// Add a raw WHERE statement; it is parenthesized when rendered.
    pub fn add_free_where(&mut self, statement: impl Into<String>) -> &mut Self {
        self.free_where.push(statement.into());
        self
    }

    pub fn add_order_by(&mut self, field: impl Into<String>, direction: SortDirection) -> &mut Self {
        self.order_by.push(OrderTerm {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn add_select(&mut self, expr: impl Into<String>) -> &mut Self {
        self.select.push(expr.into());
        self
    }

    pub fn add_update(
        &mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
        kind: ValueKind,
    ) -> &mut Self {
        self.updates.push(Assignment {
            field: field.into(),
            value: value.into(),
            kind,
        });
        self
    }

    pub fn add_insert(
        &mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
        kind: ValueKind,
    ) -> &mut Self {
        self.inserts.push(Assignment {
            field: field.into(),
            value: value.into(),
            kind,
        });
        self
    }

    /// Whether rendering the WHERE part could produce anything.
    pub fn has_where(&self) -> bool {
        !self.predicates.is_empty() || !self.between.is_empty() || !self.free_where.is_empty()
    }

    pub fn has_order_by(&self) -> bool {
        !self.order_by.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.select.is_empty()
            && !self.has_where()
            && !self.has_order_by()
            && self.updates.is_empty()
            && self.inserts.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Render the WHERE fragment (without the keyword).
    ///
    /// Fragments are joined with ` AND `. Predicates without a value (NULL,
    /// unless the operator is a NULL test), membership tests with an empty
    /// list and ranges with two open bounds are skipped.
    pub fn render_where(&self, dialect: &dyn Dialect, ignore_case: bool) -> Result<Option<String>> {
        let mut parts = Vec::new();

        for p in &self.predicates {
            if !p.op.is_null_test() && p.value.is_null() {
                continue;
            }
            if matches!(p.op, Operator::In | Operator::NotIn)
                && matches!(&p.value, Value::Array(items) if items.is_empty())
            {
                continue;
            }
            parts.push(dialect.adj_field_value(p.kind, &p.field, p.op, &p.value, ignore_case)?);
        }

        for b in &self.between {
            let field = dialect.adj_field(b.kind, &b.field, ignore_case);
            let low = if b.low.is_null() {
                None
            } else {
                Some(format!(
                    "{field}>={}",
                    dialect.adj_value(b.kind, &b.low, ignore_case)?
                ))
            };
            let high = if b.high.is_null() {
                None
            } else {
                Some(format!(
                    "{field}<={}",
                    dialect.adj_value(b.kind, &b.high, ignore_case)?
                ))
            };
            match (low, high) {
                (Some(low), Some(high)) => parts.push(format!("({low} AND {high})")),
                (Some(one), None) | (None, Some(one)) => parts.push(one),
                (None, None) => {}
            }
        }

        for stmt in &self.free_where {
            let stmt = stmt.trim();
            if !stmt.is_empty() {
                parts.push(format!("({stmt})"));
            }
        }

        Ok(if parts.is_empty() {
            None
        } else {
            Some(parts.join(" AND "))
        })
    }

    /// Render the ORDER BY list (without the keyword).
    pub fn render_order_by(&self) -> Option<String> {
        if self.order_by.is_empty() {
            return None;
        }
        Some(
            self.order_by
                .iter()
                .map(|o| format!("{} {}", o.field.trim(), o.direction.as_sql()))
                .collect::<Vec<_>>()
                .join(","),
        )
    }

    /// Render the extra select expressions.
    pub fn render_select(&self) -> Option<String> {
        if self.select.is_empty() {
            None
        } else {
            Some(self.select.join(","))
        }
    }

    /// Render `field=value` assignments for an UPDATE; NULL values are skipped.
    pub fn render_update(&self, dialect: &dyn Dialect) -> Result<Option<String>> {
        let sets = self
            .updates
            .iter()
            .filter(|a| !a.value.is_null())
            .map(|a| {
                Ok(format!(
                    "{}={}",
                    a.field.trim(),
                    dialect.adj_value(a.kind, &a.value, false)?
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(if sets.is_empty() {
            None
        } else {
            Some(sets.join(","))
        })
    }

    /// Render the column list and value list of an INSERT; NULL values are skipped.
    pub fn render_insert(&self, dialect: &dyn Dialect) -> Result<Option<(String, String)>> {
        let mut fields = Vec::new();
        let mut values = Vec::new();
        for a in self.inserts.iter().filter(|a| !a.value.is_null()) {
            fields.push(a.field.trim().to_string());
            values.push(dialect.adj_value(a.kind, &a.value, false)?);
        }
        Ok(if fields.is_empty() {
            None
        } else {
            Some((fields.join(","), values.join(",")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DialectKind;

    fn sqlite() -> &'static dyn Dialect {
        DialectKind::Sqlite.dialect()
    }

    #[test]
    fn test_empty_filter_renders_nothing() {
        let f = Filter::new();
        assert!(f.is_empty());
        assert_eq!(f.render_where(sqlite(), false).unwrap(), None);
        assert_eq!(f.render_order_by(), None);
        assert_eq!(f.render_update(sqlite()).unwrap(), None);
    }

    #[test]
    fn test_where_fragments_join_with_and() {
        let mut f = Filter::new();
        f.add_where("code", Operator::Equal, "a1", ValueKind::String)
            .unwrap()
            .add_where("qty", Operator::Greater, 3, ValueKind::Integer)
            .unwrap();
        f.add_between("price", 1.5, 9.0, ValueKind::Money);
        f.add_free_where("flag = 1");
        assert_eq!(
            f.render_where(sqlite(), true).unwrap().unwrap(),
            "UPPER(code)='A1' AND qty>3 AND (price>=1.5 AND price<=9) AND (flag = 1)"
        );
    }

    #[test]
    fn test_missing_value_rejected() {
        let mut f = Filter::new();
        assert!(f
            .add_where("code", Operator::Equal, Value::Null, ValueKind::String)
            .is_err());
        f.add_where("note", Operator::IsNotNull, "ignored", ValueKind::String)
            .unwrap();
        assert_eq!(
            f.render_where(sqlite(), false).unwrap().unwrap(),
            "note IS NOT NULL"
        );
    }

    #[test]
    fn test_null_valued_predicate_skipped() {
        let mut f = Filter::new();
        f.predicates.push(Predicate {
            field: "parent_id".into(),
            op: Operator::Equal,
            value: Value::Null,
            kind: ValueKind::Integer,
        });
        f.add_where("note", Operator::IsNull, Value::Null, ValueKind::String)
            .unwrap();
        assert_eq!(
            f.render_where(sqlite(), false).unwrap().unwrap(),
            "note IS NULL"
        );
    }

    #[test]
    fn test_empty_membership_skipped() {
        let mut f = Filter::new();
        f.add_where("id", Operator::In, Value::Array(vec![]), ValueKind::Integer)
            .unwrap()
            .add_where("site", Operator::NotIn, vec!["a", "b"], ValueKind::String)
            .unwrap();
        assert_eq!(
            f.render_where(sqlite(), false).unwrap().unwrap(),
            "site NOT IN ('a','b')"
        );
    }

    #[test]
    fn test_open_range() {
        let mut f = Filter::new();
        f.add_between("d", "2024-01-01", Value::Null, ValueKind::Date);
        f.add_between("e", Value::Null, Value::Null, ValueKind::Date);
        assert_eq!(
            f.render_where(sqlite(), false).unwrap().unwrap(),
            "d>='2024-01-01'"
        );
    }

    #[test]
    fn test_order_select_and_assignments() {
        let mut f = Filter::new();
        f.add_order_by("name", SortDirection::Asc)
            .add_order_by("id", SortDirection::Desc)
            .add_select("COUNT(*) AS n")
            .add_update("name", "Bob", ValueKind::String)
            .add_update("note", Value::Null, ValueKind::String)
            .add_insert("id", 4, ValueKind::Integer)
            .add_insert("name", "O'Neil", ValueKind::String);
        assert_eq!(f.render_order_by().unwrap(), "name ASC,id DESC");
        assert_eq!(f.render_select().unwrap(), "COUNT(*) AS n");
        assert_eq!(f.render_update(sqlite()).unwrap().unwrap(), "name='Bob'");
        assert_eq!(
            f.render_insert(sqlite()).unwrap().unwrap(),
            ("id,name".to_string(), "4,'O''Neil'".to_string())
        );
        f.clear();
        assert!(f.is_empty());
    }

    #[test]
    fn test_filter_serde_round_trip() {
        let mut f = Filter::new();
        f.add_where("code", Operator::Like, "x", ValueKind::String).unwrap();
        f.add_order_by("code", SortDirection::Desc);
        let json = serde_json::to_string(&f).unwrap();
        let back: Filter = serde_json::from_str(&json).unwrap();
        assert_eq!(back, f);
    }
}
