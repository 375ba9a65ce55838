//! Result rows.
//!
//! A query returns its rows with one [`ColumnInfo`] shared between them.
//! Column lookup by name tries the exact name first and then falls back to
//! an ASCII case-insensitive match, since backends disagree on the case
//! they report unquoted identifiers in (PostgreSQL folds to lower case,
//! older engines to upper case).

use std::collections::HashMap;
use std::sync::Arc;

use crate::Result;
use crate::error::{Error, TypeError};
use crate::value::Value;

/// Ordered column names of one result set.
#[derive(Debug, Clone, Default)]
pub struct ColumnInfo {
    names: Vec<String>,
    exact: HashMap<String, usize>,
    folded: HashMap<String, usize>,
}

impl ColumnInfo {
    pub fn new(names: Vec<String>) -> Self {
        let mut exact = HashMap::with_capacity(names.len());
        let mut folded = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            exact.entry(name.clone()).or_insert(i);
            folded.entry(name.to_ascii_lowercase()).or_insert(i);
        }
        Self {
            names,
            exact,
            folded,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Position of `name`; the first column wins when names repeat.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.exact
            .get(name)
            .or_else(|| self.folded.get(&name.to_ascii_lowercase()))
            .copied()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// One result row.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<ColumnInfo>,
    values: Vec<Value>,
}

impl Row {
    /// Build a standalone row, mostly useful in tests.
    pub fn new(names: Vec<String>, values: Vec<Value>) -> Self {
        Self::with_columns(Arc::new(ColumnInfo::new(names)), values)
    }

    /// Build a row sharing the column list of its result set.
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Convert the value at `index`.
    pub fn get_as<T: FromValue>(&self, index: usize) -> Result<T> {
        match self.get(index) {
            Some(value) => T::from_value(value),
            None => Err(Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: format!("no column at position {index} of {}", self.len()),
                column: None,
            })),
        }
    }

    /// Convert the value of column `name`. Conversion errors carry the
    /// column name.
    pub fn get_named<T: FromValue>(&self, name: &str) -> Result<T> {
        let Some(value) = self.get_by_name(name) else {
            return Err(Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: "missing column".to_string(),
                column: Some(name.to_string()),
            }));
        };
        T::from_value(value).map_err(|err| match err {
            Error::Type(type_err) => Error::Type(TypeError {
                column: Some(name.to_string()),
                ..type_err
            }),
            other => other,
        })
    }

    /// `(column, value)` pairs in select-list order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .names()
            .iter()
            .map(String::as_str)
            .zip(&self.values)
    }

    /// The row as a JSON object, one member per column.
    pub fn to_json_object(&self) -> serde_json::Map<String, serde_json::Value> {
        self.iter()
            .map(|(name, value)| (name.to_string(), value.to_json()))
            .collect()
    }
}

/// Conversion out of a column value.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch(expected: &'static str, value: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: value.type_name().to_string(),
        column: None,
    })
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| mismatch("bool", value))
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_i64().ok_or_else(|| mismatch("i64", value))
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| Error::Type(TypeError {
            expected: "i32",
            actual: format!("{wide} does not fit"),
            column: None,
        }))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_f64().ok_or_else(|| mismatch("f64", value))
    }
}

// Decimals arrive as text; reading them as String keeps every digit.
impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(text) | Value::Decimal(text) => Ok(text.clone()),
            other => Err(mismatch("String", other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        if let Value::Bytes(bytes) = value {
            Ok(bytes.clone())
        } else {
            Err(mismatch("Vec<u8>", value))
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_row() -> Row {
        Row::new(
            vec!["ID".into(), "customer".into(), "note".into()],
            vec![Value::BigInt(7), Value::Text("acme".into()), Value::Null],
        )
    }

    #[test]
    fn test_lookup_by_position_and_name() {
        let row = order_row();
        assert_eq!(row.len(), 3);
        assert_eq!(row.get(1), Some(&Value::Text("acme".into())));
        assert_eq!(row.get_by_name("ID"), Some(&Value::BigInt(7)));
        assert!(row.get_by_name("total").is_none());
        assert!(row.get(3).is_none());
    }

    #[test]
    fn test_name_lookup_ignores_case_as_fallback() {
        let row = order_row();
        assert_eq!(row.get_by_name("id"), Some(&Value::BigInt(7)));
        assert_eq!(row.get_named::<String>("CUSTOMER").unwrap(), "acme");

        let mixed = ColumnInfo::new(vec!["code".into(), "CODE".into()]);
        assert_eq!(mixed.index_of("CODE"), Some(1));
        assert_eq!(mixed.index_of("Code"), Some(0));
    }

    #[test]
    fn test_typed_access() {
        let row = order_row();
        assert_eq!(row.get_as::<i32>(0).unwrap(), 7);
        assert_eq!(row.get_named::<Option<String>>("note").unwrap(), None);
        assert!(row.get_as::<i64>(9).is_err());
        let big = Row::new(vec!["n".into()], vec![Value::BigInt(i64::MAX)]);
        assert!(big.get_as::<i32>(0).is_err());
    }

    #[test]
    fn test_conversion_error_names_column() {
        let row = order_row();
        match row.get_named::<i64>("customer") {
            Err(Error::Type(te)) => {
                assert_eq!(te.column.as_deref(), Some("customer"));
                assert_eq!(te.actual, "TEXT");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_to_json_object() {
        let obj = order_row().to_json_object();
        assert_eq!(obj["ID"], serde_json::json!(7));
        assert_eq!(obj["note"], serde_json::Value::Null);
    }
}
