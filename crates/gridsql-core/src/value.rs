//! Dynamic SQL values.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::datetime;

/// One SQL value as it travels between filters, bound parameters and
/// result rows.
///
/// Temporal values use the driver's fixed epoch encoding: `Date` counts days
/// from 1970-01-01, `Time` microseconds from midnight and `Timestamp`
/// microseconds from the epoch. `Decimal` keeps its digits as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    Date(i32),
    Time(i64),
    Timestamp(i64),
    /// Right-hand side of `IN`/`NOT IN`
    Array(Vec<Value>),
}

impl Value {
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether the value is a number and renders without quotes.
    pub const fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::Int(_) | Value::BigInt(_) | Value::Float(_) | Value::Double(_) | Value::Decimal(_)
        )
    }

    /// SQL-ish name used in type errors.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::Int(_) => "INTEGER",
            Value::BigInt(_) => "BIGINT",
            Value::Float(_) => "REAL",
            Value::Double(_) => "DOUBLE",
            Value::Decimal(_) => "DECIMAL",
            Value::Text(_) => "TEXT",
            Value::Bytes(_) => "BLOB",
            Value::Date(_) => "DATE",
            Value::Time(_) => "TIME",
            Value::Timestamp(_) => "TIMESTAMP",
            Value::Array(_) => "ARRAY",
        }
    }

    /// Truthiness of integers and booleans. Text is accepted in the spellings backends commonly return
    /// (`t`/`f`, `true`/`false`, `1`/`0`, `y`/`n`).
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            Value::Int(v) => Some(*v != 0),
            Value::BigInt(v) => Some(*v != 0),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "t" | "true" | "1" | "y" | "yes" => Some(true),
                "f" | "false" | "0" | "n" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            Value::Bool(v) => Some(if *v { 1 } else { 0 }),
            _ => None,
        }
    }

    /// Widening numeric read; decimal text is parsed.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            Value::Int(v) => Some(f64::from(*v)),
            Value::BigInt(v) => Some(*v as f64),
            Value::Decimal(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Decimal(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::Text(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Convert to a `serde_json::Value`; temporal values become ISO-8601 strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(v) => serde_json::Value::Number((*v).into()),
            Value::BigInt(v) => serde_json::Value::Number((*v).into()),
            Value::Float(v) => serde_json::Number::from_f64(f64::from(*v))
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::Double(v) => serde_json::Number::from_f64(*v)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::Decimal(s) | Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::String(hex_encode(b)),
            Value::Date(d) => serde_json::Value::String(datetime::format_date(*d)),
            Value::Time(t) => serde_json::Value::String(datetime::format_time_millis(*t)),
            Value::Timestamp(ts) => {
                serde_json::Value::String(datetime::format_timestamp_millis(*ts))
            }
            Value::Array(arr) => serde_json::Value::Array(arr.iter().map(Value::to_json).collect()),
        }
    }
}

fn hex_encode(data: &[u8]) -> String {
    use std::fmt::Write;
    data.iter().fold(String::with_capacity(data.len() * 2), |mut s, b| {
        let _ = write!(s, "{:02x}", b);
        s
    })
}

/// Plain text rendering, used when a value is spliced into SQL by macros.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(v) => write!(f, "{}", v),
            Value::BigInt(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Decimal(s) | Value::Text(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "{}", hex_encode(b)),
            Value::Date(d) => write!(f, "{}", datetime::format_date(*d)),
            Value::Time(t) => write!(f, "{}", datetime::format_time_millis(*t)),
            Value::Timestamp(ts) => write!(f, "{}", datetime::format_timestamp_millis(*ts)),
            Value::Array(arr) => {
                for (i, v) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", v)?;
                }
                Ok(())
            }
        }
    }
}

macro_rules! scalar_from {
    ($($ty:ty => $make:expr),+ $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    $make(v)
                }
            }
        )+
    };
}

scalar_from! {
    bool => Value::Bool,
    i32 => Value::Int,
    i64 => Value::BigInt,
    u32 => |v| Value::BigInt(i64::from(v)),
    f32 => Value::Float,
    f64 => Value::Double,
    String => Value::Text,
    &str => |v: &str| Value::Text(v.to_owned()),
    Vec<u8> => Value::Bytes,
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// Membership lists for IN / NOT IN
macro_rules! list_from {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl From<Vec<$ty>> for Value {
                fn from(items: Vec<$ty>) -> Self {
                    Value::Array(items.into_iter().map(Value::from).collect())
                }
            }
        )+
    };
}

list_from!(i32, i64, String, &str);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_classification() {
        assert!(Value::Int(1).is_numeric());
        assert!(Value::Decimal("1.50".into()).is_numeric());
        assert!(!Value::Text("1".into()).is_numeric());
        assert!(!Value::Bool(true).is_numeric());
    }

    #[test]
    fn test_as_bool_from_text() {
        assert_eq!(Value::from("t").as_bool(), Some(true));
        assert_eq!(Value::from("FALSE").as_bool(), Some(false));
        assert_eq!(Value::from("maybe").as_bool(), None);
    }

    #[test]
    fn test_option_and_vec_conversions() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
        assert_eq!(
            Value::from(vec![1, 2]),
            Value::Array(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Date(0).to_string(), "1970-01-01");
        assert_eq!(Value::from(vec!["a", "b"]).to_string(), "a,b");
        assert_eq!(Value::Bytes(vec![0xde, 0xad]).to_string(), "dead");
        assert_eq!(Value::Null.to_string(), "NULL");
    }

    #[test]
    fn test_to_json() {
        assert_eq!(Value::BigInt(7).to_json(), serde_json::json!(7));
        assert_eq!(Value::Double(f64::NAN).to_json(), serde_json::Value::Null);
        assert_eq!(
            Value::Timestamp(86_400_000_000).to_json(),
            serde_json::json!("1970-01-02 00:00:00")
        );
    }
}
