//! Declared value kinds for predicate fields.

use serde::{Deserialize, Serialize};

/// The declared type of a field, which decides how its literals are quoted
/// and, for temporal kinds, at what precision the field is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ValueKind {
    Boolean,
    Integer,
    Float,
    Double,
    Money,
    /// Numeric primary/foreign key
    NumberKey,
    #[default]
    String,
    /// Textual primary/foreign key
    StringKey,
    Date,
    Time,
    Timestamp,
    /// Timestamp compared on its date part only
    TimestampCmpDateOnly,
    /// Timestamp compared on its time-of-day part only
    TimestampCmpHourOnly,
    /// Timestamp compared to the second
    TimestampCmpToSec,
    /// Timestamp compared to the minute
    TimestampCmpToMin,
}

impl ValueKind {
    /// Kinds rendered as bare numbers.
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            ValueKind::Integer
                | ValueKind::Float
                | ValueKind::Double
                | ValueKind::Money
                | ValueKind::NumberKey
        )
    }

    /// Kinds rendered as quoted, escaped text.
    pub const fn is_string(self) -> bool {
        matches!(self, ValueKind::String | ValueKind::StringKey)
    }

    /// Date, time and timestamp kinds, including the reduced-precision ones.
    pub const fn is_temporal(self) -> bool {
        matches!(
            self,
            ValueKind::Date
                | ValueKind::Time
                | ValueKind::Timestamp
                | ValueKind::TimestampCmpDateOnly
                | ValueKind::TimestampCmpHourOnly
                | ValueKind::TimestampCmpToSec
                | ValueKind::TimestampCmpToMin
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_is_disjoint() {
        let all = [
            ValueKind::Boolean,
            ValueKind::Integer,
            ValueKind::Float,
            ValueKind::Double,
            ValueKind::Money,
            ValueKind::NumberKey,
            ValueKind::String,
            ValueKind::StringKey,
            ValueKind::Date,
            ValueKind::Time,
            ValueKind::Timestamp,
            ValueKind::TimestampCmpDateOnly,
            ValueKind::TimestampCmpHourOnly,
            ValueKind::TimestampCmpToSec,
            ValueKind::TimestampCmpToMin,
        ];
        for kind in all {
            let hits = [kind.is_numeric(), kind.is_string(), kind.is_temporal()]
                .iter()
                .filter(|b| **b)
                .count();
            let expected = usize::from(kind != ValueKind::Boolean);
            assert_eq!(hits, expected, "{kind:?}");
        }
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&ValueKind::TimestampCmpToMin).unwrap();
        assert_eq!(json, "\"TimestampCmpToMin\"");
        let back: ValueKind = serde_json::from_str("\"NumberKey\"").unwrap();
        assert_eq!(back, ValueKind::NumberKey);
    }
}
