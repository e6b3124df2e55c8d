//! Bound parameter values and materialized rows.
//!
//! Predicates never inline user input into SQL text. Every search value that
//! reaches a query travels as a [`BindValue`] attached to a named parameter,
//! and rows come back from the execution primitive as plain JSON records.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

/// Plain key/value record as returned by the execution primitive.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Format used for date/time parameters.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Coarse classification of values.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[non_exhaustive]
pub enum ValueKind {
    None,
    Bool,
    Number,
    String,
    DateTime,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            ValueKind::None => "none",
            ValueKind::Bool => "bool",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::DateTime => "datetime",
        })
    }
}

/// A value bound to a query parameter.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BindValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl BindValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            BindValue::Null => ValueKind::None,
            BindValue::Bool(_) => ValueKind::Bool,
            BindValue::Int(_) | BindValue::Float(_) => ValueKind::Number,
            BindValue::Text(_) => ValueKind::String,
            BindValue::DateTime(_) => ValueKind::DateTime,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, BindValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            BindValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            BindValue::Int(i) => Some(*i),
            BindValue::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }
}

impl fmt::Display for BindValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindValue::Null => f.write_str("NULL"),
            BindValue::Bool(b) => write!(f, "{b}"),
            BindValue::Int(i) => write!(f, "{i}"),
            BindValue::Float(x) => write!(f, "{x}"),
            BindValue::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            BindValue::DateTime(dt) => write!(f, "'{}'", dt.format(DATETIME_FORMAT)),
        }
    }
}

impl From<bool> for BindValue {
    fn from(v: bool) -> Self {
        BindValue::Bool(v)
    }
}

impl From<i64> for BindValue {
    fn from(v: i64) -> Self {
        BindValue::Int(v)
    }
}

impl From<f64> for BindValue {
    fn from(v: f64) -> Self {
        BindValue::Float(v)
    }
}

impl From<&str> for BindValue {
    fn from(v: &str) -> Self {
        BindValue::Text(v.to_string())
    }
}

impl From<String> for BindValue {
    fn from(v: String) -> Self {
        BindValue::Text(v)
    }
}

impl From<NaiveDateTime> for BindValue {
    fn from(v: NaiveDateTime) -> Self {
        BindValue::DateTime(v)
    }
}

impl<T: Into<BindValue>> From<Option<T>> for BindValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(BindValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn display_quotes_text_and_dates() {
        assert_eq!(BindValue::from("o'neil").to_string(), "'o''neil'");
        let dt = NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap();
        assert_eq!(BindValue::from(dt).to_string(), "'2024-01-31 23:59:59'");
        assert_eq!(BindValue::from(None::<i64>).to_string(), "NULL");
    }

    #[test]
    fn kinds() {
        assert_eq!(BindValue::from(1i64).kind(), ValueKind::Number);
        assert_eq!(BindValue::from(1.5f64).kind(), ValueKind::Number);
        assert_eq!(BindValue::from(true).as_i64(), Some(1));
        assert!(BindValue::Null.is_null());
    }
}
