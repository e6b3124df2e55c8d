//! Per-request parameters as sent by the table client.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::sql::Direction;

/// `length` value meaning "all rows".
pub const DISABLE_PAGINATION: i64 = -1;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchParam {
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub regex: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestColumn {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub searchable: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub orderable: bool,
    #[serde(default)]
    pub search: SearchParam,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderParam {
    #[serde(deserialize_with = "lenient_usize")]
    pub column: usize,
    #[serde(default, deserialize_with = "lenient_direction")]
    pub dir: Direction,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestParams {
    /// Echo token, returned untouched
    #[serde(default, deserialize_with = "lenient_opt_i64")]
    pub draw: Option<i64>,
    #[serde(default, deserialize_with = "lenient_opt_i64")]
    pub start: Option<i64>,
    #[serde(default, deserialize_with = "lenient_opt_i64")]
    pub length: Option<i64>,
    #[serde(default)]
    pub search: Option<SearchParam>,
    #[serde(default)]
    pub columns: Vec<RequestColumn>,
    #[serde(default)]
    pub order: Vec<OrderParam>,
}

impl RequestParams {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Global search text, `None` when empty.
    pub fn global_search(&self) -> Option<&str> {
        self.search
            .as_ref()
            .map(|s| s.value.as_str())
            .filter(|v| !v.is_empty())
    }

    /// Search text of one request column, `None` when absent or empty.
    pub fn column_search(&self, index: usize) -> Option<&str> {
        self.columns
            .get(index)
            .map(|c| c.search.value.as_str())
            .filter(|v| !v.is_empty())
    }

    /// `(offset, limit)` unless `length` disables pagination or `start` is missing.
    pub fn page_window(&self) -> Option<(usize, usize)> {
        let start = self.start?;
        match self.length {
            None | Some(DISABLE_PAGINATION) => None,
            Some(length) => Some((start.max(0) as usize, length.max(0) as usize)),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Null,
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<bool, D::Error> {
    Ok(match Lenient::deserialize(d)? {
        Lenient::Bool(b) => b,
        Lenient::Int(i) => i != 0,
        Lenient::Str(s) => s == "true" || s == "1",
        Lenient::Float(_) | Lenient::Null => false,
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    Ok(match Lenient::deserialize(d)? {
        Lenient::Str(s) => s,
        Lenient::Int(i) => i.to_string(),
        Lenient::Float(f) => f.to_string(),
        Lenient::Bool(b) => b.to_string(),
        Lenient::Null => String::new(),
    })
}

fn lenient_opt_i64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<i64>, D::Error> {
    Ok(match Lenient::deserialize(d)? {
        Lenient::Int(i) => Some(i),
        Lenient::Float(f) => Some(f as i64),
        Lenient::Str(s) => s.trim().parse().ok(),
        Lenient::Bool(_) | Lenient::Null => None,
    })
}

fn lenient_usize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<usize, D::Error> {
    use serde::de::Error;
    lenient_opt_i64(d)?
        .and_then(|i| usize::try_from(i).ok())
        .ok_or_else(|| D::Error::custom("expected a column index"))
}

fn lenient_direction<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Direction, D::Error> {
    use serde::de::Error;
    match Lenient::deserialize(d)? {
        Lenient::Null => Ok(Direction::Asc),
        Lenient::Str(s) if s.trim().eq_ignore_ascii_case("asc") => Ok(Direction::Asc),
        Lenient::Str(s) if s.trim().eq_ignore_ascii_case("desc") => Ok(Direction::Desc),
        _ => Err(D::Error::custom("expected `asc` or `desc`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_client_payload_with_string_numbers() {
        let req = RequestParams::from_json(
            r#"{
                "draw": "3", "start": "20", "length": "10",
                "search": {"value": "rust", "regex": "false"},
                "columns": [
                    {"data": "title", "searchable": "true", "orderable": "true", "search": {"value": ""}},
                    {"data": 1, "orderable": "false", "search": {"value": "x"}}
                ],
                "order": [{"column": "1", "dir": "desc"}, {"column": 0}]
            }"#,
        )
        .unwrap();
        assert_eq!(req.draw, Some(3));
        assert_eq!(req.page_window(), Some((20, 10)));
        assert_eq!(req.global_search(), Some("rust"));
        assert_eq!(req.column_search(0), None);
        assert_eq!(req.column_search(1), Some("x"));
        assert_eq!(req.column_search(7), None);
        assert!(req.columns[0].orderable);
        assert!(!req.columns[1].orderable);
        assert_eq!(req.order[0], OrderParam { column: 1, dir: Direction::Desc });
        assert_eq!(req.order[1].dir, Direction::Asc);
    }

    #[test]
    fn order_direction_ignores_case() {
        let req = RequestParams::from_json(
            r#"{"order": [{"column": 0, "dir": "DESC"}, {"column": 1, "dir": "Asc"}, {"column": 2, "dir": null}]}"#,
        )
        .unwrap();
        assert_eq!(req.order[0].dir, Direction::Desc);
        assert_eq!(req.order[1].dir, Direction::Asc);
        assert_eq!(req.order[2].dir, Direction::Asc);

        assert!(RequestParams::from_json(r#"{"order": [{"column": 0, "dir": "sideways"}]}"#).is_err());
    }

    #[test]
    fn unbounded_length_disables_the_window() {
        let req = RequestParams { start: Some(40), length: Some(DISABLE_PAGINATION), ..Default::default() };
        assert_eq!(req.page_window(), None);
        let req = RequestParams { start: None, length: Some(10), ..Default::default() };
        assert_eq!(req.page_window(), None);
    }
}
