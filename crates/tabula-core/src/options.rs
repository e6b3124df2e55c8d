//! Declarative option schemas.
//!
//! Columns and filters describe their options as `{default, allowed kinds,
//! required}` entries. A variant starts from a shared base schema and applies
//! deltas: define a new key, remove one, or override a default. Resolution is
//! strict: an unknown key or a value of a kind the schema does not allow is a
//! configuration error raised at build time.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, TabulaError};

/// JSON value kinds an option may accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Null,
    Bool,
    Integer,
    Number,
    String,
    Array,
    Object,
}

impl OptionKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            OptionKind::Null => value.is_null(),
            OptionKind::Bool => value.is_boolean(),
            OptionKind::Integer => value.is_i64() || value.is_u64(),
            OptionKind::Number => value.is_number(),
            OptionKind::String => value.is_string(),
            OptionKind::Array => value.is_array(),
            OptionKind::Object => value.is_object(),
        }
    }
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OptionKind::Null => "null",
            OptionKind::Bool => "bool",
            OptionKind::Integer => "int",
            OptionKind::Number => "number",
            OptionKind::String => "string",
            OptionKind::Array => "array",
            OptionKind::Object => "object",
        })
    }
}

#[derive(Debug, Clone)]
pub struct OptionSpec {
    pub default: Value,
    pub allowed: Vec<OptionKind>,
    pub required: bool,
    /// Closed set of accepted values, checked after the kind
    pub choices: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default)]
pub struct OptionSchema {
    specs: BTreeMap<String, OptionSpec>,
}

impl OptionSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(mut self, name: &str, default: Value, allowed: &[OptionKind]) -> Self {
        self.specs.insert(
            name.to_string(),
            OptionSpec { default, allowed: allowed.to_vec(), required: false, choices: None },
        );
        self
    }

    pub fn require(mut self, name: &str, allowed: &[OptionKind]) -> Self {
        self.specs.insert(
            name.to_string(),
            OptionSpec {
                default: Value::Null,
                allowed: allowed.to_vec(),
                required: true,
                choices: None,
            },
        );
        self
    }

    /// Restricts `name` to a set of values. No-op for unknown keys.
    pub fn choices<I, V>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        if let Some(spec) = self.specs.get_mut(name) {
            spec.choices = Some(values.into_iter().map(Into::into).collect());
        }
        self
    }

    pub fn remove(mut self, name: &str) -> Self {
        self.specs.remove(name);
        self
    }

    pub fn set_default(mut self, name: &str, default: Value) -> Self {
        if let Some(spec) = self.specs.get_mut(name) {
            spec.default = default;
        }
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    pub fn spec(&self, name: &str) -> Option<&OptionSpec> {
        self.specs.get(name)
    }

    /// Validates `given` against the schema and fills in defaults.
    pub fn resolve(&self, given: &Map<String, Value>) -> Result<ResolvedOptions> {
        if let Some(unknown) = given.keys().find(|k| !self.specs.contains_key(*k)) {
            let known: Vec<&str> = self.specs.keys().map(String::as_str).collect();
            return Err(TabulaError::config(format!(
                "unknown option `{unknown}`, expected one of: {}",
                known.join(", ")
            )));
        }

        let mut out = Map::new();
        for (name, spec) in &self.specs {
            let value = match given.get(name) {
                Some(v) => v.clone(),
                None if spec.required => {
                    return Err(TabulaError::config(format!("missing required option `{name}`")))
                }
                None => spec.default.clone(),
            };
            if !spec.allowed.is_empty() && !spec.allowed.iter().any(|k| k.matches(&value)) {
                let kinds: Vec<String> = spec.allowed.iter().map(ToString::to_string).collect();
                return Err(TabulaError::config(format!(
                    "option `{name}` expects {}, got `{value}`",
                    kinds.join(" | ")
                )));
            }
            if let Some(choices) = &spec.choices {
                if !value.is_null() && !choices.contains(&value) {
                    return Err(TabulaError::config(format!(
                        "option `{name}` does not accept `{value}`"
                    )));
                }
            }
            out.insert(name.clone(), value);
        }
        Ok(ResolvedOptions(out))
    }
}

/// Option values after validation, every schema key present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedOptions(Map<String, Value>);

impl ResolvedOptions {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    pub fn bool(&self, name: &str) -> bool {
        self.get(name).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// A string or a list of strings, as used by `order_column`/`search_column`.
    pub fn str_list(&self, name: &str) -> Option<Vec<String>> {
        match self.get(name)? {
            Value::String(s) => Some(vec![s.clone()]),
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
            ),
            _ => None,
        }
    }

    pub fn take(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name).filter(|v| !v.is_null())
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> OptionSchema {
        use OptionKind::*;
        OptionSchema::new()
            .define("title", Value::Null, &[Null, String])
            .define("searchable", json!(true), &[Bool])
            .define("join_type", json!("left"), &[String])
            .choices("join_type", ["left", "inner"])
            .define("order_column", Value::Null, &[Null, String, Array])
    }

    fn opts(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn defaults_are_filled() {
        let resolved = schema().resolve(&Map::new()).unwrap();
        assert!(resolved.bool("searchable"));
        assert_eq!(resolved.str("join_type"), Some("left"));
        assert_eq!(resolved.get("title"), None);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = schema().resolve(&opts(json!({"serchable": false}))).unwrap_err();
        assert!(matches!(err, TabulaError::ConfigError(ref m) if m.contains("serchable")));
    }

    #[test]
    fn kind_and_choice_mismatches_are_rejected() {
        assert!(schema().resolve(&opts(json!({"searchable": "yes"}))).is_err());
        assert!(schema().resolve(&opts(json!({"join_type": "outer"}))).is_err());
        assert!(schema().resolve(&opts(json!({"join_type": "inner"}))).is_ok());
    }

    #[test]
    fn deltas() {
        let s = schema()
            .remove("searchable")
            .set_default("join_type", json!("inner"))
            .require("attributes", &[OptionKind::Object]);
        assert!(!s.contains("searchable"));
        assert!(s.resolve(&opts(json!({"searchable": true}))).is_err());
        assert!(s.resolve(&Map::new()).is_err());
        let r = s.resolve(&opts(json!({"attributes": {}}))).unwrap();
        assert_eq!(r.str("join_type"), Some("inner"));
    }

    #[test]
    fn string_lists() {
        let r = schema().resolve(&opts(json!({"order_column": ["a", "b.c"]}))).unwrap();
        assert_eq!(r.str_list("order_column"), Some(vec!["a".into(), "b.c".into()]));
        let r = schema().resolve(&opts(json!({"order_column": "a"}))).unwrap();
        assert_eq!(r.str_list("order_column"), Some(vec!["a".into()]));
    }
}
