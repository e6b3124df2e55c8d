use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TabulaError};
use crate::options::{OptionKind, OptionSchema};

/// Options every column understands; the rest of a resolved option map is
/// kind specific and handed to the renderer untouched.
pub const CORE_OPTIONS: &[&str] = &[
    "dql",
    "data",
    "title",
    "searchable",
    "orderable",
    "visible",
    "join_type",
    "type_of_field",
    "class_name",
    "width",
    "default_content",
    "order_column",
    "search_column",
    "filter",
];

/// Closed set of column kinds. All kinds share [`super::ColumnDefinition`];
/// the renderer picks cell behavior by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Column,
    Boolean,
    DateTime,
    Number,
    Array,
    Attribute,
    Link,
    Image,
    Virtual,
    Action,
    MultiSelect,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Column => "column",
            ColumnKind::Boolean => "boolean",
            ColumnKind::DateTime => "datetime",
            ColumnKind::Number => "number",
            ColumnKind::Array => "array",
            ColumnKind::Attribute => "attribute",
            ColumnKind::Link => "link",
            ColumnKind::Image => "image",
            ColumnKind::Virtual => "virtual",
            ColumnKind::Action => "action",
            ColumnKind::MultiSelect => "multiselect",
        }
    }

    /// Kinds backed by a selected schema field.
    pub fn is_select_column(&self) -> bool {
        !matches!(self, ColumnKind::Virtual | ColumnKind::Action | ColumnKind::MultiSelect)
    }

    /// Kinds allowed at most once per table.
    pub fn is_unique(&self) -> bool {
        matches!(self, ColumnKind::Action | ColumnKind::MultiSelect)
    }

    pub fn option_schema(&self) -> OptionSchema {
        use OptionKind::*;
        let base = base_schema();
        match self {
            ColumnKind::Column | ColumnKind::Array => base.define("editable", Value::Null, &[Null, Object]),
            ColumnKind::Boolean => base
                .set_default("filter", json!("boolean"))
                .define("true_label", Value::Null, &[Null, String])
                .define("false_label", Value::Null, &[Null, String])
                .define("true_icon", Value::Null, &[Null, String])
                .define("false_icon", Value::Null, &[Null, String])
                .define("editable", Value::Null, &[Null, Object]),
            ColumnKind::DateTime => base
                .define("date_format", json!("lll"), &[String])
                .define("timeago", json!(false), &[Bool])
                .define("editable", Value::Null, &[Null, Object]),
            ColumnKind::Number => base
                .set_default("filter", json!("number"))
                .define("formatter", Value::Null, &[Null, Object])
                .define("use_format_currency", json!(false), &[Bool])
                .define("editable", Value::Null, &[Null, Object]),
            ColumnKind::Attribute => base.define("attributes", Value::Null, &[Null, Object, Array]),
            ColumnKind::Link => base
                .define("route", Value::Null, &[Null, String])
                .define("route_params", json!({}), &[Object])
                .define("empty_value", json!(""), &[String])
                .define("text", Value::Null, &[Null, String]),
            ColumnKind::Image => base
                .require("relative_path", &[String])
                .define("imagine_filter", json!(""), &[String])
                .define("holder_url", Value::Null, &[Null, String])
                .set_default("searchable", json!(false))
                .set_default("orderable", json!(false)),
            ColumnKind::Virtual => base
                .remove("dql")
                .remove("join_type")
                .set_default("searchable", json!(false))
                .set_default("orderable", json!(false)),
            ColumnKind::Action => action_schema(base),
            ColumnKind::MultiSelect => action_schema(base)
                .define("value", json!("id"), &[String])
                .define("value_prefix", json!(false), &[Bool])
                .define("render_actions_to_id", Value::Null, &[Null, String]),
        }
    }

    /// Filter option used when the caller did not pass one.
    pub fn default_filter_option(&self) -> Value {
        self.option_schema()
            .spec("filter")
            .map(|s| s.default.clone())
            .unwrap_or(Value::Null)
    }
}

fn base_schema() -> OptionSchema {
    use OptionKind::*;
    OptionSchema::new()
        .define("dql", Value::Null, &[Null, String])
        .define("data", Value::Null, &[Null, String])
        .define("title", Value::Null, &[Null, String])
        .define("searchable", json!(true), &[Bool])
        .define("orderable", json!(true), &[Bool])
        .define("visible", json!(true), &[Bool])
        .define("join_type", json!("left"), &[String])
        .choices("join_type", ["left", "inner"])
        .define("type_of_field", Value::Null, &[Null, String])
        .define("class_name", Value::Null, &[Null, String])
        .define("width", Value::Null, &[Null, String])
        .define("default_content", Value::Null, &[Null, String])
        .define("order_column", Value::Null, &[Null, String, Array])
        .define("search_column", Value::Null, &[Null, String, Array])
        .define("filter", json!("text"), &[Null, String, Array, Object])
}

fn action_schema(base: OptionSchema) -> OptionSchema {
    use OptionKind::*;
    base.remove("dql")
        .remove("join_type")
        .remove("type_of_field")
        .remove("order_column")
        .remove("search_column")
        .remove("filter")
        .set_default("searchable", json!(false))
        .set_default("orderable", json!(false))
        .define("actions", json!([]), &[Array])
        .define("start_html", Value::Null, &[Null, String])
        .define("end_html", Value::Null, &[Null, String])
}

/// Splits resolved options into render-only entries.
pub(crate) fn render_options(resolved: &Map<String, Value>) -> Map<String, Value> {
    resolved
        .iter()
        .filter(|(k, _)| !CORE_OPTIONS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

impl FromStr for ColumnKind {
    type Err = TabulaError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "column" => ColumnKind::Column,
            "boolean" => ColumnKind::Boolean,
            "datetime" => ColumnKind::DateTime,
            "number" => ColumnKind::Number,
            "array" => ColumnKind::Array,
            "attribute" => ColumnKind::Attribute,
            "link" => ColumnKind::Link,
            "image" => ColumnKind::Image,
            "virtual" => ColumnKind::Virtual,
            "action" => ColumnKind::Action,
            "multiselect" => ColumnKind::MultiSelect,
            other => return Err(TabulaError::config(format!("unknown column kind `{other}`"))),
        })
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles() {
        assert!(ColumnKind::Action.is_unique());
        assert!(ColumnKind::MultiSelect.is_unique());
        assert!(!ColumnKind::Virtual.is_unique());
        assert!(!ColumnKind::Virtual.is_select_column());
        assert!(ColumnKind::Link.is_select_column());
    }

    #[test]
    fn per_kind_deltas() {
        let action = ColumnKind::Action.option_schema();
        assert!(!action.contains("filter"));
        assert!(action.contains("actions"));
        assert_eq!(ColumnKind::Number.default_filter_option(), json!("number"));
        assert_eq!(ColumnKind::Action.default_filter_option(), Value::Null);
        assert!(ColumnKind::Image.option_schema().resolve(&Map::new()).is_err());
    }

    #[test]
    fn render_options_exclude_core_keys() {
        let resolved = ColumnKind::DateTime.option_schema().resolve(&Map::new()).unwrap();
        let render = render_options(&resolved.into_map());
        assert_eq!(render.get("date_format"), Some(&json!("lll")));
        assert!(!render.contains_key("searchable"));
    }

    #[test]
    fn parse_names() {
        assert_eq!("MultiSelect".parse::<ColumnKind>().unwrap(), ColumnKind::MultiSelect);
        assert!("grid".parse::<ColumnKind>().is_err());
    }
}
