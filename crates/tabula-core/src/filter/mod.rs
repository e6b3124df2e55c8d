//! Filter strategies.
//!
//! A filter turns one search value for one field into predicates appended to
//! an accumulator. Global search goes through [`FilterStrategy::build_or_predicate`]
//! with the table-wide search type, per-column search through
//! [`FilterStrategy::build_and_predicate`] with the filter's own search type and
//! a shared [`ParameterCounter`] that keeps parameter names unique.

mod boolean;
mod date_range;
mod number;
mod select;
mod text;

pub use boolean::BooleanFilter;
pub use date_range::DateRangeFilter;
pub use number::NumberFilter;
pub use select::SelectFilter;
pub use text::TextFilter;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{Result, TabulaError};
use crate::options::{OptionKind, OptionSchema, ResolvedOptions};
use crate::schema::FieldType;
use crate::sql::{CompareOp, FieldRef, Param, Predicate, PredicateGroup};
use crate::value::BindValue;

/// First parameter number handed out to per-column filters.
pub const INIT_PARAMETER_COUNTER: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchType {
    Like,
    NotLike,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl SearchType {
    pub const ALL: [SearchType; 12] = [
        SearchType::Like,
        SearchType::NotLike,
        SearchType::Eq,
        SearchType::Neq,
        SearchType::Lt,
        SearchType::Lte,
        SearchType::Gt,
        SearchType::Gte,
        SearchType::In,
        SearchType::NotIn,
        SearchType::IsNull,
        SearchType::IsNotNull,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::Like => "like",
            SearchType::NotLike => "notLike",
            SearchType::Eq => "eq",
            SearchType::Neq => "neq",
            SearchType::Lt => "lt",
            SearchType::Lte => "lte",
            SearchType::Gt => "gt",
            SearchType::Gte => "gte",
            SearchType::In => "in",
            SearchType::NotIn => "notIn",
            SearchType::IsNull => "isNull",
            SearchType::IsNotNull => "isNotNull",
        }
    }
}

impl FromStr for SearchType {
    type Err = TabulaError;

    fn from_str(s: &str) -> Result<Self> {
        SearchType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| TabulaError::config(format!("unknown search type `{s}`")))
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Widget a filter asks the renderer for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Text,
    Number,
    DateRange,
    Boolean,
    Select,
}

/// Mints `p{n}` parameter names from a monotonically increasing counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterCounter(usize);

impl ParameterCounter {
    pub fn new(start: usize) -> Self {
        Self(start)
    }

    pub fn value(&self) -> usize {
        self.0
    }

    pub fn next_name(&mut self) -> String {
        let name = format!("p{}", self.0);
        self.0 += 1;
        name
    }
}

impl Default for ParameterCounter {
    fn default() -> Self {
        Self::new(INIT_PARAMETER_COUNTER)
    }
}

/// One search value aimed at one field.
#[derive(Debug, Clone, Copy)]
pub struct SearchTerm<'a> {
    pub field: &'a FieldRef,
    pub value: &'a str,
    pub field_type: Option<&'a FieldType>,
}

impl<'a> SearchTerm<'a> {
    pub fn new(field: &'a FieldRef, value: &'a str, field_type: Option<&'a FieldType>) -> Self {
        Self { field, value, field_type }
    }
}

pub trait FilterStrategy: Send + Sync + fmt::Debug {
    fn input_kind(&self) -> InputKind;

    /// OR-branch fragment for the global search.
    fn build_or_predicate(
        &self,
        mut acc: PredicateGroup,
        term: &SearchTerm<'_>,
        search_type: SearchType,
        column_index: usize,
    ) -> PredicateGroup {
        let slot = acc.len();
        let mut n = 0usize;
        let mut names = || {
            let name = if n == 0 {
                format!("g{column_index}_{slot}")
            } else {
                format!("g{column_index}_{slot}_{n}")
            };
            n += 1;
            name
        };
        if let Some(p) = search_expression(term, search_type, &mut names) {
            acc.push(p);
        }
        acc
    }

    /// AND-branch fragment for per-column search.
    fn build_and_predicate(
        &self,
        acc: PredicateGroup,
        term: &SearchTerm<'_>,
        counter: &mut ParameterCounter,
    ) -> PredicateGroup;
}

/// Closed set of built-in filters plus a user supplied strategy.
#[derive(Debug, Clone)]
pub enum Filter {
    Text(TextFilter),
    Number(NumberFilter),
    DateRange(DateRangeFilter),
    Boolean(BooleanFilter),
    Select(SelectFilter),
    Custom(Arc<dyn FilterStrategy>),
}

impl Default for Filter {
    fn default() -> Self {
        Filter::Text(TextFilter::default())
    }
}

impl Filter {
    pub fn custom(strategy: impl FilterStrategy + 'static) -> Self {
        Filter::Custom(Arc::new(strategy))
    }

    /// Builds a filter from a column's `filter` option.
    ///
    /// Accepted shapes: `"text"`, `["text", {options}]` and
    /// `{"type": "text", ...options}`.
    pub fn from_value(value: &Value) -> Result<Self> {
        let (name, options) = match value {
            Value::String(name) => (name.as_str(), Map::new()),
            Value::Array(items) => match items.as_slice() {
                [Value::String(name)] => (name.as_str(), Map::new()),
                [Value::String(name), Value::Object(opts)] => (name.as_str(), opts.clone()),
                [Value::String(name), Value::Array(a)] if a.is_empty() => (name.as_str(), Map::new()),
                _ => {
                    return Err(TabulaError::config(format!(
                        "filter must be `[name, {{options}}]`, got `{value}`"
                    )))
                }
            },
            Value::Object(map) => {
                let mut opts = map.clone();
                let name = opts
                    .remove("type")
                    .and_then(|v| v.as_str().map(str::to_string))
                    .ok_or_else(|| TabulaError::config("filter object needs a string `type`"))?;
                return Self::build(&name, &opts);
            }
            other => {
                return Err(TabulaError::config(format!("invalid filter option `{other}`")))
            }
        };
        Self::build(name, &options)
    }

    pub fn build(name: &str, options: &Map<String, Value>) -> Result<Self> {
        Ok(match name {
            "text" => Filter::Text(TextFilter::from_options(options)?),
            "number" => Filter::Number(NumberFilter::from_options(options)?),
            "daterange" | "date_range" => Filter::DateRange(DateRangeFilter::from_options(options)?),
            "boolean" => Filter::Boolean(BooleanFilter::from_options(options)?),
            "select" => Filter::Select(SelectFilter::from_options(options)?),
            other => return Err(TabulaError::config(format!("unknown filter `{other}`"))),
        })
    }

    fn strategy(&self) -> &dyn FilterStrategy {
        match self {
            Filter::Text(f) => f,
            Filter::Number(f) => f,
            Filter::DateRange(f) => f,
            Filter::Boolean(f) => f,
            Filter::Select(f) => f,
            Filter::Custom(f) => f.as_ref(),
        }
    }
}

impl FilterStrategy for Filter {
    fn input_kind(&self) -> InputKind {
        self.strategy().input_kind()
    }

    fn build_or_predicate(
        &self,
        acc: PredicateGroup,
        term: &SearchTerm<'_>,
        search_type: SearchType,
        column_index: usize,
    ) -> PredicateGroup {
        self.strategy().build_or_predicate(acc, term, search_type, column_index)
    }

    fn build_and_predicate(
        &self,
        acc: PredicateGroup,
        term: &SearchTerm<'_>,
        counter: &mut ParameterCounter,
    ) -> PredicateGroup {
        self.strategy().build_and_predicate(acc, term, counter)
    }
}

/// Options every built-in filter understands.
pub(crate) fn base_schema() -> OptionSchema {
    use OptionKind::*;
    let types: Vec<&str> = SearchType::ALL.iter().map(SearchType::as_str).collect();
    OptionSchema::new()
        .define("search_type", Value::from("like"), &[String])
        .choices("search_type", types)
        .define("initial_search", Value::Null, &[Null, String])
        .define("placeholder", Value::from(true), &[Bool])
        .define("placeholder_text", Value::Null, &[Null, String])
        .define("classes", Value::Null, &[Null, String])
        .define("cancel_button", Value::from(false), &[Bool])
}

pub(crate) fn resolved_search_type(options: &ResolvedOptions) -> Result<SearchType> {
    options.str("search_type").unwrap_or("like").parse()
}

/// `(string)(int)$v === $v` style check: no sign prefix, no leading zeros.
pub(crate) fn is_integer_literal(s: &str) -> bool {
    s.parse::<i64>().map(|i| i.to_string() == s).unwrap_or(false)
}

fn is_numeric(s: &str) -> bool {
    s.trim().parse::<f64>().map(f64::is_finite).unwrap_or(false)
}

/// Binds `raw` with the field's type, `None` when the field rejects it.
pub(crate) fn typed_value(raw: &str, field_type: Option<&FieldType>) -> Option<BindValue> {
    match field_type {
        Some(t) if t.is_floating() => {
            if !is_numeric(raw) {
                return None;
            }
            raw.trim().parse::<f64>().ok().map(BindValue::Float)
        }
        Some(t) if t.is_integral() => {
            if !is_integer_literal(raw) {
                return None;
            }
            raw.parse::<i64>().ok().map(BindValue::Int)
        }
        _ => Some(BindValue::Text(raw.to_string())),
    }
}

/// Predicate for a single search value under `search_type`.
///
/// Values the field type cannot hold yield no predicate.
pub(crate) fn search_expression(
    term: &SearchTerm<'_>,
    search_type: SearchType,
    names: &mut dyn FnMut() -> String,
) -> Option<Predicate> {
    let compare = |op: CompareOp, names: &mut dyn FnMut() -> String| {
        let value = typed_value(term.value, term.field_type)?;
        Some(Predicate::Compare { field: term.field.clone(), op, param: Param::new(names(), value) })
    };
    let field = term.field.clone();

    match search_type {
        SearchType::IsNull | SearchType::IsNotNull => Some(Predicate::IsNull {
            field,
            negated: search_type == SearchType::IsNotNull,
        }),
        SearchType::Like | SearchType::NotLike => {
            typed_value(term.value, term.field_type)?;
            Some(Predicate::Like {
                field,
                negated: search_type == SearchType::NotLike,
                param: Param::new(names(), format!("%{}%", term.value)),
            })
        }
        SearchType::In | SearchType::NotIn => {
            let params = term
                .value
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| typed_value(v, term.field_type).map(|b| Param::new(names(), b)))
                .collect::<Option<Vec<_>>>()?;
            if params.is_empty() {
                return None;
            }
            Some(Predicate::In { field, negated: search_type == SearchType::NotIn, params })
        }
        SearchType::Eq => compare(CompareOp::Eq, names),
        SearchType::Neq => compare(CompareOp::Neq, names),
        SearchType::Lt => compare(CompareOp::Lt, names),
        SearchType::Lte => compare(CompareOp::Lte, names),
        SearchType::Gt => compare(CompareOp::Gt, names),
        SearchType::Gte => compare(CompareOp::Gte, names),
    }
}

/// Shared AND path: one expression with counter-minted names.
pub(crate) fn and_expression(
    mut acc: PredicateGroup,
    term: &SearchTerm<'_>,
    search_type: SearchType,
    counter: &mut ParameterCounter,
) -> PredicateGroup {
    let mut names = || counter.next_name();
    if let Some(p) = search_expression(term, search_type, &mut names) {
        acc.push(p);
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field() -> FieldRef {
        FieldRef::column("post", "id")
    }

    #[test]
    fn search_type_names() {
        assert_eq!("notLike".parse::<SearchType>().unwrap(), SearchType::NotLike);
        assert!("contains".parse::<SearchType>().is_err());
        assert_eq!(serde_json::to_value(SearchType::IsNotNull).unwrap(), json!("isNotNull"));
    }

    #[test]
    fn counter_mints_sequential_names() {
        let mut c = ParameterCounter::default();
        assert_eq!(c.next_name(), "p100");
        assert_eq!(c.next_name(), "p101");
        assert_eq!(c.value(), 102);
    }

    #[test]
    fn integral_fields_need_integer_literals() {
        let f = field();
        let int = FieldType::Integer;
        for bad in ["abc", "1.5", "007", "+3", ""] {
            let term = SearchTerm::new(&f, bad, Some(&int));
            assert!(search_expression(&term, SearchType::Eq, &mut || "x".into()).is_none(), "{bad}");
        }
        let term = SearchTerm::new(&f, "-3", Some(&int));
        match search_expression(&term, SearchType::Eq, &mut || "x".into()) {
            Some(Predicate::Compare { param, .. }) => assert_eq!(param.value, BindValue::Int(-3)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn floating_fields_need_numbers() {
        let f = field();
        let dec = FieldType::Decimal;
        let term = SearchTerm::new(&f, "x1", Some(&dec));
        assert!(search_expression(&term, SearchType::Like, &mut || "x".into()).is_none());
        let term = SearchTerm::new(&f, "2.5", Some(&dec));
        match search_expression(&term, SearchType::Like, &mut || "x".into()) {
            Some(Predicate::Like { param, .. }) => assert_eq!(param.value, BindValue::from("%2.5%")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn in_splits_on_commas() {
        let f = FieldRef::column("post", "status");
        let term = SearchTerm::new(&f, "draft, published,", None);
        let mut c = ParameterCounter::default();
        let group = and_expression(PredicateGroup::and(), &term, SearchType::NotIn, &mut c);
        let mut binds = Vec::new();
        assert_eq!(group.to_sql(&mut binds).unwrap(), "`post`.`status` NOT IN (?, ?)");
        assert_eq!(binds[1], Param::new("p101", "published"));
    }

    #[test]
    fn global_names_are_unique_within_group() {
        let filter = Filter::default();
        let a = FieldRef::column("post", "title");
        let b = FieldRef::column("post", "body");
        let acc = PredicateGroup::or();
        let acc = filter.build_or_predicate(acc, &SearchTerm::new(&a, "x", None), SearchType::Like, 1);
        let acc = filter.build_or_predicate(acc, &SearchTerm::new(&b, "x", None), SearchType::Like, 1);
        let acc = filter.build_or_predicate(acc, &SearchTerm::new(&a, "x,y", None), SearchType::In, 2);
        let names: Vec<_> = acc.params().iter().map(|p| p.name.clone()).collect();
        assert_eq!(names, ["g1_0", "g1_1", "g2_2", "g2_2_1"]);
    }

    #[test]
    fn filter_option_shapes() {
        assert!(matches!(Filter::from_value(&json!("text")).unwrap(), Filter::Text(_)));
        assert!(matches!(
            Filter::from_value(&json!(["select", {"multiple": true}])).unwrap(),
            Filter::Select(_)
        ));
        assert!(matches!(
            Filter::from_value(&json!({"type": "daterange"})).unwrap(),
            Filter::DateRange(_)
        ));
        assert!(Filter::from_value(&json!("fuzzy")).is_err());
        assert!(Filter::from_value(&json!(["text", {"bogus": 1}])).is_err());
        assert!(Filter::from_value(&json!(["daterange", {"search_type": "eq"}])).is_err());
    }
}
