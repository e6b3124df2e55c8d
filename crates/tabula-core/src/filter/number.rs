use serde_json::{Map, Value};
use tracing::debug;

use super::{
    and_expression, base_schema, resolved_search_type, typed_value, FilterStrategy, InputKind,
    ParameterCounter, SearchTerm, SearchType,
};
use crate::error::Result;
use crate::options::OptionKind;
use crate::schema::FieldType;
use crate::sql::{Param, Predicate, PredicateGroup};

/// Numeric input. `"<low> - <high>"` selects an inclusive range, any other
/// value is compared with the configured search type.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberFilter {
    pub search_type: SearchType,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
}

impl Default for NumberFilter {
    fn default() -> Self {
        Self { search_type: SearchType::Eq, min: None, max: None, step: None }
    }
}

impl NumberFilter {
    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        use OptionKind::*;
        let resolved = base_schema()
            .set_default("search_type", Value::from("eq"))
            .define("min", Value::Null, &[Null, Number])
            .define("max", Value::Null, &[Null, Number])
            .define("step", Value::Null, &[Null, Number])
            .resolve(options)?;
        Ok(Self {
            search_type: resolved_search_type(&resolved)?,
            min: resolved.get("min").and_then(Value::as_f64),
            max: resolved.get("max").and_then(Value::as_f64),
            step: resolved.get("step").and_then(Value::as_f64),
        })
    }
}

impl FilterStrategy for NumberFilter {
    fn input_kind(&self) -> InputKind {
        InputKind::Number
    }

    fn build_and_predicate(
        &self,
        mut acc: PredicateGroup,
        term: &SearchTerm<'_>,
        counter: &mut ParameterCounter,
    ) -> PredicateGroup {
        let Some((low, high)) = term.value.split_once(" - ") else {
            return and_expression(acc, term, self.search_type, counter);
        };

        // untyped columns still compare numerically
        let numeric = FieldType::Float;
        let ty = term.field_type.or(Some(&numeric));
        match (typed_value(low.trim(), ty), typed_value(high.trim(), ty)) {
            (Some(low), Some(high)) => {
                acc.push(Predicate::Between {
                    field: term.field.clone(),
                    low: Param::new(counter.next_name(), low),
                    high: Param::new(counter.next_name(), high),
                });
            }
            _ => debug!(field = %term.field, value = term.value, "ignoring malformed number range"),
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::FieldRef;
    use crate::value::BindValue;

    fn run(value: &str, ty: Option<&FieldType>) -> (String, Vec<Param>) {
        let f = FieldRef::column("post", "views");
        let mut counter = ParameterCounter::default();
        let acc = NumberFilter::default().build_and_predicate(
            PredicateGroup::and(),
            &SearchTerm::new(&f, value, ty),
            &mut counter,
        );
        let mut binds = Vec::new();
        let sql = acc.to_sql(&mut binds).unwrap();
        (sql, binds)
    }

    #[test]
    fn range_becomes_between() {
        let (sql, binds) = run("10 - 20", Some(&FieldType::Integer));
        assert_eq!(sql, "`post`.`views` BETWEEN ? AND ?");
        assert_eq!(binds[0], Param::new("p100", 10i64));
        assert_eq!(binds[1], Param::new("p101", 20i64));
    }

    #[test]
    fn negative_bounds_and_untyped_fields() {
        let (_, binds) = run("-5 - 2.5", None);
        assert_eq!(binds[0].value, BindValue::Float(-5.0));
        assert_eq!(binds[1].value, BindValue::Float(2.5));
    }

    #[test]
    fn single_value_and_garbage() {
        let (sql, _) = run("42", Some(&FieldType::Integer));
        assert_eq!(sql, "`post`.`views` = ?");
        let (sql, binds) = run("a - b", Some(&FieldType::Integer));
        assert!(sql.is_empty());
        assert!(binds.is_empty());
    }
}
