use serde_json::{Map, Value};
use tracing::debug;

use super::{
    base_schema, resolved_search_type, search_expression, FilterStrategy, InputKind,
    ParameterCounter, SearchTerm, SearchType,
};
use crate::error::Result;
use crate::schema::FieldType;
use crate::sql::PredicateGroup;

/// Yes/no toggle; accepts `1`/`true` and `0`/`false`.
#[derive(Debug, Clone, PartialEq)]
pub struct BooleanFilter {
    pub search_type: SearchType,
}

impl Default for BooleanFilter {
    fn default() -> Self {
        Self { search_type: SearchType::Eq }
    }
}

impl BooleanFilter {
    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let resolved = base_schema()
            .set_default("search_type", Value::from("eq"))
            .resolve(options)?;
        Ok(Self { search_type: resolved_search_type(&resolved)? })
    }

    fn normalize(value: &str) -> Option<&'static str> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some("1"),
            "0" | "false" | "no" | "off" => Some("0"),
            _ => None,
        }
    }
}

impl FilterStrategy for BooleanFilter {
    fn input_kind(&self) -> InputKind {
        InputKind::Boolean
    }

    fn build_and_predicate(
        &self,
        mut acc: PredicateGroup,
        term: &SearchTerm<'_>,
        counter: &mut ParameterCounter,
    ) -> PredicateGroup {
        let Some(flag) = Self::normalize(term.value) else {
            debug!(field = %term.field, value = term.value, "boolean filter ignored");
            return acc;
        };
        let ty = FieldType::Boolean;
        let normalized = SearchTerm::new(term.field, flag, Some(&ty));
        let mut names = || counter.next_name();
        if let Some(p) = search_expression(&normalized, self.search_type, &mut names) {
            acc.push(p);
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::FieldRef;
    use crate::value::BindValue;

    #[test]
    fn maps_words_to_flags() {
        let f = FieldRef::column("post", "published");
        let mut counter = ParameterCounter::default();
        let filter = BooleanFilter::default();
        let acc = filter.build_and_predicate(PredicateGroup::and(), &SearchTerm::new(&f, "true", None), &mut counter);
        let acc = filter.build_and_predicate(acc, &SearchTerm::new(&f, "maybe", None), &mut counter);
        let acc = filter.build_and_predicate(acc, &SearchTerm::new(&f, "0", None), &mut counter);
        let values: Vec<_> = acc.params().iter().map(|p| p.value.clone()).collect();
        assert_eq!(values, [BindValue::Int(1), BindValue::Int(0)]);
        assert_eq!(counter.value(), 102);
    }
}
