use serde_json::{Map, Value};

use super::{
    and_expression, base_schema, resolved_search_type, FilterStrategy, InputKind,
    ParameterCounter, SearchTerm, SearchType,
};
use crate::error::Result;
use crate::options::OptionKind;
use crate::sql::PredicateGroup;

/// Choice among fixed options. With `multiple` the submitted value is a
/// comma separated list matched with `IN`.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectFilter {
    pub search_type: SearchType,
    pub select_options: Map<String, Value>,
    pub multiple: bool,
}

impl Default for SelectFilter {
    fn default() -> Self {
        Self { search_type: SearchType::Eq, select_options: Map::new(), multiple: false }
    }
}

impl SelectFilter {
    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        use OptionKind::*;
        let mut resolved = base_schema()
            .set_default("search_type", Value::from("eq"))
            .define("select_options", Value::Object(Map::new()), &[Object])
            .define("multiple", Value::from(false), &[Bool])
            .resolve(options)?;
        let multiple = resolved.bool("multiple");
        let search_type = match resolved_search_type(&resolved)? {
            SearchType::Neq | SearchType::NotIn if multiple => SearchType::NotIn,
            _ if multiple => SearchType::In,
            other => other,
        };
        let select_options = match resolved.take("select_options") {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        Ok(Self { search_type, select_options, multiple })
    }
}

impl FilterStrategy for SelectFilter {
    fn input_kind(&self) -> InputKind {
        InputKind::Select
    }

    fn build_and_predicate(
        &self,
        acc: PredicateGroup,
        term: &SearchTerm<'_>,
        counter: &mut ParameterCounter,
    ) -> PredicateGroup {
        and_expression(acc, term, self.search_type, counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;
    use crate::sql::FieldRef;
    use serde_json::json;

    #[test]
    fn multiple_uses_in() {
        let opts = json!({"select_options": {"1": "Draft", "2": "Live"}, "multiple": true});
        let filter = SelectFilter::from_options(opts.as_object().unwrap()).unwrap();
        assert_eq!(filter.search_type, SearchType::In);
        assert_eq!(filter.select_options.len(), 2);

        let f = FieldRef::column("post", "status");
        let mut counter = ParameterCounter::default();
        let acc = filter.build_and_predicate(
            PredicateGroup::and(),
            &SearchTerm::new(&f, "1,2", Some(&FieldType::SmallInt)),
            &mut counter,
        );
        let mut binds = Vec::new();
        assert_eq!(acc.to_sql(&mut binds).unwrap(), "`post`.`status` IN (?, ?)");
        assert_eq!(counter.value(), 102);
    }

    #[test]
    fn single_choice_is_equality() {
        let filter = SelectFilter::default();
        let f = FieldRef::column("post", "status");
        let mut counter = ParameterCounter::default();
        let acc = filter.build_and_predicate(PredicateGroup::and(), &SearchTerm::new(&f, "2", None), &mut counter);
        assert_eq!(acc.to_sql(&mut Vec::new()).unwrap(), "`post`.`status` = ?");
    }
}
