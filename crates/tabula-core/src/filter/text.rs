use serde_json::{Map, Value};

use super::{
    and_expression, base_schema, resolved_search_type, FilterStrategy, InputKind,
    ParameterCounter, SearchTerm, SearchType,
};
use crate::error::Result;
use crate::sql::PredicateGroup;

/// Free text input compared with the configured search type.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFilter {
    pub search_type: SearchType,
    pub initial_search: Option<String>,
}

impl Default for TextFilter {
    fn default() -> Self {
        Self { search_type: SearchType::Like, initial_search: None }
    }
}

impl TextFilter {
    pub fn new(search_type: SearchType) -> Self {
        Self { search_type, ..Self::default() }
    }

    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let resolved = base_schema().resolve(options)?;
        Ok(Self {
            search_type: resolved_search_type(&resolved)?,
            initial_search: resolved.str("initial_search").map(str::to_string),
        })
    }
}

impl FilterStrategy for TextFilter {
    fn input_kind(&self) -> InputKind {
        InputKind::Text
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
