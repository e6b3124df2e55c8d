use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use tracing::debug;

use super::{base_schema, FilterStrategy, InputKind, ParameterCounter, SearchTerm};
use crate::error::{Result, TabulaError};
use crate::sql::{Param, Predicate, PredicateGroup};

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d.%m.%Y"];

/// `"<start> - <end>"` date range; the end bound covers the whole day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DateRangeFilter {
    pub initial_search: Option<String>,
}

impl DateRangeFilter {
    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let resolved = base_schema().remove("search_type").resolve(options)?;
        Ok(Self { initial_search: resolved.str("initial_search").map(str::to_string) })
    }

    /// Splits on `" - "` and parses the first two parts; anything after the
    /// second part is ignored.
    pub fn parse_range(value: &str) -> Result<(NaiveDateTime, NaiveDateTime)> {
        let mut parts = value.split(" - ");
        let (start, end) = match (parts.next(), parts.next()) {
            (Some(start), Some(end)) => (start, end),
            _ => return Err(TabulaError::parse(format!("`{value}` is not a date range"))),
        };
        let start = parse_datetime(start.trim())?;
        let end = parse_datetime(end.trim())?;
        let end = end
            .date()
            .and_hms_opt(23, 59, 59)
            .ok_or_else(|| TabulaError::parse(format!("`{value}` has no valid end of day")))?;
        Ok((start, end))
    }
}

fn parse_datetime(s: &str) -> Result<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| TabulaError::parse(format!("`{s}` is not a date")))
}

impl FilterStrategy for DateRangeFilter {
    fn input_kind(&self) -> InputKind {
        InputKind::DateRange
    }

    fn build_and_predicate(
        &self,
        mut acc: PredicateGroup,
        term: &SearchTerm<'_>,
        counter: &mut ParameterCounter,
    ) -> PredicateGroup {
        if !term.value.contains('-') {
            return acc;
        }
        match Self::parse_range(term.value) {
            Ok((start, end)) => acc.push(Predicate::Between {
                field: term.field.clone(),
                low: Param::new(counter.next_name(), start),
                high: Param::new(counter.next_name(), end),
            }),
            Err(e) => debug!(field = %term.field, error = %e, "date range filter ignored"),
        }
        acc
    }
}
