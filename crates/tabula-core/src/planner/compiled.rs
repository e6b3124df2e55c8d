use serde::Serialize;
use std::collections::BTreeMap;

use crate::sql::Param;
use crate::table::ResultCache;
use crate::value::BindValue;

/// Cache toggles attached to one compiled query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheOptions {
    pub use_query_cache: bool,
    pub result_cache: ResultCache,
}

/// SQL text with positional `?` placeholders and the parameters in
/// placeholder order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub binds: Vec<Param>,
    pub cache: CacheOptions,
}

impl CompiledQuery {
    pub fn new(sql: String, binds: Vec<Param>, cache: CacheOptions) -> Self {
        Self { sql, binds, cache }
    }

    /// Distinct named parameters. A name shared by several placeholders always
    /// carries the same value.
    pub fn parameters(&self) -> BTreeMap<&str, &BindValue> {
        self.binds.iter().map(|p| (p.name.as_str(), &p.value)).collect()
    }

    /// Key for result caching: the cache id when set, else the SQL and its values.
    pub fn cache_key(&self) -> String {
        if let Some(id) = &self.cache.result_cache.cache_id {
            return id.clone();
        }
        let values: Vec<String> = self.binds.iter().map(|p| p.value.to_string()).collect();
        format!("{}|{}", self.sql, values.join(","))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CountStrategy {
    /// The query returns the count as a single value
    Scalar,
    /// The query is grouped; the count is the number of returned rows
    MaterializedRows,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountQuery {
    pub query: CompiledQuery,
    pub strategy: CountStrategy,
}
