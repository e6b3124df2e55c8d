//! Table definition: the registered columns plus table wide settings.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::column::ColumnRegistry;
use crate::filter::SearchType;
use crate::sql::FieldRef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableOptions {
    /// Per-column search boxes are honored
    pub individual_filtering: bool,
    pub global_search_type: SearchType,
    pub search_in_non_visible_columns: bool,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            individual_filtering: false,
            global_search_type: SearchType::Like,
            search_in_non_visible_columns: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    /// `None` behaves like `Some(true)`
    pub paging: Option<bool>,
}

impl Features {
    pub fn paging_enabled(&self) -> bool {
        self.paging.unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AjaxOptions {
    pub url: Option<String>,
    pub method: String,
    /// Number of pages the client prefetches; 0 disables pipelining
    pub pipeline: u32,
}

impl Default for AjaxOptions {
    fn default() -> Self {
        Self { url: None, method: "GET".to_string(), pipeline: 0 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultCache {
    pub enabled: bool,
    /// Seconds; `None` keeps entries until evicted
    pub lifetime: Option<u64>,
    pub cache_id: Option<String>,
}

impl ResultCache {
    pub fn enabled(lifetime: Option<u64>, cache_id: Option<&str>) -> Self {
        Self { enabled: true, lifetime, cache_id: cache_id.map(str::to_string) }
    }
}

/// Cache toggles, forwarded untouched to the execution primitive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub use_query_cache: bool,
    pub use_count_query_cache: bool,
    pub use_result_cache: ResultCache,
    pub use_count_result_cache: ResultCache,
}

/// Settings a deployment applies to every table it defines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableDefaults {
    pub options: TableOptions,
    pub features: Features,
    pub ajax: AjaxOptions,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct TableDefinition {
    name: String,
    registry: Arc<ColumnRegistry>,
    pub options: TableOptions,
    pub features: Features,
    pub ajax: AjaxOptions,
    pub cache: CacheSettings,
    base_predicates: Vec<String>,
    group_by: Vec<FieldRef>,
}

impl TableDefinition {
    pub fn new(name: &str, registry: ColumnRegistry) -> Self {
        Self::with_defaults(name, registry, TableDefaults::default())
    }

    pub fn with_defaults(name: &str, registry: ColumnRegistry, defaults: TableDefaults) -> Self {
        Self {
            name: name.to_string(),
            registry: Arc::new(registry),
            options: defaults.options,
            features: defaults.features,
            ajax: defaults.ajax,
            cache: defaults.cache,
            base_predicates: Vec::new(),
            group_by: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &ColumnRegistry {
        &self.registry
    }

    pub fn shared_registry(&self) -> Arc<ColumnRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn with_options(mut self, options: TableOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    pub fn with_ajax(mut self, ajax: AjaxOptions) -> Self {
        self.ajax = ajax;
        self
    }

    pub fn with_cache(mut self, cache: CacheSettings) -> Self {
        self.cache = cache;
        self
    }

    /// Restricts every query of this table, counts included.
    pub fn where_raw(mut self, sql: &str) -> Self {
        self.base_predicates.push(sql.to_string());
        self
    }

    /// Groups the base query; counts then go through materialized rows.
    pub fn group_by(mut self, field: &str) -> Self {
        self.group_by.push(FieldRef::parse(field));
        self
    }

    pub fn base_predicates(&self) -> &[String] {
        &self.base_predicates
    }

    pub fn group_by_fields(&self) -> &[FieldRef] {
        &self.group_by
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::blog_schema;

    #[test]
    fn defaults_deserialize_from_partial_input() {
        let defaults: TableDefaults = serde_json::from_str(
            r#"{"options": {"individual_filtering": true, "global_search_type": "eq"},
                "ajax": {"pipeline": 3}}"#,
        )
        .unwrap();
        assert!(defaults.options.individual_filtering);
        assert_eq!(defaults.options.global_search_type, SearchType::Eq);
        assert_eq!(defaults.ajax.pipeline, 3);
        assert_eq!(defaults.ajax.method, "GET");
        assert!(defaults.features.paging_enabled());
    }

    #[test]
    fn base_customization() {
        let reg = ColumnRegistry::new(blog_schema(), "Post").unwrap();
        let table = TableDefinition::new("posts", reg)
            .where_raw("post.status <> 0")
            .group_by("post.id");
        assert_eq!(table.base_predicates(), ["post.status <> 0"]);
        assert_eq!(table.group_by_fields(), [FieldRef::column("post", "id")]);
    }
}
