use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::kind::render_options;
use super::{ColumnDefinition, ColumnKind};
use crate::error::{Result, TabulaError};
use crate::filter::Filter;
use crate::path::DataPath;
use crate::schema::{EntityMetadata, FieldType, RelationKind, SchemaProvider};
use crate::sql::JoinKind;

/// Ordered column list of one table definition.
///
/// Columns are registered once at build time; afterwards the registry is
/// only read, so it can be shared behind an `Arc` across requests.
#[derive(Clone)]
pub struct ColumnRegistry {
    schema: Arc<dyn SchemaProvider>,
    entity: String,
    columns: Vec<ColumnDefinition>,
    names: HashMap<String, usize>,
}

impl ColumnRegistry {
    /// Fails with a schema error when `entity` is unknown.
    pub fn new(schema: Arc<dyn SchemaProvider>, entity: &str) -> Result<Self> {
        schema.entity(entity)?;
        Ok(Self {
            schema,
            entity: entity.to_string(),
            columns: Vec::new(),
            names: HashMap::new(),
        })
    }

    pub fn schema(&self) -> &dyn SchemaProvider {
        self.schema.as_ref()
    }

    pub fn entity_name(&self) -> &str {
        &self.entity
    }

    pub fn metadata(&self) -> Result<&EntityMetadata> {
        self.schema.entity(&self.entity)
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&ColumnDefinition> {
        self.columns.get(index)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Registration key to index.
    pub fn column_names(&self) -> &HashMap<String, usize> {
        &self.names
    }

    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    pub fn unique_column(&self, kind: ColumnKind) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.kind == kind && kind.is_unique())
    }

    /// Adds a column. `name` is the field path (`author.name`), the name of a
    /// virtual column, or `None` for columns without any data.
    pub fn register(
        &mut self,
        name: Option<&str>,
        kind: ColumnKind,
        options: Value,
    ) -> Result<&ColumnDefinition> {
        self.insert(name, kind, options, None)
    }

    /// Like [`Self::register`] with a filter instance that wins over the
    /// `filter` option.
    pub fn register_with_filter(
        &mut self,
        name: Option<&str>,
        kind: ColumnKind,
        options: Value,
        filter: Filter,
    ) -> Result<&ColumnDefinition> {
        self.insert(name, kind, options, Some(filter))
    }

    #[instrument(level = "debug", skip(self, options, filter), fields(entity = %self.entity))]
    fn insert(
        &mut self,
        name: Option<&str>,
        kind: ColumnKind,
        options: Value,
        filter: Option<Filter>,
    ) -> Result<&ColumnDefinition> {
        let mut column = self.build(name, kind, options, filter)?;
        let index = self.columns.len();
        column.index = index;
        self.columns.push(column);
        if let Some(name) = name {
            self.names.insert(name.to_string(), index);
        }

        if let Err(e) = self.check_uniqueness() {
            self.columns.pop();
            self.rebuild_names();
            return Err(e);
        }

        debug!(index, kind = %kind, "column registered");
        Ok(&self.columns[index])
    }

    /// Removes the first column registered under `name` and re-indexes.
    pub fn unregister(&mut self, name: &str) -> Option<ColumnDefinition> {
        let pos = self.columns.iter().position(|c| c.name.as_deref() == Some(name))?;
        let removed = self.columns.remove(pos);
        for (i, c) in self.columns.iter_mut().enumerate() {
            c.index = i;
        }
        self.rebuild_names();
        debug!(entity = %self.entity, name, "column removed");
        Some(removed)
    }

    /// At most one column per unique kind.
    pub fn check_uniqueness(&self) -> Result<()> {
        let mut seen: HashMap<ColumnKind, usize> = HashMap::new();
        for c in self.columns.iter().filter(|c| c.kind.is_unique()) {
            if let Some(first) = seen.insert(c.kind, c.index) {
                return Err(TabulaError::config(format!(
                    "unique column kind `{}` is registered twice (indexes {first} and {})",
                    c.kind, c.index
                )));
            }
        }
        Ok(())
    }

    fn rebuild_names(&mut self) {
        self.names = self
            .columns
            .iter()
            .filter_map(|c| c.name.clone().map(|n| (n, c.index)))
            .collect();
    }

    fn build(
        &self,
        name: Option<&str>,
        kind: ColumnKind,
        options: Value,
        filter: Option<Filter>,
    ) -> Result<ColumnDefinition> {
        let given = match options {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(TabulaError::config(format!(
                    "column options must be an object, got `{other}`"
                )))
            }
        };
        let mut resolved = kind.option_schema().resolve(&given)?;

        let name_path = name.map(DataPath::parse).transpose()?;
        let data = match resolved.str("data") {
            Some(d) => Some(DataPath::parse(d)?),
            None => name_path.clone(),
        };

        let custom_dql = resolved.str("dql").is_some();
        let dql = if custom_dql {
            if data.is_none() {
                return Err(TabulaError::config(
                    "a column with a custom `dql` expression needs a name",
                ));
            }
            resolved.str("dql").map(str::to_string)
        } else {
            name_path.as_ref().map(DataPath::field_path)
        };

        let type_override = resolved.str("type_of_field").map(|t| {
            t.parse::<FieldType>().unwrap_or_else(|never| match never {})
        });
        let (field_type, original_field_type, association_chain) =
            if kind.is_select_column() && !custom_dql {
                let path = dql.as_deref().ok_or_else(|| {
                    TabulaError::config(format!("`{kind}` column needs a field path"))
                })?;
                let (schema_type, chain) = self.resolve_types(path)?;
                (type_override.or(Some(schema_type.clone())), Some(schema_type), chain)
            } else {
                (type_override, None, Vec::new())
            };

        let filter = match filter {
            Some(f) => Some(f),
            None => match resolved.take("filter") {
                Some(value) => Some(Filter::from_value(&value)?),
                None => None,
            },
        };

        let join_type = match resolved.str("join_type") {
            Some("inner") => JoinKind::Inner,
            _ => JoinKind::Left,
        };

        Ok(ColumnDefinition {
            index: 0,
            kind,
            name: name.map(str::to_string),
            data,
            dql,
            custom_dql,
            field_type,
            original_field_type,
            association_chain,
            title: resolved.str("title").map(str::to_string),
            searchable: resolved.bool("searchable"),
            orderable: resolved.bool("orderable"),
            visible: resolved.bool("visible"),
            join_type,
            class_name: resolved.str("class_name").map(str::to_string),
            width: resolved.str("width").map(str::to_string),
            default_content: resolved.str("default_content").map(str::to_string),
            order_column: resolved.str_list("order_column"),
            search_column: resolved.str_list("search_column"),
            filter,
            render_options: render_options(&resolved.into_map()),
        })
    }

    /// Walks `path` one relationship at a time; returns the terminal field
    /// type and the kind of every hop.
    fn resolve_types(&self, path: &str) -> Result<(FieldType, Vec<RelationKind>)> {
        let mut meta = self.metadata()?;
        let mut chain = Vec::new();
        let mut parts: Vec<&str> = path.split('.').collect();
        let field = parts.pop().unwrap_or_default();
        for part in parts {
            let association = meta.association(part)?;
            chain.push(association.kind);
            meta = self.schema.entity(&association.target)?;
        }
        Ok((meta.field_type(field)?.clone(), chain))
    }
}

impl fmt::Debug for ColumnRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnRegistry")
            .field("entity", &self.entity)
            .field("columns", &self.columns)
            .field("names", &self.names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterStrategy, InputKind};
    use crate::fixtures::blog_schema;
    use serde_json::json;

    fn registry() -> ColumnRegistry {
        ColumnRegistry::new(blog_schema(), "Post").unwrap()
    }

    #[test]
    fn unknown_entity() {
        assert!(matches!(
            ColumnRegistry::new(blog_schema(), "Nope"),
            Err(TabulaError::SchemaError(_))
        ));
    }

    #[test]
    fn resolves_types_across_associations() {
        let mut reg = registry();
        let col = reg
            .register(Some("author.address.city"), ColumnKind::Column, Value::Null)
            .unwrap();
        assert_eq!(col.index(), 0);
        assert!(col.is_association());
        assert_eq!(col.field_type(), Some(&FieldType::String));
        assert_eq!(
            col.association_chain(),
            [RelationKind::ManyToOne, RelationKind::OneToOne]
        );

        let col = reg
            .register(Some("comments[, ].body"), ColumnKind::Column, Value::Null)
            .unwrap();
        assert_eq!(col.dql(), Some("comments.body"));
        assert_eq!(col.data_key(), "comments[, ].body");
        assert!(col.is_to_many());
        assert_eq!(reg.lookup("comments[, ].body"), Some(1));
    }

    #[test]
    fn unknown_fields_are_schema_errors() {
        let mut reg = registry();
        assert!(matches!(
            reg.register(Some("author.nope"), ColumnKind::Column, Value::Null),
            Err(TabulaError::SchemaError(_))
        ));
        assert!(matches!(
            reg.register(Some("editor.name"), ColumnKind::Column, Value::Null),
            Err(TabulaError::SchemaError(_))
        ));
        assert!(reg.is_empty());
    }

    #[test]
    fn type_of_field_keeps_original() {
        let mut reg = registry();
        let col = reg
            .register(Some("status"), ColumnKind::Column, json!({"type_of_field": "string"}))
            .unwrap();
        assert_eq!(col.field_type(), Some(&FieldType::String));
        assert_eq!(col.original_field_type(), Some(&FieldType::SmallInt));
    }

    #[test]
    fn strict_options() {
        let mut reg = registry();
        assert!(matches!(
            reg.register(Some("title"), ColumnKind::Column, json!({"sortable": true})),
            Err(TabulaError::ConfigError(_))
        ));
        assert!(matches!(
            reg.register(Some("title"), ColumnKind::Column, json!({"searchable": "no"})),
            Err(TabulaError::ConfigError(_))
        ));
        assert!(reg.register(Some("title"), ColumnKind::Column, json!([1])).is_err());
    }

    #[test]
    fn custom_dql_and_virtual_columns() {
        let mut reg = registry();
        let col = reg
            .register(
                Some("commentsCount"),
                ColumnKind::Number,
                json!({"dql": "(SELECT COUNT({c}.id) FROM comments {c} WHERE {c}.post_id = post.id)"}),
            )
            .unwrap();
        assert!(col.is_custom_dql());
        assert!(!col.is_association());
        assert_eq!(col.original_field_type(), None);
        assert_eq!(col.filter().map(|f| f.input_kind()), Some(InputKind::Number));

        let col = reg
            .register(
                Some("fullTitle"),
                ColumnKind::Virtual,
                json!({"searchable": true, "search_column": ["title", "author.name"]}),
            )
            .unwrap();
        assert!(col.is_virtual());
        assert_eq!(col.search_column().unwrap().len(), 2);

        let col = reg.register(None, ColumnKind::Action, json!({"actions": []})).unwrap();
        assert_eq!(col.data_key(), "2");
        assert!(col.filter().is_none());
        assert!(!col.is_searchable_in(true));
    }

    #[test]
    fn unique_roles_are_enforced() {
        let mut reg = registry();
        reg.register(None, ColumnKind::Action, Value::Null).unwrap();
        reg.register(None, ColumnKind::MultiSelect, Value::Null).unwrap();
        let err = reg.register(None, ColumnKind::Action, Value::Null).unwrap_err();
        assert!(matches!(err, TabulaError::ConfigError(_)));
        assert_eq!(reg.len(), 2);
        assert!(reg.check_uniqueness().is_ok());
        assert_eq!(reg.unique_column(ColumnKind::MultiSelect).map(|c| c.index()), Some(1));
    }

    #[test]
    fn unregister_reindexes() {
        let mut reg = registry();
        for name in ["id", "title", "author.name", "views"] {
            reg.register(Some(name), ColumnKind::Column, Value::Null).unwrap();
        }
        let removed = reg.unregister("title").unwrap();
        assert_eq!(removed.index(), 1);
        let indexes: Vec<_> = reg.columns().iter().map(|c| c.index()).collect();
        assert_eq!(indexes, [0, 1, 2]);
        assert_eq!(reg.lookup("title"), None);
        assert_eq!(reg.lookup("author.name"), Some(1));
        assert_eq!(reg.lookup("views"), Some(2));
        assert!(reg.unregister("title").is_none());
    }

    #[test]
    fn explicit_filter_wins() {
        #[derive(Debug)]
        struct Noop;
        impl FilterStrategy for Noop {
            fn input_kind(&self) -> InputKind {
                InputKind::Select
            }
            fn build_and_predicate(
                &self,
                acc: crate::sql::PredicateGroup,
                _term: &crate::filter::SearchTerm<'_>,
                _counter: &mut crate::filter::ParameterCounter,
            ) -> crate::sql::PredicateGroup {
                acc
            }
        }
        let mut reg = registry();
        let col = reg
            .register_with_filter(Some("title"), ColumnKind::Column, Value::Null, Filter::custom(Noop))
            .unwrap();
        assert!(matches!(col.filter(), Some(Filter::Custom(_))));
    }
}
