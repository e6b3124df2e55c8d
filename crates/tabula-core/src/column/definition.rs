use serde_json::{Map, Value};

use super::ColumnKind;
use crate::filter::Filter;
use crate::path::DataPath;
use crate::schema::{FieldType, RelationKind};
use crate::sql::JoinKind;

/// One column of a table definition.
///
/// Built by [`super::ColumnRegistry::register`] and read-only afterwards.
#[derive(Debug, Clone)]
pub struct ColumnDefinition {
    pub(crate) index: usize,
    pub(crate) kind: ColumnKind,
    /// Registration key, used by `lookup` and `unregister`
    pub(crate) name: Option<String>,
    pub(crate) data: Option<DataPath>,
    /// Field path or custom expression
    pub(crate) dql: Option<String>,
    pub(crate) custom_dql: bool,
    pub(crate) field_type: Option<FieldType>,
    pub(crate) original_field_type: Option<FieldType>,
    pub(crate) association_chain: Vec<RelationKind>,
    pub(crate) title: Option<String>,
    pub(crate) searchable: bool,
    pub(crate) orderable: bool,
    pub(crate) visible: bool,
    pub(crate) join_type: JoinKind,
    pub(crate) class_name: Option<String>,
    pub(crate) width: Option<String>,
    pub(crate) default_content: Option<String>,
    pub(crate) order_column: Option<Vec<String>>,
    pub(crate) search_column: Option<Vec<String>>,
    pub(crate) filter: Option<Filter>,
    pub(crate) render_options: Map<String, Value>,
}

impl ColumnDefinition {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> ColumnKind {
        self.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn data_path(&self) -> Option<&DataPath> {
        self.data.as_ref()
    }

    /// Key of the cell in a rendered row; columns without a data path use
    /// their index.
    pub fn data_key(&self) -> String {
        match &self.data {
            Some(path) => path.as_str().to_string(),
            None => self.index.to_string(),
        }
    }

    pub fn dql(&self) -> Option<&str> {
        self.dql.as_deref()
    }

    pub fn is_custom_dql(&self) -> bool {
        self.custom_dql
    }

    /// The field path crosses at least one relationship.
    pub fn is_association(&self) -> bool {
        !self.custom_dql && self.dql.as_deref().is_some_and(|d| d.contains('.'))
    }

    pub fn is_selectable(&self) -> bool {
        self.kind.is_select_column()
    }

    pub fn is_unique(&self) -> bool {
        self.kind.is_unique()
    }

    pub fn is_virtual(&self) -> bool {
        !self.custom_dql && !self.kind.is_select_column()
    }

    /// Effective type, `type_of_field` when given.
    pub fn field_type(&self) -> Option<&FieldType> {
        self.field_type.as_ref()
    }

    /// Type the schema reports for the field.
    pub fn original_field_type(&self) -> Option<&FieldType> {
        self.original_field_type.as_ref()
    }

    pub fn association_chain(&self) -> &[RelationKind] {
        &self.association_chain
    }

    /// Some hop of the field path yields many rows.
    pub fn is_to_many(&self) -> bool {
        self.association_chain.iter().any(RelationKind::is_to_many)
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn is_searchable(&self) -> bool {
        self.searchable
    }

    pub fn is_orderable(&self) -> bool {
        self.orderable
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Takes part in the WHERE clause.
    pub fn is_searchable_in(&self, search_in_non_visible: bool) -> bool {
        self.dql.is_some() && self.searchable && (search_in_non_visible || self.visible)
    }

    pub fn join_type(&self) -> JoinKind {
        self.join_type
    }

    pub fn class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    pub fn width(&self) -> Option<&str> {
        self.width.as_deref()
    }

    pub fn default_content(&self) -> Option<&str> {
        self.default_content.as_deref()
    }

    pub fn order_column(&self) -> Option<&[String]> {
        self.order_column.as_deref()
    }

    pub fn search_column(&self) -> Option<&[String]> {
        self.search_column.as_deref()
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    /// Kind specific options for the renderer.
    pub fn render_options(&self) -> &Map<String, Value> {
        &self.render_options
    }
}
