//! Backend schema metadata consumed by the column registry and the planner.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TabulaError};

/// Mapped type of a scalar field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    String,
    Text,
    Integer,
    SmallInt,
    BigInt,
    Decimal,
    Float,
    Boolean,
    Date,
    DateTime,
    Time,
    Json,
    Other(String),
}

impl FieldType {
    pub fn is_floating(&self) -> bool {
        matches!(self, FieldType::Decimal | FieldType::Float)
    }

    /// Types whose search values must be integer literals.
    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            FieldType::Integer | FieldType::SmallInt | FieldType::BigInt | FieldType::Boolean
        )
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, FieldType::Date | FieldType::DateTime | FieldType::Time)
    }

    pub fn as_str(&self) -> &str {
        match self {
            FieldType::String => "string",
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::SmallInt => "smallint",
            FieldType::BigInt => "bigint",
            FieldType::Decimal => "decimal",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
            FieldType::Time => "time",
            FieldType::Json => "json",
            FieldType::Other(s) => s,
        }
    }
}

impl FromStr for FieldType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "string" | "varchar" => FieldType::String,
            "text" => FieldType::Text,
            "integer" | "int" => FieldType::Integer,
            "smallint" => FieldType::SmallInt,
            "bigint" => FieldType::BigInt,
            "decimal" => FieldType::Decimal,
            "float" | "double" => FieldType::Float,
            "boolean" | "bool" => FieldType::Boolean,
            "date" | "date_immutable" => FieldType::Date,
            "datetime" | "datetime_immutable" | "datetimetz" => FieldType::DateTime,
            "time" | "time_immutable" => FieldType::Time,
            "json" => FieldType::Json,
            other => FieldType::Other(other.to_string()),
        })
    }
}

impl From<String> for FieldType {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(t) => t,
            Err(never) => match never {},
        }
    }
}

impl From<FieldType> for String {
    fn from(t: FieldType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cardinality of a relationship hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    OneToOne,
    ManyToOne,
    OneToMany,
    ManyToMany,
}

impl RelationKind {
    pub fn is_to_many(&self) -> bool {
        matches!(self, RelationKind::OneToMany | RelationKind::ManyToMany)
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RelationKind::OneToOne => "one_to_one",
            RelationKind::ManyToOne => "many_to_one",
            RelationKind::OneToMany => "one_to_many",
            RelationKind::ManyToMany => "many_to_many",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    /// DB column; defaults to the field name
    #[serde(default)]
    pub column: Option<String>,
    #[serde(rename = "type")]
    pub ty: FieldType,
    #[serde(default)]
    pub nullable: bool,
}

/// Link table of a many-to-many relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinTable {
    pub table: String,
    /// Column pointing at the owning side identifier
    pub source_column: String,
    /// Column pointing at the target identifier
    pub target_column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Association {
    pub target: String,
    pub kind: RelationKind,
    /// Column on the parent side of the join condition
    pub local_column: String,
    /// Column on the target side of the join condition
    pub foreign_column: String,
    #[serde(default)]
    pub join_table: Option<JoinTable>,
    #[serde(default = "default_owning")]
    pub owning: bool,
}

fn default_owning() -> bool {
    true
}

impl Association {
    /// `parent.<fk> = target.id`
    pub fn many_to_one(target: &str, fk: &str) -> Self {
        Self {
            target: target.to_string(),
            kind: RelationKind::ManyToOne,
            local_column: fk.to_string(),
            foreign_column: "id".to_string(),
            join_table: None,
            owning: true,
        }
    }

    pub fn one_to_one(target: &str, fk: &str) -> Self {
        Self {
            kind: RelationKind::OneToOne,
            ..Self::many_to_one(target, fk)
        }
    }

    /// `parent.id = target.<mapped_by>`
    pub fn one_to_many(target: &str, mapped_by: &str) -> Self {
        Self {
            target: target.to_string(),
            kind: RelationKind::OneToMany,
            local_column: "id".to_string(),
            foreign_column: mapped_by.to_string(),
            join_table: None,
            owning: false,
        }
    }

    pub fn many_to_many(target: &str, join_table: JoinTable) -> Self {
        Self {
            target: target.to_string(),
            kind: RelationKind::ManyToMany,
            local_column: "id".to_string(),
            foreign_column: "id".to_string(),
            join_table: Some(join_table),
            owning: true,
        }
    }
}

/// Mapping metadata for one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub name: String,
    pub table: String,
    pub identifiers: Vec<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldMapping>,
    #[serde(default)]
    pub associations: BTreeMap<String, Association>,
}

impl EntityMetadata {
    pub fn new(name: &str, table: &str) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            identifiers: Vec::new(),
            fields: BTreeMap::new(),
            associations: BTreeMap::new(),
        }
    }

    /// Declares `name` as identifier and as an integer field.
    pub fn with_identifier(mut self, name: &str) -> Self {
        self.identifiers.push(name.to_string());
        self.fields.entry(name.to_string()).or_insert(FieldMapping {
            column: None,
            ty: FieldType::Integer,
            nullable: false,
        });
        self
    }

    pub fn with_field(mut self, name: &str, ty: FieldType) -> Self {
        self.fields.insert(
            name.to_string(),
            FieldMapping { column: None, ty, nullable: false },
        );
        self
    }

    pub fn with_column(mut self, name: &str, column: &str, ty: FieldType) -> Self {
        self.fields.insert(
            name.to_string(),
            FieldMapping { column: Some(column.to_string()), ty, nullable: false },
        );
        self
    }

    pub fn with_association(mut self, name: &str, association: Association) -> Self {
        self.associations.insert(name.to_string(), association);
        self
    }

    /// Lowercased short name, e.g. `App::Entity::Post` -> `post`.
    pub fn short_name(&self) -> String {
        self.name
            .rsplit(|c: char| c == ':' || c == '\\' || c == '.')
            .next()
            .unwrap_or(&self.name)
            .to_lowercase()
    }

    /// First identifier field.
    pub fn identifier(&self) -> Result<&str> {
        self.identifiers
            .first()
            .map(String::as_str)
            .ok_or_else(|| TabulaError::schema(format!("entity `{}` has no identifier", self.name)))
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn field_type(&self, name: &str) -> Result<&FieldType> {
        self.fields.get(name).map(|f| &f.ty).ok_or_else(|| {
            TabulaError::schema(format!("unknown field `{name}` in entity `{}`", self.name))
        })
    }

    /// DB column of a field; unknown fields map to themselves.
    pub fn column_for<'a>(&'a self, field: &'a str) -> &'a str {
        self.fields
            .get(field)
            .and_then(|f| f.column.as_deref())
            .unwrap_or(field)
    }

    pub fn has_association(&self, name: &str) -> bool {
        self.associations.contains_key(name)
    }

    pub fn association(&self, name: &str) -> Result<&Association> {
        self.associations.get(name).ok_or_else(|| {
            TabulaError::schema(format!(
                "unknown association `{name}` in entity `{}`",
                self.name
            ))
        })
    }
}

/// Source of mapping metadata for the planner.
pub trait SchemaProvider: Send + Sync {
    /// Fails with a schema error when `name` is not a mapped entity.
    fn entity(&self, name: &str) -> Result<&EntityMetadata>;

    /// Whether `word` collides with a reserved keyword of the backend.
    fn is_reserved_keyword(&self, word: &str) -> bool {
        is_reserved_keyword(word)
    }
}

/// Schema held in memory, usually built at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemorySchema {
    entities: HashMap<String, EntityMetadata>,
}

impl InMemorySchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, meta: EntityMetadata) -> Self {
        self.register(meta);
        self
    }

    pub fn register(&mut self, meta: EntityMetadata) {
        self.entities.insert(meta.name.clone(), meta);
    }

    /// Loads entities from a JSON array of entity metadata objects.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let list: Vec<EntityMetadata> = serde_json::from_str(json)?;
        Ok(list.into_iter().fold(Self::new(), Self::with_entity))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl SchemaProvider for InMemorySchema {
    fn entity(&self, name: &str) -> Result<&EntityMetadata> {
        self.entities
            .get(name)
            .ok_or_else(|| TabulaError::schema(format!("`{name}` is not a mapped entity")))
    }
}

static RESERVED: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "add", "all", "alter", "and", "as", "asc", "between", "by", "case", "check", "column",
        "condition", "constraint", "create", "cross", "current_date", "current_user", "database",
        "default", "delete", "desc", "describe", "distinct", "drop", "else", "exists", "explain",
        "false", "for", "foreign", "from", "function", "grant", "group", "having", "if", "in",
        "index", "inner", "insert", "interval", "into", "is", "join", "key", "keys", "kill",
        "left", "like", "limit", "lines", "load", "lock", "match", "natural", "not", "null", "on",
        "option", "or", "order", "outer", "primary", "procedure", "range", "read", "references",
        "rename", "replace", "require", "restrict", "return", "revoke", "right", "schema",
        "select", "set", "show", "table", "then", "to", "trigger", "true", "union", "unique",
        "update", "usage", "use", "using", "values", "when", "where", "while", "with", "write",
    ]
    .into_iter()
    .collect()
});

/// Case-insensitive reserved keyword check (MySQL flavor).
pub fn is_reserved_keyword(word: &str) -> bool {
    RESERVED.contains(word.to_ascii_lowercase().as_str())
}
