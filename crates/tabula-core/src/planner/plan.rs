use std::collections::HashMap;

use crate::schema::{Association, RelationKind};
use crate::sql::{FieldRef, JoinKind};

/// One join, reused by every column walking the same relationship.
#[derive(Debug, Clone)]
pub struct JoinEntry {
    pub parent_alias: String,
    pub relationship: String,
    pub alias: String,
    pub kind: JoinKind,
    /// Entity behind `alias`
    pub entity: String,
    pub table: String,
    /// Identifier field of `entity`
    pub identifier: String,
    pub association: Association,
}

impl JoinEntry {
    pub fn relation_kind(&self) -> RelationKind {
        self.association.kind
    }

    pub fn is_to_many(&self) -> bool {
        self.association.kind.is_to_many()
    }

    /// Alias of the link table of a many-to-many hop.
    pub fn link_alias(&self) -> String {
        format!("{}_link", self.alias)
    }
}

/// Joins keyed by `(parent alias, relationship)`.
#[derive(Debug, Clone, Default)]
pub struct JoinPlan {
    entries: Vec<JoinEntry>,
    index: HashMap<(String, String), usize>,
}

impl JoinPlan {
    pub fn get(&self, parent_alias: &str, relationship: &str) -> Option<&JoinEntry> {
        self.index
            .get(&(parent_alias.to_string(), relationship.to_string()))
            .map(|&i| &self.entries[i])
    }

    /// Adds the entry unless its key is already planned; returns the planned one.
    pub fn get_or_insert(&mut self, entry: JoinEntry) -> &JoinEntry {
        let key = (entry.parent_alias.clone(), entry.relationship.clone());
        let i = *self.index.entry(key).or_insert_with(|| {
            self.entries.push(entry);
            self.entries.len() - 1
        });
        &self.entries[i]
    }

    pub fn entries(&self) -> &[JoinEntry] {
        &self.entries
    }

    pub fn by_alias(&self, alias: &str) -> Option<&JoinEntry> {
        self.entries.iter().find(|e| e.alias == alias)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectEntry {
    /// Partial projection of one alias, fields in first-seen order
    Partial { alias: String, fields: Vec<String> },
    /// Custom expression selected under its own alias
    Raw { expr: String, alias: String },
}

#[derive(Debug, Clone, Default)]
pub struct SelectPlan {
    entries: Vec<SelectEntry>,
}

impl SelectPlan {
    pub fn add_field(&mut self, alias: &str, field: &str) {
        for entry in self.entries.iter_mut() {
            if let SelectEntry::Partial { alias: a, fields } = entry {
                if a == alias {
                    if !fields.iter().any(|f| f == field) {
                        fields.push(field.to_string());
                    }
                    return;
                }
            }
        }
        self.entries.push(SelectEntry::Partial {
            alias: alias.to_string(),
            fields: vec![field.to_string()],
        });
    }

    pub fn add_raw(&mut self, expr: &str, alias: &str) {
        let entry = SelectEntry::Raw { expr: expr.to_string(), alias: alias.to_string() };
        if !self.entries.contains(&entry) {
            self.entries.push(entry);
        }
    }

    pub fn entries(&self) -> &[SelectEntry] {
        &self.entries
    }

    pub fn fields_of(&self, alias: &str) -> Option<&[String]> {
        self.entries.iter().find_map(|e| match e {
            SelectEntry::Partial { alias: a, fields } if a == alias => Some(fields.as_slice()),
            _ => None,
        })
    }

    pub fn raw_aliases(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|e| match e {
            SelectEntry::Raw { alias, .. } => Some(alias.as_str()),
            _ => None,
        })
    }
}

/// Search or order target of one column.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldSlot {
    #[default]
    Empty,
    One(FieldRef),
    Many(Vec<FieldRef>),
}

impl FieldSlot {
    pub fn fields(&self) -> &[FieldRef] {
        match self {
            FieldSlot::Empty => &[],
            FieldSlot::One(f) => std::slice::from_ref(f),
            FieldSlot::Many(list) => list,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }
}

/// Result of walking the columns once.
#[derive(Debug, Clone)]
pub struct Plan {
    pub root_alias: String,
    pub root_entity: String,
    pub root_table: String,
    /// Identifier field of the root entity
    pub root_identifier: String,
    pub joins: JoinPlan,
    pub select: SelectPlan,
    /// Parallel to the column list
    pub search: Vec<FieldSlot>,
    /// Parallel to the column list
    pub order: Vec<FieldSlot>,
}

impl Plan {
    /// Entity behind a root or join alias.
    pub fn entity_of(&self, alias: &str) -> Option<&str> {
        if alias == self.root_alias {
            Some(&self.root_entity)
        } else {
            self.joins.by_alias(alias).map(|e| e.entity.as_str())
        }
    }
}

/// Result column label of `alias.field`.
pub fn label(alias: &str, field: &str) -> String {
    format!("{alias}__{field}")
}
