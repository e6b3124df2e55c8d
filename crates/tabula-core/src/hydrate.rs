//! Turns flat, labeled result rows into nested records.
//!
//! Every selected field comes back as `<alias>__<field>`. Rows sharing a root
//! identifier collapse into one record; to-one relationships become nested
//! objects and to-many relationships arrays deduplicated by child identifier.

use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::planner::{label, Plan};
use crate::value::Record;

#[derive(Debug, Clone)]
struct Node {
    alias: String,
    identifier: String,
    fields: Vec<String>,
    children: Vec<Child>,
}

#[derive(Debug, Clone)]
struct Child {
    relationship: String,
    to_many: bool,
    node: Node,
}

impl Node {
    fn build(plan: &Plan, alias: &str, identifier: &str) -> Self {
        let fields = plan.select.fields_of(alias).map(<[String]>::to_vec).unwrap_or_default();
        let children = plan
            .joins
            .entries()
            .iter()
            .filter(|e| e.parent_alias == alias)
            .map(|e| Child {
                relationship: e.relationship.clone(),
                to_many: e.is_to_many(),
                node: Node::build(plan, &e.alias, &e.identifier),
            })
            .collect();
        Self { alias: alias.to_string(), identifier: identifier.to_string(), fields, children }
    }

    fn id(&self, row: &Record) -> Value {
        row.get(&label(&self.alias, &self.identifier)).cloned().unwrap_or(Value::Null)
    }

    fn object(&self, row: &Record) -> Map<String, Value> {
        let mut out = Map::new();
        for field in &self.fields {
            let value = row.get(&label(&self.alias, field)).cloned().unwrap_or(Value::Null);
            out.insert(field.clone(), value);
        }
        out
    }

    /// Folds the relationships of `row` into `target`, which already holds
    /// this node's own fields.
    fn merge(&self, target: &mut Map<String, Value>, row: &Record) {
        for child in &self.children {
            let id = child.node.id(row);
            let slot = target.entry(child.relationship.clone()).or_insert_with(|| {
                if child.to_many {
                    Value::Array(Vec::new())
                } else {
                    Value::Null
                }
            });
            if id.is_null() {
                continue;
            }

            match slot {
                Value::Array(items) => {
                    let existing = items.iter_mut().find_map(|item| match item {
                        Value::Object(obj) if obj.get(&child.node.identifier) == Some(&id) => Some(obj),
                        _ => None,
                    });
                    match existing {
                        Some(obj) => child.node.merge(obj, row),
                        None => {
                            let mut obj = child.node.object(row);
                            child.node.merge(&mut obj, row);
                            items.push(Value::Object(obj));
                        }
                    }
                }
                Value::Object(obj) => child.node.merge(obj, row),
                other => {
                    let mut obj = child.node.object(row);
                    child.node.merge(&mut obj, row);
                    *other = Value::Object(obj);
                }
            }
        }
    }
}

/// Nests labeled rows following the joins of a [`Plan`].
#[derive(Debug, Clone)]
pub struct Hydrator {
    root: Node,
    raw_aliases: Vec<String>,
}

impl Hydrator {
    pub fn new(plan: &Plan) -> Self {
        Self {
            root: Node::build(plan, &plan.root_alias, &plan.root_identifier),
            raw_aliases: plan.select.raw_aliases().map(str::to_string).collect(),
        }
    }

    /// One record per root identifier, in first-seen order. Custom expression
    /// aliases land at the top level of the record.
    pub fn hydrate(&self, rows: &[Record]) -> Vec<Record> {
        let mut out: Vec<Record> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for row in rows {
            let id = self.root.id(row);
            let key = id.to_string();
            let index = match seen.get(&key) {
                Some(&i) => i,
                None => {
                    let mut record = self.root.object(row);
                    for alias in &self.raw_aliases {
                        record.insert(alias.clone(), row.get(alias).cloned().unwrap_or(Value::Null));
                    }
                    out.push(record);
                    seen.insert(key, out.len() - 1);
                    out.len() - 1
                }
            };
            self.root.merge(&mut out[index], row);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{ColumnKind, ColumnRegistry};
    use crate::fixtures::blog_schema;
    use crate::planner::{QueryPlanner, RequestParams};
    use crate::table::TableDefinition;
    use serde_json::json;

    fn hydrator() -> Hydrator {
        let mut reg = ColumnRegistry::new(blog_schema(), "Post").unwrap();
        reg.register(Some("title"), ColumnKind::Column, json!({})).unwrap();
        reg.register(Some("author.name"), ColumnKind::Column, json!({})).unwrap();
        reg.register(Some("comments.body"), ColumnKind::Column, json!({})).unwrap();
        reg.register(Some("comments.createdBy.name"), ColumnKind::Column, json!({})).unwrap();
        reg.register(
            Some("commentsCount"),
            ColumnKind::Number,
            json!({"dql": "(SELECT COUNT({c}.id) FROM comments {c} WHERE {c}.post_id = post.id)"}),
        )
        .unwrap();
        let table = TableDefinition::new("posts", reg);
        let planned = QueryPlanner::new(&table, RequestParams::default()).unwrap().plan().unwrap();
        Hydrator::new(planned.plan())
    }

    fn row(v: Value) -> Record {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn to_many_rows_collapse_per_root() {
        let rows = vec![
            row(json!({
                "post__id": 1, "post__title": "Hello",
                "author__id": 7, "author__name": "ann",
                "comments__id": 10, "comments__body": "first",
                "comments_createdBy__id": 7, "comments_createdBy__name": "ann",
                "commentsCount": 2
            })),
            row(json!({
                "post__id": 1, "post__title": "Hello",
                "author__id": 7, "author__name": "ann",
                "comments__id": 11, "comments__body": "second",
                "comments_createdBy__id": null, "comments_createdBy__name": null,
                "commentsCount": 2
            })),
            row(json!({
                "post__id": 2, "post__title": "Empty",
                "author__id": null, "author__name": null,
                "comments__id": null, "comments__body": null,
                "comments_createdBy__id": null, "comments_createdBy__name": null,
                "commentsCount": 0
            })),
        ];

        let out = hydrator().hydrate(&rows);
        assert_eq!(out.len(), 2);
        assert_eq!(
            Value::Object(out[0].clone()),
            json!({
                "id": 1, "title": "Hello", "commentsCount": 2,
                "author": {"id": 7, "name": "ann"},
                "comments": [
                    {"id": 10, "body": "first", "createdBy": {"id": 7, "name": "ann"}},
                    {"id": 11, "body": "second", "createdBy": null}
                ]
            })
        );
        assert_eq!(
            Value::Object(out[1].clone()),
            json!({"id": 2, "title": "Empty", "commentsCount": 0, "author": null, "comments": []})
        );
    }

    #[test]
    fn repeated_child_rows_are_deduplicated() {
        let base = json!({
            "post__id": 1, "post__title": "Hello",
            "author__id": 7, "author__name": "ann",
            "comments__id": 10, "comments__body": "first",
            "comments_createdBy__id": 7, "comments_createdBy__name": "ann",
            "commentsCount": 1
        });
        let rows = vec![row(base.clone()), row(base)];
        let out = hydrator().hydrate(&rows);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["comments"].as_array().unwrap().len(), 1);
    }
}
