//! WHERE clause building blocks: field references, named parameters and
//! AND/OR predicate groups.

use anyhow::{bail, Result};
use serde::Serialize;
use std::fmt;

use super::helpers::{is_ident_path, quote_ident, quote_ident_path};
use crate::value::BindValue;

/// Something a predicate or sort term can point at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldRef {
    /// `alias.column`
    Column { alias: String, column: String },
    /// Select alias of a computed column, e.g. `comments_count`
    Alias(String),
    /// Raw SQL expression, used as written
    Expression(String),
}

impl FieldRef {
    pub fn column(alias: impl Into<String>, column: impl Into<String>) -> Self {
        FieldRef::Column { alias: alias.into(), column: column.into() }
    }

    /// `a.b` becomes a column, `a` an alias, anything else an expression.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        match s.split_once('.') {
            Some((alias, column)) if is_ident_path(s) && !column.contains('.') => {
                FieldRef::column(alias, column)
            }
            None if is_ident_path(s) => FieldRef::Alias(s.to_string()),
            _ => FieldRef::Expression(s.to_string()),
        }
    }

    pub fn is_column(&self) -> bool {
        matches!(self, FieldRef::Column { .. })
    }

    pub fn to_sql(&self) -> Result<String> {
        match self {
            FieldRef::Column { alias, column } => {
                Ok(format!("{}.{}", quote_ident(alias)?, quote_ident(column)?))
            }
            FieldRef::Alias(a) => quote_ident_path(a),
            FieldRef::Expression(e) => {
                if e.trim().is_empty() { bail!("empty expression"); }
                Ok(e.clone())
            }
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRef::Column { alias, column } => write!(f, "{alias}.{column}"),
            FieldRef::Alias(a) => f.write_str(a),
            FieldRef::Expression(e) => f.write_str(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Neq => "<>",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
        }
    }
}

/// A named bound parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Param {
    pub name: String,
    pub value: BindValue,
}

impl Param {
    pub fn new(name: impl Into<String>, value: impl Into<BindValue>) -> Self {
        Self { name: name.into(), value: value.into() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare { field: FieldRef, op: CompareOp, param: Param },
    Like { field: FieldRef, negated: bool, param: Param },
    In { field: FieldRef, negated: bool, params: Vec<Param> },
    Between { field: FieldRef, low: Param, high: Param },
    IsNull { field: FieldRef, negated: bool },
    /// Trusted SQL fragment supplied by the table author
    Raw(String),
    Group(PredicateGroup),
}

impl Predicate {
    fn to_sql(&self, binds: &mut Vec<Param>) -> Result<String> {
        Ok(match self {
            Predicate::Compare { field, op, param } => {
                binds.push(param.clone());
                format!("{} {} ?", field.to_sql()?, op.as_sql())
            }
            Predicate::Like { field, negated, param } => {
                binds.push(param.clone());
                let op = if *negated { "NOT LIKE" } else { "LIKE" };
                format!("{} {op} ?", field.to_sql()?)
            }
            Predicate::In { field, negated, params } => {
                if params.is_empty() { bail!("IN predicate on `{field}` without values"); }
                binds.extend(params.iter().cloned());
                let op = if *negated { "NOT IN" } else { "IN" };
                let marks = vec!["?"; params.len()].join(", ");
                format!("{} {op} ({marks})", field.to_sql()?)
            }
            Predicate::Between { field, low, high } => {
                binds.push(low.clone());
                binds.push(high.clone());
                format!("{} BETWEEN ? AND ?", field.to_sql()?)
            }
            Predicate::IsNull { field, negated } => {
                let op = if *negated { "IS NOT NULL" } else { "IS NULL" };
                format!("{} {op}", field.to_sql()?)
            }
            Predicate::Raw(sql) => format!("({sql})"),
            Predicate::Group(group) => format!("({})", group.to_sql(binds)?),
        })
    }

    fn collect_params<'a>(&'a self, out: &mut Vec<&'a Param>) {
        match self {
            Predicate::Compare { param, .. } | Predicate::Like { param, .. } => out.push(param),
            Predicate::In { params, .. } => out.extend(params.iter()),
            Predicate::Between { low, high, .. } => {
                out.push(low);
                out.push(high);
            }
            Predicate::IsNull { .. } | Predicate::Raw(_) => {}
            Predicate::Group(group) => {
                for p in &group.items {
                    p.collect_params(out);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conjunction {
    And,
    Or,
}

/// Accumulator filters append to.
#[derive(Debug, Clone, PartialEq)]
pub struct PredicateGroup {
    conjunction: Conjunction,
    items: Vec<Predicate>,
}

impl PredicateGroup {
    pub fn and() -> Self {
        Self { conjunction: Conjunction::And, items: Vec::new() }
    }

    pub fn or() -> Self {
        Self { conjunction: Conjunction::Or, items: Vec::new() }
    }

    pub fn conjunction(&self) -> Conjunction {
        self.conjunction
    }

    pub fn add(mut self, predicate: Predicate) -> Self {
        self.items.push(predicate);
        self
    }

    pub fn push(&mut self, predicate: Predicate) {
        self.items.push(predicate);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[Predicate] {
        &self.items
    }

    /// Every parameter in appearance order, nested groups included.
    pub fn params(&self) -> Vec<&Param> {
        let mut out = Vec::new();
        for p in &self.items {
            p.collect_params(&mut out);
        }
        out
    }

    pub(crate) fn to_sql(&self, binds: &mut Vec<Param>) -> Result<String> {
        let glue = match self.conjunction {
            Conjunction::And => " AND ",
            Conjunction::Or => " OR ",
        };
        let parts = self
            .items
            .iter()
            .map(|p| p.to_sql(binds))
            .collect::<Result<Vec<_>>>()?;
        Ok(parts.join(glue))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_ref_parsing() -> Result<()> {
        assert_eq!(FieldRef::parse("post.title"), FieldRef::column("post", "title"));
        assert_eq!(FieldRef::parse("comments_count"), FieldRef::Alias("comments_count".into()));
        assert!(matches!(FieldRef::parse("a.b.c"), FieldRef::Expression(_)));
        assert!(matches!(FieldRef::parse("COUNT(c.id)"), FieldRef::Expression(_)));
        assert_eq!(FieldRef::parse("post.title").to_sql()?, "`post`.`title`");
        Ok(())
    }

    #[test]
    fn group_rendering_collects_binds_in_order() -> Result<()> {
        let group = PredicateGroup::or()
            .add(Predicate::Like {
                field: FieldRef::column("post", "title"),
                negated: false,
                param: Param::new("g0", "%rust%"),
            })
            .add(Predicate::Between {
                field: FieldRef::column("post", "id"),
                low: Param::new("p100", 1i64),
                high: Param::new("p101", 9i64),
            })
            .add(Predicate::IsNull { field: FieldRef::column("post", "deletedAt"), negated: true });

        let mut binds = Vec::new();
        let sql = group.to_sql(&mut binds)?;
        assert_eq!(
            sql,
            "`post`.`title` LIKE ? OR `post`.`id` BETWEEN ? AND ? OR `post`.`deletedAt` IS NOT NULL"
        );
        let names: Vec<_> = binds.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["g0", "p100", "p101"]);
        assert_eq!(group.params().len(), 3);
        Ok(())
    }

    #[test]
    fn empty_in_is_rejected() {
        let p = Predicate::In { field: FieldRef::column("a", "b"), negated: false, params: vec![] };
        assert!(PredicateGroup::and().add(p).to_sql(&mut Vec::new()).is_err());
    }
}
