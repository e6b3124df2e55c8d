use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::helpers::{quote_ident, validate_ident};
use super::predicate::{FieldRef, Param, Predicate, PredicateGroup};
use super::selector::Selector;
use crate::sql::OnClause;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    #[default]
    Left,
    Inner,
}

impl JoinKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Inner => "INNER JOIN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Join {
    pub kind: JoinKind,
    pub table: Arc<str>,
    pub alias: Arc<str>,
    pub on: Vec<OnClause>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderTerm {
    pub field: FieldRef,
    pub direction: Direction,
}

/// A copy-on-write object that holds an assembled query.
///
/// Every builder method returns a modified copy, so a base query can be
/// shared between the page query and the count queries derived from it.
#[derive(Debug, Clone)]
pub struct Query {
    table: Arc<str>,
    alias: Arc<str>,
    select: Arc<Vec<Selector>>,
    joins: Arc<Vec<Join>>,
    filters: Arc<Vec<PredicateGroup>>,
    group_by: Arc<Vec<FieldRef>>,
    order_by: Arc<Vec<OrderTerm>>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl Query {
    /// Creates an empty query object for a specific table.
    pub fn new(table: &str, alias: &str) -> Self {
        Query {
            table: Arc::from(table),
            alias: Arc::from(alias),
            select: Default::default(),
            joins: Default::default(),
            filters: Default::default(),
            group_by: Default::default(),
            order_by: Default::default(),
            limit: None,
            offset: None,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn selectors(&self) -> &[Selector] {
        &self.select
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn filters(&self) -> &[PredicateGroup] {
        &self.filters
    }

    pub fn order_terms(&self) -> &[OrderTerm] {
        &self.order_by
    }

    pub fn has_group_by(&self) -> bool {
        !self.group_by.is_empty()
    }

    pub fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<usize> {
        self.offset
    }

    /// Replaces the select list.
    pub fn select<I, S>(&self, cols: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: TryInto<Selector, Error = anyhow::Error>,
    {
        let mut rv = self.clone();
        let v: Vec<Selector> = cols
            .into_iter()
            .map(|s| s.try_into())
            .collect::<Result<_, _>>()?;
        rv.select = Arc::new(v);
        Ok(rv)
    }

    pub fn with_selectors(&self, selectors: Vec<Selector>) -> Self {
        let mut rv = self.clone();
        rv.select = Arc::new(selectors);
        rv
    }

    pub fn add_select(&self, selector: Selector) -> Self {
        let mut rv = self.clone();
        Arc::make_mut(&mut rv.select).push(selector);
        rv
    }

    pub fn join<I, S>(&self, kind: JoinKind, table: &str, alias: &str, on: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: TryInto<OnClause, Error = anyhow::Error>,
    {
        let on = on.into_iter().map(|s| s.try_into()).collect::<Result<Vec<_>, _>>()?;
        self.join_on(kind, table, alias, on)
    }

    pub fn join_on(&self, kind: JoinKind, table: &str, alias: &str, on: Vec<OnClause>) -> Result<Self> {
        let mut rv = self.clone();
        if on.is_empty() {
            bail!("join `{table}` AS `{alias}` needs at least one ON condition");
        }
        Arc::make_mut(&mut rv.joins).push(Join {
            kind,
            table: Arc::from(table),
            alias: Arc::from(alias),
            on,
        });
        Ok(rv)
    }

    /// Adds a predicate group; groups are AND-combined. Empty groups are ignored.
    pub fn filter(&self, group: PredicateGroup) -> Self {
        if group.is_empty() {
            return self.clone();
        }
        let mut rv = self.clone();
        Arc::make_mut(&mut rv.filters).push(group);
        rv
    }

    /// Adds a trusted SQL predicate written by the table author.
    pub fn filter_raw(&self, sql: &str) -> Self {
        self.filter(PredicateGroup::and().add(Predicate::Raw(sql.to_string())))
    }

    pub fn group_by(&self, field: FieldRef) -> Self {
        let mut rv = self.clone();
        Arc::make_mut(&mut rv.group_by).push(field);
        rv
    }

    pub fn order_by(&self, field: FieldRef, direction: Direction) -> Self {
        let mut rv = self.clone();
        Arc::make_mut(&mut rv.order_by).push(OrderTerm { field, direction });
        rv
    }

    pub fn reset_order_by(&self) -> Self {
        let mut rv = self.clone();
        rv.order_by = Default::default();
        rv
    }

    /// Limits the query to `count` rows.
    pub fn limit(&self, count: usize) -> Self {
        let mut rv = self.clone();
        rv.limit = Some(count);
        rv
    }

    /// Offsets the query by `count` rows.
    pub fn offset(&self, count: usize) -> Self {
        let mut rv = self.clone();
        rv.offset = Some(count);
        rv
    }

    pub fn to_sql(&self) -> Result<(String, Vec<Param>)> {
        let table = &*self.table;
        validate_ident(table)?;

        // SELECT
        let select = if self.select.is_empty() {
            Selector::new("*").set_source(&self.alias).to_sql()?
        } else {
            self.select
                .iter()
                .map(|c| c.to_sql())
                .collect::<Result<Vec<_>>>()?
                .join(", ")
        };

        let mut sql = format!(
            "SELECT {select} FROM {} AS {}",
            quote_ident(table)?,
            quote_ident(&self.alias)?
        );
        let mut binds = Vec::<Param>::new();

        // JOINs (must come before WHERE)
        for j in self.joins.iter() {
            sql.push_str(&format!(
                " {} {} AS {} ON {}",
                j.kind.as_sql(),
                quote_ident(&j.table)?,
                quote_ident(&j.alias)?,
                j.on.iter()
                    .map(|clause| clause.to_sql())
                    .collect::<Result<Vec<_>>>()?
                    .join(" AND ")
            ));
        }

        // WHERE
        if !self.filters.is_empty() {
            let wrap = self.filters.len() > 1;
            let parts = self
                .filters
                .iter()
                .map(|g| {
                    let s = g.to_sql(&mut binds)?;
                    Ok(if wrap && g.len() > 1 { format!("({s})") } else { s })
                })
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" WHERE ");
            sql.push_str(&parts.join(" AND "));
        }

        // GROUP BY
        if !self.group_by.is_empty() {
            let fields = self
                .group_by
                .iter()
                .map(|f| f.to_sql())
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(&format!(" GROUP BY {}", fields.join(", ")));
        }

        // ORDER BY
        if !self.order_by.is_empty() {
            let terms = self
                .order_by
                .iter()
                .map(|t| Ok(format!("{} {}", t.field.to_sql()?, t.direction.as_sql())))
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(&format!(" ORDER BY {}", terms.join(", ")));
        }

        // LIMIT/OFFSET
        if let Some(l) = self.limit {
            sql.push_str(&format!(" LIMIT {l}"));
        }
        if let Some(o) = self.offset {
            if self.limit.is_none() {
                // MySQL has no bare OFFSET
                sql.push_str(&format!(" LIMIT {}", u64::MAX));
            }
            sql.push_str(&format!(" OFFSET {o}"));
        }

        Ok((sql, binds))
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_sql() {
            Ok((sql, _)) => write!(f, "Query: {}", sql),
            Err(e) => write!(f, "Query: <error: {}>", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::predicate::CompareOp;

    fn base() -> Query {
        Query::new("posts", "post")
    }

    #[test]
    fn bare_query_selects_root() -> Result<()> {
        let (sql, binds) = base().to_sql()?;
        assert_eq!(sql, "SELECT `post`.* FROM `posts` AS `post`");
        assert!(binds.is_empty());
        Ok(())
    }

    #[test]
    fn joins_where_order_and_window() -> Result<()> {
        let q = base()
            .select(["post.id:post__id", "author.name:author__name"])?
            .join(JoinKind::Left, "users", "author", ["post.author_id = author.id"])?
            .filter(
                PredicateGroup::or()
                    .add(Predicate::Like {
                        field: FieldRef::column("post", "title"),
                        negated: false,
                        param: Param::new("g0", "%rust%"),
                    })
                    .add(Predicate::Like {
                        field: FieldRef::column("author", "name"),
                        negated: false,
                        param: Param::new("g1", "%rust%"),
                    }),
            )
            .filter(PredicateGroup::and().add(Predicate::Compare {
                field: FieldRef::column("post", "id"),
                op: CompareOp::Gt,
                param: Param::new("p100", 3i64),
            }))
            .order_by(FieldRef::column("post", "title"), Direction::Desc)
            .order_by(FieldRef::Alias("author_name".into()), Direction::Asc)
            .limit(10)
            .offset(20);

        let (sql, binds) = q.to_sql()?;
        assert_eq!(
            sql,
            "SELECT `post`.`id` AS `post__id`, `author`.`name` AS `author__name` \
             FROM `posts` AS `post` \
             LEFT JOIN `users` AS `author` ON `post`.`author_id` = `author`.`id` \
             WHERE (`post`.`title` LIKE ? OR `author`.`name` LIKE ?) AND `post`.`id` > ? \
             ORDER BY `post`.`title` DESC, `author_name` ASC LIMIT 10 OFFSET 20"
        );
        let names: Vec<_> = binds.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["g0", "g1", "p100"]);
        Ok(())
    }

    #[test]
    fn copy_on_write_leaves_base_untouched() -> Result<()> {
        let q = base().filter_raw("post.published = 1");
        let counted = q
            .with_selectors(vec![Selector::count_distinct("post", "id")])
            .reset_order_by();
        assert!(q.selectors().is_empty());
        assert_eq!(
            counted.to_sql()?.0,
            "SELECT COUNT(DISTINCT `post`.`id`) FROM `posts` AS `post` WHERE (post.published = 1)"
        );
        Ok(())
    }

    #[test]
    fn group_by_and_empty_groups() -> Result<()> {
        let q = base()
            .filter(PredicateGroup::or())
            .group_by(FieldRef::column("post", "id"));
        assert!(q.has_group_by());
        assert!(q.filters().is_empty());
        assert_eq!(q.to_sql()?.0, "SELECT `post`.* FROM `posts` AS `post` GROUP BY `post`.`id`");
        Ok(())
    }

    #[test]
    fn join_requires_condition() {
        let none: [&str; 0] = [];
        assert!(base().join(JoinKind::Inner, "users", "author", none).is_err());
        assert!(base().join(JoinKind::Inner, "users", "author", ["garbage"]).is_err());
    }
}
