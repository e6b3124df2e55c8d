use std::{str::FromStr, sync::Arc};

use anyhow::{bail, Result};

use super::helpers::{quote_ident, validate_ident};

/// One entry of a SELECT list.
#[derive(Clone, PartialEq)]
pub enum Selector {
    /// `source.column [AS alias]`, `source.*` or `*`
    Column {
        source: Option<Arc<str>>,
        column: Arc<str>,
        alias: Option<Arc<str>>,
    },
    /// Raw expression owned by the table author, always aliased
    Expression { sql: Arc<str>, alias: Arc<str> },
    /// `COUNT(DISTINCT source.column)`
    CountDistinct { source: Arc<str>, column: Arc<str> },
}

impl Selector {
    pub fn new(column: &str) -> Self {
        Selector::Column { source: None, column: Arc::from(column), alias: None }
    }

    pub fn expression(sql: &str, alias: &str) -> Self {
        Selector::Expression { sql: Arc::from(sql), alias: Arc::from(alias) }
    }

    pub fn count_distinct(source: &str, column: &str) -> Self {
        Selector::CountDistinct { source: Arc::from(source), column: Arc::from(column) }
    }

    pub fn set_source(self, source: &str) -> Self {
        match self {
            Selector::Column { column, alias, .. } => {
                Selector::Column { source: Some(Arc::from(source)), column, alias }
            }
            other => other,
        }
    }

    pub fn set_alias(self, alias: &str) -> Self {
        match self {
            Selector::Column { source, column, .. } => {
                Selector::Column { source, column, alias: Some(Arc::from(alias)) }
            }
            Selector::Expression { sql, .. } => Selector::Expression { sql, alias: Arc::from(alias) },
            other => other,
        }
    }

    pub fn source(&self) -> Option<&str> {
        match self {
            Selector::Column { source, .. } => source.as_deref(),
            Selector::CountDistinct { source, .. } => Some(source),
            Selector::Expression { .. } => None,
        }
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            Selector::Column { alias, .. } => alias.as_deref(),
            Selector::Expression { alias, .. } => Some(alias),
            Selector::CountDistinct { .. } => None,
        }
    }

    pub fn to_sql(&self) -> Result<String> {
        match self {
            Selector::Column { source, column, alias } if &**column == "*" => {
                if alias.is_some() {
                    bail!("cannot alias a wildcard selector (`*` or `src.*`)");
                }
                match source {
                    Some(src) => Ok(format!("{}.*", quote_ident(src)?)),
                    None => Ok("*".to_string()),
                }
            }
            Selector::Column { source, column, alias } => {
                let expr = match source {
                    Some(src) => format!("{}.{}", quote_ident(src)?, quote_ident(column)?),
                    None => quote_ident(column)?,
                };
                match alias {
                    Some(alias) => Ok(format!("{expr} AS {}", quote_ident(alias)?)),
                    None => Ok(expr),
                }
            }
            Selector::Expression { sql, alias } => {
                if sql.trim().is_empty() {
                    bail!("empty select expression for `{alias}`");
                }
                Ok(format!("{sql} AS {}", quote_ident(alias)?))
            }
            Selector::CountDistinct { source, column } => {
                Ok(format!("COUNT(DISTINCT {}.{})", quote_ident(source)?, quote_ident(column)?))
            }
        }
    }
}

impl FromStr for Selector {
    type Err = anyhow::Error;

    /// Parse a column selector:
    ///   "*", "src.*", "col", "src.col", "src.col:alias"
    ///
    /// Wildcards cannot be aliased and an alias requires a source.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        if input.is_empty() {
            bail!("empty selector");
        }

        let (lhs, alias) = match input.rsplit_once(':') {
            Some((l, a)) => {
                let a = a.trim();
                if a.is_empty() {
                    bail!("empty alias after ':'");
                }
                validate_ident(a)?;
                (l.trim(), Some(Arc::<str>::from(a)))
            }
            None => (input, None),
        };

        if lhs == "*" {
            if alias.is_some() {
                bail!("cannot alias a wildcard selector (`*` or `src.*`)");
            }
            return Ok(Selector::new("*"));
        }

        let parts: Vec<&str> = lhs.split('.').map(str::trim).collect();
        match parts.as_slice() {
            [column] => {
                if alias.is_some() {
                    bail!("alias requires a source: use `source.column:alias`");
                }
                validate_ident(column)?;
                Ok(Selector::new(column))
            }
            [source, column] => {
                validate_ident(source)?;
                if *column == "*" {
                    if alias.is_some() {
                        bail!("cannot alias a wildcard selector (`*` or `src.*`)");
                    }
                } else {
                    validate_ident(column)?;
                }
                Ok(Selector::Column {
                    source: Some(Arc::from(*source)),
                    column: Arc::from(*column),
                    alias,
                })
            }
            _ => bail!("selector supports at most one dot: `source.column` or `source.*`"),
        }
    }
}

impl TryFrom<&str> for Selector {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Selector::from_str(value)
    }
}

impl TryFrom<String> for Selector {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Selector::from_str(&value)
    }
}

impl std::fmt::Debug for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Column { source, column, alias } => f
                .debug_struct("Column")
                .field("source", &source.as_deref())
                .field("column", column)
                .field("alias", &alias.as_deref())
                .finish(),
            Selector::Expression { sql, alias } => {
                f.debug_struct("Expression").field("sql", sql).field("alias", alias).finish()
            }
            Selector::CountDistinct { source, column } => f
                .debug_struct("CountDistinct")
                .field("source", source)
                .field("column", column)
                .finish(),
        }
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.to_sql().map_err(|_| std::fmt::Error).and_then(|s| f.write_str(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sql(s: &str) -> anyhow::Result<String> {
        Selector::from_str(s)?.to_sql()
    }

    #[test]
    fn wildcards() -> anyhow::Result<()> {
        assert_eq!(sql("*")?, "*");
        assert_eq!(sql("post.*")?, "`post`.*");
        assert!(Selector::from_str("*:x").is_err());
        assert!(Selector::from_str("post.*:x").is_err());
        assert!(Selector::new("*").set_source("post").set_alias("x").to_sql().is_err());
        Ok(())
    }

    #[test]
    fn qualified_with_alias() -> anyhow::Result<()> {
        let sel = Selector::from_str(" post . id : post__id ")?;
        assert_eq!(sel.source(), Some("post"));
        assert_eq!(sel.alias(), Some("post__id"));
        assert_eq!(sel.to_sql()?, "`post`.`id` AS `post__id`");
        assert!(Selector::from_str("id:alias").is_err());
        assert!(Selector::from_str("a.b.c").is_err());
        assert!(Selector::from_str("post.bad name").is_err());
        Ok(())
    }

    #[test]
    fn expressions_and_counts() -> anyhow::Result<()> {
        let sel = Selector::expression("(SELECT COUNT(c.id) FROM comments c WHERE c.post_id = post.id)", "comments_count");
        assert_eq!(
            sel.to_sql()?,
            "(SELECT COUNT(c.id) FROM comments c WHERE c.post_id = post.id) AS `comments_count`"
        );
        assert_eq!(Selector::count_distinct("post", "id").to_sql()?, "COUNT(DISTINCT `post`.`id`)");
        assert!(Selector::expression(" ", "x").to_sql().is_err());
        Ok(())
    }

    #[test]
    fn display_formats_like_sql() -> anyhow::Result<()> {
        let sel: Selector = "post.title:post__title".try_into()?;
        assert_eq!(format!("{sel}"), sel.to_sql()?);
        Ok(())
    }
}
