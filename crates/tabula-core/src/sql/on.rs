use std::{str::FromStr, sync::Arc};

use anyhow::{anyhow, bail, Result};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::sql::helpers::{quote_ident_path, validate_ident};

#[derive(Debug, Clone, PartialEq)]
pub enum RightOperand {
    Ident(Arc<str>),   // dotted identifier path
    Null,
    Number(Arc<str>),  // original text, e.g. 1, 3.14, -2e10
    Str(Arc<str>),     // unquoted inner string
}

/// One condition of a join's ON clause.
#[derive(Debug, Clone, PartialEq)]
pub struct OnClause {
    left: Arc<str>,
    operator: Arc<str>, // normalized (UPPERCASE, single spaces)
    right: RightOperand,
}

impl OnClause {
    pub fn new(left: &str, operator: &str, right: &str) -> Result<Self> {
        let op = normalize_op(operator)?;
        let right = parse_right(right)?;
        validate_on(&op, left, &right)?;
        Ok(Self {
            left: Arc::from(left),
            operator: Arc::from(op.as_str()),
            right,
        })
    }

    /// `left_alias.left_col = right_alias.right_col`
    pub fn columns(left_alias: &str, left_col: &str, right_alias: &str, right_col: &str) -> Result<Self> {
        Self::new(
            &format!("{left_alias}.{left_col}"),
            "=",
            &format!("{right_alias}.{right_col}"),
        )
    }

    pub fn left(&self) -> &str {
        &self.left
    }

    pub fn right(&self) -> &RightOperand {
        &self.right
    }

    /// Render to SQL with quoting; handles `IS/IS NOT NULL`.
    pub fn to_sql(&self) -> Result<String> {
        let op = &*self.operator;
        let lq = quote_ident_path(&self.left)?;
        match &self.right {
            RightOperand::Null => match op {
                "IS" => Ok(format!("{lq} IS NULL")),
                "IS NOT" => Ok(format!("{lq} IS NOT NULL")),
                _ => bail!("operator `{op}` not valid with NULL"),
            },
            RightOperand::Ident(p) => Ok(format!("{lq} {op} {}", quote_ident_path(p)?)),
            RightOperand::Number(n) => Ok(format!("{lq} {op} {n}")),
            RightOperand::Str(s) => Ok(format!("{lq} {op} '{}'", s.replace('\'', "''"))),
        }
    }
}

impl FromStr for OnClause {
    type Err = anyhow::Error;

    fn from_str(input: &str) -> Result<Self> {
        // longest/most specific operator first
        static OP_RE: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"(?i)\s*(\bis\s+not\b|\bis\b|<=|>=|<>|!=|=|<|>)\s*").unwrap()
        });

        let s = input.trim();
        let m = OP_RE
            .find(s)
            .ok_or_else(|| anyhow!("invalid ON clause: `{input}`"))?;

        let left = s[..m.start()].trim();
        let right = s[m.end()..].trim();
        if left.is_empty() || right.is_empty() {
            bail!("invalid ON clause: `{input}`");
        }
        Self::new(left, &s[m.start()..m.end()], right)
    }
}

impl TryFrom<&str> for OnClause {
    type Error = anyhow::Error;
    fn try_from(s: &str) -> Result<Self> {
        Self::from_str(s)
    }
}

impl std::fmt::Display for OnClause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.to_sql().map_err(|_| std::fmt::Error).and_then(|s| f.write_str(&s))
    }
}

fn normalize_op(op: &str) -> Result<String> {
    let norm = op.trim().to_ascii_uppercase().split_whitespace().collect::<Vec<_>>().join(" ");
    match norm.as_str() {
        "=" | "!=" | "<>" | "<" | "<=" | ">" | ">=" | "IS" | "IS NOT" => Ok(norm),
        _ => bail!("unsupported operator `{op}`"),
    }
}

fn parse_right(raw: &str) -> Result<RightOperand> {
    if raw.eq_ignore_ascii_case("NULL") {
        return Ok(RightOperand::Null);
    }
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'\'' && last == b'\'') || (first == b'"' && last == b'"') {
            return Ok(RightOperand::Str(Arc::from(&raw[1..raw.len() - 1])));
        }
    }
    let numeric_start = bytes.first().is_some_and(|b| b.is_ascii_digit()) || raw.starts_with(['+', '-']);
    if numeric_start && raw.chars().all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E')) {
        return Ok(RightOperand::Number(Arc::from(raw)));
    }
    validate_ident(raw)?;
    Ok(RightOperand::Ident(Arc::from(raw)))
}

fn validate_on(op: &str, left: &str, right: &RightOperand) -> Result<()> {
    validate_ident(left)?;
    match right {
        RightOperand::Null if !matches!(op, "IS" | "IS NOT") => {
            bail!("only IS / IS NOT allowed with NULL in ON clause")
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_equality() -> Result<()> {
        let on = OnClause::columns("post", "author_id", "author", "id")?;
        assert_eq!(on.to_sql()?, "`post`.`author_id` = `author`.`id`");
        Ok(())
    }

    #[test]
    fn parse_variants() -> Result<()> {
        assert_eq!(
            "c.deleted_at is not null".parse::<OnClause>()?.to_sql()?,
            "`c`.`deleted_at` IS NOT NULL"
        );
        assert_eq!("c.status = 'active'".parse::<OnClause>()?.right(), &RightOperand::Str(Arc::from("active")));
        assert_eq!("c.rank >= 3".parse::<OnClause>()?.to_sql()?, "`c`.`rank` >= 3");
        Ok(())
    }

    #[test]
    fn rejects_garbage() {
        assert!("nonsense".parse::<OnClause>().is_err());
        assert_eq!("c.visible = 1".parse::<OnClause>().unwrap().left(), "c.visible");
        assert!("c.x = NULL".parse::<OnClause>().is_err());
        assert!(OnClause::new("c x", "=", "1").is_err());
        assert!(OnClause::new("c.x", "LIKE", "1").is_err());
    }
}
