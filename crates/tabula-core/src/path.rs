//! Data path grammar shared by the planner and the renderer.
//!
//! A data path is a dot-separated list of identifiers, e.g. `author.name`.
//! One segment may carry a bracket suffix marking a to-many collection, e.g.
//! `comments[, ].author.name`; the text between the brackets is the separator
//! the renderer uses to join collection entries.

use std::fmt;

use crate::error::{Result, TabulaError};
use crate::sql::helpers::validate_ident;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPath {
    raw: String,
    segments: Vec<String>,
    /// Index of the segment carrying the bracket suffix
    collection: Option<usize>,
    separator: Option<String>,
}

impl DataPath {
    pub fn parse(s: &str) -> Result<Self> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(TabulaError::config("empty data path"));
        }

        let mut segments = Vec::new();
        let mut collection = None;
        let mut separator = None;
        let mut rest = raw;

        while !rest.is_empty() {
            let (segment, tail) = match rest.find(['.', '[']) {
                Some(pos) if rest.as_bytes()[pos] == b'[' => {
                    let close = rest[pos..].find(']').ok_or_else(|| {
                        TabulaError::config(format!("unclosed `[` in data path `{raw}`"))
                    })?;
                    if collection.is_some() {
                        return Err(TabulaError::config(format!(
                            "data path `{raw}` has more than one collection marker"
                        )));
                    }
                    collection = Some(segments.len());
                    separator = Some(rest[pos + 1..pos + close].to_string());
                    let after = &rest[pos + close + 1..];
                    let after = match after.strip_prefix('.') {
                        Some(a) => a,
                        None if after.is_empty() => after,
                        None => {
                            return Err(TabulaError::config(format!(
                                "expected `.` after `]` in data path `{raw}`"
                            )))
                        }
                    };
                    (&rest[..pos], after)
                }
                Some(pos) => (&rest[..pos], &rest[pos + 1..]),
                None => (rest, ""),
            };
            validate_ident(segment)
                .map_err(|e| TabulaError::config(format!("data path `{raw}`: {e}")))?;
            segments.push(segment.to_string());
            if tail.is_empty() && rest.ends_with('.') {
                return Err(TabulaError::config(format!("trailing `.` in data path `{raw}`")));
            }
            rest = tail;
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
            collection,
            separator,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// All segments but the last: the relationship hops.
    pub fn relationship_segments(&self) -> &[String] {
        &self.segments[..self.segments.len() - 1]
    }

    pub fn terminal(&self) -> &str {
        // parse() never yields an empty path
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    pub fn is_association(&self) -> bool {
        self.segments.len() > 1
    }

    pub fn is_collection(&self) -> bool {
        self.collection.is_some()
    }

    pub fn separator(&self) -> Option<&str> {
        self.separator.as_deref()
    }

    /// Plain dotted form without collection markers.
    pub fn field_path(&self) -> String {
        self.segments.join(".")
    }

    /// Alias derived from the path, `a.b` -> `a_b`.
    pub fn alias(&self) -> String {
        self.segments.join("_")
    }

    /// Array notated property paths: `createdBy.allowed` yields
    /// (`[createdBy][allowed]`, None) and `comments[, ].createdBy.name`
    /// yields (`[comments]`, Some(`[createdBy][name]`)).
    pub fn property_path(&self) -> (String, Option<String>) {
        let bracket = |segs: &[String]| -> String {
            segs.iter().map(|s| format!("[{s}]")).collect()
        };
        match self.collection {
            Some(idx) => {
                let (head, tail) = self.segments.split_at(idx + 1);
                let value = (!tail.is_empty()).then(|| bracket(tail));
                (bracket(head), value)
            }
            None => (bracket(&self.segments), None),
        }
    }

    /// Object notated path of one collection entry, e.g. `comments[2].createdBy.name`.
    pub fn element_path(&self, key: usize) -> String {
        match self.collection {
            Some(idx) => {
                let head = self.segments[..=idx].join(".");
                let tail = &self.segments[idx + 1..];
                if tail.is_empty() {
                    format!("{head}[{key}]")
                } else {
                    format!("{head}[{key}].{}", tail.join("."))
                }
            }
            None => self.field_path(),
        }
    }
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for DataPath {
    type Err = TabulaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
