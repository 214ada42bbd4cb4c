//! Path expressions selecting subtrees of a document.
//!
//! Syntax: `""` or `"/"` address the root itself; otherwise the expression is
//! a sequence of `/segment` parts. `*` matches any single key or index, a
//! canonical decimal integer matches that array index (or an object key with
//! the same spelling), and anything else is a literal key. `~0` and `~1`
//! escape `~` and `/` as in JSON Pointer.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::PathSyntaxError;

/// The key under which a selected value sits in its parent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathKey {
    Root,
    Name(String),
    Index(usize),
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathKey::Root => f.write_str("(root)"),
            PathKey::Name(name) => f.write_str(name),
            PathKey::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for PathKey {
    fn from(name: &str) -> Self {
        PathKey::Name(name.to_string())
    }
}

impl From<usize> for PathKey {
    fn from(index: usize) -> Self {
        PathKey::Index(index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Wildcard,
    Literal { name: String, index: Option<usize> },
}

impl PathSegment {
    pub fn literal(name: impl Into<String>) -> Self {
        let name = name.into();
        let index = parse_index(&name);
        PathSegment::Literal { name, index }
    }

    pub fn matches(&self, key: &PathKey) -> bool {
        match (self, key) {
            (PathSegment::Wildcard, PathKey::Name(_) | PathKey::Index(_)) => true,
            (PathSegment::Literal { name, .. }, PathKey::Name(k)) => name == k,
            (PathSegment::Literal { index: Some(i), .. }, PathKey::Index(k)) => i == k,
            _ => false,
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Wildcard => f.write_str("*"),
            PathSegment::Literal { name, .. } => f.write_str(&name.replace('~', "~0").replace('/', "~1")),
        }
    }
}

/// How a value at some concrete path relates to an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathMatch {
    /// The value is one of the selected subtrees.
    Matched,
    /// The value is an ancestor of potential matches.
    Prefix,
    /// Nothing below this value can match.
    Miss,
}

/// An immutable, parsed path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpression {
    segments: Vec<PathSegment>,
}

impl PathExpression {
    pub fn parse(expr: &str) -> Result<Self, PathSyntaxError> {
        if expr.is_empty() || expr == "/" {
            return Ok(Self::root());
        }
        let Some(rest) = expr.strip_prefix('/') else {
            return Err(PathSyntaxError::new("path expression must start with '/'", 0));
        };
        let mut segments = Vec::new();
        let mut position = 1;
        for raw in rest.split('/') {
            if raw.is_empty() {
                return Err(PathSyntaxError::new("empty path segment", position));
            }
            let segment = if raw == "*" {
                PathSegment::Wildcard
            } else {
                PathSegment::literal(unescape(raw, position)?)
            };
            segments.push(segment);
            position += raw.len() + 1;
        }
        Ok(Self { segments })
    }

    /// The document root itself.
    pub fn root() -> Self {
        Self { segments: Vec::new() }
    }

    /// Every immediate child of the root (`/*`); the default selection.
    pub fn children_of_root() -> Self {
        Self { segments: vec![PathSegment::Wildcard] }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Depth at which matches live (0 for the root).
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Classify the value at `depth` (1-based, 0 is the root) whose own key is
    /// `key`, assuming every ancestor already classified as [`PathMatch::Prefix`].
    pub fn classify(&self, depth: usize, key: &PathKey) -> PathMatch {
        if depth > 0 {
            match self.segments.get(depth - 1) {
                Some(segment) if segment.matches(key) => {}
                _ => return PathMatch::Miss,
            }
        }
        if depth == self.segments.len() {
            PathMatch::Matched
        } else {
            PathMatch::Prefix
        }
    }

    /// Full match of a concrete path against the expression.
    pub fn matches_path(&self, path: &[PathKey]) -> bool {
        path.len() == self.segments.len() && self.segments.iter().zip(path).all(|(s, k)| s.matches(k))
    }

    /// Apply the expression to an already decoded document, in document order.
    pub fn select<'a>(&self, document: &'a Value) -> Vec<(PathKey, &'a Value)> {
        let mut current = vec![(PathKey::Root, document)];
        for segment in &self.segments {
            let mut next = Vec::new();
            for (_, value) in current {
                match value {
                    Value::Object(map) => {
                        for (k, v) in map {
                            let key = PathKey::Name(k.clone());
                            if segment.matches(&key) {
                                next.push((key, v));
                            }
                        }
                    }
                    Value::Array(items) => {
                        for (i, v) in items.iter().enumerate() {
                            let key = PathKey::Index(i);
                            if segment.matches(&key) {
                                next.push((key, v));
                            }
                        }
                    }
                    _ => {}
                }
            }
            current = next;
        }
        current
    }
}

impl Default for PathExpression {
    fn default() -> Self {
        Self::children_of_root()
    }
}

impl FromStr for PathExpression {
    type Err = PathSyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

fn unescape(raw: &str, position: usize) -> Result<String, PathSyntaxError> {
    if !raw.contains('~') {
        return Ok(raw.to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.char_indices();
    while let Some((i, c)) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some((_, '0')) => out.push('~'),
            Some((_, '1')) => out.push('/'),
            Some(_) => return Err(PathSyntaxError::new("unknown escape, expected '~0' or '~1'", position + i)),
            None => return Err(PathSyntaxError::new("dangling '~' at end of segment", position + i)),
        }
    }
    Ok(out)
}

fn parse_index(name: &str) -> Option<usize> {
    let canonical = name == "0" || (!name.starts_with('0') && !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()));
    if canonical {
        name.parse().ok()
    } else {
        None
    }
}
