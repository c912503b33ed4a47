//! Dotted/bracketed field paths.
//!
//! `body.items[0]`, `query.customer.id` and `headers["x-id"]` are parsed once
//! into segments and then walked against a `serde_json::Value` tree.

use serde_json::Value;
use std::fmt;

/// One step of a field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Object key (`.name` or `["name"]`)
    Key(String),
    /// Array position (`[3]`)
    Index(usize),
}

/// A parsed field path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FieldPath {
    /// Parse a path string.
    ///
    /// Parsing never fails: an unclosed bracket is kept as part of a plain
    /// key, so a malformed path simply resolves to nothing.
    pub fn parse(path: &str) -> Self {
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut chars = path.chars().peekable();

        while let Some(ch) = chars.next() {
            match ch {
                '.' => {
                    if !current.is_empty() {
                        segments.push(Segment::Key(std::mem::take(&mut current)));
                    }
                }
                '[' => {
                    let mut inner = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == ']' {
                            closed = true;
                            break;
                        }
                        inner.push(c);
                    }

                    if !closed {
                        current.push('[');
                        current.push_str(&inner);
                        continue;
                    }

                    if !current.is_empty() {
                        segments.push(Segment::Key(std::mem::take(&mut current)));
                    }
                    segments.push(bracket_segment(&inner));
                }
                _ => current.push(ch),
            }
        }

        if !current.is_empty() {
            segments.push(Segment::Key(current));
        }

        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// First key of the path, if the path starts with one.
    pub fn head(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Key(key)) => Some(key),
            _ => None,
        }
    }

    /// Walk `root` along this path.
    pub fn resolve<'v>(&self, root: &'v Value) -> Option<&'v Value> {
        resolve_segments(root, &self.segments)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(key) if i == 0 => write!(f, "{key}")?,
                Segment::Key(key) => write!(f, ".{key}")?,
                Segment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

fn bracket_segment(inner: &str) -> Segment {
    let trimmed = inner.trim();
    for quote in ['"', '\''] {
        if trimmed.len() >= 2 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
            return Segment::Key(trimmed[1..trimmed.len() - 1].to_string());
        }
    }
    match trimmed.parse::<usize>() {
        Ok(index) => Segment::Index(index),
        Err(_) => Segment::Key(trimmed.to_string()),
    }
}

/// Walk `root` along `segments`, returning `None` for anything missing.
pub fn resolve_segments<'v>(root: &'v Value, segments: &[Segment]) -> Option<&'v Value> {
    segments.iter().try_fold(root, |value, segment| match (value, segment) {
        (Value::Object(map), Segment::Key(key)) => map.get(key),
        (Value::Object(map), Segment::Index(index)) => map.get(&index.to_string()),
        (Value::Array(items), Segment::Index(index)) => items.get(*index),
        (Value::Array(items), Segment::Key(key)) => {
            key.parse::<usize>().ok().and_then(|index| items.get(index))
        }
        _ => None,
    })
}
