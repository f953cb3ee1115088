//! Path model: segments, concrete paths and path expressions.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::parser::{ParseError, PathParser};
use crate::util::is_identifier;

/// One step of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Object property: `.name`, `['odd name']`
    Key(String),
    /// Array index, negative counts from the end: `[0]`, `[-1]`
    Index(isize),
    /// Array element identified by its `_key`: `[_key=="abc"]`
    Keyed(String),
    /// Index range `[from:to]` with `to` exclusive. Either end may be open.
    Range(Option<isize>, Option<isize>),
    /// Every child of an object or array: `*`, `[*]`
    Wildcard,
    /// Several bracket selectors at one level: `[0,2]`
    Union(Vec<PathSegment>),
}

impl PathSegment {
    /// Returns true if the segment addresses exactly one location.
    pub fn is_concrete(&self) -> bool {
        matches!(
            self,
            PathSegment::Key(_) | PathSegment::Index(_) | PathSegment::Keyed(_)
        )
    }

    /// Writes the selector as it appears between brackets.
    fn fmt_selector(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(name) => write!(f, "'{}'", escape_string(name, '\'')),
            PathSegment::Index(i) => write!(f, "{i}"),
            PathSegment::Keyed(key) => write!(f, "_key==\"{}\"", escape_string(key, '"')),
            PathSegment::Range(from, to) => {
                if let Some(from) = from {
                    write!(f, "{from}")?;
                }
                f.write_str(":")?;
                if let Some(to) = to {
                    write!(f, "{to}")?;
                }
                Ok(())
            }
            PathSegment::Wildcard => f.write_str("*"),
            PathSegment::Union(members) => {
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    member.fmt_selector(f)?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for PathSegment {
    fn from(name: &str) -> Self {
        PathSegment::Key(name.to_string())
    }
}

impl From<isize> for PathSegment {
    fn from(index: isize) -> Self {
        PathSegment::Index(index)
    }
}

/// A path expression.
///
/// When every segment is concrete the path addresses a single location and is
/// accepted by the deep accessors. Otherwise it must go through the matcher
/// first, which expands it into concrete paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Path {
    pub segments: Vec<PathSegment>,
}

impl Path {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    /// The empty path, addressing the document itself.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a path expression such as `body[_key=="a"].children[0].text`.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        PathParser::parse(input)
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_concrete(&self) -> bool {
        self.segments.iter().all(PathSegment::is_concrete)
    }

    /// First segment that keeps this path from being concrete.
    pub fn first_ambiguous(&self) -> Option<&PathSegment> {
        self.segments.iter().find(|s| !s.is_concrete())
    }

    /// Returns a new path with `segment` appended.
    pub fn child(&self, segment: PathSegment) -> Path {
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.extend(self.segments.iter().cloned());
        segments.push(segment);
        Path { segments }
    }

    pub fn push(&mut self, segment: PathSegment) {
        self.segments.push(segment);
    }

    pub fn last(&self) -> Option<&PathSegment> {
        self.segments.last()
    }

    /// Splits off the final segment. `None` for the root path.
    pub fn split_last(&self) -> Option<(Path, &PathSegment)> {
        let (last, parent) = self.segments.split_last()?;
        Some((Path::new(parent.to_vec()), last))
    }

    /// Sub-path with slice semantics: negative bounds count from the end.
    pub fn slice(&self, start: isize, end: Option<isize>) -> Path {
        let len = self.segments.len() as isize;
        let clamp = |i: isize| -> usize {
            let i = if i < 0 { len + i } else { i };
            i.clamp(0, len) as usize
        };
        let from = clamp(start);
        let to = end.map(clamp).unwrap_or(len as usize);
        if from >= to {
            return Path::root();
        }
        Path::new(self.segments[from..to].to_vec())
    }

    /// Returns true if `self` is a prefix of `other` (or equal to it).
    pub fn is_prefix_of(&self, other: &Path) -> bool {
        self.segments.len() <= other.segments.len()
            && self.segments[..] == other.segments[..self.segments.len()]
    }

    /// Decodes the wire form: either an expression string or an array of
    /// segments (`"name"`, `0`, `{"_key": "k"}`, `[from, to]`).
    pub fn from_json(value: &Value) -> Result<Path, ParseError> {
        match value {
            Value::String(s) => Path::parse(s),
            Value::Array(items) => items
                .iter()
                .map(segment_from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(Path::new),
            other => Err(ParseError::InvalidSegment(other.to_string())),
        }
    }

    /// Encodes the path as its expression string.
    pub fn to_json(&self) -> Value {
        Value::String(self.to_string())
    }
}

fn segment_from_json(value: &Value) -> Result<PathSegment, ParseError> {
    match value {
        Value::String(name) => Ok(PathSegment::Key(name.clone())),
        Value::Number(n) => n
            .as_i64()
            .map(|i| PathSegment::Index(i as isize))
            .ok_or(ParseError::InvalidNumber),
        Value::Object(map) => match map.get("_key") {
            Some(Value::String(key)) => Ok(PathSegment::Keyed(key.clone())),
            _ => Err(ParseError::InvalidSegment(value.to_string())),
        },
        Value::Array(bounds) if bounds.len() == 2 => {
            let bound = |v: &Value| -> Result<Option<isize>, ParseError> {
                match v {
                    Value::Null => Ok(None),
                    Value::String(s) if s.is_empty() => Ok(None),
                    Value::Number(n) => n
                        .as_i64()
                        .map(|i| Some(i as isize))
                        .ok_or(ParseError::InvalidNumber),
                    _ => Err(ParseError::InvalidSegment(v.to_string())),
                }
            };
            Ok(PathSegment::Range(bound(&bounds[0])?, bound(&bounds[1])?))
        }
        other => Err(ParseError::InvalidSegment(other.to_string())),
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Key(name) if is_identifier(name) => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str(name)?;
                }
                other => {
                    f.write_str("[")?;
                    other.fmt_selector(f)?;
                    f.write_str("]")?;
                }
            }
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}

impl From<Vec<PathSegment>> for Path {
    fn from(segments: Vec<PathSegment>) -> Self {
        Path::new(segments)
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a PathSegment;
    type IntoIter = std::slice::Iter<'a, PathSegment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}

fn escape_string(s: &str, quote: char) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}
