use serde::{Deserialize, Serialize};
use std::fmt;

/// Default key under which an array-of-structures element carries its
/// unique identifier.
pub const DEFAULT_ID_TAG: &str = "@id";

/// Reserved marker character introducing an identifier-match segment in a
/// path literal.
pub const ID_MATCH_MARKER: char = '#';

/// Reserved token denoting "all children" in a path literal.
pub const WILDCARD_TOKEN: &str = "*";

/// Reserved token denoting append-at-end in a path literal.
pub const EXTEND_TOKEN: &str = "-";

/// Reserved token denoting the parent of the current location.
pub const PARENT_TOKEN: &str = "..";

/// Non-positional operations a path segment can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpTag {
    /// Append a new element at the end of a sequence
    Extend,
    /// Invoke the addressed object
    Call,
    /// Reduce all addressed siblings into one value
    Combine,
    /// Step up to the parent of the current location
    Parent,
}

/// One step of a path expression.
///
/// Segments are pure data; evaluation happens only when a path is applied
/// to an entry or node. Wildcards expand during iteration, never during
/// parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathSegment {
    /// Named child of a mapping
    Key(String),
    /// Positional child of a sequence
    Index(usize),
    /// Positional range over a sequence; bounds resolve against the
    /// sequence length, negative values count from the end
    Slice {
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
    },
    /// Element of an array of structures addressed by its identifier
    /// value; carries the identifier-tag key so a non-default tag flows
    /// through descent without ambient state
    IdentifierMatch { tag: String, value: String },
    /// All immediate children
    Wildcard,
    /// A non-positional operation
    Operation(OpTag),
}

impl PathSegment {
    /// Identifier-match segment using the default identifier tag.
    pub fn identifier(value: impl Into<String>) -> Self {
        PathSegment::IdentifierMatch {
            tag: DEFAULT_ID_TAG.to_string(),
            value: value.into(),
        }
    }

    /// Identifier-match segment using an explicit identifier tag.
    pub fn identifier_with_tag(tag: impl Into<String>, value: impl Into<String>) -> Self {
        PathSegment::IdentifierMatch {
            tag: tag.into(),
            value: value.into(),
        }
    }

    /// True for segments addressing exactly one child by name or position.
    pub fn is_plain(&self) -> bool {
        matches!(self, PathSegment::Key(_) | PathSegment::Index(_))
    }

    /// Structural compatibility between a pattern segment (`self`) and a
    /// concrete segment. A wildcard matches any single segment.
    pub fn matches(&self, other: &PathSegment) -> bool {
        match (self, other) {
            (PathSegment::Wildcard, _) | (_, PathSegment::Wildcard) => true,
            (PathSegment::Key(a), PathSegment::Key(b)) => a == b,
            (PathSegment::Index(a), PathSegment::Index(b)) => a == b,
            (
                PathSegment::IdentifierMatch { tag: ta, value: va },
                PathSegment::IdentifierMatch { tag: tb, value: vb },
            ) => ta == tb && va == vb,
            (PathSegment::Operation(a), PathSegment::Operation(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => write!(f, "{}", k),
            PathSegment::Index(i) => write!(f, "{}", i),
            PathSegment::Slice { start, stop, step } => {
                if let Some(s) = start {
                    write!(f, "{}", s)?;
                }
                write!(f, ":")?;
                if let Some(s) = stop {
                    write!(f, "{}", s)?;
                }
                if let Some(s) = step {
                    write!(f, ":{}", s)?;
                }
                Ok(())
            }
            PathSegment::IdentifierMatch { value, .. } => {
                write!(f, "{}{}", ID_MATCH_MARKER, value)
            }
            PathSegment::Wildcard => write!(f, "{}", WILDCARD_TOKEN),
            PathSegment::Operation(OpTag::Extend) => write!(f, "{}", EXTEND_TOKEN),
            PathSegment::Operation(OpTag::Parent) => write!(f, "{}", PARENT_TOKEN),
            PathSegment::Operation(OpTag::Call) => write!(f, "@call"),
            PathSegment::Operation(OpTag::Combine) => write!(f, "@combine"),
        }
    }
}
