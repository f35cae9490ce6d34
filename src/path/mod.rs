//! Path expressions addressing locations inside a hierarchical tree.
//!
//! A [`Path`] is an immutable, ordered sequence of [`PathSegment`]s. Paths
//! are pure data: composition produces new paths and nothing is evaluated
//! until a path is applied to an entry or node. The literal form splits on
//! `/` and recognizes integer indices, `a:b[:c]` slices, the `*` wildcard,
//! the `-` append marker, `..` for the parent and `#value` for an
//! identifier match.

mod segment;

pub use segment::{
    OpTag, PathSegment, DEFAULT_ID_TAG, EXTEND_TOKEN, ID_MATCH_MARKER, PARENT_TOKEN,
    WILDCARD_TOKEN,
};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Errors raised while parsing a path literal.
#[derive(Debug, thiserror::Error)]
pub enum PathParseError {
    #[error("empty identifier after '#' in '{0}'")]
    EmptyIdentifier(String),
    #[error("invalid slice segment '{0}'")]
    BadSlice(String),
}

/// Immutable description of a location inside a tree.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Path {
    segments: Vec<PathSegment>,
}

impl Path {
    /// The empty path, addressing the root itself.
    pub fn root() -> Self {
        Path::default()
    }

    pub fn new(segments: Vec<PathSegment>) -> Self {
        Path { segments }
    }

    /// Parses a delimited literal into a path.
    ///
    /// Empty tokens (leading, trailing or doubled separators) are skipped,
    /// so `"/a/b"` and `"a/b"` denote the same location.
    pub fn parse(literal: &str) -> Result<Self, PathParseError> {
        let mut segments = Vec::new();
        for token in literal.split('/') {
            if token.is_empty() {
                continue;
            }
            segments.push(Self::parse_token(token)?);
        }
        Ok(Path { segments })
    }

    fn parse_token(token: &str) -> Result<PathSegment, PathParseError> {
        match token {
            WILDCARD_TOKEN => return Ok(PathSegment::Wildcard),
            EXTEND_TOKEN => return Ok(PathSegment::Operation(OpTag::Extend)),
            PARENT_TOKEN => return Ok(PathSegment::Operation(OpTag::Parent)),
            "@call" => return Ok(PathSegment::Operation(OpTag::Call)),
            "@combine" => return Ok(PathSegment::Operation(OpTag::Combine)),
            _ => {}
        }
        if let Some(value) = token.strip_prefix(ID_MATCH_MARKER) {
            if value.is_empty() {
                return Err(PathParseError::EmptyIdentifier(token.to_string()));
            }
            return Ok(PathSegment::identifier(value));
        }
        if let Ok(index) = token.parse::<usize>() {
            return Ok(PathSegment::Index(index));
        }
        if token.contains(':') {
            return Self::parse_slice(token);
        }
        Ok(PathSegment::Key(token.to_string()))
    }

    fn parse_slice(token: &str) -> Result<PathSegment, PathParseError> {
        let mut bounds = [None, None, None];
        let parts: Vec<&str> = token.split(':').collect();
        if parts.len() > 3 {
            return Err(PathParseError::BadSlice(token.to_string()));
        }
        for (slot, part) in bounds.iter_mut().zip(parts.iter()) {
            if part.is_empty() {
                continue;
            }
            match part.parse::<i64>() {
                Ok(v) => *slot = Some(v),
                Err(_) => return Err(PathParseError::BadSlice(token.to_string())),
            }
        }
        Ok(PathSegment::Slice {
            start: bounds[0],
            stop: bounds[1],
            step: bounds[2],
        })
    }

    /// Returns a new path with `segment` appended. Pure; `self` is not
    /// modified.
    #[must_use]
    pub fn append(&self, segment: impl Into<PathSegment>) -> Path {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Path { segments }
    }

    /// Returns a new path with all of `other`'s segments appended.
    #[must_use]
    pub fn join(&self, other: &Path) -> Path {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Path { segments }
    }

    /// Resolves `Parent` operations structurally: each one pops the
    /// preceding segment (clamped at the root).
    #[must_use]
    pub fn normalized(&self) -> Path {
        let mut segments: Vec<PathSegment> = Vec::with_capacity(self.segments.len());
        for seg in &self.segments {
            if matches!(seg, PathSegment::Operation(OpTag::Parent)) {
                segments.pop();
            } else {
                segments.push(seg.clone());
            }
        }
        Path { segments }
    }

    /// Structural compatibility test between this path (the pattern) and a
    /// concrete path. Wildcards match any single segment. Used for bulk
    /// identifier queries such as "all `@id` values one level below".
    pub fn matches(&self, other: &Path) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(other.segments.iter())
                .all(|(a, b)| a.matches(b))
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PathSegment> {
        self.segments.iter()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// True when every segment addresses exactly one child by name or
    /// position.
    pub fn is_plain(&self) -> bool {
        self.segments.iter().all(PathSegment::is_plain)
    }

    /// Splits into the longest leading run of plain segments and the
    /// remainder. Backends receive the plain prefix; fan-out segments are
    /// resolved in memory on the value read back.
    pub fn split_at_first_fancy(&self) -> (Path, &[PathSegment]) {
        let cut = self
            .segments
            .iter()
            .position(|s| !s.is_plain())
            .unwrap_or(self.segments.len());
        (
            Path {
                segments: self.segments[..cut].to_vec(),
            },
            &self.segments[cut..],
        )
    }

    /// The path without its last segment, and that segment. Empty paths
    /// split into themselves and nothing.
    pub fn split_last(&self) -> (Path, Option<&PathSegment>) {
        match self.segments.split_last() {
            Some((last, init)) => (
                Path {
                    segments: init.to_vec(),
                },
                Some(last),
            ),
            None => (Path::root(), None),
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for seg in &self.segments {
            if !first {
                write!(f, "/")?;
            }
            write!(f, "{}", seg)?;
            first = false;
        }
        Ok(())
    }
}

impl From<PathSegment> for Path {
    fn from(segment: PathSegment) -> Self {
        Path {
            segments: vec![segment],
        }
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let literal = String::deserialize(deserializer)?;
        Path::parse(&literal).map_err(D::Error::custom)
    }
}
