use crate::entry::{Entry, EntryKey, UpdateOp, ValueEntry};
use crate::error::{DataTreeError, DataTreeResult};
use crate::mapping::REFERENCE_MARKER;
use crate::path::{Path, PathSegment};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Bound on re-interpreting references that resolve to further
/// references; crossing it reports a malformed descriptor instead of
/// looping.
const MAX_REFERENCE_DEPTH: usize = 16;

static SUBSTITUTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("substitution pattern"));

/// Read-only entry view presenting a source entry under a different
/// schema.
///
/// The request path accumulates inside the mapping descriptor; resolution
/// looks the request up there and interprets what it finds. A plain
/// literal passes through, an `@`-marked string is a structured query
/// against the *source* entry (re-interpreted recursively when the result
/// is itself a reference), and containers are interpreted member-wise. A
/// reference resolving to nothing propagates the absence sentinel without
/// raising, which models optional fields absent from the source schema.
#[derive(Debug, Clone)]
pub struct MappedEntry {
    source: Arc<Entry>,
    mapping: ValueEntry,
    /// Named substitution variables, including ancestor identifier values
    /// collected along the traversed path
    envs: HashMap<String, String>,
}

impl MappedEntry {
    pub fn new(source: Entry, descriptor: &Arc<Value>, envs: HashMap<String, String>) -> Self {
        MappedEntry {
            source: Arc::new(source),
            mapping: ValueEntry::new(Value::clone(descriptor)),
            envs,
        }
    }

    /// The accumulated request path inside the descriptor.
    pub fn path(&self) -> &Path {
        self.mapping.path()
    }

    /// Pure descent. Descending through an identifier match records the
    /// identifier value as a substitution variable for reference queries
    /// below it.
    #[must_use]
    pub fn child(&self, segment: impl Into<PathSegment>) -> MappedEntry {
        let segment = segment.into();
        let mut envs = self.envs.clone();
        if let PathSegment::IdentifierMatch { tag, value } = &segment {
            envs.insert(tag.trim_start_matches(REFERENCE_MARKER).to_string(), value.clone());
        }
        MappedEntry {
            source: Arc::clone(&self.source),
            mapping: self.mapping.child(segment),
            envs,
        }
    }

    #[must_use]
    pub fn child_path(&self, path: &Path) -> MappedEntry {
        let mut view = self.clone();
        for segment in path.iter() {
            view = view.child(segment.clone());
        }
        view
    }

    /// Resolves the request inside the descriptor, then interprets it
    /// against the source.
    pub fn fetch(&self) -> DataTreeResult<Option<Value>> {
        match self.mapping.fetch() {
            Some(request) => self.interpret(&request, 0),
            None => Ok(None),
        }
    }

    pub fn fetch_path(&self, path: &Path) -> DataTreeResult<Option<Value>> {
        self.child_path(path).fetch()
    }

    pub fn get(&self, path: &Path, default: Value) -> DataTreeResult<Value> {
        Ok(self.fetch_path(path)?.unwrap_or(default))
    }

    pub fn exists(&self) -> DataTreeResult<bool> {
        Ok(self.fetch()?.is_some())
    }

    /// Children of the request location, yielded lazily: each child view
    /// interprets only when it is itself resolved, so untouched siblings
    /// never materialize.
    pub fn for_each(&self) -> DataTreeResult<Vec<(EntryKey, MappedEntry)>> {
        Ok(self
            .mapping
            .for_each()
            .into_iter()
            .map(|(key, _)| {
                let child = self.child(PathSegment::from(key.clone()));
                (key, child)
            })
            .collect())
    }

    pub fn insert(&self, _value: Value) -> DataTreeResult<()> {
        Err(DataTreeError::UnsupportedOperation(
            "mapped view is read-only".to_string(),
        ))
    }

    pub fn update(&self, _value: Value, _op: UpdateOp) -> DataTreeResult<()> {
        Err(DataTreeError::UnsupportedOperation(
            "mapped view is read-only".to_string(),
        ))
    }

    pub fn remove(&self) -> DataTreeResult<()> {
        Err(DataTreeError::UnsupportedOperation(
            "mapped view is read-only".to_string(),
        ))
    }

    fn interpret(&self, request: &Value, depth: usize) -> DataTreeResult<Option<Value>> {
        match request {
            Value::String(text) => match text.strip_prefix(REFERENCE_MARKER) {
                Some(query) => self.resolve_reference(query, depth),
                None => Ok(Some(request.clone())),
            },
            Value::Object(map) => {
                let mut interpreted = serde_json::Map::new();
                for (key, member) in map {
                    if let Some(value) = self.interpret(member, depth)? {
                        interpreted.insert(key.clone(), value);
                    }
                }
                Ok(Some(Value::Object(interpreted)))
            }
            Value::Array(members) => {
                let mut interpreted = Vec::with_capacity(members.len());
                for member in members {
                    if let Some(value) = self.interpret(member, depth)? {
                        interpreted.push(value);
                    }
                }
                Ok(Some(Value::Array(interpreted)))
            }
            other => Ok(Some(other.clone())),
        }
    }

    fn resolve_reference(&self, query: &str, depth: usize) -> DataTreeResult<Option<Value>> {
        if depth >= MAX_REFERENCE_DEPTH {
            return Err(DataTreeError::Malformed(format!(
                "reference chain exceeds {} indirections at '{}'",
                MAX_REFERENCE_DEPTH, query
            )));
        }
        let expanded = self.substitute(query);
        let path = Path::parse(&expanded)?;
        match self.source.fetch_path(&path)? {
            // a reference may resolve to another reference; re-interpret
            Some(Value::String(inner)) if inner.starts_with(REFERENCE_MARKER) => {
                self.interpret(&Value::String(inner), depth + 1)
            }
            resolved => Ok(resolved),
        }
    }

    /// Expands `{name}` substitution variables from the collected envs;
    /// unknown names are left intact.
    fn substitute(&self, query: &str) -> String {
        SUBSTITUTION
            .replace_all(query, |caps: &regex::Captures<'_>| {
                match self.envs.get(&caps[1]) {
                    Some(value) => value.clone(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}
