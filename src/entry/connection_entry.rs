use crate::backend::DataSource;
use crate::entry::resolve::{self, EntryKey, UpdateOp};
use crate::error::DataTreeResult;
use crate::path::{Path, PathSegment};
use serde_json::Value;
use std::sync::Arc;

/// Entry that defers reads to a backend adapter.
///
/// Descending is pure path composition; the source sees no I/O until the
/// handle is resolved, and then only for the plain prefix of the path.
/// Wildcard, slice and identifier-match segments are applied in memory to
/// the value read back.
#[derive(Clone)]
pub struct ConnectionEntry {
    source: Arc<dyn DataSource>,
    path: Path,
}

impl ConnectionEntry {
    pub fn new(source: Arc<dyn DataSource>, path: Path) -> Self {
        ConnectionEntry { source, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_writable(&self) -> bool {
        self.source.is_writable()
    }

    #[must_use]
    pub fn child(&self, segment: impl Into<PathSegment>) -> ConnectionEntry {
        ConnectionEntry {
            source: Arc::clone(&self.source),
            path: self.path.append(segment),
        }
    }

    #[must_use]
    pub fn child_path(&self, path: &Path) -> ConnectionEntry {
        ConnectionEntry {
            source: Arc::clone(&self.source),
            path: self.path.join(path),
        }
    }

    /// Resolves the handle. Absence is `Ok(None)`; errors are hard backend
    /// failures only.
    pub fn fetch(&self) -> DataTreeResult<Option<Value>> {
        let normalized = self.path.normalized();
        let (plain, rest) = normalized.split_at_first_fancy();
        let base = match self.source.read(&plain)? {
            Some(base) => base,
            None => return Ok(None),
        };
        Ok(resolve::fetch(&base, rest))
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

    pub fn count(&self) -> DataTreeResult<usize> {
        let count = match self.fetch()? {
            Some(Value::Object(map)) => map.len(),
            Some(Value::Array(elements)) => elements.len(),
            Some(Value::Null) | None => 0,
            Some(_) => 1,
        };
        Ok(count)
    }

    pub fn equal(&self, other: &Value) -> bool {
        matches!(self.fetch(), Ok(Some(ref value)) if value == other)
    }

    /// Immediate children, with exactly one level of backend I/O for the
    /// key listing.
    pub fn for_each(&self) -> DataTreeResult<Vec<(EntryKey, ConnectionEntry)>> {
        let normalized = self.path.normalized();
        let keys = if normalized.is_plain() {
            self.source.list(&normalized)?
        } else {
            match self.fetch()? {
                Some(value) => resolve::children(&value).into_iter().map(|(k, _)| k).collect(),
                None => Vec::new(),
            }
        };
        Ok(keys
            .into_iter()
            .map(|key| {
                let child = self.child(PathSegment::from(key.clone()));
                (key, child)
            })
            .collect())
    }

    pub fn insert(&self, value: Value) -> DataTreeResult<()> {
        self.source
            .write(&self.path.normalized(), value, UpdateOp::Replace)
    }

    pub fn update(&self, value: Value, op: UpdateOp) -> DataTreeResult<()> {
        if op == UpdateOp::Remove {
            return self.remove();
        }
        self.source.write(&self.path.normalized(), value, op)
    }

    pub fn append(&self, value: Value) -> DataTreeResult<()> {
        self.source
            .write(&self.path.normalized(), value, UpdateOp::Extend)
    }

    pub fn remove(&self) -> DataTreeResult<()> {
        self.source.remove(&self.path.normalized())
    }
}

impl std::fmt::Debug for ConnectionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionEntry")
            .field("path", &self.path.to_string())
            .finish()
    }
}
