use crate::entry::resolve::{self, EntryKey, UpdateOp};
use crate::error::{DataTreeError, DataTreeResult};
use crate::path::{Path, PathSegment};
use serde_json::Value;
use std::sync::{Arc, RwLock};

/// Entry over an already-materialized document.
///
/// The handle is (shared document root, relative path); descending clones
/// nothing but the path, so handles are cheap and a whole node tree can
/// address slices of one shared document. Reads resolve lazily against the
/// current document state.
#[derive(Debug, Clone)]
pub struct ValueEntry {
    root: Arc<RwLock<Value>>,
    path: Path,
}

impl ValueEntry {
    /// Wraps a materialized value as a new single-document entry.
    pub fn new(value: Value) -> Self {
        ValueEntry {
            root: Arc::new(RwLock::new(value)),
            path: Path::root(),
        }
    }

    /// Entry into an existing shared document at `path`.
    pub fn shared(root: Arc<RwLock<Value>>, path: Path) -> Self {
        ValueEntry { root, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The shared document root this handle reads through.
    pub fn document(&self) -> Arc<RwLock<Value>> {
        Arc::clone(&self.root)
    }

    /// Pure descent; no I/O, no evaluation.
    #[must_use]
    pub fn child(&self, segment: impl Into<PathSegment>) -> ValueEntry {
        ValueEntry {
            root: Arc::clone(&self.root),
            path: self.path.append(segment),
        }
    }

    #[must_use]
    pub fn child_path(&self, path: &Path) -> ValueEntry {
        ValueEntry {
            root: Arc::clone(&self.root),
            path: self.path.join(path),
        }
    }

    /// Resolves the handle, `None` when nothing exists at the path.
    pub fn fetch(&self) -> Option<Value> {
        let guard = self.root.read().unwrap_or_else(|e| e.into_inner());
        resolve::fetch(&guard, self.path.normalized().segments())
    }

    pub fn fetch_path(&self, path: &Path) -> Option<Value> {
        let guard = self.root.read().unwrap_or_else(|e| e.into_inner());
        resolve::fetch(&guard, self.path.join(path).normalized().segments())
    }

    /// Absent data yields `default`, never an error.
    pub fn get(&self, path: &Path, default: Value) -> Value {
        self.fetch_path(path).unwrap_or(default)
    }

    pub fn exists(&self) -> bool {
        self.fetch().is_some()
    }

    pub fn count(&self) -> usize {
        let guard = self.root.read().unwrap_or_else(|e| e.into_inner());
        resolve::count(&guard, self.path.normalized().segments())
    }

    pub fn equal(&self, other: &Value) -> bool {
        self.fetch().as_ref() == Some(other)
    }

    /// Immediate children of the resolved location.
    pub fn for_each(&self) -> Vec<(EntryKey, ValueEntry)> {
        let resolved = match self.fetch() {
            Some(value) => value,
            None => return Vec::new(),
        };
        resolve::children(&resolved)
            .into_iter()
            .map(|(key, _)| {
                let child = self.child(PathSegment::from(key.clone()));
                (key, child)
            })
            .collect()
    }

    /// Assigns `value` at the handle's location, vivifying intermediate
    /// containers.
    pub fn insert(&self, value: Value) -> DataTreeResult<()> {
        self.write(value, UpdateOp::Replace)
    }

    /// Applies `op` with `value` at the handle's location.
    pub fn update(&self, value: Value, op: UpdateOp) -> DataTreeResult<()> {
        if op == UpdateOp::Remove {
            return self.remove();
        }
        self.write(value, op)
    }

    /// Appends at the end of the addressed sequence.
    pub fn append(&self, value: Value) -> DataTreeResult<()> {
        self.child(PathSegment::Operation(crate::path::OpTag::Extend))
            .insert(value)
    }

    pub fn remove(&self) -> DataTreeResult<()> {
        let mut guard = self
            .root
            .write()
            .map_err(|_| DataTreeError::Lock("value entry document".to_string()))?;
        resolve::remove(&mut guard, self.path.normalized().segments())
    }

    fn write(&self, value: Value, op: UpdateOp) -> DataTreeResult<()> {
        let mut guard = self
            .root
            .write()
            .map_err(|_| DataTreeError::Lock("value entry document".to_string()))?;
        resolve::write(&mut guard, self.path.normalized().segments(), value, op)
    }
}
