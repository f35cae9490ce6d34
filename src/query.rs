//! Deferred, chainable queries over an entry.

use crate::entry::{Entry, EntryKey};
use crate::error::DataTreeResult;
use crate::path::{Path, PathSegment};
use serde_json::Value;

/// Captures (root entry, accumulated path, default value) and resolves
/// only on demand. Construction and chaining never evaluate anything and
/// never mutate the underlying data.
#[derive(Debug, Clone)]
pub struct QueryHandle {
    root: Entry,
    path: Path,
    default: Option<Value>,
}

impl QueryHandle {
    pub fn new(root: Entry) -> QueryHandle {
        QueryHandle {
            root,
            path: Path::root(),
            default: None,
        }
    }

    /// Sets the value reported when the resolved location is absent.
    #[must_use]
    pub fn with_default(mut self, default: Value) -> QueryHandle {
        self.default = Some(default);
        self
    }

    /// Chains one more step; pure.
    #[must_use]
    pub fn child(&self, segment: impl Into<PathSegment>) -> QueryHandle {
        QueryHandle {
            root: self.root.clone(),
            path: self.path.append(segment),
            default: self.default.clone(),
        }
    }

    /// Chains a whole path; pure.
    #[must_use]
    pub fn append(&self, path: &Path) -> QueryHandle {
        QueryHandle {
            root: self.root.clone(),
            path: self.path.join(path),
            default: self.default.clone(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolves the accumulated path. `None` when absent and no default
    /// was set.
    pub fn fetch(&self) -> DataTreeResult<Option<Value>> {
        match self.root.fetch_path(&self.path)? {
            Some(value) => Ok(Some(value)),
            None => Ok(self.default.clone()),
        }
    }

    /// Resolves with an explicit fallback, overriding any captured
    /// default.
    pub fn get(&self, default: Value) -> DataTreeResult<Value> {
        Ok(self.root.fetch_path(&self.path)?.unwrap_or(default))
    }

    pub fn exists(&self) -> DataTreeResult<bool> {
        Ok(self.root.fetch_path(&self.path)?.is_some())
    }

    pub fn count(&self) -> DataTreeResult<usize> {
        self.root.child_path(&self.path).count()
    }

    /// Immediate children of the resolved location, as deferred handles.
    pub fn for_each(&self) -> DataTreeResult<Vec<(EntryKey, QueryHandle)>> {
        let resolved = self.root.child_path(&self.path);
        Ok(resolved
            .for_each()?
            .into_iter()
            .map(|(key, _)| {
                let child = self.child(PathSegment::from(key.clone()));
                (key, child)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn construction_does_not_evaluate() {
        let entry = Entry::from_value(json!({"a": {"b": 1}}));
        let query = QueryHandle::new(entry).child("a").child("nope").child("deeper");
        // chaining past absent keys is fine; only resolution reports it
        assert_eq!(query.fetch().unwrap(), None);
    }

    #[test]
    fn default_applies_on_miss_only() {
        let entry = Entry::from_value(json!({"a": 1}));
        let hit = QueryHandle::new(entry.clone()).child("a").with_default(json!(0));
        let miss = QueryHandle::new(entry).child("b").with_default(json!(0));
        assert_eq!(hit.fetch().unwrap(), Some(json!(1)));
        assert_eq!(miss.fetch().unwrap(), Some(json!(0)));
    }

    #[test]
    fn chained_and_joined_paths_agree() {
        let entry = Entry::from_value(json!({"a": {"b": {"c": 3}}}));
        let stepped = QueryHandle::new(entry.clone()).child("a").child("b").child("c");
        let joined = QueryHandle::new(entry).append(&Path::parse("a/b/c").unwrap());
        assert_eq!(stepped.fetch().unwrap(), joined.fetch().unwrap());
    }
}
