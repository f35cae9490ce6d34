//! Backend handles addressed by path.
//!
//! An [`Entry`] is a cheap handle: a root data reference plus a relative
//! [`Path`]. Three realizations exist: value entries over materialized
//! documents, connection entries that defer reads to a backend adapter,
//! and mapped entries (see [`crate::mapping`]) that translate queries
//! between schemas. Descent never fails for a missing key; resolution
//! reports absence through the `None` sentinel, which is distinct from an
//! explicit null value.

pub mod resolve;

mod connection_entry;
mod value_entry;

pub use connection_entry::ConnectionEntry;
pub use resolve::{EntryKey, UpdateOp};
pub use value_entry::ValueEntry;

use crate::error::DataTreeResult;
use crate::mapping::MappedEntry;
use crate::path::{Path, PathSegment};
use serde_json::Value;

/// Handle into a data source, bound to a path inside it.
#[derive(Debug, Clone)]
pub enum Entry {
    /// Wraps an already-materialized structure
    Value(ValueEntry),
    /// Wraps a backend adapter; reads are deferred until descended into
    Connection(ConnectionEntry),
    /// Presents a source entry under a different schema
    Mapped(MappedEntry),
}

impl Entry {
    /// Entry over a fresh document holding `value`.
    pub fn from_value(value: Value) -> Entry {
        Entry::Value(ValueEntry::new(value))
    }

    pub fn path(&self) -> &Path {
        match self {
            Entry::Value(e) => e.path(),
            Entry::Connection(e) => e.path(),
            Entry::Mapped(e) => e.path(),
        }
    }

    pub fn is_writable(&self) -> bool {
        match self {
            Entry::Value(_) => true,
            Entry::Connection(e) => e.is_writable(),
            Entry::Mapped(_) => false,
        }
    }

    /// Pure descent; no I/O beyond what is needed to prove the child
    /// exists when it is actually read.
    #[must_use]
    pub fn child(&self, segment: impl Into<PathSegment>) -> Entry {
        match self {
            Entry::Value(e) => Entry::Value(e.child(segment)),
            Entry::Connection(e) => Entry::Connection(e.child(segment)),
            Entry::Mapped(e) => Entry::Mapped(e.child(segment)),
        }
    }

    #[must_use]
    pub fn child_path(&self, path: &Path) -> Entry {
        match self {
            Entry::Value(e) => Entry::Value(e.child_path(path)),
            Entry::Connection(e) => Entry::Connection(e.child_path(path)),
            Entry::Mapped(e) => Entry::Mapped(e.child_path(path)),
        }
    }

    /// Resolves the handle: `Ok(None)` for a merely-absent location,
    /// errors for hard backend failures only.
    pub fn fetch(&self) -> DataTreeResult<Option<Value>> {
        match self {
            Entry::Value(e) => Ok(e.fetch()),
            Entry::Connection(e) => e.fetch(),
            Entry::Mapped(e) => e.fetch(),
        }
    }

    pub fn fetch_path(&self, path: &Path) -> DataTreeResult<Option<Value>> {
        self.child_path(path).fetch()
    }

    /// Absent data yields `default`, never an error.
    pub fn get(&self, path: &Path, default: Value) -> DataTreeResult<Value> {
        Ok(self.fetch_path(path)?.unwrap_or(default))
    }

    pub fn exists(&self) -> DataTreeResult<bool> {
        Ok(self.fetch()?.is_some())
    }

    /// Number of immediate children at the handle's location.
    pub fn count(&self) -> DataTreeResult<usize> {
        let count = match self.fetch()? {
            Some(Value::Object(map)) => map.len(),
            Some(Value::Array(elements)) => elements.len(),
            Some(Value::Null) | None => 0,
            Some(_) => 1,
        };
        Ok(count)
    }

    /// Resolved-value equality. Absent locations compare unequal to
    /// everything, including null.
    pub fn equal(&self, other: &Value) -> bool {
        matches!(self.fetch(), Ok(Some(ref value)) if value == other)
    }

    /// Immediate children as `(key, handle)` pairs; one level of I/O for
    /// connection entries.
    pub fn for_each(&self) -> DataTreeResult<Vec<(EntryKey, Entry)>> {
        match self {
            Entry::Value(e) => Ok(e
                .for_each()
                .into_iter()
                .map(|(k, child)| (k, Entry::Value(child)))
                .collect()),
            Entry::Connection(e) => Ok(e
                .for_each()?
                .into_iter()
                .map(|(k, child)| (k, Entry::Connection(child)))
                .collect()),
            Entry::Mapped(e) => Ok(e
                .for_each()?
                .into_iter()
                .map(|(k, child)| (k, Entry::Mapped(child)))
                .collect()),
        }
    }

    /// Assigns `value` at the handle's location.
    pub fn insert(&self, value: Value) -> DataTreeResult<()> {
        match self {
            Entry::Value(e) => e.insert(value),
            Entry::Connection(e) => e.insert(value),
            Entry::Mapped(e) => e.insert(value),
        }
    }

    /// Applies `op` with `value` at the handle's location.
    pub fn update(&self, value: Value, op: UpdateOp) -> DataTreeResult<()> {
        match self {
            Entry::Value(e) => e.update(value, op),
            Entry::Connection(e) => e.update(value, op),
            Entry::Mapped(e) => e.update(value, op),
        }
    }

    /// Appends at the end of the addressed sequence.
    pub fn append(&self, value: Value) -> DataTreeResult<()> {
        match self {
            Entry::Value(e) => e.append(value),
            Entry::Connection(e) => e.append(value),
            Entry::Mapped(e) => e.update(value, UpdateOp::Extend),
        }
    }

    pub fn remove(&self) -> DataTreeResult<()> {
        match self {
            Entry::Value(e) => e.remove(),
            Entry::Connection(e) => e.remove(),
            Entry::Mapped(e) => e.remove(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn child_composition_equals_joined_path() {
        let entry = Entry::from_value(json!({"a": {"b": {"c": 7}}}));
        let p = Path::parse("a/b").unwrap();
        let q = Path::parse("c").unwrap();

        let stepped = entry.child_path(&p).child_path(&q);
        let joined = entry.child_path(&p.join(&q));
        assert_eq!(stepped.fetch().unwrap(), joined.fetch().unwrap());
        assert_eq!(stepped.fetch().unwrap(), Some(json!(7)));
    }

    #[test]
    fn get_returns_default_for_absent_data() {
        let entry = Entry::from_value(json!({"a": 1}));
        let value = entry
            .get(&Path::parse("b/c/d").unwrap(), json!(99))
            .unwrap();
        assert_eq!(value, json!(99));
    }

    #[test]
    fn for_each_yields_immediate_children() {
        let entry = Entry::from_value(json!({"a": 1, "b": {"c": 2}}));
        let children = entry.for_each().unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].0, EntryKey::Key("a".to_string()));
        assert_eq!(children[1].1.child("c").fetch().unwrap(), Some(json!(2)));
    }
}
