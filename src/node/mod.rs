//! The composite tree-node family.
//!
//! A [`TreeNode`] overlays a mutable local cache on an optional lazy
//! backing [`Entry`]: lookups hit the cache first and fall back to the
//! backing store, the two are never deep-merged at traversal time, and
//! writes land in the cache only until the tree is explicitly dumped into
//! a target entry. The identifier-addressed sequence variant is
//! [`StructArray`].

mod aos;
mod lazy;

pub use aos::StructArray;
pub use lazy::LazyCache;

use crate::entry::{Entry, EntryKey, UpdateOp, ValueEntry};
use crate::error::{DataTreeError, DataTreeResult};
use crate::path::{OpTag, PathSegment, DEFAULT_ID_TAG};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, Weak};

/// Structural category of a node, decided once at construction from the
/// shape of its input and fixed thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeCategory {
    /// No structure yet; fixes on the first structural write
    Empty,
    Scalar,
    Mapping,
    Sequence,
    /// Sequence whose elements carry unique identifier tags
    StructArray,
}

impl NodeCategory {
    pub fn of(value: &Value) -> NodeCategory {
        match value {
            Value::Null => NodeCategory::Empty,
            Value::Object(_) => NodeCategory::Mapping,
            Value::Array(_) => NodeCategory::Sequence,
            _ => NodeCategory::Scalar,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NodeCategory::Empty => "Empty",
            NodeCategory::Scalar => "Scalar",
            NodeCategory::Mapping => "Mapping",
            NodeCategory::Sequence => "Sequence",
            NodeCategory::StructArray => "StructArray",
        }
    }
}

/// Declared type for a node's children; conversion happens once per read,
/// never by re-inspecting shape on every access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChildKind {
    /// Decide from the child's shape, once, when the child node is built
    #[default]
    Auto,
    Scalar,
    Mapping,
    Sequence,
    StructArray,
}

impl ChildKind {
    fn category_for(&self, value: &Value) -> NodeCategory {
        match self {
            ChildKind::Auto => NodeCategory::of(value),
            ChildKind::Scalar => NodeCategory::Scalar,
            ChildKind::Mapping => NodeCategory::Mapping,
            ChildKind::Sequence => NodeCategory::Sequence,
            ChildKind::StructArray => NodeCategory::StructArray,
        }
    }
}

/// Per-node configuration supplied at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetadata {
    /// Value reported (and seeded into synthesized elements) when nothing
    /// else exists
    pub default_value: Option<Value>,
    /// Physical unit annotation, carried along but not interpreted here
    pub unit: Option<String>,
    /// Key under which array-of-structures elements carry their unique
    /// identifier
    pub id_tag: String,
    /// Declared type descriptor for children
    pub child_kind: ChildKind,
}

impl Default for NodeMetadata {
    fn default() -> Self {
        NodeMetadata {
            default_value: None,
            unit: None,
            id_tag: DEFAULT_ID_TAG.to_string(),
            child_kind: ChildKind::Auto,
        }
    }
}

impl NodeMetadata {
    pub fn with_default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    pub fn with_id_tag(mut self, id_tag: &str) -> Self {
        self.id_tag = id_tag.to_string();
        self
    }

    pub fn with_child_kind(mut self, child_kind: ChildKind) -> Self {
        self.child_kind = child_kind;
        self
    }

    fn for_child(&self) -> NodeMetadata {
        NodeMetadata {
            default_value: None,
            unit: None,
            id_tag: self.id_tag.clone(),
            child_kind: ChildKind::Auto,
        }
    }
}

/// Tree element combining a mutable local cache with an optional lazy
/// backing entry.
///
/// The cache is a value entry into a document owned by the node tree, so
/// child nodes address slices of the same overlay and writes are visible
/// through the whole tree. The backing entry is shared, not owned: release
/// policy belongs to whoever opened the connection. The parent reference
/// is a relation only and never keeps the parent alive.
pub struct TreeNode {
    cache: ValueEntry,
    backing: Option<Entry>,
    parent: Weak<TreeNode>,
    meta: NodeMetadata,
    category: Mutex<NodeCategory>,
    props: LazyCache<Value>,
}

impl TreeNode {
    /// Node over a literal snapshot; category is decided from the shape of
    /// `value`.
    pub fn new(value: Value) -> Arc<TreeNode> {
        let category = NodeCategory::of(&value);
        Self::from_parts(
            ValueEntry::new(value),
            None,
            NodeMetadata::default(),
            Weak::new(),
            category,
        )
    }

    /// Node with an empty cache over a lazy backing entry. Nothing is read
    /// until the node is queried.
    pub fn from_entry(backing: Entry, meta: NodeMetadata) -> Arc<TreeNode> {
        Self::from_parts(
            ValueEntry::new(Value::Null),
            Some(backing),
            meta,
            Weak::new(),
            NodeCategory::Empty,
        )
    }

    /// Node over a literal snapshot with explicit metadata.
    pub fn with_meta(value: Value, meta: NodeMetadata) -> Arc<TreeNode> {
        let category = NodeCategory::of(&value);
        Self::from_parts(ValueEntry::new(value), None, meta, Weak::new(), category)
    }

    pub(crate) fn from_parts(
        cache: ValueEntry,
        backing: Option<Entry>,
        meta: NodeMetadata,
        parent: Weak<TreeNode>,
        category: NodeCategory,
    ) -> Arc<TreeNode> {
        Arc::new(TreeNode {
            cache,
            backing,
            parent,
            meta,
            category: Mutex::new(category),
            props: LazyCache::new(),
        })
    }

    pub fn category(&self) -> NodeCategory {
        *self.category.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn metadata(&self) -> &NodeMetadata {
        &self.meta
    }

    /// The parent node, while the owning tree keeps it alive.
    pub fn parent(&self) -> Option<Arc<TreeNode>> {
        self.parent.upgrade()
    }

    /// Resolves the node's own value: cache first, then backing, then the
    /// configured default. `None` when all three are absent.
    pub fn value(&self) -> DataTreeResult<Option<Value>> {
        if let Some(cached) = self.cache.fetch() {
            if cached != Value::Null {
                return Ok(Some(cached));
            }
        }
        if let Some(backing) = &self.backing {
            if let Some(stored) = backing.fetch()? {
                return Ok(Some(stored));
            }
        }
        Ok(self.meta.default_value.clone())
    }

    /// Non-mutating child lookup: cache hit, else backing entry, else
    /// `None`.
    pub fn find(
        self: &Arc<Self>,
        key: impl Into<PathSegment>,
    ) -> DataTreeResult<Option<Arc<TreeNode>>> {
        let segment = key.into();
        let cache_child = self.cache.child(segment.clone());
        if let Some(cached) = cache_child.fetch() {
            let backing_child = self.backing.as_ref().map(|b| b.child(segment));
            return Ok(Some(self.make_child(cache_child, backing_child, &cached)));
        }
        if let Some(backing) = &self.backing {
            let backing_child = backing.child(segment);
            if let Some(stored) = backing_child.fetch()? {
                return Ok(Some(self.make_child(
                    cache_child,
                    Some(backing_child),
                    &stored,
                )));
            }
        }
        Ok(None)
    }

    /// Child value with a fallback: cache, backing, then `default`.
    pub fn get(
        self: &Arc<Self>,
        key: impl Into<PathSegment>,
        default: Value,
    ) -> DataTreeResult<Value> {
        match self.find(key)? {
            Some(child) => Ok(child.value()?.unwrap_or(default)),
            None => Ok(default),
        }
    }

    pub fn exists(self: &Arc<Self>, key: impl Into<PathSegment>) -> DataTreeResult<bool> {
        Ok(self.find(key)?.is_some())
    }

    /// Number of immediate children: the cache's, or the backing's when
    /// the cache is empty.
    pub fn len(&self) -> DataTreeResult<usize> {
        let cached = self.cache.count();
        if cached > 0 {
            return Ok(cached);
        }
        match &self.backing {
            Some(backing) => backing.count(),
            None => Ok(0),
        }
    }

    pub fn is_empty(&self) -> DataTreeResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Immediate children as nodes. Iterates the cache when it holds
    /// anything, otherwise falls back to backing iteration; the two are
    /// never merged.
    pub fn for_each(self: &Arc<Self>) -> DataTreeResult<Vec<(EntryKey, Arc<TreeNode>)>> {
        if self.cache.count() > 0 {
            let mut children = Vec::new();
            for (key, cache_child) in self.cache.for_each() {
                let resolved = cache_child.fetch().unwrap_or(Value::Null);
                let backing_child = self
                    .backing
                    .as_ref()
                    .map(|b| b.child(PathSegment::from(key.clone())));
                children.push((key, self.make_child(cache_child, backing_child, &resolved)));
            }
            return Ok(children);
        }
        let mut children = Vec::new();
        if let Some(backing) = &self.backing {
            for (key, backing_child) in backing.for_each()? {
                let resolved = backing_child.fetch()?.unwrap_or(Value::Null);
                let cache_child = self.cache.child(PathSegment::from(key.clone()));
                children.push((
                    key,
                    self.make_child(cache_child, Some(backing_child), &resolved),
                ));
            }
        }
        Ok(children)
    }

    /// Writes into the local cache. `key` of `None` addresses the node
    /// itself; the backing store is never touched.
    pub fn update(
        &self,
        key: Option<PathSegment>,
        value: Value,
        op: UpdateOp,
    ) -> DataTreeResult<()> {
        let (target, via_append) = match (&key, op) {
            (_, UpdateOp::Remove) => (None, false),
            (Some(PathSegment::Key(_)), _) => (Some(NodeCategory::Mapping), false),
            (Some(PathSegment::Index(_)), _) => (Some(NodeCategory::Sequence), false),
            (Some(PathSegment::Operation(OpTag::Extend)), _) => {
                (Some(NodeCategory::Sequence), true)
            }
            (Some(PathSegment::IdentifierMatch { .. }), _) => {
                (Some(NodeCategory::Sequence), false)
            }
            (Some(_), _) => (None, false),
            (None, UpdateOp::Extend) => (Some(NodeCategory::Sequence), true),
            (None, _) => (Some(NodeCategory::of(&value)), false),
        };
        if let Some(target) = target {
            self.transition(target, via_append)?;
        }
        let slot = match key {
            Some(segment) => self.cache.child(segment),
            None => self.cache.clone(),
        };
        slot.update(value, op)
    }

    /// Explicit append-at-end; the one write that may turn a scalar node
    /// into a sequence.
    pub fn append(&self, value: Value) -> DataTreeResult<()> {
        self.update(None, value, UpdateOp::Extend)
    }

    /// Recursively serializes the cache into `target`, delegating nested
    /// writes to nested nodes.
    pub fn dump(self: &Arc<Self>, target: &Entry) -> DataTreeResult<()> {
        match self.cache.fetch() {
            Some(Value::Object(map)) => {
                if map.is_empty() {
                    return target.insert(Value::Object(map));
                }
                for (k, _) in map {
                    if let Some(child) = self.find(PathSegment::Key(k.clone()))? {
                        child.dump(&target.child(PathSegment::Key(k)))?;
                    }
                }
                Ok(())
            }
            Some(Value::Array(elements)) => {
                if elements.is_empty() {
                    return target.insert(Value::Array(elements));
                }
                for (i, _) in elements.iter().enumerate() {
                    if let Some(child) = self.find(PathSegment::Index(i))? {
                        child.dump(&target.child(PathSegment::Index(i)))?;
                    }
                }
                Ok(())
            }
            Some(Value::Null) | None => Ok(()),
            Some(leaf) => target.insert(leaf),
        }
    }

    /// Lazily computed, memoized attribute: the compute closure runs at
    /// most once per property name, guarded by double-checked locking.
    pub fn computed<F>(&self, name: &str, compute: F) -> Value
    where
        F: FnOnce(&TreeNode) -> Value,
    {
        self.props.get_or_compute(name, || compute(self))
    }

    /// Drops a memoized attribute so the next access recomputes it.
    pub fn invalidate_computed(&self, name: &str) {
        self.props.invalidate(name);
    }

    /// View of this node as an array of structures. The node must be a
    /// sequence (or still empty).
    pub fn as_struct_array(self: &Arc<Self>) -> DataTreeResult<StructArray> {
        match self.category() {
            NodeCategory::Sequence | NodeCategory::StructArray | NodeCategory::Empty => {
                Ok(StructArray::from_parts(
                    self.cache.clone(),
                    self.backing.clone(),
                    self.meta.clone(),
                    Arc::downgrade(self),
                ))
            }
            other => Err(DataTreeError::TypeNotCompatible(format!(
                "{} node is not an array of structures",
                other.name()
            ))),
        }
    }

    fn make_child(
        self: &Arc<Self>,
        cache: ValueEntry,
        backing: Option<Entry>,
        resolved: &Value,
    ) -> Arc<TreeNode> {
        let category = self.meta.child_kind.category_for(resolved);
        TreeNode::from_parts(
            cache,
            backing,
            self.meta.for_child(),
            Arc::downgrade(self),
            category,
        )
    }

    fn transition(&self, target: NodeCategory, via_append: bool) -> DataTreeResult<()> {
        let mut category = self.category.lock().unwrap_or_else(|e| e.into_inner());
        match (*category, target) {
            (current, wanted) if current == wanted => Ok(()),
            (NodeCategory::Sequence, NodeCategory::StructArray)
            | (NodeCategory::StructArray, NodeCategory::Sequence) => Ok(()),
            (NodeCategory::Empty, wanted) => {
                // one-way: the first structural write fixes the category
                *category = wanted;
                Ok(())
            }
            (NodeCategory::Scalar, NodeCategory::Sequence) if via_append => {
                *category = NodeCategory::Sequence;
                Ok(())
            }
            (current, wanted) => Err(DataTreeError::IllegalTransition {
                from: current.name(),
                to: wanted.name(),
            }),
        }
    }
}

impl std::fmt::Debug for TreeNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeNode")
            .field("category", &self.category().name())
            .field("path", &self.cache.path().to_string())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn category_is_decided_from_shape_once() {
        assert_eq!(TreeNode::new(json!({"a": 1})).category(), NodeCategory::Mapping);
        assert_eq!(TreeNode::new(json!([1, 2])).category(), NodeCategory::Sequence);
        assert_eq!(TreeNode::new(json!(3.14)).category(), NodeCategory::Scalar);
        assert_eq!(TreeNode::new(Value::Null).category(), NodeCategory::Empty);
    }

    #[test]
    fn cache_wins_over_backing() {
        let backing = Entry::from_value(json!({"a": "stored", "b": "stored"}));
        let node = TreeNode::from_entry(backing, NodeMetadata::default());

        node.update(Some(PathSegment::from("a")), json!("local"), UpdateOp::Replace)
            .unwrap();

        assert_eq!(node.get("a", Value::Null).unwrap(), json!("local"));
        assert_eq!(node.get("b", Value::Null).unwrap(), json!("stored"));
    }

    #[test]
    fn find_is_non_mutating() {
        let node = TreeNode::new(json!({}));
        assert!(node.find("missing").unwrap().is_none());
        assert_eq!(node.len().unwrap(), 0);
    }

    #[test]
    fn first_structural_write_fixes_category() {
        let node = TreeNode::new(Value::Null);
        node.update(Some(PathSegment::from("a")), json!(1), UpdateOp::Replace)
            .unwrap();
        assert_eq!(node.category(), NodeCategory::Mapping);

        let err = node
            .update(Some(PathSegment::from(0usize)), json!(2), UpdateOp::Replace)
            .unwrap_err();
        assert!(matches!(err, DataTreeError::IllegalTransition { .. }));
    }

    #[test]
    fn scalar_becomes_sequence_only_via_append() {
        let node = TreeNode::new(json!(1));
        let err = node
            .update(Some(PathSegment::from(0usize)), json!(2), UpdateOp::Replace)
            .unwrap_err();
        assert!(matches!(err, DataTreeError::IllegalTransition { .. }));

        node.append(json!(2)).unwrap();
        assert_eq!(node.category(), NodeCategory::Sequence);
        assert_eq!(node.value().unwrap(), Some(json!([1, 2])));
    }

    #[test]
    fn parent_reference_does_not_keep_parent_alive() {
        let child = {
            let parent = TreeNode::new(json!({"a": {"b": 1}}));
            parent.find("a").unwrap().unwrap()
        };
        assert!(child.parent().is_none());
    }

    #[test]
    fn dump_round_trips_through_memory_entry() {
        let node = TreeNode::new(json!({"a": {"b": [1, 2]}, "c": "x"}));
        let target = Entry::from_value(Value::Null);
        node.dump(&target).unwrap();
        assert_eq!(target.fetch().unwrap(), Some(json!({"a": {"b": [1, 2]}, "c": "x"})));
    }

    #[test]
    fn computed_attribute_runs_once() {
        let node = TreeNode::new(json!([1, 2, 3]));
        let first = node.computed("sum", |n| {
            let total: i64 = n
                .value()
                .ok()
                .flatten()
                .and_then(|v| v.as_array().map(|xs| xs.iter().filter_map(Value::as_i64).sum()))
                .unwrap_or(0);
            json!(total)
        });
        let second = node.computed("sum", |_| json!(-1));
        assert_eq!(first, json!(6));
        assert_eq!(second, json!(6));
    }
}
