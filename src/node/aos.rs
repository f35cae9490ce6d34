use crate::entry::{Entry, EntryKey, UpdateOp, ValueEntry};
use crate::error::{DataTreeError, DataTreeResult};
use crate::node::{NodeCategory, NodeMetadata, TreeNode};
use crate::path::{PathSegment, Path};
use log::debug;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Array of structures: a sequence whose elements each carry a unique
/// identifier under the configured identifier tag, addressable by that
/// identifier as well as by position.
///
/// The local cache populates lazily: on the first lookup or iteration it
/// is resynchronized, exactly once, from the backing entry's set of
/// existing identifiers. The sync seeds skeleton elements (`{tag: id}`)
/// only, values still resolve through the backing store, so an
/// identifier already present there is never duplicated by
/// [`find_or_create`](StructArray::find_or_create). The cache is
/// invalidated only by an explicit [`reset`](StructArray::reset).
pub struct StructArray {
    cache: ValueEntry,
    backing: Option<Entry>,
    meta: NodeMetadata,
    owner: Weak<TreeNode>,
    synced: AtomicBool,
    sync_guard: Mutex<()>,
}

impl StructArray {
    /// Standalone empty array of structures.
    pub fn new(meta: NodeMetadata) -> StructArray {
        StructArray {
            cache: ValueEntry::new(Value::Null),
            backing: None,
            meta,
            owner: Weak::new(),
            synced: AtomicBool::new(false),
            sync_guard: Mutex::new(()),
        }
    }

    /// Array of structures over a lazy backing entry.
    pub fn from_entry(backing: Entry, meta: NodeMetadata) -> StructArray {
        StructArray {
            cache: ValueEntry::new(Value::Null),
            backing: Some(backing),
            meta,
            owner: Weak::new(),
            synced: AtomicBool::new(false),
            sync_guard: Mutex::new(()),
        }
    }

    pub(crate) fn from_parts(
        cache: ValueEntry,
        backing: Option<Entry>,
        meta: NodeMetadata,
        owner: Weak<TreeNode>,
    ) -> StructArray {
        StructArray {
            cache,
            backing,
            meta,
            owner,
            synced: AtomicBool::new(false),
            sync_guard: Mutex::new(()),
        }
    }

    pub fn id_tag(&self) -> &str {
        &self.meta.id_tag
    }

    /// Number of elements (cache after sync, else backing).
    pub fn len(&self) -> DataTreeResult<usize> {
        self.sync_once()?;
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

    /// Identifier values in element order, after sync.
    pub fn identifiers(&self) -> DataTreeResult<Vec<String>> {
        self.sync_once()?;
        let elements = match self.cache.fetch() {
            Some(Value::Array(elements)) => elements,
            _ => Vec::new(),
        };
        Ok(elements
            .iter()
            .filter_map(|e| e.get(&self.meta.id_tag).and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    /// Non-mutating lookup by identifier: cache hit, else backing entry,
    /// else `None`. Never synthesizes an element.
    pub fn find(&self, id: &str) -> DataTreeResult<Option<Arc<TreeNode>>> {
        self.sync_once()?;
        let segment = PathSegment::identifier_with_tag(self.meta.id_tag.clone(), id);
        let cache_child = self.cache.child(segment.clone());
        if let Some(cached) = cache_child.fetch() {
            return Ok(Some(self.element_node(segment, &cached)));
        }
        if let Some(backing) = &self.backing {
            if let Some(stored) = backing.child(segment.clone()).fetch()? {
                return Ok(Some(self.element_node(segment, &stored)));
            }
        }
        Ok(None)
    }

    /// Positional lookup; elements without an identifier tag are reachable
    /// only this way.
    pub fn at(&self, index: usize) -> DataTreeResult<Option<Arc<TreeNode>>> {
        self.sync_once()?;
        let segment = PathSegment::Index(index);
        let cache_child = self.cache.child(segment.clone());
        if let Some(cached) = cache_child.fetch() {
            return Ok(Some(self.element_node(segment, &cached)));
        }
        if let Some(backing) = &self.backing {
            if let Some(stored) = backing.child(segment.clone()).fetch()? {
                return Ok(Some(self.element_node(segment, &stored)));
            }
        }
        Ok(None)
    }

    /// Lookup by identifier, synthesizing one new default-valued element
    /// tagged with `id` on a miss and appending it to the cache. The
    /// preceding sync guarantees an identifier already present in the
    /// backing store is found, not duplicated.
    pub fn find_or_create(&self, id: &str) -> DataTreeResult<Arc<TreeNode>> {
        if let Some(existing) = self.find(id)? {
            return Ok(existing);
        }
        let mut element = match &self.meta.default_value {
            Some(Value::Object(map)) => Value::Object(map.clone()),
            _ => Value::Object(serde_json::Map::new()),
        };
        if let Some(map) = element.as_object_mut() {
            map.insert(self.meta.id_tag.clone(), Value::String(id.to_string()));
        }
        debug!("struct array: synthesizing element {}={}", self.meta.id_tag, id);
        self.cache.append(element)?;

        let segment = PathSegment::identifier_with_tag(self.meta.id_tag.clone(), id);
        let resolved = self.cache.child(segment.clone()).fetch().unwrap_or(Value::Null);
        Ok(self.element_node(segment, &resolved))
    }

    /// Applies `op` with `value`. `Extend` always appends a new element,
    /// identifier or not; every other op resolves its target through an
    /// identifier (from `key`, or from the value itself) and fails with
    /// `MissingIdentifier` when neither carries one.
    pub fn update(
        &self,
        key: Option<&str>,
        value: Value,
        op: UpdateOp,
    ) -> DataTreeResult<()> {
        if op == UpdateOp::Extend {
            return self.cache.append(value);
        }
        let id = match key {
            Some(id) => id.to_string(),
            None => value
                .get(&self.meta.id_tag)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    DataTreeError::MissingIdentifier(format!(
                        "{:?} update without '{}' value",
                        op, self.meta.id_tag
                    ))
                })?,
        };
        self.sync_once()?;
        let slot = self
            .cache
            .child(PathSegment::identifier_with_tag(self.meta.id_tag.clone(), &id));
        slot.update(value, op)
    }

    /// Elements in cache order: identifier-addressed where the tag is
    /// present, positional otherwise; pure backing iteration when the
    /// cache is empty even after sync.
    pub fn for_each(&self) -> DataTreeResult<Vec<(EntryKey, Arc<TreeNode>)>> {
        self.sync_once()?;
        let elements = match self.cache.fetch() {
            Some(Value::Array(elements)) => elements,
            _ => Vec::new(),
        };
        if !elements.is_empty() {
            let mut out = Vec::with_capacity(elements.len());
            for (index, element) in elements.iter().enumerate() {
                match element.get(&self.meta.id_tag).and_then(Value::as_str) {
                    Some(id) => {
                        let segment =
                            PathSegment::identifier_with_tag(self.meta.id_tag.clone(), id);
                        out.push((
                            EntryKey::Key(id.to_string()),
                            self.element_node(segment, element),
                        ));
                    }
                    None => {
                        out.push((
                            EntryKey::Index(index),
                            self.element_node(PathSegment::Index(index), element),
                        ));
                    }
                }
            }
            return Ok(out);
        }
        let mut out = Vec::new();
        if let Some(backing) = &self.backing {
            for (key, child) in backing.for_each()? {
                let resolved = child.fetch()?.unwrap_or(Value::Null);
                let segment = PathSegment::from(key.clone());
                let cache_child = self.cache.child(segment);
                let node = TreeNode::from_parts(
                    cache_child,
                    Some(child),
                    self.meta.for_child(),
                    self.owner.clone(),
                    NodeCategory::of(&resolved),
                );
                out.push((key, node));
            }
        }
        Ok(out)
    }

    /// Discards the local cache; the next access resynchronizes from the
    /// backing identifier set.
    pub fn reset(&self) -> DataTreeResult<()> {
        let _held = self.sync_guard.lock().unwrap_or_else(|e| e.into_inner());
        self.cache.remove()?;
        self.synced.store(false, Ordering::Release);
        Ok(())
    }

    /// Recursively serializes the cache into `target`.
    pub fn dump(&self, target: &Entry) -> DataTreeResult<()> {
        let elements = match self.cache.fetch() {
            Some(Value::Array(elements)) => elements,
            _ => return Ok(()),
        };
        target.insert(Value::Array(vec![Value::Null; elements.len()]))?;
        for (index, _) in elements.iter().enumerate() {
            if let Some(node) = self.at(index)? {
                node.dump(&target.child(PathSegment::Index(index)))?;
            }
        }
        Ok(())
    }

    /// Resynchronizes the cache, exactly once, from the backing entry's
    /// identifier set. Seeds skeletons only; element values keep resolving
    /// through the backing store.
    fn sync_once(&self) -> DataTreeResult<()> {
        if self.synced.load(Ordering::Acquire) {
            return Ok(());
        }
        let _held = self.sync_guard.lock().unwrap_or_else(|e| e.into_inner());
        if self.synced.load(Ordering::Acquire) {
            return Ok(());
        }
        if self.cache.count() == 0 {
            if let Some(backing) = &self.backing {
                let pattern = Path::root()
                    .append(PathSegment::Wildcard)
                    .append(PathSegment::Key(self.meta.id_tag.clone()));
                if let Some(Value::Array(ids)) = backing.fetch_path(&pattern)? {
                    let mut seen: Vec<String> = Vec::new();
                    for id in ids.iter().filter_map(Value::as_str) {
                        if !seen.iter().any(|s| s == id) {
                            seen.push(id.to_string());
                        }
                    }
                    debug!(
                        "struct array: synced {} identifier(s) from backing",
                        seen.len()
                    );
                    for id in seen {
                        let mut skeleton = serde_json::Map::new();
                        skeleton.insert(self.meta.id_tag.clone(), Value::String(id));
                        self.cache.append(Value::Object(skeleton))?;
                    }
                }
            }
        }
        self.synced.store(true, Ordering::Release);
        Ok(())
    }

    fn element_node(&self, segment: PathSegment, resolved: &Value) -> Arc<TreeNode> {
        let backing_child = self.backing.as_ref().map(|b| b.child(segment.clone()));
        TreeNode::from_parts(
            self.cache.child(segment),
            backing_child,
            self.meta.for_child(),
            self.owner.clone(),
            NodeCategory::of(resolved),
        )
    }
}

impl std::fmt::Debug for StructArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructArray")
            .field("id_tag", &self.meta.id_tag)
            .field("synced", &self.synced.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn find_or_create_is_idempotent() {
        let aos = StructArray::new(NodeMetadata::default());

        let first = aos.find_or_create("A").unwrap();
        assert_eq!(first.get("@id", Value::Null).unwrap(), json!("A"));

        let second = aos.find_or_create("A").unwrap();
        assert_eq!(second.get("@id", Value::Null).unwrap(), json!("A"));
        assert_eq!(aos.len().unwrap(), 1);
    }

    #[test]
    fn find_never_synthesizes() {
        let aos = StructArray::new(NodeMetadata::default());
        assert!(aos.find("missing").unwrap().is_none());
        assert_eq!(aos.len().unwrap(), 0);
    }

    #[test]
    fn backing_identifiers_are_not_duplicated() {
        let backing = Entry::from_value(json!([
            {"@id": "pf1", "turns": 140},
            {"@id": "pf2", "turns": 120}
        ]));
        let aos = StructArray::from_entry(backing, NodeMetadata::default());

        let pf1 = aos.find_or_create("pf1").unwrap();
        assert_eq!(aos.len().unwrap(), 2);
        // skeleton only in cache; the value resolves through the backing
        assert_eq!(pf1.get("turns", Value::Null).unwrap(), json!(140));

        let pf9 = aos.find_or_create("pf9").unwrap();
        assert_eq!(pf9.get("@id", Value::Null).unwrap(), json!("pf9"));
        assert_eq!(aos.len().unwrap(), 3);
    }

    #[test]
    fn extend_appends_without_identifier() {
        let aos = StructArray::new(NodeMetadata::default());
        aos.update(None, json!({"value": 1}), UpdateOp::Extend).unwrap();
        assert_eq!(aos.len().unwrap(), 1);
    }

    #[test]
    fn replace_without_identifier_is_rejected() {
        let aos = StructArray::new(NodeMetadata::default());
        let err = aos
            .update(None, json!({"value": 1}), UpdateOp::Replace)
            .unwrap_err();
        assert!(matches!(err, DataTreeError::MissingIdentifier(_)));
    }

    #[test]
    fn default_value_seeds_synthesized_elements() {
        let meta = NodeMetadata::default().with_default_value(json!({"state": "off"}));
        let aos = StructArray::new(meta);
        let node = aos.find_or_create("pump").unwrap();
        assert_eq!(node.get("state", Value::Null).unwrap(), json!("off"));
    }

    #[test]
    fn for_each_prefers_identifier_order() {
        let backing = Entry::from_value(json!([
            {"@id": "b"},
            {"@id": "a"},
            {"nameless": true}
        ]));
        let aos = StructArray::from_entry(backing, NodeMetadata::default());
        // sync seeds the tagged elements; the untagged backing element is
        // reachable positionally through backing iteration semantics
        let ids = aos.identifiers().unwrap();
        assert_eq!(ids, vec!["b".to_string(), "a".to_string()]);

        let children = aos.for_each().unwrap();
        assert_eq!(children[0].0, EntryKey::Key("b".to_string()));
        assert_eq!(children[1].0, EntryKey::Key("a".to_string()));
    }

    #[test]
    fn reset_invalidates_and_resyncs() {
        let backing = Entry::from_value(json!([{"@id": "x"}]));
        let aos = StructArray::from_entry(backing, NodeMetadata::default());
        aos.find_or_create("y").unwrap();
        assert_eq!(aos.len().unwrap(), 2);

        aos.reset().unwrap();
        assert_eq!(aos.identifiers().unwrap(), vec!["x".to_string()]);
    }

    #[test]
    fn custom_identifier_tag() {
        let meta = NodeMetadata::default().with_id_tag("@name");
        let backing = Entry::from_value(json!([{"@name": "core"}]));
        let aos = StructArray::from_entry(backing, meta);
        assert_eq!(aos.identifiers().unwrap(), vec!["core".to_string()]);
        assert!(aos.find("core").unwrap().is_some());
    }
}
