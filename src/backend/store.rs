use crate::backend::{Connection, DataSource, OpenMode, SourceFactory};
use crate::entry::{resolve, EntryKey, UpdateOp};
use crate::error::{DataTreeError, DataTreeResult};
use crate::path::{OpTag, Path, PathSegment};
use log::debug;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

/// Every key starts with the root marker so the store root has an exact
/// key like any other location.
const ROOT_KEY: &str = "$";

/// Width index segments are zero-padded to, so lexicographic prefix scans
/// return positional children in order.
const INDEX_WIDTH: usize = 10;

/// Backend over an embedded sled tree.
///
/// Locations map to path-literal keys under a root marker; leaves are
/// JSON-encoded bytes. Container values are flattened into one key per
/// leaf so that `list` and partial reads stay one prefix scan. Writes are
/// flushed eagerly.
pub struct StoreSource {
    _db: sled::Db,
    tree: sled::Tree,
    writable: bool,
}

impl StoreSource {
    pub fn open(path: PathBuf, mode: OpenMode) -> DataTreeResult<Self> {
        let db = sled::open(&path)?;
        let tree = db.open_tree("data")?;
        debug!("store source opened: {}", path.display());
        Ok(StoreSource {
            _db: db,
            tree,
            writable: mode.write,
        })
    }

    fn encode_segment(segment: &PathSegment) -> DataTreeResult<String> {
        match segment {
            PathSegment::Key(k) => Ok(k.clone()),
            PathSegment::Index(i) => Ok(format!("{:0width$}", i, width = INDEX_WIDTH)),
            other => Err(DataTreeError::UnsupportedOperation(format!(
                "store keys address plain segments only, got {:?}",
                other
            ))),
        }
    }

    fn decode_segment(token: &str) -> PathSegment {
        if token.len() == INDEX_WIDTH && token.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = token.parse::<usize>() {
                return PathSegment::Index(index);
            }
        }
        PathSegment::Key(token.to_string())
    }

    fn encode_path(path: &Path) -> DataTreeResult<String> {
        let mut key = String::from(ROOT_KEY);
        for segment in path.iter() {
            key.push('/');
            key.push_str(&Self::encode_segment(segment)?);
        }
        Ok(key)
    }

    fn require_writable(&self) -> DataTreeResult<()> {
        if self.writable {
            Ok(())
        } else {
            Err(DataTreeError::UnsupportedOperation(
                "store opened read-only".to_string(),
            ))
        }
    }

    /// Reassembles a subtree from the flattened keys below `key`.
    fn reconstruct(&self, key: &str) -> DataTreeResult<Option<Value>> {
        let prefix = format!("{}/", key);
        let mut root = Value::Null;
        let mut found = false;
        for item in self.tree.scan_prefix(prefix.as_bytes()) {
            let (stored_key, bytes) = item?;
            let stored_key = String::from_utf8_lossy(&stored_key).to_string();
            let relative = &stored_key[prefix.len()..];
            let segments: Vec<PathSegment> =
                relative.split('/').map(Self::decode_segment).collect();
            let leaf: Value = serde_json::from_slice(&bytes)?;
            resolve::write(&mut root, &segments, leaf, UpdateOp::Replace)?;
            found = true;
        }
        Ok(found.then_some(root))
    }

    /// Replaces the subtree at `key` with `value`, flattened into leaf
    /// keys.
    fn store(&self, key: &str, value: Value) -> DataTreeResult<()> {
        self.clear(key)?;
        self.put_flattened(key, value)?;
        self.tree.flush()?;
        Ok(())
    }

    fn put_flattened(&self, key: &str, value: Value) -> DataTreeResult<()> {
        match &value {
            Value::Object(map) if !map.is_empty() => {
                for (k, v) in map {
                    self.put_flattened(&format!("{}/{}", key, k), v.clone())?;
                }
                Ok(())
            }
            Value::Array(elements) if !elements.is_empty() => {
                for (i, v) in elements.iter().enumerate() {
                    let token = format!("{:0width$}", i, width = INDEX_WIDTH);
                    self.put_flattened(&format!("{}/{}", key, token), v.clone())?;
                }
                Ok(())
            }
            _ => {
                let bytes = serde_json::to_vec(&value)?;
                self.tree.insert(key.as_bytes(), bytes)?;
                Ok(())
            }
        }
    }

    fn clear(&self, key: &str) -> DataTreeResult<()> {
        self.tree.remove(key.as_bytes())?;
        let prefix = format!("{}/", key);
        let stale: Vec<sled::IVec> = self
            .tree
            .scan_prefix(prefix.as_bytes())
            .keys()
            .collect::<Result<_, _>>()?;
        for stored_key in stale {
            self.tree.remove(stored_key)?;
        }
        Ok(())
    }
}

impl DataSource for StoreSource {
    fn is_writable(&self) -> bool {
        self.writable
    }

    fn read(&self, path: &Path) -> DataTreeResult<Option<Value>> {
        let key = Self::encode_path(path)?;
        if let Some(bytes) = self.tree.get(key.as_bytes())? {
            return Ok(Some(serde_json::from_slice(&bytes)?));
        }
        self.reconstruct(&key)
    }

    fn write(&self, path: &Path, value: Value, op: UpdateOp) -> DataTreeResult<()> {
        self.require_writable()?;
        // A trailing append marker addresses the next free index.
        if let (parent, Some(PathSegment::Operation(OpTag::Extend))) = path.split_last() {
            return self.write(&parent, value, UpdateOp::Extend);
        }
        let key = Self::encode_path(path)?;
        match op {
            UpdateOp::Replace => self.store(&key, value),
            UpdateOp::Merge | UpdateOp::Extend => {
                let mut current = self.read(path)?.unwrap_or(Value::Null);
                resolve::write(&mut current, &[], value, op)?;
                self.store(&key, current)
            }
            UpdateOp::Remove => self.remove(path),
        }
    }

    fn remove(&self, path: &Path) -> DataTreeResult<()> {
        self.require_writable()?;
        let key = Self::encode_path(path)?;
        self.clear(&key)?;
        self.tree.flush()?;
        Ok(())
    }

    fn list(&self, path: &Path) -> DataTreeResult<Vec<EntryKey>> {
        let key = Self::encode_path(path)?;
        if let Some(bytes) = self.tree.get(key.as_bytes())? {
            let leaf: Value = serde_json::from_slice(&bytes)?;
            return Ok(resolve::children(&leaf).into_iter().map(|(k, _)| k).collect());
        }
        let prefix = format!("{}/", key);
        let mut seen = BTreeSet::new();
        for item in self.tree.scan_prefix(prefix.as_bytes()).keys() {
            let stored_key = item?;
            let stored_key = String::from_utf8_lossy(&stored_key).to_string();
            let first = stored_key[prefix.len()..]
                .split('/')
                .next()
                .unwrap_or_default()
                .to_string();
            if !first.is_empty() {
                seen.insert(first);
            }
        }
        Ok(seen
            .into_iter()
            .map(|token| match Self::decode_segment(&token) {
                PathSegment::Index(i) => EntryKey::Index(i),
                PathSegment::Key(k) => EntryKey::Key(k),
                _ => EntryKey::Key(token),
            })
            .collect())
    }

    fn flush(&self) -> DataTreeResult<()> {
        self.tree.flush()?;
        Ok(())
    }
}

/// Factory registered under the name `store`. Accepts bare directory
/// paths and `store://` locators.
#[derive(Debug)]
pub struct StoreFormat;

impl StoreFormat {
    fn db_path(locator: &str) -> PathBuf {
        PathBuf::from(locator.strip_prefix("store://").unwrap_or(locator))
    }
}

impl SourceFactory for StoreFormat {
    fn open(&self, locator: &str, mode: OpenMode) -> DataTreeResult<Connection> {
        let source = StoreSource::open(Self::db_path(locator), mode)?;
        Ok(Connection::new(locator, mode, Arc::new(source)))
    }
}
