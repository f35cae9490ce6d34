use crate::backend::{Connection, DataSource, OpenMode, SourceFactory};
use crate::entry::{resolve, EntryKey, UpdateOp};
use crate::error::{DataTreeError, DataTreeResult};
use crate::path::Path;
use serde_json::Value;
use std::sync::{Arc, RwLock};

/// Backend over a process-local document. Mostly useful for tests and for
/// staging trees that are later dumped into a durable source.
pub struct MemorySource {
    doc: RwLock<Value>,
}

impl MemorySource {
    pub fn new(initial: Value) -> Self {
        MemorySource {
            doc: RwLock::new(initial),
        }
    }
}

impl DataSource for MemorySource {
    fn is_writable(&self) -> bool {
        true
    }

    fn read(&self, path: &Path) -> DataTreeResult<Option<Value>> {
        let guard = self.doc.read().unwrap_or_else(|e| e.into_inner());
        Ok(resolve::fetch(&guard, path.segments()))
    }

    fn write(&self, path: &Path, value: Value, op: UpdateOp) -> DataTreeResult<()> {
        let mut guard = self
            .doc
            .write()
            .map_err(|_| DataTreeError::Lock("memory source document".to_string()))?;
        resolve::write(&mut guard, path.segments(), value, op)
    }

    fn remove(&self, path: &Path) -> DataTreeResult<()> {
        let mut guard = self
            .doc
            .write()
            .map_err(|_| DataTreeError::Lock("memory source document".to_string()))?;
        resolve::remove(&mut guard, path.segments())
    }

    fn list(&self, path: &Path) -> DataTreeResult<Vec<EntryKey>> {
        let guard = self.doc.read().unwrap_or_else(|e| e.into_inner());
        let keys = resolve::fetch(&guard, path.segments())
            .map(|value| resolve::children(&value).into_iter().map(|(k, _)| k).collect())
            .unwrap_or_default();
        Ok(keys)
    }
}

/// Factory registered under the name `memory`. The locator names the
/// scratch space but carries no addressing information.
#[derive(Debug)]
pub struct MemoryFormat;

impl SourceFactory for MemoryFormat {
    fn open(&self, locator: &str, mode: OpenMode) -> DataTreeResult<Connection> {
        let source = Arc::new(MemorySource::new(Value::Null));
        Ok(Connection::new(locator, mode, source))
    }
}
