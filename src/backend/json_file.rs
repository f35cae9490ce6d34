use crate::backend::{Connection, DataSource, OpenMode, SourceFactory};
use crate::entry::{resolve, EntryKey, UpdateOp};
use crate::error::{DataTreeError, DataTreeResult};
use crate::path::Path;
use log::debug;
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::RwLock;

/// Backend over one JSON document on disk.
///
/// The whole file is parsed when the connection is constructed, so
/// malformed content surfaces at open time, never at first query. Writes
/// mutate the in-memory document and are flushed back to the file
/// immediately; `flush` is also called on connection close.
#[derive(Debug)]
pub struct JsonFileSource {
    file: PathBuf,
    doc: RwLock<Value>,
    writable: bool,
}

impl JsonFileSource {
    pub fn open(file: PathBuf, mode: OpenMode) -> DataTreeResult<Self> {
        let doc = match fs::read_to_string(&file) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                DataTreeError::Malformed(format!("{}: {}", file.display(), e))
            })?,
            Err(err) if err.kind() == ErrorKind::NotFound && mode.create => Value::Null,
            Err(err) => return Err(err.into()),
        };
        debug!("json source loaded: {}", file.display());
        Ok(JsonFileSource {
            file,
            doc: RwLock::new(doc),
            writable: mode.write,
        })
    }

    fn persist(&self, doc: &Value) -> DataTreeResult<()> {
        let text = serde_json::to_string_pretty(doc)?;
        fs::write(&self.file, text)?;
        Ok(())
    }
}

impl DataSource for JsonFileSource {
    fn is_writable(&self) -> bool {
        self.writable
    }

    fn read(&self, path: &Path) -> DataTreeResult<Option<Value>> {
        let guard = self.doc.read().unwrap_or_else(|e| e.into_inner());
        Ok(resolve::fetch(&guard, path.segments()))
    }

    fn write(&self, path: &Path, value: Value, op: UpdateOp) -> DataTreeResult<()> {
        if !self.writable {
            return Err(DataTreeError::UnsupportedOperation(format!(
                "{} opened read-only",
                self.file.display()
            )));
        }
        let mut guard = self
            .doc
            .write()
            .map_err(|_| DataTreeError::Lock("json source document".to_string()))?;
        resolve::write(&mut guard, path.segments(), value, op)?;
        self.persist(&guard)
    }

    fn remove(&self, path: &Path) -> DataTreeResult<()> {
        if !self.writable {
            return Err(DataTreeError::UnsupportedOperation(format!(
                "{} opened read-only",
                self.file.display()
            )));
        }
        let mut guard = self
            .doc
            .write()
            .map_err(|_| DataTreeError::Lock("json source document".to_string()))?;
        resolve::remove(&mut guard, path.segments())?;
        self.persist(&guard)
    }

    fn list(&self, path: &Path) -> DataTreeResult<Vec<EntryKey>> {
        let guard = self.doc.read().unwrap_or_else(|e| e.into_inner());
        let keys = resolve::fetch(&guard, path.segments())
            .map(|value| resolve::children(&value).into_iter().map(|(k, _)| k).collect())
            .unwrap_or_default();
        Ok(keys)
    }

    fn flush(&self) -> DataTreeResult<()> {
        if !self.writable {
            return Ok(());
        }
        let guard = self.doc.read().unwrap_or_else(|e| e.into_inner());
        self.persist(&guard)
    }
}

/// Factory registered under the name `json`. Accepts bare file paths and
/// `json://` locators.
#[derive(Debug)]
pub struct JsonFormat;

impl JsonFormat {
    fn file_path(locator: &str) -> PathBuf {
        PathBuf::from(locator.strip_prefix("json://").unwrap_or(locator))
    }
}

impl SourceFactory for JsonFormat {
    fn open(&self, locator: &str, mode: OpenMode) -> DataTreeResult<Connection> {
        let source = JsonFileSource::open(Self::file_path(locator), mode)?;
        Ok(Connection::new(locator, mode, std::sync::Arc::new(source)))
    }
}
