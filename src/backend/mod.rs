//! Backend capability interface consumed by the core.
//!
//! File and store collaborators plug in through two seams: [`DataSource`],
//! the minimal read/write surface a backend adapter exposes, and
//! [`Connection`], the scoped handle that owns backend resources from open
//! to close. Concrete codecs for scientific encodings live outside this
//! crate; the built-ins here (memory, JSON file, sled store) are the
//! reference adapters.

mod json_file;
mod memory;
mod store;

pub use json_file::JsonFormat;
pub use memory::MemoryFormat;
pub use store::StoreFormat;

use crate::entry::{ConnectionEntry, Entry, EntryKey, UpdateOp};
use crate::error::{DataTreeError, DataTreeResult};
use crate::path::Path;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Minimal surface a backend adapter must expose.
///
/// Sources receive structurally normalized paths. Reads are handed the
/// longest plain (key/index) prefix of a query; fan-out segments are
/// resolved in memory by the entry layer on the value read back.
pub trait DataSource: Send + Sync {
    fn is_readable(&self) -> bool {
        true
    }

    fn is_writable(&self) -> bool;

    /// Reads the value at `path`; `Ok(None)` for a merely-absent location.
    fn read(&self, path: &Path) -> DataTreeResult<Option<Value>>;

    /// Applies `op` with `value` at `path`.
    fn write(&self, path: &Path, value: Value, op: UpdateOp) -> DataTreeResult<()>;

    /// Removes the value at `path`; absent locations are a no-op.
    fn remove(&self, path: &Path) -> DataTreeResult<()>;

    /// Keys of the immediate children at `path` (one level of I/O).
    fn list(&self, path: &Path) -> DataTreeResult<Vec<EntryKey>>;

    /// Pushes buffered state to durable storage, where that means
    /// anything.
    fn flush(&self) -> DataTreeResult<()> {
        Ok(())
    }
}

/// Instantiates connections from locators; implementations are looked up
/// by name through the plugin registry.
pub trait SourceFactory: Send + Sync + std::fmt::Debug {
    fn open(&self, locator: &str, mode: OpenMode) -> DataTreeResult<Connection>;
}

/// Open-mode flags for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenMode {
    pub read: bool,
    pub write: bool,
    /// Create the backing resource if it does not exist
    pub create: bool,
    /// Open for writing at the end of existing content
    pub append: bool,
    /// Backing resource is scratch space; contents need not survive close
    pub temporary: bool,
}

impl Default for OpenMode {
    fn default() -> Self {
        OpenMode::read()
    }
}

impl OpenMode {
    pub const fn read() -> Self {
        OpenMode {
            read: true,
            write: false,
            create: false,
            append: false,
            temporary: false,
        }
    }

    pub const fn read_write() -> Self {
        OpenMode {
            read: true,
            write: true,
            create: false,
            append: false,
            temporary: false,
        }
    }

    pub const fn create() -> Self {
        OpenMode {
            read: true,
            write: true,
            create: true,
            append: false,
            temporary: false,
        }
    }

    pub const fn append() -> Self {
        OpenMode {
            read: true,
            write: true,
            create: true,
            append: true,
            temporary: false,
        }
    }

    /// Compact "rwcat" style string for diagnostics.
    pub fn mode_str(&self) -> String {
        let mut s = String::new();
        if self.read {
            s.push('r');
        }
        if self.write {
            s.push('w');
        }
        if self.create {
            s.push('c');
        }
        if self.append {
            s.push('a');
        }
        if self.temporary {
            s.push('t');
        }
        s
    }
}

/// Scoped handle over an opened data source.
///
/// Backend resources are acquired when the connection is constructed and
/// released deterministically on [`close`](Connection::close) or when the
/// connection is dropped.
pub struct Connection {
    id: String,
    locator: String,
    mode: OpenMode,
    source: Arc<dyn DataSource>,
    opened_at: DateTime<Utc>,
    open: AtomicBool,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("locator", &self.locator)
            .field("mode", &self.mode)
            .field("opened_at", &self.opened_at)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub fn new(locator: impl Into<String>, mode: OpenMode, source: Arc<dyn DataSource>) -> Self {
        let locator = locator.into();
        let id = Uuid::new_v4().to_string();
        info!("connection {} opened: {} [{}]", id, locator, mode.mode_str());
        Connection {
            id,
            locator,
            mode,
            source,
            opened_at: Utc::now(),
            open: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn is_readable(&self) -> bool {
        self.mode.read && self.source.is_readable()
    }

    pub fn is_writable(&self) -> bool {
        self.mode.write && self.source.is_writable()
    }

    /// Entry at the root of the connected source. Lazy: no data is read
    /// until the entry is descended into and resolved.
    pub fn read(&self) -> DataTreeResult<Entry> {
        if !self.is_open() {
            return Err(DataTreeError::UnsupportedOperation(format!(
                "connection {} is closed",
                self.locator
            )));
        }
        if !self.is_readable() {
            return Err(DataTreeError::UnsupportedOperation(format!(
                "connection {} is not readable",
                self.locator
            )));
        }
        Ok(Entry::Connection(ConnectionEntry::new(
            Arc::clone(&self.source),
            Path::root(),
        )))
    }

    /// Materializes `entry` and writes it at the source root.
    pub fn write(&self, entry: &Entry) -> DataTreeResult<()> {
        if !self.is_open() {
            return Err(DataTreeError::UnsupportedOperation(format!(
                "connection {} is closed",
                self.locator
            )));
        }
        if !self.is_writable() {
            return Err(DataTreeError::UnsupportedOperation(format!(
                "connection {} is not writable",
                self.locator
            )));
        }
        let value = entry.fetch()?.unwrap_or(Value::Null);
        let op = if self.mode.append {
            UpdateOp::Extend
        } else {
            UpdateOp::Replace
        };
        self.source.write(&Path::root(), value, op)?;
        self.source.flush()
    }

    /// Flushes and releases the connection. Idempotent.
    pub fn close(&self) -> DataTreeResult<()> {
        if self.open.swap(false, Ordering::AcqRel) {
            info!("connection {} closed: {}", self.id, self.locator);
            self.source.flush()?;
        }
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("connection {} close failed on drop: {}", self.id, err);
        }
    }
}
