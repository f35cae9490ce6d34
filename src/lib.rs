//! # DataTree Library
//!
//! This library lets application code address heterogeneous data sources
//! (in-memory structures, structured files, embedded stores) as one
//! uniform, lazily evaluated hierarchical tree, navigable by declarative
//! path expressions. A tree authored under one naming schema can be viewed
//! under a different schema through a declarative translation descriptor,
//! without copying the underlying data.
//!
//! ## Core Components
//!
//! * `path` - Immutable path expressions addressing locations in a tree
//! * `entry` - Backend handles bound to a path inside a data source
//! * `backend` - Capability interface and built-in sources (memory, JSON
//!   file, embedded store)
//! * `node` - Tree nodes overlaying a mutable cache on a lazy backing
//!   entry, including the identifier-addressed array of structures
//! * `query` - Deferred, chainable queries
//! * `mapping` - Schema-translation views driven by mapping descriptors
//! * `registry` - Name-to-implementation lookup for backend plugins
//!
//! ## Architecture
//!
//! Entries are cheap handles that defer reads until a location is actually
//! resolved; nodes add a mutable local overlay on top, resolved cache
//! first and backing store second, never deep-merged. Absence flows
//! through every layer as a sentinel (`None`), distinct from an explicit
//! null and never an error; errors are reserved for programmer mistakes
//! and hard backend failures.

pub mod backend;
pub mod config;
pub mod entry;
pub mod error;
pub mod logging;
pub mod mapping;
pub mod node;
pub mod path;
pub mod query;
pub mod registry;

mod datatree;

// Re-export main types for convenience
pub use backend::{Connection, DataSource, OpenMode, SourceFactory};
pub use config::{DataTreeConfig, MAPPING_PATH_ENV};
pub use datatree::DataTree;
pub use entry::{ConnectionEntry, Entry, EntryKey, UpdateOp, ValueEntry};
pub use error::{DataTreeError, DataTreeResult};
pub use mapping::{MappedEntry, Mapper, MappingLookup};
pub use node::{ChildKind, LazyCache, NodeCategory, NodeMetadata, StructArray, TreeNode};
pub use path::{OpTag, Path, PathSegment, DEFAULT_ID_TAG};
pub use query::QueryHandle;
pub use registry::{PluginKind, PluginRegistry};
