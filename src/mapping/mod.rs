//! Schema-translation views.
//!
//! A tree authored under one naming schema can be read under another
//! through a declarative mapping descriptor: a tree whose leaves are
//! literal values or `@`-marked structured queries back into the source
//! entry. Descriptors live on disk under
//! `<mapping_root>/<source_schema>/<target_schema>/` and are loaded once
//! per ordered schema pair.

mod mapped_entry;

pub use mapped_entry::MappedEntry;

use crate::config::DataTreeConfig;
use crate::entry::Entry;
use crate::error::{DataTreeError, DataTreeResult};
use crate::node::LazyCache;
use log::{debug, info};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Marker prefixing a descriptor leaf that denotes an indirection into
/// the source entry.
pub const REFERENCE_MARKER: char = '@';

/// Canonical descriptor filenames under a schema-pair directory, in
/// precedence order; the first existing file wins.
pub const DESCRIPTOR_CANDIDATES: [&str; 3] =
    ["config.json", "static/config.json", "dynamic/config.json"];

/// Result of a mapping lookup for an ordered schema pair.
#[derive(Debug, Clone)]
pub enum MappingLookup {
    /// Source and target schema are identical; no view is constructed
    PassThrough,
    /// Loaded descriptor tree for the pair
    Mapped(Arc<Value>),
}

/// Locates, loads and applies schema-translation descriptors.
pub struct Mapper {
    mapping_dirs: Vec<PathBuf>,
    source_schema: String,
    target_schema: String,
    envs: HashMap<String, String>,
    descriptors: LazyCache<Arc<Value>>,
}

impl Mapper {
    pub fn new(
        mapping_dirs: Vec<PathBuf>,
        source_schema: impl Into<String>,
        target_schema: impl Into<String>,
    ) -> Mapper {
        Mapper {
            mapping_dirs,
            source_schema: source_schema.into(),
            target_schema: target_schema.into(),
            envs: HashMap::new(),
            descriptors: LazyCache::new(),
        }
    }

    /// Mapper configured from a [`DataTreeConfig`], including mapping
    /// roots from the environment.
    pub fn from_config(config: &DataTreeConfig) -> Mapper {
        Mapper::new(
            config.mapping_dirs_with_env(),
            config.source_schema.clone(),
            config.target_schema.clone(),
        )
    }

    /// Adds a named substitution variable available to reference queries.
    #[must_use]
    pub fn with_env(mut self, name: &str, value: &str) -> Mapper {
        self.envs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn source_schema(&self) -> &str {
        &self.source_schema
    }

    pub fn target_schema(&self) -> &str {
        &self.target_schema
    }

    /// Looks up the descriptor for an ordered schema pair.
    ///
    /// Identical schemas short-circuit to a pass-through; no view object
    /// is constructed. Otherwise the mapping roots are searched in order
    /// for the first existing canonical descriptor file under
    /// `<source>/<target>/`; the loaded tree is immutable and memoized per
    /// pair.
    pub fn find_mapping(
        &self,
        source_schema: Option<&str>,
        target_schema: Option<&str>,
    ) -> DataTreeResult<MappingLookup> {
        let source = source_schema.unwrap_or(&self.source_schema);
        let target = target_schema.unwrap_or(&self.target_schema);

        if source == target {
            debug!("source and target schema are the same: {}", source);
            return Ok(MappingLookup::PassThrough);
        }

        let tag = format!("{}/{}", source, target);
        let descriptor = self
            .descriptors
            .get_or_try_compute(&tag, || self.load_descriptor(&tag))?;
        Ok(MappingLookup::Mapped(descriptor))
    }

    /// Wraps `source` so it answers queries phrased in the target schema.
    /// Identical schemas return `source` unchanged.
    pub fn map(
        &self,
        source: Entry,
        source_schema: Option<&str>,
        target_schema: Option<&str>,
    ) -> DataTreeResult<Entry> {
        match self.find_mapping(source_schema, target_schema)? {
            MappingLookup::PassThrough => Ok(source),
            MappingLookup::Mapped(descriptor) => Ok(Entry::Mapped(MappedEntry::new(
                source,
                &descriptor,
                self.envs.clone(),
            ))),
        }
    }

    fn load_descriptor(&self, tag: &str) -> DataTreeResult<Arc<Value>> {
        for dir in &self.mapping_dirs {
            for candidate in DESCRIPTOR_CANDIDATES {
                let file = dir.join(tag).join(candidate);
                if !file.exists() {
                    continue;
                }
                info!("loading mapping descriptor {}", file.display());
                let text = std::fs::read_to_string(&file)?;
                let descriptor: Value = serde_json::from_str(&text).map_err(|e| {
                    DataTreeError::Malformed(format!("{}: {}", file.display(), e))
                })?;
                return Ok(Arc::new(descriptor));
            }
        }
        Err(DataTreeError::MappingNotFound(format!(
            "no descriptor for '{}' under {} mapping root(s)",
            tag,
            self.mapping_dirs.len()
        )))
    }
}

impl std::fmt::Debug for Mapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapper")
            .field("source_schema", &self.source_schema)
            .field("target_schema", &self.target_schema)
            .field("mapping_dirs", &self.mapping_dirs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_schemas_pass_through() {
        let mapper = Mapper::new(Vec::new(), "east", "east");
        assert!(matches!(
            mapper.find_mapping(None, None).unwrap(),
            MappingLookup::PassThrough
        ));
    }

    #[test]
    fn missing_descriptor_is_an_error() {
        let mapper = Mapper::new(Vec::new(), "east", "imas/3");
        assert!(matches!(
            mapper.find_mapping(None, None),
            Err(DataTreeError::MappingNotFound(_))
        ));
    }
}
