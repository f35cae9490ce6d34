use crate::backend::{Connection, OpenMode};
use crate::config::DataTreeConfig;
use crate::entry::Entry;
use crate::error::DataTreeResult;
use crate::mapping::Mapper;
use crate::node::{NodeMetadata, StructArray, TreeNode};
use crate::query::QueryHandle;
use crate::registry::{PluginKind, PluginRegistry};
use std::sync::Arc;

/// Front door tying the subsystems together: a plugin registry for
/// opening locators, a mapper for schema-translation views and the node
/// factories configured from one place.
pub struct DataTree {
    config: DataTreeConfig,
    registry: Arc<PluginRegistry>,
    mapper: Mapper,
}

impl DataTree {
    pub fn new(config: DataTreeConfig) -> Self {
        let mapper = Mapper::from_config(&config);
        DataTree {
            config,
            registry: Arc::new(PluginRegistry::with_builtins()),
            mapper,
        }
    }

    /// Uses an externally constructed registry, so tests and embedders can
    /// install isolated instances.
    pub fn with_registry(config: DataTreeConfig, registry: Arc<PluginRegistry>) -> Self {
        let mapper = Mapper::from_config(&config);
        DataTree {
            config,
            registry,
            mapper,
        }
    }

    pub fn config(&self) -> &DataTreeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    /// Opens `locator` with the implementation its scheme or extension
    /// names in the registry.
    pub fn open(&self, locator: &str, mode: OpenMode) -> DataTreeResult<Connection> {
        let (name, kind) = Self::guess_plugin(locator);
        let factory = self.registry.resolve(&name, kind)?;
        factory.open(locator, mode)
    }

    /// Root node over an opened entry, carrying the configured identifier
    /// tag.
    pub fn node(&self, entry: Entry) -> Arc<TreeNode> {
        TreeNode::from_entry(entry, self.node_metadata())
    }

    /// Array-of-structures view over an opened entry.
    pub fn struct_array(&self, entry: Entry) -> StructArray {
        StructArray::from_entry(entry, self.node_metadata())
    }

    /// Deferred query over an opened entry.
    pub fn query(&self, entry: Entry) -> QueryHandle {
        QueryHandle::new(entry)
    }

    /// Presents `source` under the configured (or explicitly given)
    /// schema pair. Identical schemas return `source` unchanged.
    pub fn map_entry(
        &self,
        source: Entry,
        source_schema: Option<&str>,
        target_schema: Option<&str>,
    ) -> DataTreeResult<Entry> {
        self.mapper.map(source, source_schema, target_schema)
    }

    fn node_metadata(&self) -> NodeMetadata {
        NodeMetadata::default().with_id_tag(&self.config.id_tag)
    }

    /// Plugin name and capability guessed from a locator: the scheme when
    /// one is present, the file extension otherwise, and the embedded
    /// store for bare directory-style paths.
    fn guess_plugin(locator: &str) -> (String, PluginKind) {
        if let Some((scheme, _)) = locator.split_once("://") {
            let kind = if scheme == "store" {
                PluginKind::Store
            } else {
                PluginKind::FileFormat
            };
            return (scheme.to_string(), kind);
        }
        let file_name = locator.rsplit('/').next().unwrap_or(locator);
        match file_name.rsplit_once('.') {
            Some((stem, extension)) if !stem.is_empty() => {
                (extension.to_ascii_lowercase(), PluginKind::FileFormat)
            }
            _ => ("store".to_string(), PluginKind::Store),
        }
    }
}
