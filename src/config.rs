use crate::path::DEFAULT_ID_TAG;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable holding additional mapping root directories,
/// `:`-separated, appended after the configured ones.
pub const MAPPING_PATH_ENV: &str = "DATATREE_MAPPING_PATH";

/// Configuration for a [`DataTree`](crate::DataTree) instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataTreeConfig {
    /// Path where store-backed sources keep their data
    pub storage_path: PathBuf,
    /// Ordered mapping root directories searched for schema-translation
    /// descriptors
    #[serde(default)]
    pub mapping_dirs: Vec<PathBuf>,
    /// Key under which array-of-structures elements carry their unique
    /// identifier
    #[serde(default = "default_id_tag")]
    pub id_tag: String,
    /// Schema the opened sources are authored under
    #[serde(default = "default_schema")]
    pub source_schema: String,
    /// Schema queries are phrased in
    #[serde(default = "default_schema")]
    pub target_schema: String,
}

fn default_id_tag() -> String {
    DEFAULT_ID_TAG.to_string()
}

fn default_schema() -> String {
    "local".to_string()
}

impl Default for DataTreeConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("data"),
            mapping_dirs: Vec::new(),
            id_tag: default_id_tag(),
            source_schema: default_schema(),
            target_schema: default_schema(),
        }
    }
}

impl DataTreeConfig {
    /// Create a new configuration with the specified storage path
    pub fn new(storage_path: PathBuf) -> Self {
        Self {
            storage_path,
            ..Default::default()
        }
    }

    pub fn with_mapping_dir(mut self, dir: PathBuf) -> Self {
        self.mapping_dirs.push(dir);
        self
    }

    pub fn with_id_tag(mut self, id_tag: &str) -> Self {
        self.id_tag = id_tag.to_string();
        self
    }

    pub fn with_source_schema(mut self, schema: &str) -> Self {
        self.source_schema = schema.to_string();
        self
    }

    pub fn with_target_schema(mut self, schema: &str) -> Self {
        self.target_schema = schema.to_string();
        self
    }

    /// Configured mapping roots plus any from the environment, in search
    /// order.
    pub fn mapping_dirs_with_env(&self) -> Vec<PathBuf> {
        let mut dirs = self.mapping_dirs.clone();
        if let Ok(raw) = std::env::var(MAPPING_PATH_ENV) {
            dirs.extend(
                raw.split(':')
                    .filter(|p| !p.is_empty())
                    .map(PathBuf::from),
            );
        }
        dirs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = DataTreeConfig::default();
        assert_eq!(config.id_tag, "@id");
        assert_eq!(config.source_schema, config.target_schema);
        assert!(config.mapping_dirs.is_empty());
    }

    #[test]
    fn builders_compose() {
        let config = DataTreeConfig::new(PathBuf::from("scratch"))
            .with_mapping_dir(PathBuf::from("mappings"))
            .with_source_schema("east")
            .with_target_schema("imas/3");
        assert_eq!(config.storage_path, PathBuf::from("scratch"));
        assert_eq!(config.mapping_dirs.len(), 1);
        assert_eq!(config.source_schema, "east");
    }
}
