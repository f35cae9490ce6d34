//! Name-to-implementation lookup for backend plugins.
//!
//! The registry is an explicit object with defined construction and
//! teardown, passed by reference into whatever needs to instantiate
//! implementations by name, never reached through ambient static state,
//! so tests can install isolated instances.

use crate::backend::{JsonFormat, MemoryFormat, SourceFactory, StoreFormat};
use crate::error::{DataTreeError, DataTreeResult};
use log::{debug, warn};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Capability a registered implementation provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginKind {
    /// File codec producing connections over documents
    FileFormat,
    /// Embedded store producing connections over databases
    Store,
}

impl PluginKind {
    fn name(&self) -> &'static str {
        match self {
            PluginKind::FileFormat => "file format",
            PluginKind::Store => "store",
        }
    }
}

type BuiltinConstructor = fn() -> Arc<dyn SourceFactory>;

/// Built-in implementations registered by the one-time discovery pass.
static BUILTIN_PLUGINS: Lazy<Vec<(&'static str, PluginKind, BuiltinConstructor)>> =
    Lazy::new(|| {
        vec![
            ("memory", PluginKind::FileFormat, || Arc::new(MemoryFormat)),
            ("json", PluginKind::FileFormat, || Arc::new(JsonFormat)),
            ("store", PluginKind::Store, || Arc::new(StoreFormat)),
        ]
    });

struct Registered {
    kind: PluginKind,
    factory: Arc<dyn SourceFactory>,
}

/// Explicit plugin registry instance.
pub struct PluginRegistry {
    plugins: RwLock<HashMap<String, Registered>>,
    discovered: AtomicBool,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    /// Empty registry; built-ins appear on the first failed resolve via
    /// the discovery pass.
    pub fn new() -> Self {
        PluginRegistry {
            plugins: RwLock::new(HashMap::new()),
            discovered: AtomicBool::new(false),
        }
    }

    /// Registry with the built-in implementations already installed.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.discover();
        registry
    }

    /// Registers `factory` under one or more names. Idempotent;
    /// re-registering a name overwrites the previous implementation.
    pub fn register(
        &self,
        names: &[&str],
        kind: PluginKind,
        factory: Arc<dyn SourceFactory>,
    ) -> DataTreeResult<()> {
        let mut plugins = self
            .plugins
            .write()
            .map_err(|_| DataTreeError::Lock("plugin registry".to_string()))?;
        for name in names {
            if plugins.contains_key(*name) {
                warn!("plugin '{}' re-registered, overwriting", name);
            }
            plugins.insert(
                name.to_string(),
                Registered {
                    kind,
                    factory: Arc::clone(&factory),
                },
            );
        }
        Ok(())
    }

    /// Resolves `name` to an implementation with the requested capability.
    ///
    /// A miss triggers a one-time discovery pass over the built-in
    /// namespace, then one retry; still absent is `PluginNotFound`, and a
    /// hit with the wrong capability is `TypeNotCompatible`.
    pub fn resolve(
        &self,
        name: &str,
        kind: PluginKind,
    ) -> DataTreeResult<Arc<dyn SourceFactory>> {
        if let Some(resolved) = self.lookup(name, kind)? {
            return resolved;
        }
        if !self.discovered.swap(true, Ordering::AcqRel) {
            debug!("plugin '{}' not registered, running discovery pass", name);
            self.discover();
            if let Some(resolved) = self.lookup(name, kind)? {
                return resolved;
            }
        }
        Err(DataTreeError::PluginNotFound(name.to_string()))
    }

    /// Names currently registered, in no particular order.
    pub fn names(&self) -> DataTreeResult<Vec<String>> {
        let plugins = self
            .plugins
            .read()
            .map_err(|_| DataTreeError::Lock("plugin registry".to_string()))?;
        Ok(plugins.keys().cloned().collect())
    }

    /// Drops every registration, including discovered built-ins.
    pub fn clear(&self) -> DataTreeResult<()> {
        let mut plugins = self
            .plugins
            .write()
            .map_err(|_| DataTreeError::Lock("plugin registry".to_string()))?;
        plugins.clear();
        self.discovered.store(false, Ordering::Release);
        Ok(())
    }

    #[allow(clippy::type_complexity)]
    fn lookup(
        &self,
        name: &str,
        kind: PluginKind,
    ) -> DataTreeResult<Option<DataTreeResult<Arc<dyn SourceFactory>>>> {
        let plugins = self
            .plugins
            .read()
            .map_err(|_| DataTreeError::Lock("plugin registry".to_string()))?;
        match plugins.get(name) {
            Some(registered) if registered.kind == kind => {
                Ok(Some(Ok(Arc::clone(&registered.factory))))
            }
            Some(registered) => Ok(Some(Err(DataTreeError::TypeNotCompatible(format!(
                "'{}' is registered as a {}, not a {}",
                name,
                registered.kind.name(),
                kind.name()
            ))))),
            None => Ok(None),
        }
    }

    fn discover(&self) {
        for (name, kind, constructor) in BUILTIN_PLUGINS.iter() {
            let already = self
                .plugins
                .read()
                .map(|p| p.contains_key(*name))
                .unwrap_or(false);
            if already {
                continue;
            }
            if let Err(err) = self.register(&[*name], *kind, constructor()) {
                warn!("builtin plugin '{}' registration failed: {}", name, err);
            }
        }
        self.discovered.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Connection, OpenMode};

    #[test]
    fn discovery_pass_finds_builtins() {
        let registry = PluginRegistry::new();
        assert!(registry.names().unwrap().is_empty());

        let factory = registry.resolve("json", PluginKind::FileFormat).unwrap();
        let _unused: &dyn SourceFactory = factory.as_ref();
        assert!(registry.names().unwrap().contains(&"json".to_string()));
    }

    #[test]
    fn unknown_plugin_after_discovery() {
        let registry = PluginRegistry::new();
        let err = registry.resolve("hdf5", PluginKind::FileFormat).unwrap_err();
        assert!(matches!(err, DataTreeError::PluginNotFound(_)));
    }

    #[test]
    fn kind_mismatch_is_not_compatible() {
        let registry = PluginRegistry::with_builtins();
        let err = registry.resolve("json", PluginKind::Store).unwrap_err();
        assert!(matches!(err, DataTreeError::TypeNotCompatible(_)));
    }

    #[test]
    fn re_registration_overwrites() {
        #[derive(Debug)]
        struct Failing;
        impl SourceFactory for Failing {
            fn open(&self, locator: &str, _mode: OpenMode) -> DataTreeResult<Connection> {
                Err(DataTreeError::PluginNotFound(locator.to_string()))
            }
        }

        let registry = PluginRegistry::with_builtins();
        registry
            .register(&["memory"], PluginKind::FileFormat, Arc::new(Failing))
            .unwrap();
        let factory = registry.resolve("memory", PluginKind::FileFormat).unwrap();
        assert!(factory.open("memory://x", OpenMode::read()).is_err());
    }
}
