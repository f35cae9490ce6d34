use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Memoization cache for lazily computed attributes, keyed by property
/// name.
///
/// First access follows double-checked locking: an unlocked read, then a
/// per-property lock, a re-check (another thread may have finished while
/// we waited), one computation, store, release. This bounds duplicate
/// expensive computation on first concurrent access without serializing
/// subsequent reads.
#[derive(Debug, Default)]
pub struct LazyCache<T: Clone> {
    values: RwLock<HashMap<String, T>>,
    guards: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<T: Clone> LazyCache<T> {
    pub fn new() -> Self {
        LazyCache {
            values: RwLock::new(HashMap::new()),
            guards: Mutex::new(HashMap::new()),
        }
    }

    /// The stored value, if one was computed already.
    pub fn get(&self, name: &str) -> Option<T> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values.get(name).cloned()
    }

    /// Returns the memoized value, computing it at most once per miss.
    pub fn get_or_compute<F>(&self, name: &str, compute: F) -> T
    where
        F: FnOnce() -> T,
    {
        self.get_or_try_compute(name, || Ok::<T, std::convert::Infallible>(compute()))
            .unwrap_or_else(|never| match never {})
    }

    /// Fallible variant; failures are not cached, so a later access
    /// retries the computation.
    pub fn get_or_try_compute<F, E>(&self, name: &str, compute: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(value) = self.get(name) {
            return Ok(value);
        }

        let guard = {
            let mut guards = self.guards.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(
                guards
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        let _held = guard.lock().unwrap_or_else(|e| e.into_inner());

        // re-check: another thread may have filled the slot while we
        // awaited the property lock
        if let Some(value) = self.get(name) {
            return Ok(value);
        }

        let value = compute()?;
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(name.to_string(), value.clone());
        Ok(value)
    }

    /// Drops one memoized value; the next access recomputes.
    pub fn invalidate(&self, name: &str) {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.remove(name);
    }

    pub fn clear(&self) {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.clear();
    }
}
