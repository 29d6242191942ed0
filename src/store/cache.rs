use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Run-scoped memo of what a store's search discovered, keyed by kubeconfig path.
///
/// Many readers or one writer. Readers clone the record out and release the
/// lock immediately; no lock is ever held across an `.await`, so backend
/// calls always happen outside of it.
#[derive(Debug)]
pub struct DiscoveryCache<V> {
    entries: RwLock<HashMap<String, V>>,
}

impl<V> Default for DiscoveryCache<V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<V: Clone> DiscoveryCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<V> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    pub fn insert(&self, path: impl Into<String>, value: V) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.into(), value);
    }

    /// Inserts `value` unless the search already stored a record for `path`,
    /// and returns whichever record ends up cached. The check and the insert
    /// happen under one write lock.
    pub fn insert_if_absent(&self, path: &str, value: V) -> V {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries
            .entry(path.to_string())
            .or_insert(value)
            .clone()
    }

    /// First cached record matching `predicate`.
    pub fn find(&self, predicate: impl Fn(&V) -> bool) -> Option<(String, V)> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(_, value)| predicate(value))
            .map(|(path, value)| (path.clone(), value.clone()))
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
