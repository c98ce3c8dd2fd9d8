use dashmap::DashMap;
use std::sync::Arc;

use crate::storage::DbHandle;

/// Named database handles shared by every stream of a server.
///
/// Cloning is cheap; clones see the same entries.
#[derive(Clone, Default)]
pub struct DatabaseRegistry {
    dbs: Arc<DashMap<String, DbHandle>>,
}

impl DatabaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` under `name`, returning the handle it replaced.
    ///
    /// The replaced handle is not closed; releasing it is up to the caller.
    pub fn add(&self, name: impl Into<String>, handle: DbHandle) -> Option<DbHandle> {
        let name = name.into();
        tracing::debug!("Registering database '{}'", name);
        self.dbs.insert(name, handle)
    }

    pub fn get(&self, name: &str) -> Option<DbHandle> {
        self.dbs.get(name).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, name: &str) -> Option<DbHandle> {
        self.dbs.remove(name).map(|(_, handle)| handle)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.dbs.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.dbs.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.dbs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dbs.is_empty()
    }
}

impl std::fmt::Debug for DatabaseRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseRegistry")
            .field("names", &self.names())
            .finish()
    }
}
