//! Registry of every resource set known to an engine.

use rustc_hash::FxHashMap;
use std::path::Path;
use std::sync::Arc;

use super::{ResourceSet, SetError};

/// Resource sets by unique name, iterated in registration order.
#[derive(Default)]
pub struct SetRegistry {
    sets: FxHashMap<String, Arc<ResourceSet>>,
    order: Vec<String>,
}

impl SetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a set, rejecting duplicate names.
    pub fn insert(&mut self, set: ResourceSet) -> Result<(), SetError> {
        if self.sets.contains_key(set.name()) {
            return Err(SetError::Duplicate(set.name().to_string()));
        }
        self.order.push(set.name().to_string());
        self.sets.insert(set.name().to_string(), Arc::new(set));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ResourceSet>> {
        self.sets.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ResourceSet>> {
        self.order.iter().filter_map(|name| self.sets.get(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Sets with a static resource backed by `path`.
    pub fn containing(&self, path: &Path) -> Vec<&Arc<ResourceSet>> {
        self.iter().filter(|s| s.contains_local_path(path)).collect()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

impl TryFrom<Vec<ResourceSet>> for SetRegistry {
    type Error = SetError;

    fn try_from(sets: Vec<ResourceSet>) -> Result<Self, Self::Error> {
        let mut registry = Self::new();
        for set in sets {
            registry.insert(set)?;
        }
        Ok(registry)
    }
}
