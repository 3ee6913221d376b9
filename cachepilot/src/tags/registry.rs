//! Tag registry with dependency cycle detection.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use tracing::info;

use super::tag::CacheTag;
use crate::error::ConfigurationError;

/// Owns every registered [`CacheTag`].
///
/// Dependencies may name tags that are registered later. A registration that
/// would close a dependency cycle is rejected, so the graph held here is
/// always acyclic.
#[derive(Debug, Default)]
pub struct TagRegistry {
    tags: RwLock<HashMap<String, CacheTag>>,
}

impl TagRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a tag.
    pub fn register(&self, tag: CacheTag) -> Result<(), ConfigurationError> {
        let mut tags = self.tags.write();
        if let Some(cycle) = find_cycle(&tags, &tag) {
            return Err(ConfigurationError::CyclicTagDependency {
                tag: tag.name.clone(),
                cycle,
            });
        }
        info!(
            tag = %tag.name,
            pattern = %tag.pattern,
            dependencies = ?tag.dependencies,
            "Tag registered"
        );
        tags.insert(tag.name.clone(), tag);
        Ok(())
    }

    /// Look up a tag by name.
    pub fn get(&self, name: &str) -> Option<CacheTag> {
        self.tags.read().get(name).cloned()
    }

    /// Remove a tag, returning it.
    pub fn remove(&self, name: &str) -> Option<CacheTag> {
        self.tags.write().remove(name)
    }

    /// Whether a tag is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tags.read().contains_key(name)
    }

    /// Number of registered tags.
    pub fn len(&self) -> usize {
        self.tags.read().len()
    }

    /// Whether no tag is registered.
    pub fn is_empty(&self) -> bool {
        self.tags.read().is_empty()
    }

    /// Registered tag names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tags.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// All registered tags.
    pub fn tags(&self) -> Vec<CacheTag> {
        self.tags.read().values().cloned().collect()
    }

    /// Insert without cycle detection, to exercise the invalidator's runtime guard.
    #[cfg(test)]
    pub(crate) fn insert_unchecked(&self, tag: CacheTag) {
        self.tags.write().insert(tag.name.clone(), tag);
    }
}

/// Find a dependency path from `tag` back to itself, treating `tag` as
/// replacing any registered tag of the same name.
fn find_cycle(tags: &HashMap<String, CacheTag>, tag: &CacheTag) -> Option<Vec<String>> {
    let mut visited = HashSet::new();
    let mut path = vec![tag.name.clone()];
    for dependency in &tag.dependencies {
        if reaches(tags, tag, dependency, &mut visited, &mut path) {
            return Some(path);
        }
    }
    None
}

fn reaches(
    tags: &HashMap<String, CacheTag>,
    target: &CacheTag,
    node: &str,
    visited: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> bool {
    path.push(node.to_string());
    if node == target.name {
        return true;
    }
    if visited.insert(node.to_string()) {
        if let Some(current) = tags.get(node) {
            for dependency in &current.dependencies {
                if reaches(tags, target, dependency, visited, path) {
                    return true;
                }
            }
        }
    }
    path.pop();
    false
}
