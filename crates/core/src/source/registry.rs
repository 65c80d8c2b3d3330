//! Explicit plugin registry.
//!
//! Plugins are registered once at startup and handed to the orchestrator as
//! a dependency; adding a new source never touches the orchestrator.

use std::collections::HashMap;
use std::sync::Arc;

use super::SearchSource;

/// Registry of plugin sources, keyed by name.
#[derive(Default)]
pub struct SourceRegistry {
    plugins: HashMap<String, Arc<dyn SearchSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin. A plugin registered under an already-taken name
    /// replaces the previous one.
    pub fn register(&mut self, plugin: Arc<dyn SearchSource>) {
        self.plugins.insert(plugin.name().to_string(), plugin);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn SearchSource>> {
        self.plugins.get(name)
    }

    /// All registered plugins, sorted by descending priority then name so
    /// iteration order is stable.
    pub fn all(&self) -> Vec<Arc<dyn SearchSource>> {
        let mut plugins: Vec<_> = self.plugins.values().cloned().collect();
        plugins.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then_with(|| a.name().cmp(b.name()))
        });
        plugins
    }

    /// Sorted registered plugin names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.plugins.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
