//! Resource registry: key (or alias) -> immutable resource config.

use crate::config::{is_valid_key, resolve_resource, validate, FullConfig, PostProcess, ResourceConfig};
use crate::error::{AppError, ConfigError};
use crate::mapper::DomainMapper;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Read-only after `RegistryBuilder::build`; safe to share across request tasks without locking.
#[derive(Clone, Debug, Default)]
pub struct ResourceRegistry {
    by_key: HashMap<String, Arc<ResourceConfig>>,
    canonical: Vec<String>,
}

impl ResourceRegistry {
    /// Resolve a canonical key or alias. Fails with `ResourceNotFound` for unknown or malformed keys.
    pub fn resolve(&self, key: &str) -> Result<Arc<ResourceConfig>, AppError> {
        if !is_valid_key(key) {
            return Err(AppError::ResourceNotFound(truncate_key(key)));
        }
        self.by_key
            .get(key)
            .cloned()
            .ok_or_else(|| AppError::ResourceNotFound(key.to_string()))
    }

    /// Canonical keys in declaration order.
    pub fn keys(&self) -> &[String] {
        &self.canonical
    }

    /// Every table the registered resources touch, sorted and deduplicated.
    pub fn tables(&self) -> Vec<String> {
        let tables: BTreeSet<&str> = self
            .canonical
            .iter()
            .filter_map(|key| self.by_key.get(key))
            .flat_map(|config| config.tables())
            .collect();
        tables.into_iter().map(str::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }
}

fn truncate_key(key: &str) -> String {
    key.chars().take(64).collect()
}

/// Collects declarations plus code-only hooks, then freezes them into a `ResourceRegistry`.
#[derive(Default)]
pub struct RegistryBuilder {
    config: FullConfig,
    mappers: HashMap<String, Arc<dyn DomainMapper>>,
    post_process: HashMap<String, PostProcess>,
}

impl RegistryBuilder {
    pub fn new(config: FullConfig) -> Self {
        RegistryBuilder {
            config,
            ..Default::default()
        }
    }

    /// Replace the config-driven mapper for one resource.
    pub fn with_mapper(mut self, key: &str, mapper: Arc<dyn DomainMapper>) -> Self {
        self.mappers.insert(key.to_string(), mapper);
        self
    }

    pub fn with_post_process(mut self, key: &str, hook: PostProcess) -> Self {
        self.post_process.insert(key.to_string(), hook);
        self
    }

    pub fn build(mut self) -> Result<ResourceRegistry, ConfigError> {
        validate(&self.config)?;
        for key in self.mappers.keys().chain(self.post_process.keys()) {
            if !self.config.resources.iter().any(|r| &r.key == key) {
                return Err(ConfigError::Validation(format!("hook registered for unknown resource '{}'", key)));
            }
        }

        let mut by_key = HashMap::new();
        let mut canonical = Vec::with_capacity(self.config.resources.len());
        for decl in &self.config.resources {
            let resolved = Arc::new(resolve_resource(
                decl,
                self.mappers.remove(&decl.key),
                self.post_process.remove(&decl.key),
            ));
            for alias in &decl.aliases {
                by_key.insert(alias.clone(), Arc::clone(&resolved));
            }
            by_key.insert(decl.key.clone(), resolved);
            canonical.push(decl.key.clone());
        }
        tracing::debug!(resources = canonical.len(), "resource registry built");
        Ok(ResourceRegistry { by_key, canonical })
    }
}
