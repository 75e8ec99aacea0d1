//! Capability factories and the process-wide instance cache

use crate::capability::Capability;
use crate::contract::SkillInvoker;
use crate::error::{CapabilityError, FactoryError};
use parking_lot::RwLock;
use skillflow_protocol::models::SkillManifest;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Constructor for the capability behind a type tag
pub type CapabilityFactory =
    Arc<dyn Fn(&SkillManifest) -> Result<Box<dyn Capability>, CapabilityError> + Send + Sync>;

/// Registry mapping skill type tags to capability constructors
#[derive(Clone, Default)]
pub struct CapabilityFactories {
    factories: HashMap<String, CapabilityFactory>,
}

impl std::fmt::Debug for CapabilityFactories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityFactories")
            .field("types", &self.types())
            .finish()
    }
}

impl CapabilityFactories {
    /// Create an empty factory registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the constructor for a type tag
    pub fn register<F>(&mut self, skill_type: impl Into<String>, factory: F)
    where
        F: Fn(&SkillManifest) -> Result<Box<dyn Capability>, CapabilityError>
            + Send
            + Sync
            + 'static,
    {
        let skill_type = skill_type.into();
        debug!(skill_type = %skill_type, "Registering capability factory");
        self.factories.insert(skill_type, Arc::new(factory));
    }

    /// Whether a constructor exists for the type tag
    pub fn supports(&self, skill_type: &str) -> bool {
        self.factories.contains_key(skill_type)
    }

    /// Registered type tags, sorted
    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Build a capability for a manifest
    pub fn create(&self, manifest: &SkillManifest) -> Result<Box<dyn Capability>, FactoryError> {
        let factory = self
            .factories
            .get(&manifest.skill_type)
            .ok_or_else(|| FactoryError::UnknownType(manifest.skill_type.clone()))?;
        factory(manifest).map_err(|source| FactoryError::Construction {
            skill_id: manifest.skill_id.clone(),
            source,
        })
    }
}

/// Lazily populated map from skill id to its wrapped capability.
///
/// Entries are created at most once and live for the lifetime of the cache.
/// Reads take a shared lock; a miss upgrades to the exclusive lock and checks
/// again before constructing, so racing callers all observe one instance.
#[derive(Debug, Default)]
pub struct CapabilityCache {
    invokers: RwLock<HashMap<String, Arc<SkillInvoker>>>,
}

impl CapabilityCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached invoker for the manifest's skill id, constructing it
    /// on first use
    pub fn get_or_create(
        &self,
        manifest: &Arc<SkillManifest>,
        factories: &CapabilityFactories,
    ) -> Result<Arc<SkillInvoker>, FactoryError> {
        if let Some(invoker) = self.invokers.read().get(&manifest.skill_id) {
            return Ok(Arc::clone(invoker));
        }

        let mut invokers = self.invokers.write();
        if let Some(invoker) = invokers.get(&manifest.skill_id) {
            return Ok(Arc::clone(invoker));
        }

        let capability = factories.create(manifest)?;
        let invoker = Arc::new(SkillInvoker::new(Arc::clone(manifest), capability));
        invokers.insert(manifest.skill_id.clone(), Arc::clone(&invoker));
        info!(skill_id = %manifest.skill_id, skill_type = %manifest.skill_type, "Capability created");
        Ok(invoker)
    }

    /// Number of cached instances
    pub fn len(&self) -> usize {
        self.invokers.read().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.invokers.read().is_empty()
    }
}
