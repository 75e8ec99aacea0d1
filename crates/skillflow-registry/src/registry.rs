use skillflow_protocol::models::{FlowDefinition, RegistryConfig, SkillManifest};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Central lookup table for skills and flows.
///
/// Cloning is cheap; clones share the same tables. Registration is expected at
/// startup and does no validation beyond what the loader already performed.
#[derive(Default, Clone)]
pub struct SkillRegistry {
    inner: Arc<RwLock<Tables>>,
}

#[derive(Default)]
struct Tables {
    skills: HashMap<String, Arc<SkillManifest>>,
    flows: HashMap<String, Arc<FlowDefinition>>,
    config: RegistryConfig,
}

/// Skills and flows carrying a given tag
#[derive(Debug, Clone, Default)]
pub struct TaggedEntries {
    /// Matching skills, sorted by id
    pub skills: Vec<Arc<SkillManifest>>,
    /// Matching flows, sorted by id
    pub flows: Vec<Arc<FlowDefinition>>,
}

impl SkillRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a skill manifest
    pub async fn register_skill(&self, manifest: SkillManifest) {
        info!(skill_id = %manifest.skill_id, version = manifest.version, "Registered skill");
        let mut tables = self.inner.write().await;
        tables
            .skills
            .insert(manifest.skill_id.clone(), Arc::new(manifest));
    }

    /// Register (or replace) a flow definition
    pub async fn register_flow(&self, flow: FlowDefinition) {
        info!(flow_id = %flow.flow_id, version = flow.version, "Registered flow");
        let mut tables = self.inner.write().await;
        tables.flows.insert(flow.flow_id.clone(), Arc::new(flow));
    }

    /// Replace the registry configuration
    pub async fn set_config(&self, config: RegistryConfig) {
        self.inner.write().await.config = config;
    }

    /// Get a skill manifest by id
    pub async fn get_skill(&self, skill_id: &str) -> Option<Arc<SkillManifest>> {
        self.inner.read().await.skills.get(skill_id).cloned()
    }

    /// Get a flow definition by id
    pub async fn get_flow(&self, flow_id: &str) -> Option<Arc<FlowDefinition>> {
        self.inner.read().await.flows.get(flow_id).cloned()
    }

    /// Current registry configuration
    pub async fn config(&self) -> RegistryConfig {
        self.inner.read().await.config.clone()
    }

    /// All skills, sorted by id
    pub async fn list_skills(&self) -> Vec<Arc<SkillManifest>> {
        let tables = self.inner.read().await;
        let mut skills: Vec<_> = tables.skills.values().cloned().collect();
        skills.sort_by(|a, b| a.skill_id.cmp(&b.skill_id));
        skills
    }

    /// All flows, sorted by id
    pub async fn list_flows(&self) -> Vec<Arc<FlowDefinition>> {
        let tables = self.inner.read().await;
        let mut flows: Vec<_> = tables.flows.values().cloned().collect();
        flows.sort_by(|a, b| a.flow_id.cmp(&b.flow_id));
        flows
    }

    /// Skills and flows carrying `tag`
    pub async fn list_by_tag(&self, tag: &str) -> TaggedEntries {
        let tables = self.inner.read().await;
        let mut skills: Vec<_> = tables
            .skills
            .values()
            .filter(|s| s.tags.iter().any(|t| t == tag))
            .cloned()
            .collect();
        skills.sort_by(|a, b| a.skill_id.cmp(&b.skill_id));

        let mut flows: Vec<_> = tables
            .flows
            .values()
            .filter(|f| f.tags.iter().any(|t| t == tag))
            .cloned()
            .collect();
        flows.sort_by(|a, b| a.flow_id.cmp(&b.flow_id));

        TaggedEntries { skills, flows }
    }

    /// Number of registered skills
    pub async fn skill_count(&self) -> usize {
        self.inner.read().await.skills.len()
    }

    /// Number of registered flows
    pub async fn flow_count(&self) -> usize {
        self.inner.read().await.flows.len()
    }
}
