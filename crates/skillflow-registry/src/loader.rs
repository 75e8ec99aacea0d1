use crate::registry::SkillRegistry;
use serde::de::DeserializeOwned;
use skillflow_protocol::models::{FlowDefinition, RegistryConfig, SkillManifest};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Name of the optional master config file
pub const REGISTRY_CONFIG_FILE: &str = "skill_registry.yaml";

/// Manifest files larger than this are rejected unread
const MAX_MANIFEST_BYTES: u64 = 1024 * 1024;

const MANIFEST_EXTENSIONS: &[&str] = &["yaml", "yml", "toml", "json"];

/// Errors that can occur while loading manifests
#[derive(Debug, Error)]
pub enum LoaderError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Path traversal detected
    #[error("Path traversal detected: file '{0}' is outside the registry directory")]
    PathTraversal(PathBuf),

    /// Path canonicalization failed
    #[error("Failed to canonicalize path {path}: {source}")]
    Canonicalization {
        /// The path that failed
        path: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },

    /// Failed to parse YAML
    #[error("Failed to parse YAML in {path}: {source}")]
    ParseYaml {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: serde_yaml::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML in {path}: {source}")]
    ParseToml {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: toml::de::Error,
    },

    /// Failed to parse JSON
    #[error("Failed to parse JSON in {path}: {source}")]
    ParseJson {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: serde_json::Error,
    },

    /// File parsed but violates a structural invariant
    #[error("Invalid manifest {path}: {reason}")]
    Invalid {
        /// File path
        path: PathBuf,
        /// What is wrong
        reason: String,
    },

    /// File exceeds the size limit
    #[error("Manifest {path} is too large ({size} bytes)")]
    TooLarge {
        /// File path
        path: PathBuf,
        /// Actual size
        size: u64,
    },

    /// Unsupported file extension
    #[error("Unsupported manifest format: {0}")]
    UnsupportedFormat(PathBuf),
}

/// Summary of one loader pass
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Skills registered
    pub skills_loaded: usize,
    /// Flows registered
    pub flows_loaded: usize,
    /// Files that were skipped, with the reason
    pub skipped: Vec<(PathBuf, String)>,
}

/// Loads skill manifests and flow definitions from a directory tree:
///
/// ```text
/// <base>/skill_registry.yaml
/// <base>/skills/<folder>/manifest.yaml
/// <base>/flows/<name>.yaml
/// ```
///
/// Malformed sources are skipped with a warning; they never abort a load.
#[derive(Debug, Clone)]
pub struct RegistryLoader {
    base_dir: PathBuf,
}

impl RegistryLoader {
    /// Create a loader rooted at `base_dir`
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    /// The directory this loader reads from
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Load everything and register it into `registry`.
    ///
    /// Fails only when the base directory itself cannot be resolved.
    pub async fn load_into(&self, registry: &SkillRegistry) -> Result<LoadReport, LoaderError> {
        info!("Loading skill registry from: {}", self.base_dir.display());
        let root = self.canonical_root()?;

        let mut report = LoadReport::default();
        let config = self.load_config(&root, &mut report);

        for manifest in self.load_skills(&root, &config, &mut report) {
            registry.register_skill(manifest).await;
            report.skills_loaded += 1;
        }
        for flow in self.load_flows(&root, &config, &mut report) {
            registry.register_flow(flow).await;
            report.flows_loaded += 1;
        }
        registry.set_config(config).await;

        info!(
            skills = report.skills_loaded,
            flows = report.flows_loaded,
            skipped = report.skipped.len(),
            "Skill registry loaded"
        );
        Ok(report)
    }

    fn canonical_root(&self) -> Result<PathBuf, LoaderError> {
        self.base_dir
            .canonicalize()
            .map_err(|e| LoaderError::Canonicalization {
                path: self.base_dir.clone(),
                source: e,
            })
    }

    fn load_config(&self, root: &Path, report: &mut LoadReport) -> RegistryConfig {
        let path = root.join(REGISTRY_CONFIG_FILE);
        if !path.exists() {
            warn!("No {} found, using defaults", REGISTRY_CONFIG_FILE);
            return RegistryConfig::default();
        }
        match read_manifest::<RegistryConfig>(root, &path) {
            Ok(config) => {
                info!(
                    description = config.description.as_deref().unwrap_or(""),
                    "Registry config loaded"
                );
                config
            }
            Err(e) => {
                warn!("Failed to load registry config: {}", e);
                report.skipped.push((path, e.to_string()));
                RegistryConfig::default()
            }
        }
    }

    fn load_skills(
        &self,
        root: &Path,
        config: &RegistryConfig,
        report: &mut LoadReport,
    ) -> Vec<SkillManifest> {
        let skills_dir = root.join("skills");
        if !skills_dir.is_dir() {
            warn!("Skills directory not found: {}", skills_dir.display());
            return Vec::new();
        }

        let mut manifests = Vec::new();
        for entry in WalkDir::new(&skills_dir)
            .follow_links(false)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
        {
            let folder = entry.file_name().to_string_lossy().to_string();
            if !config.skills.is_empty() && !config.skills.contains(&folder) {
                debug!(folder = %folder, "Skill folder not listed in registry config");
                continue;
            }
            let Some(path) = find_manifest(entry.path(), "manifest") else {
                debug!(folder = %folder, "No manifest in skill folder");
                continue;
            };
            match read_manifest::<SkillManifest>(root, &path).and_then(|m| validate_skill(&path, m))
            {
                Ok(manifest) => {
                    debug!(skill_id = %manifest.skill_id, "Skill loaded");
                    manifests.push(manifest);
                }
                Err(e) => {
                    warn!("Failed to load skill from {}: {}", path.display(), e);
                    report.skipped.push((path, e.to_string()));
                }
            }
        }
        manifests
    }

    fn load_flows(
        &self,
        root: &Path,
        config: &RegistryConfig,
        report: &mut LoadReport,
    ) -> Vec<FlowDefinition> {
        let flows_dir = root.join("flows");
        if !flows_dir.is_dir() {
            warn!("Flows directory not found: {}", flows_dir.display());
            return Vec::new();
        }

        let mut flows = Vec::new();
        for entry in WalkDir::new(&flows_dir)
            .follow_links(false)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && has_manifest_extension(e.path()))
        {
            let path = entry.path().to_path_buf();
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            if !config.flows.is_empty() && !config.flows.contains(&stem) {
                debug!(file = %stem, "Flow file not listed in registry config");
                continue;
            }
            match read_manifest::<FlowDefinition>(root, &path).and_then(|f| validate_flow(&path, f))
            {
                Ok(flow) => {
                    debug!(flow_id = %flow.flow_id, "Flow loaded");
                    flows.push(flow);
                }
                Err(e) => {
                    warn!("Failed to load flow from {}: {}", path.display(), e);
                    report.skipped.push((path, e.to_string()));
                }
            }
        }
        flows
    }
}

fn has_manifest_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| MANIFEST_EXTENSIONS.contains(&e))
}

fn find_manifest(dir: &Path, stem: &str) -> Option<PathBuf> {
    MANIFEST_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", stem, ext)))
        .find(|p| p.is_file())
}

/// Read and parse one manifest file, refusing anything outside `root`
fn read_manifest<T: DeserializeOwned>(root: &Path, path: &Path) -> Result<T, LoaderError> {
    let canonical_path = path
        .canonicalize()
        .map_err(|e| LoaderError::Canonicalization {
            path: path.to_path_buf(),
            source: e,
        })?;
    if !canonical_path.starts_with(root) {
        return Err(LoaderError::PathTraversal(path.to_path_buf()));
    }

    let size = std::fs::metadata(&canonical_path)?.len();
    if size > MAX_MANIFEST_BYTES {
        return Err(LoaderError::TooLarge {
            path: path.to_path_buf(),
            size,
        });
    }

    let content = std::fs::read_to_string(&canonical_path)?;
    match canonical_path.extension().and_then(|s| s.to_str()) {
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&content).map_err(|e| LoaderError::ParseYaml {
                path: path.to_path_buf(),
                source: e,
            })
        }
        Some("toml") => toml::from_str(&content).map_err(|e| LoaderError::ParseToml {
            path: path.to_path_buf(),
            source: e,
        }),
        Some("json") => serde_json::from_str(&content).map_err(|e| LoaderError::ParseJson {
            path: path.to_path_buf(),
            source: e,
        }),
        _ => Err(LoaderError::UnsupportedFormat(path.to_path_buf())),
    }
}

fn validate_skill(path: &Path, manifest: SkillManifest) -> Result<SkillManifest, LoaderError> {
    let invalid = |reason: &str| LoaderError::Invalid {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    if manifest.skill_id.trim().is_empty() {
        return Err(invalid("skill_id is empty"));
    }
    if manifest.skill_type.trim().is_empty() {
        return Err(invalid("type is empty"));
    }
    Ok(manifest)
}

fn validate_flow(path: &Path, flow: FlowDefinition) -> Result<FlowDefinition, LoaderError> {
    let invalid = |reason: String| LoaderError::Invalid {
        path: path.to_path_buf(),
        reason,
    };
    if flow.flow_id.trim().is_empty() {
        return Err(invalid("flow_id is empty".to_string()));
    }
    let mut seen = HashSet::new();
    for step in &flow.steps {
        if step.id.trim().is_empty() {
            return Err(invalid(format!("step for skill '{}' has an empty id", step.skill)));
        }
        if !seen.insert(step.id.as_str()) {
            return Err(invalid(format!("duplicate step id '{}'", step.id)));
        }
    }
    Ok(flow)
}
