//! `prompt_registry` skills: prompt template rendering.
//!
//! The template comes from the `template` input, or from the manifest's
//! `config.prompt` (inline text or a file). Placeholders of the form
//! `{{ name }}` are replaced with entries of the `variables` input; unknown
//! placeholders are left as they are.

use crate::error::SkillError;
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use skillflow_flow::{Capability, CapabilityError};
use skillflow_protocol::models::{PromptSource, SkillManifest, ValueMap};
use tracing::{debug, warn};

/// Factory for `prompt_registry` skills
pub fn factory(manifest: &SkillManifest) -> Result<Box<dyn Capability>, CapabilityError> {
    Ok(Box::new(PromptTemplateCapability::from_manifest(manifest)))
}

/// Capability rendering prompt templates
#[derive(Debug, Clone)]
pub struct PromptTemplateCapability {
    prompt_name: String,
    prompt_version: u32,
    configured: Option<String>,
}

impl PromptTemplateCapability {
    /// Build the capability from a manifest
    pub fn from_manifest(manifest: &SkillManifest) -> Self {
        let prompt = manifest.config.prompt.as_ref();
        let configured = prompt.and_then(|p| match p.source {
            PromptSource::Inline => p.inline_text.clone(),
            PromptSource::File => {
                let path = p.file_path.as_deref()?;
                match std::fs::read_to_string(path) {
                    Ok(text) => Some(text),
                    Err(e) => {
                        warn!("Failed to load prompt template {}: {}", path, e);
                        None
                    }
                }
            }
            PromptSource::Registry => {
                warn!(
                    "Prompt registry URI {:?} cannot be fetched; supply a template",
                    p.registry_uri
                );
                None
            }
        });

        Self {
            prompt_name: manifest.name.clone(),
            prompt_version: prompt.and_then(|p| p.version).unwrap_or(1),
            configured,
        }
    }
}

#[async_trait]
impl Capability for PromptTemplateCapability {
    async fn execute(&self, inputs: &ValueMap) -> Result<ValueMap, CapabilityError> {
        let template = match inputs.get("template").and_then(Value::as_str) {
            Some(t) => t.to_string(),
            None => match &self.configured {
                Some(t) => t.clone(),
                None => {
                    let mut output = ValueMap::new();
                    output.insert("error".to_string(), json!("No prompt template provided"));
                    output.insert("rendered_prompt".to_string(), json!(""));
                    return Ok(output);
                }
            },
        };

        let rendered = match inputs.get("variables") {
            Some(Value::Object(variables)) => render_template(&template, variables)?,
            _ => template.clone(),
        };

        let name = inputs
            .get("prompt_name")
            .and_then(Value::as_str)
            .unwrap_or(&self.prompt_name);
        debug!("Rendered prompt {} v{}", name, self.prompt_version);

        let mut output = ValueMap::new();
        output.insert("prompt_name".to_string(), json!(name));
        output.insert("prompt_version".to_string(), json!(self.prompt_version));
        output.insert("raw_template".to_string(), Value::String(template));
        output.insert("rendered_prompt".to_string(), Value::String(rendered));
        Ok(output)
    }

    async fn mock_execute(
        &self,
        _manifest: &SkillManifest,
        _inputs: &ValueMap,
    ) -> Result<ValueMap, CapabilityError> {
        let mut output = ValueMap::new();
        output.insert("prompt_name".to_string(), json!("mock_prompt"));
        output.insert("prompt_version".to_string(), json!(1));
        output.insert(
            "raw_template".to_string(),
            json!("You are a helpful {{role}} assistant."),
        );
        output.insert(
            "rendered_prompt".to_string(),
            json!("You are a helpful travel assistant."),
        );
        Ok(output)
    }
}

/// Replace `{{ key }}` placeholders with the matching variable
pub fn render_template(template: &str, variables: &ValueMap) -> Result<String, SkillError> {
    let mut rendered = template.to_string();
    for (key, value) in variables {
        let pattern = Regex::new(&format!(r"\{{\{{\s*{}\s*\}}\}}", regex::escape(key)))?;
        let replacement = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        rendered = pattern
            .replace_all(&rendered, regex::NoExpand(&replacement))
            .into_owned();
    }
    Ok(rendered)
}
