//! Capability invocation contract.
//!
//! [`SkillInvoker`] pairs a manifest with its capability and runs every call
//! through the same lifecycle: validate required inputs, dispatch to the mock
//! or real implementation, time the dispatch, and convert any failure into a
//! result shaped by the manifest's fallback policy. Nothing raised by a
//! capability escapes `invoke`, panics included.

use crate::capability::Capability;
use crate::error::CapabilityError;
use futures::FutureExt;
use serde_json::Value;
use skillflow_protocol::models::{
    ErrorKind, FallbackPolicy, SkillManifest, SkillResult, SkillStatus, ValueMap,
};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Output key marking a pending passthrough substitution
pub const PASSTHROUGH_MARKER: &str = "_fallback";
/// Output key naming the input field to pass through
pub const PASSTHROUGH_FIELD: &str = "_field";
/// Metadata key recording which fallback strategy was applied
pub const FALLBACK_STRATEGY_KEY: &str = "fallback_strategy";
/// Output key used to wrap a non-map default value
pub const DEFAULT_RESULT_KEY: &str = "result";

/// A capability wrapped in the invocation contract
pub struct SkillInvoker {
    manifest: Arc<SkillManifest>,
    capability: Box<dyn Capability>,
}

impl std::fmt::Debug for SkillInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkillInvoker")
            .field("skill_id", &self.manifest.skill_id)
            .field("skill_type", &self.manifest.skill_type)
            .finish()
    }
}

impl SkillInvoker {
    /// Wrap a capability
    pub fn new(manifest: Arc<SkillManifest>, capability: Box<dyn Capability>) -> Self {
        Self {
            manifest,
            capability,
        }
    }

    /// The manifest this invoker was built from
    pub fn manifest(&self) -> &SkillManifest {
        &self.manifest
    }

    /// Run one invocation. Always returns a result.
    pub async fn invoke(&self, inputs: &ValueMap, step_id: &str, mock_mode: bool) -> SkillResult {
        let skill_id = self.manifest.skill_id.as_str();
        let step_label = if step_id.is_empty() {
            skill_id.to_string()
        } else {
            format!("{}/{}", skill_id, step_id)
        };

        info!(step = %step_label, "Starting skill invocation");
        debug!(step = %step_label, inputs = ?inputs.keys().collect::<Vec<_>>(), "Resolved inputs");

        if let Some(field) = self.missing_required_input(inputs) {
            let message = format!("Missing required input: {}", field);
            error!(step = %step_label, error = %message, "Input validation failed");
            return SkillResult::failure(skill_id, step_id, ErrorKind::MissingInput, message);
        }

        let started = Instant::now();
        let outcome = if mock_mode && self.manifest.mock_enabled {
            info!(step = %step_label, "Running in mock mode");
            catch_panics(self.capability.mock_execute(&self.manifest, inputs)).await
        } else {
            catch_panics(self.capability.execute(inputs)).await
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                info!(step = %step_label, latency_ms, "Skill completed");
                SkillResult::success(skill_id, step_id, output, latency_ms)
            }
            Err(e) => {
                if e.is_timeout() {
                    warn!(step = %step_label, latency_ms, "Skill timed out");
                } else {
                    error!(step = %step_label, latency_ms, error = %e, "Skill failed");
                }
                self.apply_fallback(step_id, e.to_string(), latency_ms)
            }
        }
    }

    fn missing_required_input<'a>(&'a self, inputs: &ValueMap) -> Option<&'a str> {
        self.manifest
            .input_schema
            .iter()
            .find(|field| field.required && !inputs.contains_key(&field.name))
            .map(|field| field.name.as_str())
    }

    fn apply_fallback(&self, step_id: &str, error: String, latency_ms: u64) -> SkillResult {
        let (status, output, strategy) = match self.manifest.fallback.policy() {
            FallbackPolicy::Passthrough(field) => {
                let mut marker = ValueMap::new();
                marker.insert(
                    PASSTHROUGH_MARKER.to_string(),
                    Value::String("passthrough".to_string()),
                );
                marker.insert(PASSTHROUGH_FIELD.to_string(), Value::String(field));
                (SkillStatus::Failure, marker, "passthrough")
            }
            FallbackPolicy::DefaultValue(value) => {
                let output = match value {
                    Value::Object(map) => map,
                    scalar => {
                        let mut wrapped = ValueMap::new();
                        wrapped.insert(DEFAULT_RESULT_KEY.to_string(), scalar);
                        wrapped
                    }
                };
                (SkillStatus::Failure, output, "default_value")
            }
            FallbackPolicy::Skip => (SkillStatus::Skipped, ValueMap::new(), "skip"),
        };

        let mut metadata = ValueMap::new();
        metadata.insert(
            FALLBACK_STRATEGY_KEY.to_string(),
            Value::String(strategy.to_string()),
        );

        SkillResult {
            skill_id: self.manifest.skill_id.clone(),
            step_id: step_id.to_string(),
            status,
            output,
            error: Some(error),
            error_kind: Some(ErrorKind::ExternalFailure),
            latency_ms,
            metadata,
        }
    }
}

async fn catch_panics<F>(fut: F) -> Result<ValueMap, CapabilityError>
where
    F: std::future::Future<Output = Result<ValueMap, CapabilityError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(CapabilityError::Panicked(message))
        }
    }
}

/// Input field named by a passthrough marker, if `output` is one
pub fn passthrough_field(output: &ValueMap) -> Option<&str> {
    match output.get(PASSTHROUGH_MARKER) {
        Some(Value::String(marker)) if marker == "passthrough" => {
            output.get(PASSTHROUGH_FIELD).and_then(Value::as_str)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use skillflow_protocol::models::{skill_types, FallbackConfig, FieldSchema};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Capability for Counting {
        async fn execute(&self, inputs: &ValueMap) -> Result<ValueMap, CapabilityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CapabilityError::failed("upstream exploded"));
            }
            Ok(inputs.clone())
        }
    }

    struct Panicking;

    #[async_trait]
    impl Capability for Panicking {
        async fn execute(&self, _inputs: &ValueMap) -> Result<ValueMap, CapabilityError> {
            panic!("boom");
        }
    }

    fn inputs(value: Value) -> ValueMap {
        match value {
            Value::Object(m) => m,
            _ => ValueMap::new(),
        }
    }

    fn invoker(manifest: SkillManifest, capability: impl Capability + 'static) -> SkillInvoker {
        SkillInvoker::new(Arc::new(manifest), Box::new(capability))
    }

    #[tokio::test]
    async fn test_missing_input_never_calls_capability() {
        let calls = Arc::new(AtomicUsize::new(0));
        let manifest = SkillManifest::new("search", skill_types::FUNCTION)
            .with_input(FieldSchema::required("q"))
            .with_fallback(FallbackConfig::default_value(json!("unused")));
        let skill = invoker(
            manifest,
            Counting {
                calls: calls.clone(),
                fail: false,
            },
        );

        let result = skill.invoke(&inputs(json!({"other": 1})), "s1", false).await;

        assert_eq!(result.status, SkillStatus::Failure);
        assert_eq!(result.error_kind, Some(ErrorKind::MissingInput));
        assert_eq!(result.error.as_deref(), Some("Missing required input: q"));
        assert!(result.output.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_null_required_input_counts_as_present() {
        let manifest = SkillManifest::new("echo", skill_types::FUNCTION)
            .with_input(FieldSchema::required("q"));
        let skill = invoker(manifest, Counting::default());

        let result = skill.invoke(&inputs(json!({"q": null})), "s1", false).await;
        assert_eq!(result.status, SkillStatus::Success);
        assert_eq!(result.output.get("q"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_skip_fallback() {
        let manifest = SkillManifest::new("flaky", skill_types::FUNCTION);
        let skill = invoker(
            manifest,
            Counting {
                fail: true,
                ..Default::default()
            },
        );

        let result = skill.invoke(&ValueMap::new(), "s1", false).await;
        assert_eq!(result.status, SkillStatus::Skipped);
        assert!(result.output.is_empty());
        assert_eq!(result.error.as_deref(), Some("upstream exploded"));
        assert_eq!(result.metadata.get(FALLBACK_STRATEGY_KEY), Some(&json!("skip")));
    }

    #[tokio::test]
    async fn test_default_value_fallback_wraps_scalars() {
        let manifest = SkillManifest::new("flaky", skill_types::FUNCTION)
            .with_fallback(FallbackConfig::default_value(json!("fallback_data")));
        let skill = invoker(
            manifest,
            Counting {
                fail: true,
                ..Default::default()
            },
        );

        let result = skill.invoke(&ValueMap::new(), "s1", false).await;
        assert_eq!(result.status, SkillStatus::Failure);
        assert_eq!(result.output, inputs(json!({"result": "fallback_data"})));
        assert_eq!(result.error_kind, Some(ErrorKind::ExternalFailure));
    }

    #[tokio::test]
    async fn test_default_value_fallback_keeps_maps() {
        let manifest = SkillManifest::new("flaky", skill_types::FUNCTION)
            .with_fallback(FallbackConfig::default_value(json!({"answer": "n/a"})));
        let skill = invoker(
            manifest,
            Counting {
                fail: true,
                ..Default::default()
            },
        );

        let result = skill.invoke(&ValueMap::new(), "s1", false).await;
        assert_eq!(result.output, inputs(json!({"answer": "n/a"})));
    }

    #[tokio::test]
    async fn test_passthrough_fallback_emits_marker() {
        let manifest = SkillManifest::new("rewrite", skill_types::FUNCTION)
            .with_fallback(FallbackConfig::passthrough("query"));
        let skill = invoker(
            manifest,
            Counting {
                fail: true,
                ..Default::default()
            },
        );

        let result = skill.invoke(&ValueMap::new(), "s1", false).await;
        assert_eq!(result.status, SkillStatus::Failure);
        assert_eq!(passthrough_field(&result.output), Some("query"));
        assert_eq!(result.metadata.get(FALLBACK_STRATEGY_KEY), Some(&json!("passthrough")));
    }

    #[tokio::test]
    async fn test_panics_become_failures() {
        let manifest = SkillManifest::new("explodes", skill_types::FUNCTION);
        let skill = invoker(manifest, Panicking);

        let result = skill.invoke(&ValueMap::new(), "s1", false).await;
        assert_eq!(result.status, SkillStatus::Skipped);
        assert_eq!(result.error.as_deref(), Some("Capability panicked: boom"));
    }

    #[tokio::test]
    async fn test_mock_mode_respects_manifest_opt_out() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut manifest = SkillManifest::new("echo", skill_types::FUNCTION)
            .with_output(FieldSchema::required("answer").with_default(json!("canned")));
        manifest.mock_enabled = false;
        let skill = invoker(
            manifest,
            Counting {
                calls: calls.clone(),
                fail: false,
            },
        );

        let result = skill.invoke(&inputs(json!({"x": 1})), "s1", true).await;
        assert_eq!(result.output, inputs(json!({"x": 1})));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mock_mode_uses_declared_defaults() {
        let calls = Arc::new(AtomicUsize::new(0));
        let manifest = SkillManifest::new("echo", skill_types::FUNCTION)
            .with_output(FieldSchema::required("answer").with_default(json!("canned")));
        let skill = invoker(
            manifest,
            Counting {
                calls: calls.clone(),
                fail: false,
            },
        );

        let result = skill.invoke(&ValueMap::new(), "s1", true).await;
        assert_eq!(result.status, SkillStatus::Success);
        assert_eq!(result.output, inputs(json!({"answer": "canned"})));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
