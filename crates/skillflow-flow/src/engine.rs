//! The flow orchestration loop

use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::contract::passthrough_field;
use crate::error::FlowError;
use crate::expr::ReferenceResolver;
use crate::factory::{CapabilityCache, CapabilityFactories};
use chrono::Utc;
use serde_json::Value;
use skillflow_protocol::models::{
    ErrorKind, FlowDefinition, FlowExecuteRequest, FlowExecuteResponse, FlowResult, FlowStep,
    SkillManifest, SkillResult, SkillStatus, ValueMap,
};
use skillflow_registry::SkillRegistry;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Skip reason recorded when a step's condition evaluates to false
pub const CONDITION_NOT_MET: &str = "condition_not_met";

/// Engine for executing registered flows.
///
/// Cheap to clone; clones share the registry and the capability cache, so a
/// capability is constructed at most once per skill id across all of them.
#[derive(Clone)]
pub struct FlowEngine {
    registry: SkillRegistry,
    factories: Arc<CapabilityFactories>,
    cache: Arc<CapabilityCache>,
    resolver: ReferenceResolver,
    config: EngineConfig,
}

impl FlowEngine {
    /// Create a new flow engine
    pub fn new(
        registry: SkillRegistry,
        factories: CapabilityFactories,
        config: EngineConfig,
    ) -> Result<Self, FlowError> {
        Ok(Self {
            registry,
            factories: Arc::new(factories),
            cache: Arc::new(CapabilityCache::new()),
            resolver: ReferenceResolver::new()?,
            config,
        })
    }

    /// The registry this engine reads manifests and flows from
    pub fn registry(&self) -> &SkillRegistry {
        &self.registry
    }

    /// The engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of capability instances constructed so far
    pub fn cached_capabilities(&self) -> usize {
        self.cache.len()
    }

    /// Execute a flow by id.
    ///
    /// Never fails: an unknown flow id yields a failed [`FlowResult`] and every
    /// step-level problem is recorded on that step's result.
    #[instrument(skip(self, request), fields(run_id = tracing::field::Empty))]
    pub async fn execute_flow(
        &self,
        flow_id: &str,
        request: ValueMap,
        mock_mode: Option<bool>,
    ) -> FlowResult {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        let started_at = Utc::now();
        let started = Instant::now();
        let mock_mode = self.config.effective_mock_mode(mock_mode);

        let Some(flow) = self.registry.get_flow(flow_id).await else {
            warn!("Flow not found: {}", flow_id);
            return FlowResult::not_found(run_id, flow_id, started_at);
        };

        info!(
            "Starting flow execution: {} ({} steps, mock={})",
            flow.name,
            flow.steps.len(),
            mock_mode
        );

        let mut context = ExecutionContext::new(request);
        let mut step_results = Vec::with_capacity(flow.steps.len());

        for step in &flow.steps {
            let result = self.execute_step(step, &mut context, mock_mode).await;
            step_results.push(result);
        }

        let response = self.build_response(&flow, &context);
        let total_latency_ms = started.elapsed().as_millis() as u64;

        info!(
            "Flow {} completed in {}ms ({} of {} steps succeeded)",
            flow.flow_id,
            total_latency_ms,
            step_results.iter().filter(|r| r.is_success()).count(),
            step_results.len()
        );

        FlowResult {
            run_id,
            flow_id: flow.flow_id.clone(),
            status: SkillStatus::Success,
            response,
            step_results,
            total_latency_ms,
            display: Some(flow.display.clone()),
            error: None,
            error_kind: None,
            started_at,
        }
    }

    /// Execute a boundary request and summarize the result
    pub async fn execute(&self, request: FlowExecuteRequest) -> FlowExecuteResponse {
        let FlowExecuteRequest {
            flow_id,
            request,
            mock_mode,
        } = request;
        self.execute_flow(&flow_id, request, mock_mode).await.into()
    }

    async fn execute_step(
        &self,
        step: &FlowStep,
        context: &mut ExecutionContext,
        mock_mode: bool,
    ) -> SkillResult {
        if let Some(condition) = &step.condition {
            if !self.resolver.evaluate_condition(condition, context) {
                info!("Step {}: condition not met, skipping", step.id);
                let result = SkillResult::skipped(&step.skill, &step.id, CONDITION_NOT_MET);
                context.record_step(&step.id, SkillStatus::Skipped, ValueMap::new());
                return result;
            }
        }

        let inputs = self.resolve_inputs(step, context);

        let Some(manifest) = self.registry.get_skill(&step.skill).await else {
            error!("Step {}: skill not found: {}", step.id, step.skill);
            let result = SkillResult::failure(
                &step.skill,
                &step.id,
                ErrorKind::SkillNotFound,
                format!("Skill not found: {}", step.skill),
            );
            context.record_step(&step.id, SkillStatus::Failure, ValueMap::new());
            return result;
        };

        let invoker = match self.cache.get_or_create(&manifest, &self.factories) {
            Ok(invoker) => invoker,
            Err(e) => {
                warn!("Step {}: {}", step.id, e);
                let result =
                    SkillResult::failure(&step.skill, &step.id, ErrorKind::NoCapability, e.to_string());
                context.record_step(&step.id, SkillStatus::Failure, ValueMap::new());
                return result;
            }
        };

        info!("Step {}: invoking {}", step.id, manifest.skill_id);
        let mut result = invoker.invoke(&inputs, &step.id, mock_mode).await;
        complete_passthrough(&mut result, &manifest, &inputs);

        context.record_step(&step.id, result.status, result.output.clone());
        result
    }

    fn resolve_inputs(&self, step: &FlowStep, context: &ExecutionContext) -> ValueMap {
        step.inputs
            .iter()
            .map(|input| {
                let value = match (&input.reference, &input.value) {
                    (Some(reference), _) => self.resolver.resolve_reference(reference, context),
                    (None, Some(Value::String(text))) => {
                        Value::String(self.resolver.interpolate(text, context))
                    }
                    (None, Some(value)) => value.clone(),
                    (None, None) => Value::Null,
                };
                (input.field.clone(), value)
            })
            .collect()
    }

    fn build_response(&self, flow: &FlowDefinition, context: &ExecutionContext) -> ValueMap {
        flow.response
            .iter()
            .map(|mapping| {
                let value = match &mapping.reference {
                    Some(reference) => self.resolver.resolve_reference(reference, context),
                    None => Value::Null,
                };
                let value = if value.is_null() {
                    debug!("Response field {} falls back to its default", mapping.field);
                    mapping.default.clone()
                } else {
                    value
                };
                (mapping.field.clone(), value)
            })
            .collect()
    }
}

/// Second phase of the passthrough fallback: swap the marker for the named
/// input, keyed by the manifest's first declared output field. A marker whose
/// field was never bound is cleared so it cannot leak downstream.
fn complete_passthrough(result: &mut SkillResult, manifest: &SkillManifest, inputs: &ValueMap) {
    let Some(field) = passthrough_field(&result.output).map(str::to_string) else {
        return;
    };

    let mut output = ValueMap::new();
    match inputs.get(&field) {
        Some(value) => {
            debug!("Step {}: passing through input '{}'", result.step_id, field);
            output.insert(manifest.first_output_field().to_string(), value.clone());
        }
        None => {
            warn!(
                "Step {}: passthrough field '{}' is not among the step inputs",
                result.step_id, field
            );
        }
    }
    result.output = output;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capability;
    use crate::error::CapabilityError;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use skillflow_protocol::models::{
        skill_types, FallbackConfig, FieldSchema, ResponseMapping, StepInput,
    };

    struct Upper;

    #[async_trait]
    impl Capability for Upper {
        async fn execute(&self, inputs: &ValueMap) -> Result<ValueMap, CapabilityError> {
            let text = inputs.get("text").and_then(Value::as_str).unwrap_or_default();
            let mut output = ValueMap::new();
            output.insert("text".to_string(), json!(text.to_uppercase()));
            Ok(output)
        }
    }

    struct Broken;

    #[async_trait]
    impl Capability for Broken {
        async fn execute(&self, _inputs: &ValueMap) -> Result<ValueMap, CapabilityError> {
            Err(CapabilityError::Timeout("no response within 1s".to_string()))
        }
    }

    fn request(value: Value) -> ValueMap {
        match value {
            Value::Object(m) => m,
            _ => ValueMap::new(),
        }
    }

    async fn engine() -> FlowEngine {
        let registry = SkillRegistry::new();
        registry
            .register_skill(
                SkillManifest::new("upper", skill_types::FUNCTION)
                    .with_input(FieldSchema::required("text"))
                    .with_output(FieldSchema::required("text")),
            )
            .await;
        registry
            .register_skill(
                SkillManifest::new("rewrite", skill_types::LLM_CALL)
                    .with_input(FieldSchema::required("query"))
                    .with_output(FieldSchema::required("rewritten_query"))
                    .with_fallback(FallbackConfig::passthrough("query")),
            )
            .await;

        let mut factories = CapabilityFactories::new();
        factories.register(skill_types::FUNCTION, |_m: &SkillManifest| {
            Ok(Box::new(Upper) as Box<dyn Capability>)
        });
        factories.register(skill_types::LLM_CALL, |_m: &SkillManifest| {
            Ok(Box::new(Broken) as Box<dyn Capability>)
        });

        FlowEngine::new(registry, factories, EngineConfig::default()).expect("engine")
    }

    #[tokio::test]
    async fn test_interpolated_literal_and_response() {
        let engine = engine().await;
        engine
            .registry()
            .register_flow(
                FlowDefinition::new("greet", "Greet")
                    .with_step(
                        FlowStep::new("upper", "shout")
                            .with_input(StepInput::literal("text", json!("hello ${request.name}"))),
                    )
                    .with_response(ResponseMapping::new("greeting", "${shout.output.text}")),
            )
            .await;

        let result = engine
            .execute_flow("greet", request(json!({"name": "ada"})), None)
            .await;

        assert!(result.is_success());
        assert_eq!(result.response.get("greeting"), Some(&json!("HELLO ADA")));
        assert_eq!(result.step("shout").map(|r| r.status), Some(SkillStatus::Success));
    }

    #[tokio::test]
    async fn test_passthrough_completed_by_engine() {
        let engine = engine().await;
        engine
            .registry()
            .register_flow(
                FlowDefinition::new("search", "Search")
                    .with_step(
                        FlowStep::new("rewrite", "rewrite")
                            .with_input(StepInput::reference("query", "${request.query}")),
                    )
                    .with_response(ResponseMapping::new(
                        "query",
                        "${rewrite.output.rewritten_query}",
                    )),
            )
            .await;

        let result = engine
            .execute_flow("search", request(json!({"query": "hotels in austin"})), None)
            .await;

        let step = result.step("rewrite").expect("step recorded");
        assert_eq!(step.status, SkillStatus::Failure);
        assert_eq!(step.output, request(json!({"rewritten_query": "hotels in austin"})));
        assert_eq!(step.error.as_deref(), Some("Timeout: no response within 1s"));
        assert_eq!(result.response.get("query"), Some(&json!("hotels in austin")));
    }

    #[test]
    fn test_passthrough_without_bound_field_is_cleared() {
        let manifest = SkillManifest::new("rewrite", skill_types::LLM_CALL);
        let mut result = SkillResult::failure("rewrite", "s", ErrorKind::ExternalFailure, "x");
        result.output = request(json!({"_fallback": "passthrough", "_field": "query"}));

        complete_passthrough(&mut result, &manifest, &ValueMap::new());
        assert!(result.output.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_capability_type() {
        let engine = engine().await;
        engine
            .registry()
            .register_skill(SkillManifest::new("genie", skill_types::GENIE_QUERY))
            .await;
        engine
            .registry()
            .register_flow(FlowDefinition::new("g", "G").with_step(FlowStep::new("genie", "ask")))
            .await;

        let result = engine.execute_flow("g", ValueMap::new(), None).await;
        let step = result.step("ask").expect("step recorded");
        assert_eq!(step.status, SkillStatus::Failure);
        assert_eq!(step.error_kind, Some(ErrorKind::NoCapability));
        assert!(result.is_success());
    }
}
