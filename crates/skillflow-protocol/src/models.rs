use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A JSON object keyed by field name. Every capability input and output is one of these.
pub type ValueMap = Map<String, Value>;

/// Well-known skill type tags understood by the built-in capability factories.
pub mod skill_types {
    /// OpenAI-compatible chat completion
    pub const LLM_CALL: &str = "llm_call";
    /// Conversational data-space query
    pub const GENIE_QUERY: &str = "genie_query";
    /// External web search
    pub const WEB_SEARCH: &str = "web_search";
    /// SQL query against an operational database
    pub const LAKEBASE_QUERY: &str = "lakebase_query";
    /// Named function from a compile-time table
    pub const FUNCTION: &str = "function";
    /// Prompt template lookup and rendering
    pub const PROMPT_REGISTRY: &str = "prompt_registry";
}

/// Execution status of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SkillStatus {
    /// The capability produced its real output
    Success,
    /// The capability failed; output may carry a fallback value
    Failure,
    /// The step did not run, or its failure was downgraded to a skip
    Skipped,
}

impl SkillStatus {
    /// Lower-case tag used inside the execution context and on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            SkillStatus::Success => "success",
            SkillStatus::Failure => "failure",
            SkillStatus::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for SkillStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification of why a step (or a flow) did not fully succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A required input was absent; the capability was never called
    MissingInput,
    /// The capability implementation failed or timed out
    ExternalFailure,
    /// The step names a skill id the registry does not know
    SkillNotFound,
    /// No capability factory is registered for the skill's type tag
    NoCapability,
    /// The flow id is not registered
    FlowNotFound,
}

/// What to do when a capability invocation fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Use one of the step's resolved inputs as the output
    Passthrough,
    /// Return a static default
    DefaultValue,
    /// Mark the step as skipped and continue
    #[default]
    Skip,
}

/// Fallback configuration as written in a manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FallbackConfig {
    /// Strategy to apply
    #[serde(default)]
    pub strategy: FallbackStrategy,
    /// Input field to pass through (passthrough strategy only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passthrough_field: Option<String>,
    /// Value to return (default_value strategy only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

/// The effective fallback policy once a [`FallbackConfig`] has been checked
/// for completeness. An incomplete passthrough or default configuration
/// degrades to [`FallbackPolicy::Skip`].
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackPolicy {
    /// Phase one of the passthrough protocol; names the input field
    Passthrough(String),
    /// Substitute this value
    DefaultValue(Value),
    /// Record the step as skipped with empty output
    Skip,
}

impl FallbackConfig {
    /// Passthrough of the given input field
    pub fn passthrough(field: impl Into<String>) -> Self {
        Self {
            strategy: FallbackStrategy::Passthrough,
            passthrough_field: Some(field.into()),
            default_value: None,
        }
    }

    /// Static default value
    pub fn default_value(value: Value) -> Self {
        Self {
            strategy: FallbackStrategy::DefaultValue,
            passthrough_field: None,
            default_value: Some(value),
        }
    }

    /// Resolve the configured strategy into a policy
    pub fn policy(&self) -> FallbackPolicy {
        match (&self.strategy, &self.passthrough_field, &self.default_value) {
            (FallbackStrategy::Passthrough, Some(field), _) => {
                FallbackPolicy::Passthrough(field.clone())
            }
            (FallbackStrategy::DefaultValue, _, Some(value)) if !value.is_null() => {
                FallbackPolicy::DefaultValue(value.clone())
            }
            _ => FallbackPolicy::Skip,
        }
    }
}

/// Where to load a system prompt from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PromptSource {
    /// Defined directly in the manifest
    #[default]
    Inline,
    /// A prompt registry URI (`prompts:/name/version`)
    Registry,
    /// A local file
    File,
}

/// Prompt configuration for prompt-driven capabilities
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PromptConfig {
    /// Where the prompt text comes from
    #[serde(default)]
    pub source: PromptSource,
    /// Inline prompt text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_text: Option<String>,
    /// Registry URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_uri: Option<String>,
    /// Local file path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Registry version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

/// Provider-specific configuration for a skill.
///
/// The engine treats this as opaque; only capability implementations read it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SkillConfig {
    /// Service endpoint (may be `${ENV_VAR}`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Per-call timeout enforced by the capability itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    /// Retry budget for the capability's own external calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Data space identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_id: Option<String>,
    /// Provider name (e.g. a web search backend)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Name of the environment variable holding the API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Function name for `function` skills
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    /// Prompt configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<PromptConfig>,
    /// Arbitrary extra configuration
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: ValueMap,
}

/// Schema of one declared input or output field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldSchema {
    /// Field name
    pub name: String,
    /// Type tag: string, number, boolean, list, object
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: String,
    /// Whether the field must be present
    #[serde(default = "default_true")]
    pub required: bool,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Default value, used by the default mock implementation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

fn default_field_type() -> String {
    "string".to_string()
}

fn default_true() -> bool {
    true
}

fn default_version() -> u32 {
    1
}

impl FieldSchema {
    /// A required string field
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: default_field_type(),
            required: true,
            description: None,
            default: None,
        }
    }

    /// An optional field
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name)
        }
    }

    /// Set the type tag
    pub fn with_type(mut self, field_type: impl Into<String>) -> Self {
        self.field_type = field_type.into();
        self
    }

    /// Set the default value
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Declarative definition of a single capability.
///
/// Loaded once and immutable thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SkillManifest {
    /// Unique skill id
    pub skill_id: String,
    /// Human-readable name
    pub name: String,
    /// What this skill does
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Manifest version
    #[serde(default = "default_version")]
    pub version: u32,
    /// Type tag selecting the capability implementation (see [`skill_types`])
    #[serde(rename = "type")]
    pub skill_type: String,
    /// Opaque provider configuration
    #[serde(default)]
    pub config: SkillConfig,
    /// Declared inputs
    #[serde(default)]
    pub input_schema: Vec<FieldSchema>,
    /// Declared outputs, in order
    #[serde(default)]
    pub output_schema: Vec<FieldSchema>,
    /// Failure policy
    #[serde(default)]
    pub fallback: FallbackConfig,
    /// Tags for lookup
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether mock mode may substitute canned output for this skill
    #[serde(default = "default_true")]
    pub mock_enabled: bool,
}

impl SkillManifest {
    /// Create a manifest with the given id and type tag
    pub fn new(skill_id: impl Into<String>, skill_type: impl Into<String>) -> Self {
        let skill_id = skill_id.into();
        Self {
            name: skill_id.clone(),
            skill_id,
            description: None,
            version: 1,
            skill_type: skill_type.into(),
            config: SkillConfig::default(),
            input_schema: Vec::new(),
            output_schema: Vec::new(),
            fallback: FallbackConfig::default(),
            tags: Vec::new(),
            mock_enabled: true,
        }
    }

    /// Add a declared input
    pub fn with_input(mut self, field: FieldSchema) -> Self {
        self.input_schema.push(field);
        self
    }

    /// Add a declared output
    pub fn with_output(mut self, field: FieldSchema) -> Self {
        self.output_schema.push(field);
        self
    }

    /// Set the fallback configuration
    pub fn with_fallback(mut self, fallback: FallbackConfig) -> Self {
        self.fallback = fallback;
        self
    }

    /// Set the provider configuration
    pub fn with_config(mut self, config: SkillConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Name of the first declared output field, or `"result"` when none are declared
    pub fn first_output_field(&self) -> &str {
        self.output_schema
            .first()
            .map(|f| f.name.as_str())
            .unwrap_or("result")
    }
}

/// One input binding of a step: a literal value or a reference expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StepInput {
    /// Input field name passed to the capability
    pub field: String,
    /// Literal value; strings may embed `${...}` tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Whole-value reference such as `${step.output.field}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl StepInput {
    /// A literal binding
    pub fn literal(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            value: Some(value),
            reference: None,
        }
    }

    /// A reference binding
    pub fn reference(field: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: None,
            reference: Some(reference.into()),
        }
    }
}

/// A single step in a flow pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FlowStep {
    /// Skill id from the registry
    pub skill: String,
    /// Step id, unique within the flow
    pub id: String,
    /// Input bindings
    #[serde(default)]
    pub inputs: Vec<StepInput>,
    /// Optional condition; the step is skipped when it evaluates false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl FlowStep {
    /// Create a step invoking `skill` under the id `id`
    pub fn new(skill: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            skill: skill.into(),
            id: id.into(),
            inputs: Vec::new(),
            condition: None,
        }
    }

    /// Add an input binding
    pub fn with_input(mut self, input: StepInput) -> Self {
        self.inputs.push(input);
        self
    }

    /// Set the condition expression
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

/// Maps a response field to a reference expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResponseMapping {
    /// Response field name
    pub field: String,
    /// Reference expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Value used when the reference resolves to null
    #[serde(default)]
    pub default: Value,
}

impl ResponseMapping {
    /// Map `field` to `reference` with a null default
    pub fn new(field: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reference: Some(reference.into()),
            default: Value::Null,
        }
    }

    /// Set the default value
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = default;
        self
    }
}

fn default_display_type() -> String {
    "inline".to_string()
}

fn default_results_format() -> String {
    "cards".to_string()
}

/// Frontend display configuration for a flow's results.
///
/// Passed through to callers untouched; unknown keys are preserved in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DisplayConfig {
    /// inline, page, modal, toast
    #[serde(rename = "type", default = "default_display_type")]
    pub display_type: String,
    /// Show the answer text
    #[serde(default = "default_true")]
    pub show_answer: bool,
    /// cards, list, table
    #[serde(default = "default_results_format")]
    pub results_format: String,
    /// Show result sources
    #[serde(default = "default_true")]
    pub show_sources: bool,
    /// Show the rewritten query
    #[serde(default = "default_true")]
    pub show_rewritten_query: bool,
    /// Show follow-up questions
    #[serde(default)]
    pub show_follow_up: bool,
    /// Any other keys
    #[serde(flatten)]
    pub extra: ValueMap,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            display_type: default_display_type(),
            show_answer: true,
            results_format: default_results_format(),
            show_sources: true,
            show_rewritten_query: true,
            show_follow_up: false,
            extra: ValueMap::new(),
        }
    }
}

/// Declarative definition of a multi-step pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FlowDefinition {
    /// Unique flow id
    pub flow_id: String,
    /// Human-readable name
    pub name: String,
    /// What this flow does
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Definition version
    #[serde(default = "default_version")]
    pub version: u32,
    /// Free-form trigger description (e.g. an HTTP route)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    /// Ordered steps
    #[serde(default)]
    pub steps: Vec<FlowStep>,
    /// Response mappings
    #[serde(default)]
    pub response: Vec<ResponseMapping>,
    /// Display passthrough
    #[serde(default)]
    pub display: DisplayConfig,
    /// Tags for lookup
    #[serde(default)]
    pub tags: Vec<String>,
}

impl FlowDefinition {
    /// Create an empty flow
    pub fn new(flow_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            flow_id: flow_id.into(),
            name: name.into(),
            description: None,
            version: 1,
            trigger: None,
            steps: Vec::new(),
            response: Vec::new(),
            display: DisplayConfig::default(),
            tags: Vec::new(),
        }
    }

    /// Append a step
    pub fn with_step(mut self, step: FlowStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Append a response mapping
    pub fn with_response(mut self, mapping: ResponseMapping) -> Self {
        self.response.push(mapping);
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Result of executing a single step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SkillResult {
    /// Skill id that ran (or was meant to run)
    pub skill_id: String,
    /// Step id within the flow
    pub step_id: String,
    /// Outcome
    pub status: SkillStatus,
    /// Output fields
    #[serde(default)]
    pub output: ValueMap,
    /// Error text when the capability failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Error classification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Time spent in the capability call
    #[serde(default)]
    pub latency_ms: u64,
    /// Free-form metadata (fallback strategy, skip reason, ...)
    #[serde(default)]
    pub metadata: ValueMap,
}

impl SkillResult {
    /// A successful result
    pub fn success(
        skill_id: impl Into<String>,
        step_id: impl Into<String>,
        output: ValueMap,
        latency_ms: u64,
    ) -> Self {
        Self {
            skill_id: skill_id.into(),
            step_id: step_id.into(),
            status: SkillStatus::Success,
            output,
            error: None,
            error_kind: None,
            latency_ms,
            metadata: ValueMap::new(),
        }
    }

    /// A failed result with empty output
    pub fn failure(
        skill_id: impl Into<String>,
        step_id: impl Into<String>,
        kind: ErrorKind,
        error: impl Into<String>,
    ) -> Self {
        Self {
            skill_id: skill_id.into(),
            step_id: step_id.into(),
            status: SkillStatus::Failure,
            output: ValueMap::new(),
            error: Some(error.into()),
            error_kind: Some(kind),
            latency_ms: 0,
            metadata: ValueMap::new(),
        }
    }

    /// A skipped result with empty output and a `reason` metadata entry
    pub fn skipped(
        skill_id: impl Into<String>,
        step_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        let mut metadata = ValueMap::new();
        metadata.insert("reason".to_string(), Value::String(reason.into()));
        Self {
            skill_id: skill_id.into(),
            step_id: step_id.into(),
            status: SkillStatus::Skipped,
            output: ValueMap::new(),
            error: None,
            error_kind: None,
            latency_ms: 0,
            metadata,
        }
    }

    /// Whether the step produced its real output
    pub fn is_success(&self) -> bool {
        self.status == SkillStatus::Success
    }
}

/// Result of executing a complete flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FlowResult {
    /// Unique id of this invocation
    pub run_id: Uuid,
    /// Flow id that was requested
    pub flow_id: String,
    /// Orchestration-level status; says nothing about individual steps
    pub status: SkillStatus,
    /// Assembled response
    #[serde(default)]
    pub response: ValueMap,
    /// Per-step results in execution order
    #[serde(default)]
    pub step_results: Vec<SkillResult>,
    /// Wall-clock time of the whole invocation
    #[serde(default)]
    pub total_latency_ms: u64,
    /// Display passthrough from the flow definition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<DisplayConfig>,
    /// Error text when the flow could not run at all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Error classification when the flow could not run at all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// When the invocation started
    pub started_at: DateTime<Utc>,
}

impl FlowResult {
    /// Result for a flow id that is not registered
    pub fn not_found(run_id: Uuid, flow_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        let flow_id = flow_id.into();
        Self {
            run_id,
            error: Some(format!("Flow not found: {}", flow_id)),
            error_kind: Some(ErrorKind::FlowNotFound),
            flow_id,
            status: SkillStatus::Failure,
            response: ValueMap::new(),
            step_results: Vec::new(),
            total_latency_ms: 0,
            display: None,
            started_at,
        }
    }

    /// Look up the result recorded for a step id
    pub fn step(&self, step_id: &str) -> Option<&SkillResult> {
        self.step_results.iter().find(|r| r.step_id == step_id)
    }

    /// Whether the orchestration itself succeeded
    pub fn is_success(&self) -> bool {
        self.status == SkillStatus::Success
    }
}

/// Request accepted at the flow-invocation boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FlowExecuteRequest {
    /// Flow to execute
    pub flow_id: String,
    /// Request payload, addressable as `${request.*}`
    #[serde(default)]
    pub request: ValueMap,
    /// Explicit mock mode; falls back to the engine default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_mode: Option<bool>,
}

/// Summary of one step for boundary responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StepResultSummary {
    /// Skill id
    pub skill_id: String,
    /// Step id
    pub step_id: String,
    /// Outcome
    pub status: SkillStatus,
    /// Capability latency
    pub latency_ms: u64,
    /// Error text, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response returned at the flow-invocation boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FlowExecuteResponse {
    /// Flow id
    pub flow_id: String,
    /// Orchestration-level status
    pub status: SkillStatus,
    /// Assembled response
    pub response: ValueMap,
    /// Step summaries in execution order
    pub steps: Vec<StepResultSummary>,
    /// Wall-clock time of the invocation
    pub total_latency_ms: u64,
    /// Display passthrough
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<DisplayConfig>,
    /// Flow-level error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&FlowResult> for FlowExecuteResponse {
    fn from(result: &FlowResult) -> Self {
        Self {
            flow_id: result.flow_id.clone(),
            status: result.status,
            response: result.response.clone(),
            steps: result
                .step_results
                .iter()
                .map(|r| StepResultSummary {
                    skill_id: r.skill_id.clone(),
                    step_id: r.step_id.clone(),
                    status: r.status,
                    latency_ms: r.latency_ms,
                    error: r.error.clone(),
                })
                .collect(),
            total_latency_ms: result.total_latency_ms,
            display: result.display.clone(),
            error: result.error.clone(),
        }
    }
}

impl From<FlowResult> for FlowExecuteResponse {
    fn from(result: FlowResult) -> Self {
        Self::from(&result)
    }
}

/// Top-level registry configuration (`skill_registry.yaml`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RegistryConfig {
    /// Config format version
    #[serde(default = "default_version")]
    pub version: u32,
    /// Description of this registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Skill folder names to load; empty loads all
    #[serde(default)]
    pub skills: Vec<String>,
    /// Flow file stems to load; empty loads all
    #[serde(default)]
    pub flows: Vec<String>,
    /// Flow used when a caller does not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_flow: Option<String>,
    /// Free-form settings
    #[serde(default)]
    pub settings: ValueMap,
}
