//! `llm_call` skills: OpenAI-compatible chat completions.
//!
//! Configuration read from the manifest:
//!
//! - `config.endpoint` - API base URL (default `https://api.openai.com/v1`)
//! - `config.extra.model` - model name (default `gpt-4o-mini`)
//! - `config.api_key_env` - env var holding the API key (default `OPENAI_API_KEY`)
//! - `config.temperature`, `config.max_tokens`, `config.timeout_seconds`
//! - `config.prompt` - system prompt, inline or from a file
//!
//! `${NAME}` values in the endpoint and model are expanded from the
//! environment. The reply is expected to be a JSON object; when it is not, the
//! first `{...}` block in it is tried, and failing that the raw text is
//! returned under the first declared output field.

use crate::env::{non_empty_var, resolve_env_var};
use crate::error::SkillError;
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{self, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use skillflow_flow::{Capability, CapabilityError};
use skillflow_protocol::models::{PromptConfig, PromptSource, SkillManifest, ValueMap};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// Default API base URL
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
/// Default model
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// Default env var holding the API key
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
/// System prompt used when none is configured or it cannot be loaded
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

const DEFAULT_TEMPERATURE: f32 = 0.2;
const DEFAULT_MAX_TOKENS: u32 = 1024;
const MAX_SNIPPETS: usize = 10;
const MAX_RAW_CHARS: usize = 500;

/// Get the default timeout from environment variable or use the default value
fn get_default_timeout() -> u64 {
    std::env::var("SKILLFLOW_LLM_TIMEOUT_SECONDS")
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(60)
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
    #[serde(rename = "type", default)]
    error_type: String,
}

/// Factory for `llm_call` skills
pub fn factory(manifest: &SkillManifest) -> Result<Box<dyn Capability>, CapabilityError> {
    Ok(Box::new(LlmCallCapability::from_manifest(manifest)?))
}

/// Capability calling an OpenAI-compatible chat completion endpoint
#[derive(Debug)]
pub struct LlmCallCapability {
    endpoint: String,
    model: String,
    api_key_env: String,
    temperature: f32,
    max_tokens: u32,
    system_prompt: String,
    first_output: String,
    http: reqwest::Client,
    json_block: Regex,
}

impl LlmCallCapability {
    /// Build the capability from a manifest.
    ///
    /// The endpoint is only validated when a real call is made, so mock mode
    /// works with an unconfigured endpoint.
    pub fn from_manifest(manifest: &SkillManifest) -> Result<Self, SkillError> {
        let config = &manifest.config;
        let timeout = config.timeout_seconds.unwrap_or_else(get_default_timeout);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()?;

        let model = config
            .extra
            .get("model")
            .and_then(Value::as_str)
            .map(resolve_env_var)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        Ok(Self {
            endpoint: resolve_env_var(config.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT)),
            model,
            api_key_env: config
                .api_key_env
                .clone()
                .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string()),
            temperature: config.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system_prompt: load_system_prompt(config.prompt.as_ref()),
            first_output: manifest.first_output_field().to_string(),
            http,
            json_block: Regex::new(r"\{[^{}]*\}")?,
        })
    }

    /// The system prompt in effect
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn completions_url(&self) -> Result<Url, SkillError> {
        let mut base = self.endpoint.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        Url::parse(&base)
            .and_then(|url| url.join("chat/completions"))
            .map_err(|source| SkillError::InvalidEndpoint {
                url: self.endpoint.clone(),
                source,
            })
    }

    fn build_headers(&self) -> Result<HeaderMap, SkillError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = non_empty_var(&self.api_key_env).map(|k| SecretString::new(k.into())) {
            let value = HeaderValue::from_str(&format!("Bearer {}", key.expose_secret()))
                .map_err(|e| SkillError::Api(format!("Invalid API key characters: {}", e)))?;
            headers.insert(header::AUTHORIZATION, value);
        } else {
            debug!("{} is not set; calling without authorization", self.api_key_env);
        }
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Ok(headers)
    }

    #[instrument(skip(self, user_content), fields(model = %self.model))]
    async fn chat(&self, user_content: &str) -> Result<String, SkillError> {
        let url = self.completions_url()?;
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: &self.system_prompt,
                },
                Message {
                    role: "user",
                    content: user_content,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        info!("Calling chat endpoint {}", url.host_str().unwrap_or("unknown"));
        let response = self
            .http
            .post(url)
            .headers(self.build_headers()?)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let chat: ChatResponse = response.json().await?;
            return chat
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| SkillError::Api("No response content".to_string()));
        }

        let error_text = response.text().await?;
        error!("API error ({}): {}", status, error_text);
        match serde_json::from_str::<ApiError>(&error_text) {
            Ok(api_error) => Err(SkillError::Api(format!(
                "{} ({})",
                sanitize_error_message(&api_error.error.message),
                api_error.error.error_type
            ))),
            Err(_) => Err(SkillError::Api(format!(
                "HTTP error {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown error")
            ))),
        }
    }

    fn parse_output(&self, text: &str) -> ValueMap {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
            return map;
        }
        if let Some(block) = self.json_block.find(text) {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(block.as_str()) {
                return map;
            }
        }

        warn!("Could not parse JSON from model reply; wrapping raw text");
        let raw: String = text.trim().chars().take(MAX_RAW_CHARS).collect();
        let mut output = ValueMap::new();
        output.insert(self.first_output.clone(), Value::String(raw));
        output
    }
}

#[async_trait]
impl Capability for LlmCallCapability {
    async fn execute(&self, inputs: &ValueMap) -> Result<ValueMap, CapabilityError> {
        let user_content = build_user_message(inputs);
        let reply = self.chat(&user_content).await?;
        Ok(self.parse_output(&reply))
    }

    async fn mock_execute(
        &self,
        _manifest: &SkillManifest,
        inputs: &ValueMap,
    ) -> Result<ValueMap, CapabilityError> {
        Ok(mock_output(inputs))
    }
}

fn load_system_prompt(prompt: Option<&PromptConfig>) -> String {
    let Some(prompt) = prompt else {
        return DEFAULT_SYSTEM_PROMPT.to_string();
    };
    match prompt.source {
        PromptSource::Inline => prompt
            .inline_text
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        PromptSource::File => {
            let path = prompt.file_path.as_deref().unwrap_or_default();
            match std::fs::read_to_string(path) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to load prompt from file {}: {}", path, e);
                    DEFAULT_SYSTEM_PROMPT.to_string()
                }
            }
        }
        PromptSource::Registry => {
            warn!(
                "Prompt registry source {:?} is not supported for llm_call; using default prompt",
                prompt.registry_uri
            );
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
    }
}

/// One line per input; `snippets` rendered as a numbered list
fn build_user_message(inputs: &ValueMap) -> String {
    let mut parts = Vec::with_capacity(inputs.len());
    for (key, value) in inputs {
        match value {
            Value::Null => {}
            Value::Array(items) if key == "snippets" => {
                let numbered: Vec<String> = items
                    .iter()
                    .take(MAX_SNIPPETS)
                    .enumerate()
                    .map(|(i, s)| format!("[{}] {}", i + 1, display(s)))
                    .collect();
                parts.push(format!("Web search results:\n{}", numbered.join("\n\n")));
            }
            other => parts.push(format!("{}: {}", key, display(other))),
        }
    }
    parts.join("\n")
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn mock_output(inputs: &ValueMap) -> ValueMap {
    let has_snippets = inputs
        .get("snippets")
        .and_then(Value::as_array)
        .is_some_and(|s| !s.is_empty());

    let output = if has_snippets {
        json!({
            "summary": "Based on web search results, there are several well-reviewed hotels in the area that match your criteria.",
            "suggestions": [
                {"name": "Suggested Hotel A", "reason": "Highly rated, great location", "source": "Web search"},
                {"name": "Suggested Hotel B", "reason": "Good value, walkable", "source": "Web search"}
            ]
        })
    } else {
        let query = inputs
            .get("user_query")
            .or_else(|| inputs.get("query"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase();
        let location = if query.contains("tahoe") {
            "Lake Tahoe, CA"
        } else if query.contains("austin") {
            "Austin, TX"
        } else {
            "Miami, FL"
        };
        json!({
            "rewritten_query": format!("Find highly-rated hotels in {} under $300/night with good amenities", location),
            "assumptions": [format!("Looking for hotels in {}", location), "User prefers walkable locations"],
            "missing_info_questions": ["Do you have specific dates in mind?"]
        })
    };

    match output {
        Value::Object(map) => map,
        _ => ValueMap::new(),
    }
}

/// Sanitize error messages to prevent information disclosure
pub(crate) fn sanitize_error_message(message: &str) -> String {
    let patterns = [
        (r"sk-[a-zA-Z0-9]{20,}", "sk-***"),
        (r"(?i)bearer\s+[a-zA-Z0-9._-]+", "Bearer ***"),
        (r"[a-zA-Z0-9_-]{32,}", "***REDACTED***"),
    ];

    let mut sanitized = message.to_string();
    for (pattern, replacement) in patterns {
        if let Ok(re) = Regex::new(pattern) {
            sanitized = re.replace_all(&sanitized, replacement).to_string();
        }
    }

    if sanitized.chars().count() > 256 {
        let truncated: String = sanitized.chars().take(256).collect();
        format!("{}... [truncated]", truncated)
    } else {
        sanitized
    }
}
