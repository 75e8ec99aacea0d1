//! `genie_query` skills: natural-language questions over a Databricks Genie
//! space.
//!
//! Configuration read from the manifest:
//!
//! - `config.space_id` - Genie space id
//! - `config.endpoint` - workspace URL (default `${DATABRICKS_HOST}`)
//! - `config.api_key_env` - env var holding the access token (default `DATABRICKS_TOKEN`)
//! - `config.timeout_seconds` - how long to wait for an answer (default 60)
//! - `config.max_retries` - extra attempts after a transport or API error (default 1)
//! - `config.extra.poll_interval_ms` - message status poll interval (default 2000)
//! - `config.extra.retry_delay_ms` - pause between attempts (default 1000)
//!
//! The output is `{answer_text, items, genie_status}` where the status is
//! `ok`, `no_answer` or `error`. Once the space is reachable, failures are
//! reported through `genie_status` and the step still succeeds. A missing
//! space, host or token fails the step so the manifest's fallback applies.

use crate::env::{is_set, non_empty_var, resolve_env_var};
use crate::error::SkillError;
use crate::llm::sanitize_error_message;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use skillflow_flow::{Capability, CapabilityError};
use skillflow_protocol::models::{SkillManifest, ValueMap};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// Default workspace URL
pub const DEFAULT_HOST: &str = "${DATABRICKS_HOST}";
/// Default env var holding the workspace access token
pub const DEFAULT_TOKEN_ENV: &str = "DATABRICKS_TOKEN";
/// Answer reported when Genie returns neither text nor rows
pub const NO_ANSWER_TEXT: &str = "I couldn't find relevant information for your query.";

const DEFAULT_TIMEOUT_SECONDS: u64 = 60;
const DEFAULT_MAX_RETRIES: u32 = 1;
const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

#[derive(Debug, Serialize)]
struct StartConversation<'a> {
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ConversationStarted {
    conversation_id: String,
    message_id: String,
}

#[derive(Debug, Deserialize)]
struct GenieMessage {
    #[serde(default)]
    status: String,
    #[serde(default)]
    attachments: Vec<Attachment>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Attachment {
    #[serde(default)]
    attachment_id: Option<String>,
    #[serde(default)]
    text: Option<TextAttachment>,
    #[serde(default)]
    query: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TextAttachment {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct QueryResult {
    #[serde(default)]
    statement_response: Option<StatementResponse>,
}

#[derive(Debug, Default, Deserialize)]
struct StatementResponse {
    #[serde(default)]
    manifest: Option<ResultManifest>,
    #[serde(default)]
    result: Option<ResultData>,
}

#[derive(Debug, Default, Deserialize)]
struct ResultManifest {
    #[serde(default)]
    schema: Option<ResultSchema>,
}

#[derive(Debug, Default, Deserialize)]
struct ResultSchema {
    #[serde(default)]
    columns: Vec<Column>,
}

#[derive(Debug, Deserialize)]
struct Column {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ResultData {
    #[serde(default)]
    data_array: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    error_code: String,
    message: String,
}

/// Factory for `genie_query` skills
pub fn factory(manifest: &SkillManifest) -> Result<Box<dyn Capability>, CapabilityError> {
    Ok(Box::new(GenieQueryCapability::from_manifest(manifest)?))
}

/// Capability asking questions of a Genie space
#[derive(Debug)]
pub struct GenieQueryCapability {
    space_id: Option<String>,
    host: String,
    token_env: String,
    timeout: Duration,
    max_retries: u32,
    poll_interval: Duration,
    retry_delay: Duration,
    http: reqwest::Client,
}

impl GenieQueryCapability {
    /// Build the capability from a manifest.
    ///
    /// Space, host and token are checked when a real call is made, so mock
    /// mode works without any of them.
    pub fn from_manifest(manifest: &SkillManifest) -> Result<Self, SkillError> {
        let config = &manifest.config;
        let timeout = Duration::from_secs(config.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS));
        let millis = |key: &str, default: u64| {
            Duration::from_millis(config.extra.get(key).and_then(Value::as_u64).unwrap_or(default))
        };

        Ok(Self {
            space_id: config.space_id.as_deref().map(resolve_env_var),
            host: resolve_env_var(config.endpoint.as_deref().unwrap_or(DEFAULT_HOST)),
            token_env: config
                .api_key_env
                .clone()
                .unwrap_or_else(|| DEFAULT_TOKEN_ENV.to_string()),
            timeout,
            max_retries: config.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            poll_interval: millis("poll_interval_ms", DEFAULT_POLL_INTERVAL_MS),
            retry_delay: millis("retry_delay_ms", DEFAULT_RETRY_DELAY_MS),
            http: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    fn space_id(&self) -> Result<&str, SkillError> {
        match self.space_id.as_deref() {
            Some(id) if is_set(id) => Ok(id),
            _ => Err(SkillError::NotConfigured("Genie space (config.space_id)".to_string())),
        }
    }

    fn base_url(&self) -> Result<Url, SkillError> {
        if !is_set(&self.host) {
            return Err(SkillError::NotConfigured(
                "Databricks host (config.endpoint)".to_string(),
            ));
        }
        let mut base = if self.host.contains("://") {
            self.host.clone()
        } else {
            format!("https://{}", self.host)
        };
        if !base.ends_with('/') {
            base.push('/');
        }
        Url::parse(&base).map_err(|source| SkillError::InvalidEndpoint {
            url: self.host.clone(),
            source,
        })
    }

    fn token(&self) -> Result<SecretString, SkillError> {
        non_empty_var(&self.token_env)
            .map(|t| SecretString::new(t.into()))
            .ok_or_else(|| SkillError::NotConfigured(format!("Databricks token ({})", self.token_env)))
    }

    fn join(&self, base: &Url, path: &str) -> Result<Url, SkillError> {
        base.join(path).map_err(|source| SkillError::InvalidEndpoint {
            url: self.host.clone(),
            source,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        token: &SecretString,
    ) -> Result<T, SkillError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(token.expose_secret())
            .send()
            .await?;
        read_json(response).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
        token: &SecretString,
    ) -> Result<T, SkillError> {
        let response = self
            .http
            .post(url)
            .bearer_auth(token.expose_secret())
            .json(body)
            .send()
            .await?;
        read_json(response).await
    }

    /// One attempt: start a conversation, wait for the answer, fetch rows
    #[instrument(skip(self, question, token))]
    async fn ask(
        &self,
        base: &Url,
        space_id: &str,
        question: &str,
        token: &SecretString,
    ) -> Result<ValueMap, SkillError> {
        let space_path = format!("api/2.0/genie/spaces/{}", space_id);
        let started: ConversationStarted = self
            .post_json(
                self.join(base, &format!("{}/start-conversation", space_path))?,
                &StartConversation { content: question },
                token,
            )
            .await?;
        info!(
            conversation_id = %started.conversation_id,
            "Started Genie conversation"
        );

        let message_path = format!(
            "{}/conversations/{}/messages/{}",
            space_path, started.conversation_id, started.message_id
        );
        let message_url = self.join(base, &message_path)?;
        let deadline = Instant::now() + self.timeout;

        loop {
            let message: GenieMessage = self.get_json(message_url.clone(), token).await?;
            match message.status.as_str() {
                "COMPLETED" => {
                    return self.collect_answer(base, &message_path, message, token).await;
                }
                "FAILED" | "CANCELLED" | "ERROR" | "QUERY_RESULT_EXPIRED" => {
                    let reason = message
                        .error
                        .as_ref()
                        .map(describe_error)
                        .unwrap_or_else(|| format!("Genie message {}", message.status));
                    warn!("Genie query failed: {}", reason);
                    return Ok(error_output(&reason));
                }
                status => debug!(status = %status, "Waiting for Genie answer"),
            }

            if Instant::now() >= deadline {
                warn!("Genie answer not ready after {}s", self.timeout.as_secs());
                return Ok(error_output(&format!(
                    "Timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn collect_answer(
        &self,
        base: &Url,
        message_path: &str,
        message: GenieMessage,
        token: &SecretString,
    ) -> Result<ValueMap, SkillError> {
        let mut answer_text = None;
        let mut items = Vec::new();

        for attachment in message.attachments {
            if let Some(content) = attachment.text.and_then(|t| t.content) {
                answer_text = Some(content);
            }
            let (Some(_), Some(id)) = (attachment.query, attachment.attachment_id) else {
                continue;
            };
            let url = self.join(
                base,
                &format!("{}/attachments/{}/query-result", message_path, id),
            )?;
            let result: QueryResult = self.get_json(url, token).await?;
            items.extend(rows_to_items(result));
        }

        if answer_text.is_none() && items.is_empty() {
            return Ok(output(json!(NO_ANSWER_TEXT), Vec::new(), "no_answer"));
        }
        Ok(output(json!(answer_text), items, "ok"))
    }
}

#[async_trait]
impl Capability for GenieQueryCapability {
    async fn execute(&self, inputs: &ValueMap) -> Result<ValueMap, CapabilityError> {
        let question = inputs
            .get("query_text")
            .and_then(Value::as_str)
            .ok_or_else(|| SkillError::invalid_input("query_text", "expected a string"))?;
        let space_id = self.space_id()?;
        let base = self.base_url()?;
        let token = self.token()?;

        let mut attempt = 0;
        loop {
            match self.ask(&base, space_id, question, &token).await {
                Ok(output) => return Ok(output),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(attempt, error = %e, "Genie query failed; retrying");
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    error!(
                        "Genie query failed after {} attempt(s): {}",
                        attempt + 1,
                        e
                    );
                    return Ok(error_output(&e.to_string()));
                }
            }
        }
    }

    async fn mock_execute(
        &self,
        _manifest: &SkillManifest,
        _inputs: &ValueMap,
    ) -> Result<ValueMap, CapabilityError> {
        Ok(mock_output())
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, SkillError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let body = response.text().await?;
    error!("Genie API error ({}): {}", status, sanitize_error_message(&body));
    match serde_json::from_str::<ApiError>(&body) {
        Ok(api_error) => Err(SkillError::Api(format!(
            "{} ({})",
            sanitize_error_message(&api_error.message),
            api_error.error_code
        ))),
        Err(_) => Err(SkillError::Api(format!(
            "HTTP error {}: {}",
            status,
            status.canonical_reason().unwrap_or("Unknown error")
        ))),
    }
}

/// Rows keyed by column name; `{data: row}` when the result has no schema
fn rows_to_items(result: QueryResult) -> Vec<Value> {
    let statement = result.statement_response.unwrap_or_default();
    let columns: Vec<String> = statement
        .manifest
        .and_then(|m| m.schema)
        .map(|s| s.columns.into_iter().map(|c| c.name).collect())
        .unwrap_or_default();
    let rows = statement.result.map(|r| r.data_array).unwrap_or_default();

    rows.into_iter()
        .map(|row| {
            if columns.is_empty() {
                return json!({ "data": row });
            }
            let item: ValueMap = columns.iter().cloned().zip(row).collect();
            Value::Object(item)
        })
        .collect()
}

fn describe_error(error: &Value) -> String {
    let message = error
        .get("error")
        .or_else(|| error.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());
    sanitize_error_message(&message)
}

fn output(answer_text: Value, items: Vec<Value>, status: &str) -> ValueMap {
    let mut output = ValueMap::new();
    output.insert("answer_text".to_string(), answer_text);
    output.insert("items".to_string(), Value::Array(items));
    output.insert("genie_status".to_string(), json!(status));
    output
}

fn error_output(reason: &str) -> ValueMap {
    let mut output = output(Value::Null, Vec::new(), "error");
    output.insert("error".to_string(), json!(reason));
    output
}

fn mock_output() -> ValueMap {
    let items = vec![
        json!({
            "id": "stay_mock_1",
            "name": "Grand Miami Resort & Spa",
            "location": "Miami Beach, FL",
            "price_per_night": 289,
            "rating": 4.8,
            "highlights": ["Ocean view", "Near concert venues", "Pool access"]
        }),
        json!({
            "id": "stay_mock_2",
            "name": "Downtown Miami Luxury Hotel",
            "location": "Downtown Miami, FL",
            "price_per_night": 245,
            "rating": 4.6,
            "highlights": ["Walking distance to events", "Rooftop bar", "Free breakfast"]
        }),
        json!({
            "id": "stay_mock_3",
            "name": "Beachside Boutique Inn",
            "location": "South Beach, FL",
            "price_per_night": 199,
            "rating": 4.5,
            "highlights": ["Beach access", "Cozy atmosphere", "Great reviews"]
        }),
    ];
    output(
        json!("Based on your preferences, I found several highly-rated hotels that match your criteria."),
        items,
        "ok",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use pretty_assertions::assert_eq;
    use skillflow_protocol::models::{skill_types, SkillConfig};

    fn inputs(value: Value) -> ValueMap {
        match value {
            Value::Object(m) => m,
            _ => ValueMap::new(),
        }
    }

    fn manifest(host: &str, token_env: &str, timeout_seconds: u64) -> SkillManifest {
        let mut extra = ValueMap::new();
        extra.insert("poll_interval_ms".to_string(), json!(20));
        extra.insert("retry_delay_ms".to_string(), json!(10));
        SkillManifest::new("hotel_genie", skill_types::GENIE_QUERY).with_config(SkillConfig {
            space_id: Some("space1".to_string()),
            endpoint: Some(host.to_string()),
            api_key_env: Some(token_env.to_string()),
            timeout_seconds: Some(timeout_seconds),
            max_retries: Some(1),
            extra,
            ..Default::default()
        })
    }

    async fn start_mock(server: &mut mockito::Server) -> mockito::Mock {
        server
            .mock("POST", "/api/2.0/genie/spaces/space1/start-conversation")
            .match_header("authorization", "Bearer genie-token")
            .match_body(Matcher::PartialJson(json!({"content": "hotels under 200"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"conversation_id": "c1", "message_id": "m1"}).to_string())
            .create_async()
            .await
    }

    const MESSAGE_PATH: &str = "/api/2.0/genie/spaces/space1/conversations/c1/messages/m1";

    #[test]
    fn test_rows_to_items() {
        let result: QueryResult = serde_json::from_value(json!({
            "statement_response": {
                "manifest": {"schema": {"columns": [{"name": "name"}, {"name": "price"}]}},
                "result": {"data_array": [["Sea View", "199"], ["Palms", "150"]]}
            }
        }))
        .expect("parses");
        assert_eq!(
            rows_to_items(result),
            vec![
                json!({"name": "Sea View", "price": "199"}),
                json!({"name": "Palms", "price": "150"})
            ]
        );

        let schemaless: QueryResult = serde_json::from_value(json!({
            "statement_response": {"result": {"data_array": [["x", 1]]}}
        }))
        .expect("parses");
        assert_eq!(rows_to_items(schemaless), vec![json!({"data": ["x", 1]})]);
        assert!(rows_to_items(QueryResult::default()).is_empty());
    }

    #[tokio::test]
    async fn test_mock_output() {
        let manifest = manifest("http://localhost", "SKILLFLOW_TEST_GENIE_UNSET", 5);
        let capability = GenieQueryCapability::from_manifest(&manifest).expect("builds");
        let output = capability
            .mock_execute(&manifest, &ValueMap::new())
            .await
            .expect("mock output");
        assert_eq!(output.get("genie_status"), Some(&json!("ok")));
        assert_eq!(
            output.get("items").and_then(Value::as_array).map(Vec::len),
            Some(3)
        );
    }

    #[tokio::test]
    async fn test_missing_configuration_fails() {
        let capability = GenieQueryCapability::from_manifest(&manifest(
            "${SKILLFLOW_TEST_GENIE_HOST_UNSET}",
            "SKILLFLOW_TEST_GENIE_UNSET",
            5,
        ))
        .expect("builds");
        let result = capability
            .execute(&inputs(json!({"query_text": "hotels"})))
            .await;
        assert!(matches!(result, Err(CapabilityError::Failed(m)) if m.contains("not configured")));

        assert!(capability.execute(&ValueMap::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_completed_message_with_query_result() {
        std::env::set_var("SKILLFLOW_TEST_GENIE_TOKEN_OK", "genie-token");
        let mut server = mockito::Server::new_async().await;
        let start = start_mock(&mut server).await;
        let message = server
            .mock("GET", MESSAGE_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "status": "COMPLETED",
                    "attachments": [
                        {"attachment_id": "a1", "text": {"content": "Two hotels match."}},
                        {"attachment_id": "a2", "query": {"query": "SELECT name, price FROM hotels"}}
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;
        let rows = server
            .mock("GET", format!("{}/attachments/a2/query-result", MESSAGE_PATH).as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "statement_response": {
                        "manifest": {"schema": {"columns": [{"name": "name"}, {"name": "price"}]}},
                        "result": {"data_array": [["Sea View", "199"]]}
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let capability = GenieQueryCapability::from_manifest(&manifest(
            &server.url(),
            "SKILLFLOW_TEST_GENIE_TOKEN_OK",
            5,
        ))
        .expect("builds");
        let output = capability
            .execute(&inputs(json!({"query_text": "hotels under 200"})))
            .await
            .expect("succeeds");

        start.assert_async().await;
        message.assert_async().await;
        rows.assert_async().await;
        assert_eq!(
            output,
            inputs(json!({
                "answer_text": "Two hotels match.",
                "items": [{"name": "Sea View", "price": "199"}],
                "genie_status": "ok"
            }))
        );
    }

    #[tokio::test]
    async fn test_polls_until_completed() {
        std::env::set_var("SKILLFLOW_TEST_GENIE_TOKEN_POLL", "genie-token");
        let mut server = mockito::Server::new_async().await;
        let _start = start_mock(&mut server).await;
        let running = server
            .mock("GET", MESSAGE_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"status": "EXECUTING_QUERY"}).to_string())
            .expect(2)
            .create_async()
            .await;
        let completed = server
            .mock("GET", MESSAGE_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"status": "COMPLETED", "attachments": []}).to_string())
            .create_async()
            .await;

        let capability = GenieQueryCapability::from_manifest(&manifest(
            &server.url(),
            "SKILLFLOW_TEST_GENIE_TOKEN_POLL",
            5,
        ))
        .expect("builds");
        let output = capability
            .execute(&inputs(json!({"query_text": "hotels under 200"})))
            .await
            .expect("succeeds");

        running.assert_async().await;
        completed.assert_async().await;
        assert_eq!(output.get("genie_status"), Some(&json!("no_answer")));
        assert_eq!(output.get("answer_text"), Some(&json!(NO_ANSWER_TEXT)));
    }

    #[tokio::test]
    async fn test_failed_message_is_reported_not_retried() {
        std::env::set_var("SKILLFLOW_TEST_GENIE_TOKEN_FAILED", "genie-token");
        let mut server = mockito::Server::new_async().await;
        let start = start_mock(&mut server).await;
        let _message = server
            .mock("GET", MESSAGE_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"status": "FAILED", "error": {"error": "Table not found"}}).to_string(),
            )
            .create_async()
            .await;

        let capability = GenieQueryCapability::from_manifest(&manifest(
            &server.url(),
            "SKILLFLOW_TEST_GENIE_TOKEN_FAILED",
            5,
        ))
        .expect("builds");
        let output = capability
            .execute(&inputs(json!({"query_text": "hotels under 200"})))
            .await
            .expect("succeeds");

        start.assert_async().await;
        assert_eq!(
            output,
            inputs(json!({
                "answer_text": null,
                "items": [],
                "genie_status": "error",
                "error": "Table not found"
            }))
        );
    }

    #[tokio::test]
    async fn test_api_errors_are_retried_then_reported() {
        std::env::set_var("SKILLFLOW_TEST_GENIE_TOKEN_RETRY", "genie-token");
        let mut server = mockito::Server::new_async().await;
        let start = server
            .mock("POST", "/api/2.0/genie/spaces/space1/start-conversation")
            .with_status(403)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"error_code": "PERMISSION_DENIED", "message": "No access to space"})
                    .to_string(),
            )
            .expect(2)
            .create_async()
            .await;

        let capability = GenieQueryCapability::from_manifest(&manifest(
            &server.url(),
            "SKILLFLOW_TEST_GENIE_TOKEN_RETRY",
            5,
        ))
        .expect("builds");
        let output = capability
            .execute(&inputs(json!({"query_text": "hotels under 200"})))
            .await
            .expect("succeeds");

        start.assert_async().await;
        assert_eq!(output.get("genie_status"), Some(&json!("error")));
        assert_eq!(
            output.get("error"),
            Some(&json!("API error: No access to space (PERMISSION_DENIED)"))
        );
    }

    #[tokio::test]
    async fn test_unanswered_message_times_out() {
        std::env::set_var("SKILLFLOW_TEST_GENIE_TOKEN_SLOW", "genie-token");
        let mut server = mockito::Server::new_async().await;
        let _start = start_mock(&mut server).await;
        let _message = server
            .mock("GET", MESSAGE_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"status": "EXECUTING_QUERY"}).to_string())
            .create_async()
            .await;

        let capability = GenieQueryCapability::from_manifest(&manifest(
            &server.url(),
            "SKILLFLOW_TEST_GENIE_TOKEN_SLOW",
            1,
        ))
        .expect("builds");
        let output = capability
            .execute(&inputs(json!({"query_text": "hotels under 200"})))
            .await
            .expect("succeeds");

        assert_eq!(output.get("genie_status"), Some(&json!("error")));
        assert_eq!(output.get("error"), Some(&json!("Timed out after 1s")));
    }
}
