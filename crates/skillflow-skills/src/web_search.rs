//! `web_search` skills: SerpAPI, Bing and Google Custom Search.
//!
//! Every provider's answer is normalized to
//! `{snippets: [..], links: [{title, url, snippet}], search_status}` where the
//! status is `ok`, `no_results`, `no_config` or `error`. A missing API key is
//! not a failure: the step succeeds with `search_status: "no_config"`.

use crate::env::{non_empty_var, resolve_env_var};
use crate::error::SkillError;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use skillflow_flow::{Capability, CapabilityError};
use skillflow_protocol::models::{SkillManifest, ValueMap};
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Default env var holding the provider API key
pub const DEFAULT_API_KEY_ENV: &str = "WEB_SEARCH_API_KEY";
/// Env var holding the Google Custom Search engine id
pub const GOOGLE_CSE_ID_ENV: &str = "GOOGLE_CSE_ID";

const DEFAULT_NUM_RESULTS: u64 = 10;
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Supported search providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// serpapi.com (Google engine)
    SerpApi,
    /// Bing Web Search v7
    Bing,
    /// Google Custom Search JSON API
    GoogleCse,
}

impl Provider {
    /// Parse a provider name as written in a manifest
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "serpapi" => Some(Provider::SerpApi),
            "bing" => Some(Provider::Bing),
            "google_cse" => Some(Provider::GoogleCse),
            _ => None,
        }
    }

    fn default_endpoint(&self) -> &'static str {
        match self {
            Provider::SerpApi => "https://serpapi.com/search",
            Provider::Bing => "https://api.bing.microsoft.com/v7.0/search",
            Provider::GoogleCse => "https://www.googleapis.com/customsearch/v1",
        }
    }
}

/// Factory for `web_search` skills
pub fn factory(manifest: &SkillManifest) -> Result<Box<dyn Capability>, CapabilityError> {
    Ok(Box::new(WebSearchCapability::from_manifest(manifest)?))
}

/// Capability querying a web search provider
#[derive(Debug)]
pub struct WebSearchCapability {
    provider_name: String,
    endpoint: Option<String>,
    api_key_env: String,
    cse_id: Option<String>,
    query_suffix: Option<String>,
    http: reqwest::Client,
}

impl WebSearchCapability {
    /// Build the capability from a manifest.
    ///
    /// `config.endpoint` overrides the provider's URL; `config.extra` may set
    /// `cse_id` (Google) and `query_suffix` (appended to every query).
    pub fn from_manifest(manifest: &SkillManifest) -> Result<Self, SkillError> {
        let config = &manifest.config;
        let timeout = config.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS);
        let extra_str = |key: &str| {
            config
                .extra
                .get(key)
                .and_then(Value::as_str)
                .map(resolve_env_var)
        };

        Ok(Self {
            provider_name: resolve_env_var(config.provider.as_deref().unwrap_or("serpapi")),
            endpoint: config.endpoint.as_deref().map(resolve_env_var),
            api_key_env: config
                .api_key_env
                .clone()
                .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string()),
            cse_id: extra_str("cse_id"),
            query_suffix: extra_str("query_suffix"),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout))
                .build()?,
        })
    }

    #[instrument(skip(self, api_key))]
    async fn search(
        &self,
        provider: Provider,
        query: &str,
        api_key: &SecretString,
        num_results: u64,
    ) -> Result<ValueMap, SkillError> {
        let url = self
            .endpoint
            .as_deref()
            .unwrap_or(provider.default_endpoint());
        let num = num_results.to_string();

        let request = match provider {
            Provider::SerpApi => self.http.get(url).query(&[
                ("q", query),
                ("api_key", api_key.expose_secret()),
                ("num", num.as_str()),
                ("engine", "google"),
            ]),
            Provider::Bing => self
                .http
                .get(url)
                .header("Ocp-Apim-Subscription-Key", api_key.expose_secret())
                .query(&[("q", query), ("count", num.as_str()), ("mkt", "en-US")]),
            Provider::GoogleCse => {
                let Some(cse_id) = self
                    .cse_id
                    .clone()
                    .or_else(|| non_empty_var(GOOGLE_CSE_ID_ENV))
                else {
                    let mut output = status_only("no_config");
                    output.insert(
                        "error".to_string(),
                        json!("Google CSE ID not configured"),
                    );
                    return Ok(output);
                };
                let capped = num_results.min(10).to_string();
                self.http.get(url).query(&[
                    ("key", api_key.expose_secret()),
                    ("cx", cse_id.as_str()),
                    ("q", query),
                    ("num", capped.as_str()),
                ])
            }
        };

        let data: Value = request.send().await?.error_for_status()?.json().await?;

        let (items, title_key, url_key) = match provider {
            Provider::SerpApi => (data.get("organic_results"), "title", "link"),
            Provider::Bing => (data.pointer("/webPages/value"), "name", "url"),
            Provider::GoogleCse => (data.get("items"), "title", "link"),
        };
        let items = items.and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[]);
        Ok(normalize(items, title_key, url_key, num_results as usize))
    }
}

#[async_trait]
impl Capability for WebSearchCapability {
    async fn execute(&self, inputs: &ValueMap) -> Result<ValueMap, CapabilityError> {
        let query = inputs
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| SkillError::invalid_input("query", "expected a string"))?;
        let num_results = inputs
            .get("num_results")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_NUM_RESULTS);

        let Some(api_key) = non_empty_var(&self.api_key_env).map(|k| SecretString::new(k.into()))
        else {
            warn!("No API key configured in {}", self.api_key_env);
            return Ok(status_only("no_config"));
        };

        let Some(provider) = Provider::parse(&self.provider_name) else {
            let mut output = status_only("error");
            output.insert(
                "error".to_string(),
                json!(format!("Unknown provider: {}", self.provider_name)),
            );
            return Ok(output);
        };

        let query = match &self.query_suffix {
            Some(suffix) => format!("{} {}", query, suffix),
            None => query.to_string(),
        };
        info!(
            "Searching with {}: {}",
            self.provider_name,
            query.chars().take(80).collect::<String>()
        );

        Ok(self.search(provider, &query, &api_key, num_results).await?)
    }

    async fn mock_execute(
        &self,
        _manifest: &SkillManifest,
        _inputs: &ValueMap,
    ) -> Result<ValueMap, CapabilityError> {
        Ok(mock_output())
    }
}

fn status_only(status: &str) -> ValueMap {
    let mut output = ValueMap::new();
    output.insert("snippets".to_string(), json!([]));
    output.insert("links".to_string(), json!([]));
    output.insert("search_status".to_string(), json!(status));
    output
}

/// Keep results that carry a snippet, up to `limit`
fn normalize(items: &[Value], title_key: &str, url_key: &str, limit: usize) -> ValueMap {
    let field = |item: &Value, key: &str| {
        item.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let mut snippets = Vec::new();
    let mut links = Vec::new();
    for item in items.iter().take(limit) {
        let snippet = field(item, "snippet");
        if snippet.is_empty() {
            continue;
        }
        links.push(json!({
            "title": field(item, title_key),
            "url": field(item, url_key),
            "snippet": snippet,
        }));
        snippets.push(Value::String(snippet));
    }

    let status = if snippets.is_empty() { "no_results" } else { "ok" };
    let mut output = ValueMap::new();
    output.insert("snippets".to_string(), Value::Array(snippets));
    output.insert("links".to_string(), Value::Array(links));
    output.insert("search_status".to_string(), json!(status));
    output
}

fn mock_output() -> ValueMap {
    let output = json!({
        "snippets": [
            "The best hotels near Miami concert venues include the Grand Hyatt.",
            "For concerts, fans recommend staying downtown for easy transit access.",
            "Budget-friendly options under $300/night include several boutique hotels.",
            "Many hotels offer shuttle service to major concert venues.",
            "Top-rated accommodations in Miami Beach feature ocean views."
        ],
        "links": [
            {
                "title": "Best Hotels Near Miami Concerts",
                "url": "https://example.com/miami-hotels",
                "snippet": "The best hotels near Miami concert venues include the Grand Hyatt."
            },
            {
                "title": "Where to Stay for Miami Events",
                "url": "https://example.com/events-stay",
                "snippet": "For concerts, fans recommend staying downtown."
            }
        ],
        "search_status": "ok"
    });
    match output {
        Value::Object(map) => map,
        _ => ValueMap::new(),
    }
}
