use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use skillflow_flow::{EngineConfig, FlowEngine};
use skillflow_protocol::models::{ErrorKind, SkillStatus, ValueMap};
use skillflow_registry::{RegistryLoader, SkillRegistry};
use std::path::{Path, PathBuf};

fn demo_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/agent_skills")
}

fn map(value: Value) -> ValueMap {
    match value {
        Value::Object(m) => m,
        _ => ValueMap::new(),
    }
}

async fn load(dir: &Path) -> anyhow::Result<FlowEngine> {
    let registry = SkillRegistry::new();
    let report = RegistryLoader::new(dir).load_into(&registry).await?;
    assert!(report.skipped.is_empty(), "skipped: {:?}", report.skipped);
    Ok(FlowEngine::new(
        registry,
        skillflow_skills::builtin_factories(),
        EngineConfig::default(),
    )?)
}

fn write(root: &Path, rel: &str, content: &str) -> anyhow::Result<()> {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

#[tokio::test]
async fn test_demo_registry_loads() -> anyhow::Result<()> {
    let registry = SkillRegistry::new();
    let report = RegistryLoader::new(demo_dir()).load_into(&registry).await?;

    assert_eq!(report.skills_loaded, 8);
    assert_eq!(report.flows_loaded, 2);
    assert_eq!(
        registry.config().await.default_flow.as_deref(),
        Some("hotel_search")
    );
    Ok(())
}

#[tokio::test]
async fn test_hotel_search_in_mock_mode() -> anyhow::Result<()> {
    let engine = load(&demo_dir()).await?;

    let result = engine
        .execute_flow(
            "hotel_search",
            map(json!({"message": "Quiet hotel in Austin near downtown"})),
            Some(true),
        )
        .await;

    assert!(result.is_success());
    let statuses: Vec<(&str, SkillStatus)> = result
        .step_results
        .iter()
        .map(|r| (r.step_id.as_str(), r.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("rewrite", SkillStatus::Success),
            ("geo", SkillStatus::Success),
            ("hotels", SkillStatus::Success),
            ("stays", SkillStatus::Success),
            ("search", SkillStatus::Skipped),
            ("summarize", SkillStatus::Skipped),
        ]
    );
    assert_eq!(
        result.step("search").and_then(|r| r.metadata.get("reason")),
        Some(&json!("condition_not_met"))
    );

    let response = &result.response;
    assert_eq!(
        response.get("rewritten_query"),
        Some(&json!(
            "Find highly-rated hotels in Austin, TX under $300/night with good amenities"
        ))
    );
    assert_eq!(response.get("location"), Some(&json!("Austin")));
    assert_eq!(
        response.get("inventory_answer"),
        Some(&json!(
            "Based on your preferences, I found several highly-rated hotels that match your criteria."
        ))
    );
    assert_eq!(
        response.get("hotels").and_then(Value::as_array).map(Vec::len),
        Some(3)
    );
    assert_eq!(
        response
            .get("stays")
            .and_then(|s| s.get(0))
            .and_then(|s| s.get("name")),
        Some(&json!("Beautiful Home in Austin"))
    );
    assert_eq!(response.get("summary"), Some(&json!("No summary available.")));
    assert_eq!(response.get("sources"), Some(&json!([])));
    assert_eq!(
        result.display.as_ref().map(|d| d.display_type.as_str()),
        Some("hotel_results")
    );
    Ok(())
}

#[tokio::test]
async fn test_hotel_search_without_services_degrades() -> anyhow::Result<()> {
    let engine = load(&demo_dir()).await?;

    let result = engine
        .execute_flow(
            "hotel_search",
            map(json!({"message": "somewhere warm"})),
            Some(false),
        )
        .await;

    assert!(result.is_success());

    // No Genie space configured: the inventory step is skipped by its fallback.
    let hotels = result.step("hotels").expect("hotels recorded");
    assert_eq!(hotels.status, SkillStatus::Skipped);
    assert_eq!(hotels.error_kind, Some(ErrorKind::ExternalFailure));
    assert_eq!(
        result.step("stays").map(|r| r.status),
        Some(SkillStatus::Skipped)
    );

    // No endpoint configured: the rewriter passes the message through.
    let rewrite = result.step("rewrite").expect("rewrite recorded");
    assert_eq!(rewrite.status, SkillStatus::Failure);
    assert_eq!(
        rewrite.output,
        map(json!({"rewritten_query": "somewhere warm"}))
    );

    // No search key: the search succeeds with nothing, so the summary is skipped.
    let search = result.step("search").expect("search recorded");
    assert_eq!(search.output.get("search_status"), Some(&json!("no_config")));
    assert_eq!(
        result.step("summarize").map(|r| r.status),
        Some(SkillStatus::Skipped)
    );

    assert_eq!(result.response.get("rewritten_query"), Some(&json!("somewhere warm")));
    assert_eq!(result.response.get("location"), Some(&json!("unknown")));
    assert_eq!(
        result.response.get("summary"),
        Some(&json!("No summary available."))
    );
    assert_eq!(result.response.get("sources"), Some(&json!([])));
    assert_eq!(result.response.get("hotels"), Some(&json!([])));
    Ok(())
}

#[tokio::test]
async fn test_trip_quote_runs_functions_and_prompts() -> anyhow::Result<()> {
    let engine = load(&demo_dir()).await?;

    let with_prompt = engine
        .execute_flow(
            "trip_quote",
            map(json!({
                "price_per_night": 150,
                "nights": 3,
                "prompt_variables": {"role": "travel", "city": "Boston"}
            })),
            Some(false),
        )
        .await;
    assert_eq!(with_prompt.response.get("total"), Some(&json!(495.0)));
    assert_eq!(
        with_prompt.response.get("system_prompt"),
        Some(&json!("You are a helpful travel assistant for Boston."))
    );

    let without_prompt = engine
        .execute_flow(
            "trip_quote",
            map(json!({"price_per_night": 100, "nights": 2})),
            Some(false),
        )
        .await;
    assert_eq!(without_prompt.response.get("total"), Some(&json!(220.0)));
    assert_eq!(
        without_prompt.step("prompt").map(|r| r.status),
        Some(SkillStatus::Skipped)
    );
    assert_eq!(without_prompt.response.get("system_prompt"), Some(&Value::Null));
    Ok(())
}

#[tokio::test]
async fn test_live_llm_step_feeds_later_steps() -> anyhow::Result<()> {
    let mut server = mockito::Server::new_async().await;
    let completion = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "choices": [{"message": {"role": "assistant", "content": "Here you go: {\"rewritten_query\": \"hotels in San Diego near the beach\"}"}}]
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir()?;
    let root = dir.path();
    write(
        root,
        "skills/rewriter/manifest.yaml",
        &format!(
            "skill_id: rewriter\nname: Rewriter\ntype: llm_call\nconfig:\n  endpoint: {}/v1\n  api_key_env: SKILLFLOW_E2E_KEY_UNSET\ninput_schema:\n  - name: user_query\noutput_schema:\n  - name: rewritten_query\nfallback:\n  strategy: passthrough\n  passthrough_field: user_query\n",
            server.url()
        ),
    )?;
    write(
        root,
        "skills/geo/manifest.yaml",
        "skill_id: geo\nname: Geo\ntype: function\nconfig:\n  function_name: extract_location_hint\ninput_schema:\n  - name: query_text\noutput_schema:\n  - name: location\n",
    )?;
    write(
        root,
        "flows/search.yaml",
        r#"flow_id: search
name: Search
steps:
  - skill: rewriter
    id: rewrite
    inputs:
      - field: user_query
        reference: ${request.message}
  - skill: geo
    id: geo
    condition: ${rewrite.status} == "success"
    inputs:
      - field: query_text
        reference: ${rewrite.output.rewritten_query}
response:
  - field: query
    reference: ${rewrite.output.rewritten_query}
  - field: location
    reference: ${geo.output.location}
"#,
    )?;

    let engine = load(root).await?;
    let result = engine
        .execute_flow("search", map(json!({"message": "beach trip"})), Some(false))
        .await;

    completion.assert_async().await;
    assert_eq!(
        result.response,
        map(json!({
            "query": "hotels in San Diego near the beach",
            "location": "San Diego"
        }))
    );
    Ok(())
}
