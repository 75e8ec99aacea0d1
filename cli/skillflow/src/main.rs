//! Skillflow CLI

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use schemars::schema_for;
use serde_json::{json, Value};
use skillflow_flow::{EngineConfig, FlowEngine};
use skillflow_protocol::models::{
    FlowDefinition, FlowExecuteRequest, SkillManifest, SkillStatus, ValueMap,
};
use skillflow_registry::{lint_flow, RegistryLoader, SkillRegistry};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "skillflow")]
#[command(about = "Declarative skill flows - run, list and lint")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a flow and print its response as JSON
    Run {
        /// Flow to execute; defaults to the registry's default flow
        #[arg(value_name = "FLOW_ID")]
        flow_id: Option<String>,

        /// Registry directory
        #[arg(short, long, env = "SKILLFLOW_DIR", default_value = "./agent_skills")]
        dir: PathBuf,

        /// JSON request payload (e.g., '{"message": "hotels in Austin"}')
        #[arg(short, long, default_value = "{}")]
        request: String,

        /// Use mock implementations where skills allow it
        #[arg(long, conflicts_with = "no_mock")]
        mock: bool,

        /// Call real implementations even if mock mode is the default
        #[arg(long)]
        no_mock: bool,
    },

    /// List registered skills and flows
    List {
        /// Registry directory
        #[arg(short, long, env = "SKILLFLOW_DIR", default_value = "./agent_skills")]
        dir: PathBuf,

        /// Only show entries carrying this tag
        #[arg(short, long)]
        tag: Option<String>,
    },

    /// Check flows for unknown skills and dangling step references
    Lint {
        /// Registry directory
        #[arg(short, long, env = "SKILLFLOW_DIR", default_value = "./agent_skills")]
        dir: PathBuf,
    },

    /// Print the JSON Schemas of skill manifests and flow definitions
    Schema,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            flow_id,
            dir,
            request,
            mock,
            no_mock,
        } => run_flow(flow_id, &dir, &request, mock_override(mock, no_mock)).await,
        Commands::List { dir, tag } => list_entries(&dir, tag.as_deref()).await,
        Commands::Lint { dir } => lint_registry(&dir).await,
        Commands::Schema => print_schemas(),
    }
}

fn mock_override(mock: bool, no_mock: bool) -> Option<bool> {
    match (mock, no_mock) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn parse_request(raw: &str) -> anyhow::Result<ValueMap> {
    match serde_json::from_str::<Value>(raw).context("Invalid JSON request")? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("Request must be a JSON object, got: {}", other),
    }
}

async fn load_registry(dir: &Path) -> anyhow::Result<SkillRegistry> {
    let registry = SkillRegistry::new();
    let report = RegistryLoader::new(dir)
        .load_into(&registry)
        .await
        .with_context(|| format!("Failed to load registry from {}", dir.display()))?;

    for (path, reason) in &report.skipped {
        eprintln!(
            "{} {}: {}",
            style("skipped").yellow(),
            path.display(),
            reason
        );
    }
    Ok(registry)
}

async fn run_flow(
    flow_id: Option<String>,
    dir: &Path,
    raw_request: &str,
    mock_mode: Option<bool>,
) -> anyhow::Result<()> {
    let request = parse_request(raw_request)?;
    let registry = load_registry(dir).await?;

    let flow_id = match flow_id.or(registry.config().await.default_flow) {
        Some(id) => id,
        None => anyhow::bail!("No flow given and the registry has no default_flow"),
    };

    let config = EngineConfig::from_env();
    let mode = if config.effective_mock_mode(mock_mode) {
        style("mock").yellow().to_string()
    } else {
        style("live").green().to_string()
    };
    eprintln!("{}", style(format!("Running flow: {}", flow_id)).bold().cyan());
    eprintln!("  Registry: {}", dir.display());
    eprintln!("  Mode: {}", mode);

    let engine = FlowEngine::new(registry, skillflow_skills::builtin_factories(), config)?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(format!("Executing {}...", flow_id));

    let response = engine
        .execute(FlowExecuteRequest {
            flow_id,
            request,
            mock_mode,
        })
        .await;

    pb.finish_and_clear();

    for step in &response.steps {
        let status = match step.status {
            SkillStatus::Success => style("success").green(),
            SkillStatus::Failure => style("failure").red(),
            SkillStatus::Skipped => style("skipped").dim(),
        };
        eprintln!(
            "  {:<20} {:<8} {}ms{}",
            step.step_id,
            status,
            step.latency_ms,
            step.error
                .as_deref()
                .map(|e| format!("  ({})", e))
                .unwrap_or_default()
        );
    }

    println!("{}", serde_json::to_string_pretty(&response)?);

    if response.status != SkillStatus::Success {
        eprintln!(
            "{}",
            style(format!(
                "Flow failed: {}",
                response.error.as_deref().unwrap_or("unknown error")
            ))
            .red()
            .bold()
        );
        std::process::exit(1);
    }
    Ok(())
}

async fn list_entries(dir: &Path, tag: Option<&str>) -> anyhow::Result<()> {
    let registry = load_registry(dir).await?;

    let (skills, flows) = match tag {
        Some(tag) => {
            let tagged = registry.list_by_tag(tag).await;
            (tagged.skills, tagged.flows)
        }
        None => (registry.list_skills().await, registry.list_flows().await),
    };

    println!("{}", style(format!("Skills ({})", skills.len())).bold());
    for skill in &skills {
        print_skill(skill);
    }

    println!("\n{}", style(format!("Flows ({})", flows.len())).bold());
    for flow in &flows {
        print_flow(flow);
    }
    Ok(())
}

fn print_skill(skill: &SkillManifest) {
    println!(
        "  {:<24} {:<16} {}",
        style(&skill.skill_id).cyan(),
        skill.skill_type,
        skill.name
    );
}

fn print_flow(flow: &FlowDefinition) {
    let steps: Vec<&str> = flow.steps.iter().map(|s| s.id.as_str()).collect();
    println!(
        "  {:<24} {} [{}]",
        style(&flow.flow_id).cyan(),
        flow.name,
        steps.join(" -> ")
    );
}

async fn lint_registry(dir: &Path) -> anyhow::Result<()> {
    let registry = load_registry(dir).await?;
    let flows = registry.list_flows().await;
    println!("{}", style(format!("Linting {} flows", flows.len())).bold());

    let mut total = 0;
    for flow in &flows {
        let findings = lint_flow(flow, &registry)
            .await
            .with_context(|| format!("Failed to lint flow {}", flow.flow_id))?;
        if findings.is_empty() {
            println!("  {} {}", style("ok").green(), flow.flow_id);
            continue;
        }
        total += findings.len();
        println!("  {} {}", style("!!").red(), flow.flow_id);
        for finding in findings {
            println!("      {}", finding);
        }
    }

    if total > 0 {
        println!("\n{}", style(format!("{} finding(s)", total)).red().bold());
        std::process::exit(1);
    }
    println!("\n{}", style("No findings").green().bold());
    Ok(())
}

fn print_schemas() -> anyhow::Result<()> {
    let schemas = json!({
        "skill_manifest": schema_for!(SkillManifest),
        "flow_definition": schema_for!(FlowDefinition),
    });
    println!("{}", serde_json::to_string_pretty(&schemas)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_flags() {
        assert_eq!(mock_override(false, false), None);
        assert_eq!(mock_override(true, false), Some(true));
        assert_eq!(mock_override(false, true), Some(false));
    }

    #[test]
    fn test_parse_request() {
        let request = parse_request(r#"{"message": "hotels in Austin"}"#).expect("object");
        assert_eq!(request.get("message"), Some(&json!("hotels in Austin")));

        assert!(parse_request("[1, 2]").is_err());
        assert!(parse_request("not json").is_err());
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "skillflow",
            "run",
            "hotel_search",
            "--dir",
            "demos/agent_skills",
            "--mock",
        ])
        .expect("parses");
        match cli.command {
            Commands::Run {
                flow_id, dir, mock, ..
            } => {
                assert_eq!(flow_id.as_deref(), Some("hotel_search"));
                assert_eq!(dir, PathBuf::from("demos/agent_skills"));
                assert!(mock);
            }
            _ => panic!("expected run"),
        }

        assert!(Cli::try_parse_from(["skillflow", "run", "--mock", "--no-mock"]).is_err());
    }
}
