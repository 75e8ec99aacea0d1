//! Built-in capability types
//!
//! Each module implements [`skillflow_flow::Capability`] for one skill type
//! tag and exposes a factory suitable for [`CapabilityFactories::register`].
//!
//! - [`function`] - named functions from a compile-time table (`function`)
//! - [`llm`] - OpenAI-compatible chat completions (`llm_call`)
//! - [`web_search`] - SerpAPI, Bing and Google CSE search (`web_search`)
//! - [`prompt_template`] - `{{ var }}` prompt rendering (`prompt_registry`)
//! - [`genie`] - Databricks Genie space questions (`genie_query`)
//! - [`lakebase`] - Lakebase listing and review queries (`lakebase_query`)

#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

use skillflow_flow::CapabilityFactories;
use skillflow_protocol::models::skill_types;

pub mod env;
pub mod error;
pub mod function;
pub mod genie;
pub mod lakebase;
pub mod llm;
pub mod prompt_template;
pub mod web_search;

pub use env::resolve_env_var;
pub use error::SkillError;
pub use function::{FunctionCapability, FunctionTable, SkillFunction};
pub use genie::GenieQueryCapability;
pub use lakebase::LakebaseQueryCapability;
pub use llm::LlmCallCapability;
pub use prompt_template::PromptTemplateCapability;
pub use web_search::WebSearchCapability;

/// Register factories for every built-in type tag
pub fn register_builtins(factories: &mut CapabilityFactories) {
    register_with_functions(factories, FunctionTable::builtin());
}

/// Register the built-ins, using `functions` for the `function` type
pub fn register_with_functions(factories: &mut CapabilityFactories, functions: FunctionTable) {
    factories.register(skill_types::FUNCTION, function::factory(functions));
    factories.register(skill_types::LLM_CALL, llm::factory);
    factories.register(skill_types::WEB_SEARCH, web_search::factory);
    factories.register(skill_types::PROMPT_REGISTRY, prompt_template::factory);
    factories.register(skill_types::GENIE_QUERY, genie::factory);
    factories.register(skill_types::LAKEBASE_QUERY, lakebase::factory);
}

/// A factory registry holding all built-ins
pub fn builtin_factories() -> CapabilityFactories {
    let mut factories = CapabilityFactories::new();
    register_builtins(&mut factories);
    factories
}
