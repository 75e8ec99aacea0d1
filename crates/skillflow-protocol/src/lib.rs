//! Skillflow Protocol - Core types shared by the registry, engine and skills
//!
//! This crate holds the declarative data model of the interpreter: capability
//! manifests, flow definitions, and the results produced when a flow runs.
//!
//! # Core Types
//!
//! - [`SkillManifest`] - Declarative metadata for one capability
//! - [`FlowDefinition`] - An ordered pipeline of [`FlowStep`]s plus response mappings
//! - [`SkillResult`] - Outcome of one step of one invocation
//! - [`FlowResult`] - Outcome of a whole flow invocation
//! - [`FlowExecuteRequest`] / [`FlowExecuteResponse`] - The invocation boundary
//!
//! # Example
//!
//! ```rust
//! use skillflow_protocol::models::{FlowDefinition, FlowStep, ResponseMapping, StepInput};
//!
//! let flow = FlowDefinition::new("search", "Search")
//!     .with_step(
//!         FlowStep::new("query_rewriter", "rewrite")
//!             .with_input(StepInput::reference("user_query", "${request.message}")),
//!     )
//!     .with_response(ResponseMapping::new("answer", "${rewrite.output.rewritten_query}"));
//!
//! assert_eq!(flow.steps.len(), 1);
//! ```

#![warn(missing_docs)]

/// Protocol models module
pub mod models;

pub use models::*;
