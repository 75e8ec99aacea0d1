//! Flow Execution Engine
//!
//! Runs declarative flows: each step's inputs are resolved from the request
//! and earlier step results, its condition is evaluated, and its capability is
//! driven through a uniform invocation contract with mock and fallback support.
//!
//! # Modules
//!
//! - [`expr`] - Reference resolution, string interpolation and the condition grammar
//! - [`context`] - Per-invocation execution context
//! - [`capability`] - The capability trait every skill implementation satisfies
//! - [`contract`] - Validation, timing, mock dispatch and fallback around a capability
//! - [`factory`] - Type-tag factories and the process-wide capability cache
//! - [`engine`] - The orchestration loop

#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

pub mod capability;
pub mod config;
pub mod context;
pub mod contract;
pub mod engine;
pub mod error;
pub mod expr;
pub mod factory;

pub use capability::{with_timeout, Capability};
pub use config::EngineConfig;
pub use context::ExecutionContext;
pub use contract::SkillInvoker;
pub use engine::FlowEngine;
pub use error::{CapabilityError, FactoryError, FlowError};
pub use expr::ReferenceResolver;
pub use factory::{CapabilityCache, CapabilityFactories};
