//! Skill Registry
//!
//! Lookup tables for skill manifests and flow definitions, the directory
//! loader that populates them, and an optional load-time flow linter.

#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Optional static checks over flow definitions
pub mod lint;
/// Directory-based manifest loader
pub mod loader;
/// Skill and flow lookup tables
pub mod registry;

pub use lint::{lint_flow, LintError, LintFinding, LintKind};
pub use loader::{LoadReport, LoaderError, RegistryLoader};
pub use registry::{SkillRegistry, TaggedEntries};
