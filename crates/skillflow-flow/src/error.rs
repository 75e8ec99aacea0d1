//! Error types for the flow engine

use thiserror::Error;

/// Errors raised while constructing the engine.
///
/// Once constructed, `execute_flow` never fails: every problem is reported
/// inside the returned `FlowResult`.
#[derive(Debug, Error)]
pub enum FlowError {
    /// The reference token pattern failed to compile
    #[error("Invalid reference pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Failure signalled by a capability implementation
#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    /// The capability gave up waiting on its external call
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The capability failed
    #[error("{0}")]
    Failed(String),

    /// The capability panicked while executing
    #[error("Capability panicked: {0}")]
    Panicked(String),

    /// The manifest configuration is unusable for this capability
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl CapabilityError {
    /// Wrap any displayable error as a failure
    pub fn failed(e: impl std::fmt::Display) -> Self {
        CapabilityError::Failed(e.to_string())
    }

    /// Whether this is a timeout-class failure
    pub fn is_timeout(&self) -> bool {
        matches!(self, CapabilityError::Timeout(_))
    }
}

impl From<anyhow::Error> for CapabilityError {
    fn from(e: anyhow::Error) -> Self {
        CapabilityError::Failed(format!("{:#}", e))
    }
}

/// Errors obtaining a capability instance for a skill
#[derive(Debug, Clone, Error)]
pub enum FactoryError {
    /// No factory is registered for the skill's type tag
    #[error("No capability registered for skill type '{0}'")]
    UnknownType(String),

    /// The factory rejected the manifest
    #[error("Failed to construct capability for skill '{skill_id}': {source}")]
    Construction {
        /// Skill id
        skill_id: String,
        /// Underlying error
        source: CapabilityError,
    },
}
