//! Error types for the built-in capabilities

use skillflow_flow::CapabilityError;
use thiserror::Error;

/// Errors raised by built-in capabilities
#[derive(Debug, Error)]
pub enum SkillError {
    /// The manifest names a function the table does not contain
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// The manifest does not name a function at all
    #[error("No function specified for skill {0}; set config.function_name")]
    NoFunction(String),

    /// An input is missing or has the wrong shape
    #[error("Invalid input '{field}': {reason}")]
    InvalidInput {
        /// Input field
        field: String,
        /// What is wrong with it
        reason: String,
    },

    /// The configured endpoint is not a valid URL
    #[error("Invalid endpoint URL '{url}': {source}")]
    InvalidEndpoint {
        /// Endpoint as configured (after env expansion)
        url: String,
        /// Parse error
        #[source]
        source: url::ParseError,
    },

    /// Transport-level HTTP failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote service answered with an error
    #[error("API error: {0}")]
    Api(String),

    /// A service the skill needs has no usable configuration
    #[error("{0} is not configured")]
    NotConfigured(String),

    /// Database query failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A template placeholder pattern failed to compile
    #[error("Invalid template pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl SkillError {
    /// Shorthand for [`SkillError::InvalidInput`]
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        SkillError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<SkillError> for CapabilityError {
    fn from(e: SkillError) -> Self {
        match &e {
            SkillError::Http(inner) if inner.is_timeout() => CapabilityError::Timeout(e.to_string()),
            SkillError::Database(sqlx::Error::PoolTimedOut) => {
                CapabilityError::Timeout(e.to_string())
            }
            _ => CapabilityError::Failed(e.to_string()),
        }
    }
}
