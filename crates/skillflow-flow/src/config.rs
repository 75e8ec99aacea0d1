//! Engine configuration

/// Environment variable holding the process-wide mock mode default
pub const MOCK_MODE_ENV: &str = "SKILLFLOW_MOCK_MODE";

/// Configuration for a [`crate::FlowEngine`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Mock mode used when a caller does not pass one explicitly
    pub default_mock_mode: bool,
}

impl EngineConfig {
    /// Read the configuration from the environment.
    ///
    /// `SKILLFLOW_MOCK_MODE` set to `true` or `1` (any case) enables mock mode.
    pub fn from_env() -> Self {
        Self {
            default_mock_mode: std::env::var(MOCK_MODE_ENV)
                .ok()
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
        }
    }

    /// Set the default mock mode
    pub fn with_mock_mode(mut self, enabled: bool) -> Self {
        self.default_mock_mode = enabled;
        self
    }

    /// Effective mock mode: an explicit request wins over the default
    pub fn effective_mock_mode(&self, requested: Option<bool>) -> bool {
        requested.unwrap_or(self.default_mock_mode)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1")
}
