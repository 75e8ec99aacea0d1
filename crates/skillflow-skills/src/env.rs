//! Environment expansion for manifest configuration values

/// Expand a whole-value `${NAME}` reference from the environment.
///
/// Anything else, including an unset variable, is returned unchanged.
pub fn resolve_env_var(value: &str) -> String {
    match value.strip_prefix("${").and_then(|v| v.strip_suffix('}')) {
        Some(name) if !name.is_empty() => std::env::var(name).unwrap_or_else(|_| value.to_string()),
        _ => value.to_string(),
    }
}

/// Read a non-empty environment variable
pub(crate) fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Whether an expanded config value holds something usable.
///
/// Blank values and `${NAME}` references left unexpanded are not.
pub(crate) fn is_set(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && !value.starts_with("${")
}
