//! The capability trait.
//!
//! A capability is the concrete implementation behind a skill type tag. The
//! invocation contract in [`crate::contract`] wraps every capability with
//! input validation, mock dispatch, timing and fallback handling, so
//! implementations only deal with the happy path and report failures as
//! [`CapabilityError`].

use crate::error::CapabilityError;
use async_trait::async_trait;
use skillflow_protocol::models::{SkillManifest, ValueMap};
use std::future::Future;
use std::time::Duration;

/// Implementation behind a skill type tag
#[async_trait]
pub trait Capability: Send + Sync {
    /// Perform the real operation on validated inputs
    async fn execute(&self, inputs: &ValueMap) -> Result<ValueMap, CapabilityError>;

    /// Produce deterministic canned output for mock mode.
    ///
    /// The default returns each declared output field's default value.
    async fn mock_execute(
        &self,
        manifest: &SkillManifest,
        _inputs: &ValueMap,
    ) -> Result<ValueMap, CapabilityError> {
        Ok(declared_output_defaults(manifest))
    }
}

/// Map of every declared output field to its default (null when unset)
pub fn declared_output_defaults(manifest: &SkillManifest) -> ValueMap {
    manifest
        .output_schema
        .iter()
        .map(|field| {
            (
                field.name.clone(),
                field.default.clone().unwrap_or(serde_json::Value::Null),
            )
        })
        .collect()
}

/// Bound a future with a timeout, reporting expiry as [`CapabilityError::Timeout`]
pub async fn with_timeout<F, T>(limit: Duration, fut: F) -> Result<T, CapabilityError>
where
    F: Future<Output = Result<T, CapabilityError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(CapabilityError::Timeout(format!(
            "no response within {}s",
            limit.as_secs_f64()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skillflow_protocol::models::{skill_types, FieldSchema};

    struct Noop;

    #[async_trait]
    impl Capability for Noop {
        async fn execute(&self, _inputs: &ValueMap) -> Result<ValueMap, CapabilityError> {
            Ok(ValueMap::new())
        }
    }

    #[tokio::test]
    async fn test_default_mock_uses_output_defaults() {
        let manifest = SkillManifest::new("s", skill_types::FUNCTION)
            .with_output(FieldSchema::required("answer").with_default(json!("n/a")))
            .with_output(FieldSchema::required("score").with_type("number"));

        let output = Noop
            .mock_execute(&manifest, &ValueMap::new())
            .await
            .expect("mock output");
        assert_eq!(output.get("answer"), Some(&json!("n/a")));
        assert_eq!(output.get("score"), Some(&serde_json::Value::Null));
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result: Result<(), _> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(result.expect_err("should time out").is_timeout());
    }
}
