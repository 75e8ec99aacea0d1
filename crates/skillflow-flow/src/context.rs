//! Per-invocation execution context

use serde_json::{json, Value};
use skillflow_protocol::models::{SkillStatus, ValueMap};
use std::collections::HashMap;
use tracing::warn;

/// Namespace under which the original request is addressable
pub const REQUEST_NAMESPACE: &str = "request";
/// Namespace addressing the step table, as in `steps.<id>.output`
pub const STEPS_NAMESPACE: &str = "steps";

/// State of one flow invocation: the request plus a record per executed step.
///
/// Owned by exactly one invocation and dropped once the response is built.
/// Step records are write-once.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    request: Value,
    steps: HashMap<String, Value>,
}

impl ExecutionContext {
    /// Start a context for the given request payload
    pub fn new(request: ValueMap) -> Self {
        Self {
            request: Value::Object(request),
            steps: HashMap::new(),
        }
    }

    /// The original request payload
    pub fn request(&self) -> &Value {
        &self.request
    }

    /// The `{output, status}` record of a step that has run
    pub fn step(&self, step_id: &str) -> Option<&Value> {
        self.steps.get(step_id)
    }

    /// Whether a step has been recorded
    pub fn has_step(&self, step_id: &str) -> bool {
        self.steps.contains_key(step_id)
    }

    /// Record a step's outcome.
    ///
    /// Returns `false` and leaves the existing record untouched if the step id
    /// was already recorded.
    pub fn record_step(&mut self, step_id: &str, status: SkillStatus, output: ValueMap) -> bool {
        if self.steps.contains_key(step_id) {
            warn!(step_id = %step_id, "Step already recorded; keeping the first record");
            return false;
        }
        self.steps.insert(
            step_id.to_string(),
            json!({ "output": Value::Object(output), "status": status.as_str() }),
        );
        true
    }

    /// Root value for the leading segments of a reference path.
    ///
    /// `request` selects the request payload and `steps.<id>` the record of
    /// step `<id>`; both take precedence over step ids. Any other recorded
    /// step id selects that step's record. Consumes the segments it used.
    pub(crate) fn root<'a, 'p>(
        &'a self,
        segments: &mut impl Iterator<Item = &'p str>,
    ) -> Option<&'a Value> {
        match segments.next()? {
            REQUEST_NAMESPACE => Some(&self.request),
            STEPS_NAMESPACE => self.steps.get(segments.next()?),
            step_id => self.steps.get(step_id),
        }
    }
}
