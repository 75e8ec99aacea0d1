//! Reference resolution, interpolation and conditions.
//!
//! A reference token is `${path}`. The first path segment is a namespace:
//! `request` for the request payload, `steps` followed by a step id, or the id
//! of a step that has already run. Remaining segments descend through nested
//! maps. Any miss resolves to null.
//!
//! Conditions are a deliberately small grammar, evaluated in this order on the
//! interpolated text:
//!
//! 1. `X is not empty`
//! 2. `X is empty`
//! 3. `A != B`
//! 4. `A == B`
//! 5. `not C`
//! 6. plain truthiness (the interpolated text is non-empty)
//!
//! For the emptiness forms `X` is re-resolved as a reference from the raw
//! condition, so the check sees the real value rather than its string form.
//! Evaluation is fail-closed: an evaluation error yields `false`.

use crate::context::ExecutionContext;
use crate::error::FlowError;
use regex::{Captures, Regex};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Pattern matching one reference token; group 1 is the path
pub const REFERENCE_PATTERN: &str = r"\$\{([^}]+)\}";

const IS_NOT_EMPTY: &str = "is not empty";
const IS_EMPTY: &str = "is empty";
const NOT_PREFIX: &str = "not ";
const MAX_NEGATION_DEPTH: usize = 32;

#[derive(Debug, Error)]
enum ConditionError {
    #[error("condition nests 'not' deeper than {0} levels")]
    TooDeep(usize),
}

/// Resolves references, interpolates strings and evaluates conditions
#[derive(Debug, Clone)]
pub struct ReferenceResolver {
    pattern: Regex,
}

impl ReferenceResolver {
    /// Compile the reference pattern
    pub fn new() -> Result<Self, FlowError> {
        Ok(Self {
            pattern: Regex::new(REFERENCE_PATTERN)?,
        })
    }

    /// Resolve a `${path}` reference to a value.
    ///
    /// The surrounding `${` and `}` are optional. Unknown namespaces, missing
    /// keys and descent through non-map values all yield null.
    pub fn resolve_reference(&self, reference: &str, context: &ExecutionContext) -> Value {
        match lookup(reference, context) {
            Some(value) => value.clone(),
            None => {
                debug!(reference = %reference, "Reference did not resolve; using null");
                Value::Null
            }
        }
    }

    /// Replace every reference token in `text`.
    ///
    /// Strings are substituted verbatim; other values as compact JSON. Tokens
    /// that resolve to null (or not at all) are left in place.
    pub fn interpolate(&self, text: &str, context: &ExecutionContext) -> String {
        self.pattern
            .replace_all(text, |caps: &Captures| match lookup(&caps[0], context) {
                Some(value) if !value.is_null() => value_to_string(value),
                _ => caps[0].to_string(),
            })
            .into_owned()
    }

    /// Whether `text` contains any reference token
    pub fn has_references(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    /// Evaluate a step condition. Never fails; errors evaluate to `false`.
    pub fn evaluate_condition(&self, condition: &str, context: &ExecutionContext) -> bool {
        match self.evaluate(condition, context, 0) {
            Ok(result) => result,
            Err(e) => {
                warn!(condition = %condition, error = %e, "Condition evaluation failed; treating as false");
                false
            }
        }
    }

    fn evaluate(
        &self,
        condition: &str,
        context: &ExecutionContext,
        depth: usize,
    ) -> Result<bool, ConditionError> {
        if depth > MAX_NEGATION_DEPTH {
            return Err(ConditionError::TooDeep(MAX_NEGATION_DEPTH));
        }

        let resolved = self.interpolate(condition, context);

        if resolved.contains(IS_NOT_EMPTY) {
            let subject = left_of(condition, IS_NOT_EMPTY);
            return Ok(!is_empty_value(&self.resolve_reference(subject, context)));
        }
        if resolved.contains(IS_EMPTY) {
            let subject = left_of(condition, IS_EMPTY);
            return Ok(is_empty_value(&self.resolve_reference(subject, context)));
        }

        if let Some((left, right)) = resolved.split_once("!=") {
            return Ok(unquote(left) != unquote(right));
        }
        if let Some((left, right)) = resolved.split_once("==") {
            return Ok(unquote(left) == unquote(right));
        }

        if let Some(inner) = resolved.trim().strip_prefix(NOT_PREFIX) {
            return Ok(!self.evaluate(inner, context, depth + 1)?);
        }

        Ok(!resolved.is_empty())
    }
}

/// Emptiness as used by `is empty` / `is not empty`.
///
/// Null, the empty string, the empty list and the empty map are empty.
/// Numbers (including zero) and booleans (including `false`) never are.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Number(_) | Value::Bool(_) => false,
    }
}

/// String form used for interpolation
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn lookup<'a>(reference: &str, context: &'a ExecutionContext) -> Option<&'a Value> {
    let path = reference.trim();
    let path = path
        .strip_prefix("${")
        .and_then(|p| p.strip_suffix('}'))
        .unwrap_or(path);

    let mut segments = path.split('.');
    let mut current = context.root(&mut segments)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn left_of<'a>(condition: &'a str, keyword: &str) -> &'a str {
    condition
        .split(keyword)
        .next()
        .unwrap_or(condition)
        .trim()
}

fn unquote(operand: &str) -> &str {
    operand.trim().trim_matches('"').trim_matches('\'')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use skillflow_protocol::models::{SkillStatus, ValueMap};

    fn map(value: Value) -> ValueMap {
        match value {
            Value::Object(m) => m,
            _ => ValueMap::new(),
        }
    }

    fn context() -> ExecutionContext {
        let mut context = ExecutionContext::new(map(json!({
            "query": "hotels in miami",
            "filters": {"max_price": 200}
        })));
        context.record_step(
            "search",
            SkillStatus::Success,
            map(json!({"results": [], "count": 0, "top": {"name": "Sea View"}})),
        );
        context.record_step("rewrite", SkillStatus::Failure, map(json!({"text": ""})));
        context
    }

    fn resolver() -> ReferenceResolver {
        ReferenceResolver::new().expect("pattern compiles")
    }

    #[test]
    fn test_resolve_reference() {
        let r = resolver();
        let ctx = context();
        assert_eq!(r.resolve_reference("${request.query}", &ctx), json!("hotels in miami"));
        assert_eq!(r.resolve_reference("${request.filters.max_price}", &ctx), json!(200));
        assert_eq!(r.resolve_reference("${search.output.top.name}", &ctx), json!("Sea View"));
        assert_eq!(r.resolve_reference("${search.status}", &ctx), json!("success"));
        assert_eq!(r.resolve_reference("request.query", &ctx), json!("hotels in miami"));
        assert_eq!(r.resolve_reference("${steps.search.output.top.name}", &ctx), json!("Sea View"));
        assert_eq!(r.resolve_reference("${steps.rewrite.status}", &ctx), json!("failure"));
    }

    #[test]
    fn test_unresolvable_references_are_null() {
        let r = resolver();
        let ctx = context();
        assert_eq!(r.resolve_reference("${missing.output.field}", &ctx), Value::Null);
        assert_eq!(r.resolve_reference("${request.nope}", &ctx), Value::Null);
        assert_eq!(r.resolve_reference("${request.query.deeper}", &ctx), Value::Null);
        assert_eq!(r.resolve_reference("${env.HOME}", &ctx), Value::Null);
        assert_eq!(r.resolve_reference("${steps.missing.status}", &ctx), Value::Null);
        assert_eq!(r.resolve_reference("${steps}", &ctx), Value::Null);
    }

    #[test]
    fn test_resolution_is_repeatable() {
        let r = resolver();
        let ctx = context();
        for reference in ["${request.filters}", "${search.output.count}", "${ghost.output}"] {
            assert_eq!(
                r.resolve_reference(reference, &ctx),
                r.resolve_reference(reference, &ctx)
            );
        }
        let text = "${request.query} (${rewrite.status})";
        assert_eq!(r.interpolate(text, &ctx), r.interpolate(text, &ctx));
    }

    #[test]
    fn test_interpolate() {
        let r = resolver();
        let ctx = context();
        assert_eq!(
            r.interpolate("Find ${request.query} under ${request.filters.max_price}", &ctx),
            "Find hotels in miami under 200"
        );
        assert_eq!(
            r.interpolate("${request.filters}", &ctx),
            "{\"max_price\":200}"
        );
        assert_eq!(r.interpolate("keep ${nothing.here}", &ctx), "keep ${nothing.here}");
        assert_eq!(r.interpolate("no tokens", &ctx), "no tokens");
    }

    #[test]
    fn test_emptiness_conditions() {
        let r = resolver();
        let ctx = context();
        assert!(r.evaluate_condition("${search.output.count} is not empty", &ctx));
        assert!(r.evaluate_condition("${search.output.results} is empty", &ctx));
        assert!(r.evaluate_condition("${rewrite.output.text} is empty", &ctx));
        assert!(r.evaluate_condition("${missing.output.x} is empty", &ctx));
        assert!(!r.evaluate_condition("${request.query} is empty", &ctx));
    }

    #[test]
    fn test_comparison_conditions() {
        let r = resolver();
        let ctx = context();
        assert!(r.evaluate_condition("${search.status} == \"success\"", &ctx));
        assert!(r.evaluate_condition("${search.status} == 'success'", &ctx));
        assert!(r.evaluate_condition("${rewrite.status} != \"success\"", &ctx));
        assert!(r.evaluate_condition("${steps.search.status} == \"success\"", &ctx));
        assert!(!r.evaluate_condition("${missing.output.field} == \"ok\"", &ctx));
    }

    #[test]
    fn test_negation_and_truthiness() {
        let r = resolver();
        let ctx = context();
        assert!(r.evaluate_condition("${request.query}", &ctx));
        assert!(!r.evaluate_condition("", &ctx));
        assert!(!r.evaluate_condition("not ${request.query}", &ctx));
        assert!(r.evaluate_condition("not not ${request.query}", &ctx));
    }

    #[test]
    fn test_runaway_negation_fails_closed() {
        let r = resolver();
        let ctx = context();
        let condition = format!("{}x", "not ".repeat(MAX_NEGATION_DEPTH + 2));
        assert!(!r.evaluate_condition(&condition, &ctx));
    }

    #[test]
    fn test_is_empty_value() {
        assert!(is_empty_value(&Value::Null));
        assert!(is_empty_value(&json!("")));
        assert!(is_empty_value(&json!([])));
        assert!(is_empty_value(&json!({})));
        assert!(!is_empty_value(&json!(0)));
        assert!(!is_empty_value(&json!(false)));
        assert!(!is_empty_value(&json!(" ")));
    }
}
