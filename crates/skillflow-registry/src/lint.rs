//! Static checks over flow definitions.
//!
//! At run time the engine resolves unknown and forward step references to
//! null. The linter reports those cases ahead of time without changing that
//! behavior; nothing in the execution path calls it.

use crate::registry::SkillRegistry;
use regex::Regex;
use serde_json::Value;
use skillflow_protocol::models::FlowDefinition;
use std::collections::HashSet;
use thiserror::Error;

/// Prefix addressing a step through the step table, as in `${steps.<id>.output}`
const STEPS_PREFIX: &str = "steps";

/// Errors that stop a flow from being linted at all
#[derive(Debug, Error)]
pub enum LintError {
    /// The reference pattern failed to compile
    #[error("Invalid reference pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Category of a lint finding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LintKind {
    /// Two steps share an id
    DuplicateStepId,
    /// A reference names a step that only runs later in the flow
    ForwardReference,
    /// A reference names neither `request` nor any step of the flow
    UnknownReference,
    /// A step names a skill the registry does not know
    UnknownSkill,
}

/// A single lint finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LintFinding {
    /// Category
    pub kind: LintKind,
    /// Step the finding belongs to; `None` for response mappings
    pub step_id: Option<String>,
    /// Human-readable description
    pub message: String,
}

impl std::fmt::Display for LintFinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.step_id {
            Some(step) => write!(f, "[{}] {}", step, self.message),
            None => write!(f, "[response] {}", self.message),
        }
    }
}

/// Lint a flow against the registry.
///
/// Conditions, input references, top-level string literals and response
/// references are checked; strings nested in list or map literals are not
/// interpolated at run time and are ignored.
pub async fn lint_flow(
    flow: &FlowDefinition,
    registry: &SkillRegistry,
) -> Result<Vec<LintFinding>, LintError> {
    let mut findings = Vec::new();
    let pattern = Regex::new(r"\$\{([^}]+)\}")?;

    let all_ids: HashSet<&str> = flow.steps.iter().map(|s| s.id.as_str()).collect();
    let mut executed: HashSet<&str> = HashSet::new();

    for step in &flow.steps {
        if registry.get_skill(&step.skill).await.is_none() {
            findings.push(LintFinding {
                kind: LintKind::UnknownSkill,
                step_id: Some(step.id.clone()),
                message: format!("skill '{}' is not registered", step.skill),
            });
        }

        let mut texts: Vec<&str> = Vec::new();
        if let Some(condition) = &step.condition {
            texts.push(condition);
        }
        for input in &step.inputs {
            if let Some(reference) = &input.reference {
                texts.push(reference);
            }
            if let Some(Value::String(text)) = &input.value {
                texts.push(text);
            }
        }
        for text in texts {
            check_references(&pattern, text, &executed, &all_ids, Some(&step.id), &mut findings);
        }

        if !executed.insert(step.id.as_str()) {
            findings.push(LintFinding {
                kind: LintKind::DuplicateStepId,
                step_id: Some(step.id.clone()),
                message: format!("step id '{}' is used more than once", step.id),
            });
        }
    }

    for mapping in &flow.response {
        if let Some(reference) = &mapping.reference {
            check_references(&pattern, reference, &executed, &all_ids, None, &mut findings);
        }
    }

    Ok(findings)
}

/// Step id or `request` a reference path is rooted at
fn root_of(path: &str) -> &str {
    let mut segments = path.split('.');
    match segments.next() {
        Some(STEPS_PREFIX) => segments.next().unwrap_or(""),
        Some(first) => first,
        None => "",
    }
}

fn check_references(
    pattern: &Regex,
    text: &str,
    executed: &HashSet<&str>,
    all_ids: &HashSet<&str>,
    step_id: Option<&String>,
    findings: &mut Vec<LintFinding>,
) {
    for cap in pattern.captures_iter(text) {
        let path = cap.get(1).map(|m| m.as_str()).unwrap_or("");
        let namespace = root_of(path);
        if namespace == "request" || executed.contains(namespace) {
            continue;
        }
        let (kind, message) = if all_ids.contains(namespace) {
            (
                LintKind::ForwardReference,
                format!("'{}' refers to step '{}' before it runs", &cap[0], namespace),
            )
        } else {
            (
                LintKind::UnknownReference,
                format!("'{}' refers to unknown namespace '{}'", &cap[0], namespace),
            )
        };
        findings.push(LintFinding {
            kind,
            step_id: step_id.cloned(),
            message,
        });
    }
}
