//! The five validation stages.
//!
//! Syntax turns text into a document; the other stages are pure functions
//! of the document, its kind and the pinned registry snapshot.

pub mod duplicates;
pub mod references;
pub mod schema;
pub mod services;
pub mod syntax;

use autogen_core::{DocumentKind, ValidationFinding, ValidationStage};
use autogen_registry::RegistrySnapshot;
use serde_yaml::Value;

pub use syntax::parse_document;

/// Minimum Jaro-Winkler similarity for a "did you mean" suggestion.
pub const SUGGESTION_THRESHOLD: f64 = 0.85;

/// Run one post-syntax stage over a parsed document.
pub fn run_stage(
    stage: ValidationStage,
    doc: &Value,
    kind: DocumentKind,
    snapshot: &RegistrySnapshot,
) -> Vec<ValidationFinding> {
    match stage {
        // Syntax findings come from `parse_document`.
        ValidationStage::Syntax => Vec::new(),
        ValidationStage::EntityReferences => references::check(doc, snapshot),
        ValidationStage::ServiceCalls => services::check(doc, snapshot),
        ValidationStage::Schema => schema::check(doc, kind),
        ValidationStage::Duplicates => duplicates::check(doc, kind, snapshot),
    }
}

/// Closest candidate to `target` at or above [`SUGGESTION_THRESHOLD`].
///
/// Ties keep the first candidate in iteration order.
pub fn closest<'a, I>(target: &str, candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(&str, f64)> = None;
    for candidate in candidates {
        if candidate == target {
            continue;
        }
        let score = strsim::jaro_winkler(target, candidate);
        if score < SUGGESTION_THRESHOLD {
            continue;
        }
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((candidate, score));
        }
    }
    best.map(|(candidate, _)| candidate)
}

/// Short type name of a YAML node for messages.
pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}
