//! Validation findings shared by the pipeline, the repair loop and callers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The five validation stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStage {
    Syntax,
    EntityReferences,
    ServiceCalls,
    Schema,
    Duplicates,
}

impl ValidationStage {
    pub const ALL: [ValidationStage; 5] = [
        ValidationStage::Syntax,
        ValidationStage::EntityReferences,
        ValidationStage::ServiceCalls,
        ValidationStage::Schema,
        ValidationStage::Duplicates,
    ];

    /// 1-based position in the pipeline.
    pub fn number(&self) -> u8 {
        match self {
            ValidationStage::Syntax => 1,
            ValidationStage::EntityReferences => 2,
            ValidationStage::ServiceCalls => 3,
            ValidationStage::Schema => 4,
            ValidationStage::Duplicates => 5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValidationStage::Syntax => "syntax",
            ValidationStage::EntityReferences => "entity_references",
            ValidationStage::ServiceCalls => "service_calls",
            ValidationStage::Schema => "schema",
            ValidationStage::Duplicates => "duplicates",
        }
    }

    /// Only syntax and schema failures block a document and trigger repair.
    pub fn can_block(&self) -> bool {
        matches!(self, ValidationStage::Syntax | ValidationStage::Schema)
    }
}

impl fmt::Display for ValidationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a finding stops the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Advisory,
    Blocking,
}

/// One problem found in a generated document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidationFinding {
    pub stage: ValidationStage,
    pub severity: Severity,
    pub message: String,
    /// Dotted path inside the document, or `line N` for syntax errors.
    pub location: String,
    pub affected_ref: Option<String>,
    pub suggestion: Option<String>,
}

impl ValidationFinding {
    pub fn blocking(
        stage: ValidationStage,
        location: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(stage, Severity::Blocking, location, message)
    }

    pub fn advisory(
        stage: ValidationStage,
        location: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(stage, Severity::Advisory, location, message)
    }

    fn new(
        stage: ValidationStage,
        severity: Severity,
        location: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            severity,
            message: message.into(),
            location: location.into(),
            affected_ref: None,
            suggestion: None,
        }
    }

    pub fn with_ref(mut self, affected_ref: impl Into<String>) -> Self {
        self.affected_ref = Some(affected_ref.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Blocking
    }
}

impl fmt::Display for ValidationFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.stage)?;
        if !self.location.is_empty() {
            write!(f, " {}:", self.location)?;
        }
        write!(f, " {}", self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " ({suggestion})")?;
        }
        Ok(())
    }
}

/// Compact multi-line summary, at most `limit` findings, blocking first.
///
/// Used for repair prompts and user-facing errors; it only contains text
/// produced by the validators, never backend output.
pub fn summarize(findings: &[ValidationFinding], limit: usize) -> String {
    let mut ordered: Vec<&ValidationFinding> = findings.iter().collect();
    ordered.sort_by_key(|f| std::cmp::Reverse(f.severity));

    let mut lines: Vec<String> = ordered
        .iter()
        .take(limit)
        .map(|f| format!("- {f}"))
        .collect();
    if findings.len() > limit {
        lines.push(format!("- ... and {} more", findings.len() - limit));
    }
    lines.join("\n")
}
