//! Ordered validation of one document against a pinned snapshot.

use autogen_core::finding::summarize;
use autogen_core::{DocumentKind, Severity, ValidationFinding, ValidationStage};
use autogen_registry::RegistrySnapshot;
use serde::Serialize;
use serde_yaml::Value;
use tracing::debug;

use crate::stages::{parse_document, run_stage};

/// Outcome of running the stages over one document.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub kind: DocumentKind,
    /// The parsed document; `None` when syntax failed.
    pub document: Option<Value>,
    pub findings: Vec<ValidationFinding>,
    /// Stages that actually ran, in order.
    pub stages_run: Vec<ValidationStage>,
    /// The stage whose blocking findings stopped the pipeline.
    pub blocked_at: Option<ValidationStage>,
    pub snapshot_version: u64,
}

impl ValidationReport {
    pub fn is_blocked(&self) -> bool {
        self.blocked_at.is_some()
    }

    /// Number of blocking findings.
    pub fn blocking_count(&self) -> usize {
        self.findings.iter().filter(|f| f.is_blocking()).count()
    }

    /// Number of advisory findings.
    pub fn advisory_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Advisory)
            .count()
    }

    pub fn advisories(&self) -> impl Iterator<Item = &ValidationFinding> {
        self.findings.iter().filter(|f| !f.is_blocking())
    }

    /// Compact text of the findings, blocking first.
    pub fn summary(&self, limit: usize) -> String {
        summarize(&self.findings, limit)
    }
}

/// Runs syntax, entity references, service calls, schema and duplicate
/// detection in that order.
///
/// A blocking finding at syntax or schema stops the remaining stages.
/// The pipeline holds no state between calls, so validating the same text
/// against the same snapshot always gives the same report.
#[derive(Debug, Clone, Copy)]
pub struct ValidationPipeline {
    kind: DocumentKind,
}

impl ValidationPipeline {
    pub fn new(kind: DocumentKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn validate(&self, text: &str, snapshot: &RegistrySnapshot) -> ValidationReport {
        let mut report = ValidationReport {
            kind: self.kind,
            document: None,
            findings: Vec::new(),
            stages_run: vec![ValidationStage::Syntax],
            blocked_at: None,
            snapshot_version: snapshot.version(),
        };

        let doc = match parse_document(text) {
            Ok(doc) => doc,
            Err(finding) => {
                debug!(stage = "syntax", location = %finding.location, "document does not parse");
                report.findings.push(finding);
                report.blocked_at = Some(ValidationStage::Syntax);
                return report;
            }
        };

        for stage in ValidationStage::ALL.into_iter().skip(1) {
            let findings = run_stage(stage, &doc, self.kind, snapshot);
            let blocking = findings.iter().filter(|f| f.is_blocking()).count();
            debug!(
                stage = stage.name(),
                findings = findings.len(),
                blocking = blocking,
                "stage finished"
            );
            report.stages_run.push(stage);
            report.findings.extend(findings);
            if blocking > 0 && stage.can_block() {
                report.blocked_at = Some(stage);
                break;
            }
        }

        report.document = Some(doc);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autogen_registry::{EntityEntry, RegistryData};

    fn snapshot() -> RegistrySnapshot {
        let data = RegistryData {
            entities: vec![EntityEntry::new("light.porch")],
            ..Default::default()
        };
        RegistrySnapshot::build(data, 4).expect("snapshot")
    }

    #[test]
    fn test_syntax_failure_short_circuits() {
        let report = ValidationPipeline::new(DocumentKind::Automation)
            .validate("alias: [unclosed\n", &snapshot());
        assert_eq!(report.blocked_at, Some(ValidationStage::Syntax));
        assert_eq!(report.stages_run, vec![ValidationStage::Syntax]);
        assert!(report.document.is_none());
        assert_eq!(report.snapshot_version, 4);
    }

    #[test]
    fn test_schema_failure_skips_duplicates() {
        let report = ValidationPipeline::new(DocumentKind::Automation)
            .validate("alias: No trigger\naction:\n  - service: light.turn_on\n", &snapshot());
        assert_eq!(report.blocked_at, Some(ValidationStage::Schema));
        assert!(!report.stages_run.contains(&ValidationStage::Duplicates));
        assert_eq!(report.blocking_count(), 1);
    }

    #[test]
    fn test_advisory_findings_do_not_block() {
        let text = "alias: Porch\ntrigger:\n  - platform: sun\n    event: sunset\naction:\n  - service: light.turn_on\n    target:\n      entity_id: light.porh\n";
        let report = ValidationPipeline::new(DocumentKind::Automation).validate(text, &snapshot());
        assert!(!report.is_blocked());
        assert_eq!(report.stages_run.len(), 5);
        assert_eq!(report.advisory_count(), 1);
        assert!(report.summary(5).contains("did you mean light.porch?"));
    }
}
