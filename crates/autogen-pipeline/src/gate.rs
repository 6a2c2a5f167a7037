//! Handoff gate: the only way a document leaves the pipeline.
//!
//! A document is released when it carries no blocking finding and, if it
//! touches a sensitive domain, when the caller confirmed that exact
//! document (matched by content digest).

use autogen_core::{DocumentKind, SensitivePolicy, SensitivityReport, ValidationFinding};
use autogen_registry::ContentDigest;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_yaml::Value;
use thiserror::Error;

use crate::pipeline::ValidationReport;

/// A document that passed every blocking check.
#[derive(Debug, Clone, Serialize)]
pub struct ValidatedDocument {
    pub kind: DocumentKind,
    /// The YAML text as extracted from the reply.
    pub text: String,
    pub document: Value,
    /// Advisory findings only.
    pub findings: Vec<ValidationFinding>,
    pub sensitive: bool,
    pub sensitivity: SensitivityReport,
    pub snapshot_version: u64,
    /// Which generation produced it; 1 for the first attempt.
    pub attempt_number: u32,
    pub digest: ContentDigest,
}

impl ValidatedDocument {
    /// Accept a report that did not block. Blocked reports are handed back.
    pub fn accept(
        report: ValidationReport,
        text: impl Into<String>,
        policy: &SensitivePolicy,
        attempt_number: u32,
    ) -> Result<Self, ValidationReport> {
        if report.is_blocked() {
            return Err(report);
        }
        match report.document {
            Some(document) => {
                let text = text.into();
                let sensitivity = policy.inspect(&document, report.kind);
                Ok(Self {
                    kind: report.kind,
                    digest: ContentDigest::of_text(&text),
                    text,
                    document,
                    findings: report.findings,
                    sensitive: sensitivity.sensitive,
                    sensitivity,
                    snapshot_version: report.snapshot_version,
                    attempt_number,
                })
            }
            None => Err(report),
        }
    }

    pub fn has_blocking(&self) -> bool {
        self.findings.iter().any(|f| f.is_blocking())
    }
}

/// Explicit approval of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Confirmation {
    pub confirmed_by: String,
    pub document_digest: ContentDigest,
    pub confirmed_at: DateTime<Utc>,
}

impl Confirmation {
    pub fn for_document(document: &ValidatedDocument, confirmed_by: impl Into<String>) -> Self {
        Self {
            confirmed_by: confirmed_by.into(),
            document_digest: document.digest.clone(),
            confirmed_at: Utc::now(),
        }
    }
}

/// Why a document was not released.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandoffRefusal {
    #[error("document has {count} unresolved blocking finding(s)")]
    BlockingFindings { count: usize },

    #[error("document touches sensitive domains ({}) and needs explicit confirmation", .domains.join(", "))]
    ConfirmationRequired { domains: Vec<String> },

    #[error("confirmation was given for a different document")]
    DigestMismatch,
}

/// A document cleared for deployment.
#[derive(Debug, Clone, Serialize)]
pub struct ReleasedDocument {
    pub document: ValidatedDocument,
    pub confirmation: Option<Confirmation>,
    pub released_at: DateTime<Utc>,
}

/// Release rules for validated documents.
pub struct HandoffGate;

impl HandoffGate {
    /// Release `document` for deployment.
    ///
    /// Gate rule:
    /// - No blocking finding may be present
    /// - The text must still hash to the document digest
    /// - A confirmation, when given, must match the document digest
    /// - Sensitive documents require a confirmation
    pub fn release(
        document: ValidatedDocument,
        confirmation: Option<Confirmation>,
    ) -> Result<ReleasedDocument, HandoffRefusal> {
        let blocking = document.findings.iter().filter(|f| f.is_blocking()).count();
        if blocking > 0 {
            return Err(HandoffRefusal::BlockingFindings { count: blocking });
        }
        if !document.digest.matches(&document.text) {
            return Err(HandoffRefusal::DigestMismatch);
        }
        if let Some(c) = &confirmation {
            if c.document_digest != document.digest {
                return Err(HandoffRefusal::DigestMismatch);
            }
        }
        if document.sensitive && confirmation.is_none() {
            return Err(HandoffRefusal::ConfirmationRequired {
                domains: document.sensitivity.domains.clone(),
            });
        }

        tracing::info!(
            event = "document.released",
            kind = %document.kind,
            digest = %document.digest.short(),
            sensitive = document.sensitive,
            confirmed = confirmation.is_some(),
        );
        Ok(ReleasedDocument {
            document,
            confirmation,
            released_at: Utc::now(),
        })
    }
}
