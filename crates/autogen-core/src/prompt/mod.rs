//! Prompt assembly.
//!
//! A prompt is built from ordered, immutable [`PromptSection`]s by a pure
//! function. The template sections are fixed per document kind; the context
//! block, request text and repair feedback are filled in per call.

mod templates;

use serde::{Deserialize, Serialize};

use crate::context::{dropped_line_reserve, PackedContext, TokenEstimator};
use crate::document::{DocumentKind, RequestKind};

/// Default cap, in characters, on prior-error text carried into a retry.
pub const DEFAULT_PRIOR_ERROR_CAP: usize = 1500;

const TRUNCATION_MARKER: &str = "...";

/// One titled block of prompt text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSection {
    pub heading: String,
    pub body: String,
}

impl PromptSection {
    pub fn new(heading: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            body: body.into(),
        }
    }

    pub fn render(&self) -> String {
        if self.heading.is_empty() {
            self.body.clone()
        } else {
            format!("## {}\n\n{}", self.heading, self.body)
        }
    }
}

fn render_sections(sections: &[PromptSection]) -> String {
    sections
        .iter()
        .map(PromptSection::render)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Final prompt sent to a generation backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    /// Both parts as one text, for backends without role separation.
    pub fn text(&self) -> String {
        format!("{}\n\n{}", self.system, self.user)
    }
}

/// The fixed sections for a document kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    pub document_kind: DocumentKind,
    pub role: PromptSection,
    pub output_rules: PromptSection,
    pub conventions: PromptSection,
}

impl PromptTemplate {
    pub fn for_kind(document_kind: DocumentKind) -> Self {
        let (role, rules, conventions) = match document_kind {
            DocumentKind::Automation => (
                templates::AUTOMATION_ROLE,
                templates::AUTOMATION_OUTPUT_RULES,
                templates::AUTOMATION_CONVENTIONS,
            ),
            DocumentKind::Dashboard => (
                templates::DASHBOARD_ROLE,
                templates::DASHBOARD_OUTPUT_RULES,
                templates::DASHBOARD_CONVENTIONS,
            ),
        };
        Self {
            document_kind,
            role: PromptSection::new("Role", role),
            output_rules: PromptSection::new("Output Rules", rules),
            conventions: PromptSection::new("Conventions", conventions),
        }
    }
}

/// What the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRequest {
    pub text: String,
    pub kind: RequestKind,
    pub document_kind: DocumentKind,
    /// The document under review or modification.
    pub existing_document: Option<String>,
}

impl PromptRequest {
    pub fn generate(document_kind: DocumentKind, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: RequestKind::Generate,
            document_kind,
            existing_document: None,
        }
    }

    pub fn with_existing(mut self, kind: RequestKind, document: impl Into<String>) -> Self {
        self.kind = kind;
        self.existing_document = Some(document.into());
        self
    }
}

/// Combines a template, packed context and request into a [`Prompt`].
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    template: PromptTemplate,
    estimator: TokenEstimator,
    prior_error_cap: usize,
}

impl PromptAssembler {
    pub fn new(template: PromptTemplate, estimator: TokenEstimator) -> Self {
        Self {
            template,
            estimator,
            prior_error_cap: DEFAULT_PRIOR_ERROR_CAP,
        }
    }

    pub fn with_prior_error_cap(mut self, cap: usize) -> Self {
        self.prior_error_cap = cap.max(TRUNCATION_MARKER.len());
        self
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    /// Build the prompt. Pure: identical inputs give identical output.
    pub fn assemble(
        &self,
        packed: &PackedContext,
        request: &PromptRequest,
        prior_error: Option<&str>,
    ) -> Prompt {
        let context = if packed.is_empty() {
            templates::EMPTY_CONTEXT.to_string()
        } else {
            packed.render()
        };
        let notice = packed
            .truncated
            .then(|| packed.dropped_summary_line())
            .map(|line| line.unwrap_or_default());
        let prior_error = prior_error.map(|e| self.cap_prior_error(e));
        self.compose(&context, notice.as_deref(), request, prior_error.as_deref())
    }

    /// Estimated size of everything except the context lines, with room
    /// for the largest repair section and truncation notice. The packer's
    /// ceiling is the window minus this and the output reserve.
    pub fn overhead(&self, request: &PromptRequest) -> usize {
        let worst_notice = "x".repeat(dropped_line_reserve());
        let worst_error = "x".repeat(self.prior_error_cap);
        let prompt = self.compose(
            templates::EMPTY_CONTEXT,
            Some(&worst_notice),
            request,
            Some(&worst_error),
        );
        self.estimator.estimate(&prompt.text())
    }

    fn compose(
        &self,
        context: &str,
        truncation: Option<&str>,
        request: &PromptRequest,
        prior_error: Option<&str>,
    ) -> Prompt {
        let t = &self.template;
        let mut system = vec![
            t.role.clone(),
            t.output_rules.clone(),
            t.conventions.clone(),
            PromptSection::new("Available Entities", context),
        ];
        if let Some(dropped) = truncation {
            let body = if dropped.is_empty() {
                templates::TRUNCATION_NOTICE.to_string()
            } else {
                format!("{}\n{dropped}", templates::TRUNCATION_NOTICE)
            };
            system.push(PromptSection::new("Context Notice", body));
        }

        let mut user = Vec::new();
        if let Some(existing) = request.existing_document.as_deref() {
            let heading = match request.kind {
                RequestKind::Review => "Document Under Review",
                _ => "Current Document",
            };
            user.push(PromptSection::new(
                heading,
                format!("```yaml\n{}\n```", existing.trim_end()),
            ));
        }
        user.push(PromptSection::new(
            "User Request",
            format!(
                "{}\n\n{}",
                request.text.trim(),
                templates::request_instruction(request.kind, request.document_kind)
            ),
        ));
        if let Some(error) = prior_error {
            user.push(PromptSection::new(
                "Previous Attempt Failed",
                format!(
                    "The previous attempt failed because:\n{error}\n\n{}",
                    templates::REPAIR_INSTRUCTION
                ),
            ));
        }

        Prompt {
            system: render_sections(&system),
            user: render_sections(&user),
        }
    }

    fn cap_prior_error(&self, error: &str) -> String {
        if error.len() <= self.prior_error_cap {
            return error.to_string();
        }
        let mut end = self.prior_error_cap - TRUNCATION_MARKER.len();
        while !error.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}{TRUNCATION_MARKER}", &error[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{DroppedItems, PackedContext};

    fn empty_context() -> PackedContext {
        PackedContext {
            full_detail_items: Vec::new(),
            summary_items: Vec::new(),
            dropped: DroppedItems::default(),
            estimated_size: 0,
            budget_ceiling: 100,
            truncated: false,
        }
    }

    fn assembler(kind: DocumentKind) -> PromptAssembler {
        PromptAssembler::new(PromptTemplate::for_kind(kind), TokenEstimator::default())
    }

    #[test]
    fn test_sections_in_stable_order() {
        let prompt = assembler(DocumentKind::Automation).assemble(
            &empty_context(),
            &PromptRequest::generate(DocumentKind::Automation, "turn on the porch light"),
            None,
        );
        let role = prompt.system.find("## Role").expect("role");
        let rules = prompt.system.find("## Output Rules").expect("rules");
        let conv = prompt.system.find("## Conventions").expect("conventions");
        let ctx = prompt.system.find("## Available Entities").expect("context");
        assert!(role < rules && rules < conv && conv < ctx);
        assert!(prompt.system.contains("(no matching entities"));
        assert!(prompt.user.starts_with("## User Request\n\nturn on the porch light"));
        assert!(!prompt.user.contains("Previous Attempt Failed"));
    }

    #[test]
    fn test_prior_error_appended_last() {
        let prompt = assembler(DocumentKind::Automation).assemble(
            &empty_context(),
            &PromptRequest::generate(DocumentKind::Automation, "x"),
            Some("- [schema] automation is missing required key 'trigger'"),
        );
        let request = prompt.user.find("## User Request").expect("request");
        let repair = prompt.user.find("## Previous Attempt Failed").expect("repair");
        assert!(request < repair);
        assert!(prompt.user.contains("missing required key 'trigger'"));
    }

    #[test]
    fn test_prior_error_is_capped() {
        let asm = assembler(DocumentKind::Automation).with_prior_error_cap(20);
        let prompt = asm.assemble(
            &empty_context(),
            &PromptRequest::generate(DocumentKind::Automation, "x"),
            Some(&"é".repeat(50)),
        );
        let section = &prompt.user[prompt.user.find("because:\n").expect("section")..];
        assert!(section.contains("..."));
        assert!(!section.contains(&"é".repeat(11)));
    }

    #[test]
    fn test_modify_includes_existing_document() {
        let request = PromptRequest::generate(DocumentKind::Dashboard, "add a weather card")
            .with_existing(RequestKind::Modify, "views:\n  - title: Home\n");
        let prompt = assembler(DocumentKind::Dashboard).assemble(&empty_context(), &request, None);
        assert!(prompt.user.starts_with("## Current Document\n\n```yaml\nviews:"));
        assert!(prompt.user.contains("Apply the requested change to the dashboard"));
        assert!(prompt.system.contains("Lovelace"));
    }

    #[test]
    fn test_truncation_notice_includes_dropped_domains() {
        let mut packed = empty_context();
        packed.truncated = true;
        packed.dropped.count = 3;
        packed.dropped.by_domain.insert("sensor".to_string(), 3);
        let prompt = assembler(DocumentKind::Automation).assemble(
            &packed,
            &PromptRequest::generate(DocumentKind::Automation, "x"),
            None,
        );
        assert!(prompt.system.contains("## Context Notice"));
        assert!(prompt.system.contains("+ 3 sensor entities not listed"));
    }

    #[test]
    fn test_overhead_covers_repair_prompt() {
        let asm = assembler(DocumentKind::Automation);
        let request = PromptRequest::generate(DocumentKind::Automation, "kitchen light at sunset");
        let prompt = asm.assemble(&empty_context(), &request, Some(&"e".repeat(5000)));
        let est = TokenEstimator::default();
        assert!(est.estimate(&prompt.text()) <= asm.overhead(&request));
    }
}
