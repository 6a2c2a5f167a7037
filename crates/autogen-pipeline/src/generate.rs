//! End-to-end generation for one request.
//!
//! Pins a snapshot, ranks and packs the inventory under the model's budget,
//! then hands the packed context to the [`RepairLoop`].

use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use std::time::Instant;

use autogen_core::metrics::METRICS;
use autogen_core::obs::{
    emit_context_packed, emit_generation_finished, emit_generation_started, request_span,
};
use autogen_core::{
    rank, rank_inventory, AutogenConfig, BudgetPacker, BudgetPlan, DocumentKind,
    GenerationBackend, GenerationError, PackedContext, PromptAssembler, PromptRequest,
    PromptTemplate, RelevanceCandidate, RequestKind,
};
use autogen_registry::{RegistrySnapshot, SnapshotStore};
use serde::Serialize;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

use crate::gate::ValidatedDocument;
use crate::repair::{RepairLog, RepairLoop, RepairPolicy};
use crate::review::{review_text, ReviewFinding, ReviewRules};

/// Ranked and packed context for one request.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedContext {
    pub snapshot_version: u64,
    pub plan: BudgetPlan,
    pub candidates: Vec<RelevanceCandidate>,
    pub packed: PackedContext,
    /// The request matched nothing and the whole inventory was used instead.
    pub inventory_fallback: bool,
}

/// Everything known about a finished request.
#[derive(Debug)]
pub struct GenerationReport {
    pub request_id: String,
    pub context: Option<PreparedContext>,
    pub log: Option<RepairLog>,
    /// Rule findings on the existing document; empty unless reviewing.
    pub review: Vec<ReviewFinding>,
    pub result: Result<ValidatedDocument, GenerationError>,
}

impl GenerationReport {
    pub fn into_result(self) -> Result<ValidatedDocument, GenerationError> {
        self.result
    }

    fn failed(request_id: String, error: GenerationError) -> Self {
        Self {
            request_id,
            context: None,
            log: None,
            review: Vec::new(),
            result: Err(error),
        }
    }
}

/// Wires the snapshot store, configuration and backend together.
pub struct GenerationPipeline {
    config: AutogenConfig,
    store: Arc<SnapshotStore>,
    backend: Arc<dyn GenerationBackend>,
    attempts: Arc<AtomicU32>,
}

impl GenerationPipeline {
    pub fn new(
        config: AutogenConfig,
        store: Arc<SnapshotStore>,
        backend: Arc<dyn GenerationBackend>,
    ) -> Self {
        Self {
            config,
            store,
            backend,
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn config(&self) -> &AutogenConfig {
        &self.config
    }

    /// Backend calls made by this pipeline across all requests.
    pub fn attempt_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.attempts)
    }

    /// Prompt assembler configured for `kind`.
    pub fn assembler(&self, kind: DocumentKind) -> PromptAssembler {
        PromptAssembler::new(PromptTemplate::for_kind(kind), self.config.estimator())
            .with_prior_error_cap(self.config.budget.prior_error_chars)
    }

    /// Rank and pack the inventory for `request` without calling the backend.
    pub fn prepare(&self, request: &PromptRequest, snapshot: &RegistrySnapshot) -> PreparedContext {
        let policy = self.config.relevance_policy();
        let mut inventory_fallback = false;
        let mut candidates = match request.document_kind {
            DocumentKind::Dashboard => rank_inventory(&request.text, snapshot, &policy),
            DocumentKind::Automation => {
                let ranked = rank(&request.text, snapshot, &policy);
                if ranked.is_empty() {
                    debug!("request matched no inventory items; using the whole inventory");
                    inventory_fallback = true;
                    rank_inventory(&request.text, snapshot, &policy)
                } else {
                    ranked
                }
            }
        };
        candidates.truncate(policy.max_candidates);

        let assembler = self.assembler(request.document_kind);
        let plan = BudgetPlan::new(
            self.config.context_window(self.backend.model_name()),
            assembler.overhead(request),
            self.config.budget.output_reserve,
        );
        let packed = BudgetPacker::new(self.config.estimator()).pack(
            snapshot,
            &candidates,
            plan.ceiling,
            self.config.full_detail_floor,
        );
        if packed.truncated {
            warn!(
                dropped = packed.dropped.count,
                ceiling = plan.ceiling,
                "context truncated to fit the model window"
            );
        }

        PreparedContext {
            snapshot_version: snapshot.version(),
            plan,
            candidates,
            packed,
            inventory_fallback,
        }
    }

    /// Deterministic review of the document a review request carries.
    pub fn review_existing(&self, request: &PromptRequest, snapshot: &RegistrySnapshot) -> Vec<ReviewFinding> {
        let (RequestKind::Review, Some(existing)) = (request.kind, request.existing_document.as_deref())
        else {
            return Vec::new();
        };
        let rules = ReviewRules::new(self.config.sensitive_policy());
        let findings = review_text(&rules, existing, request.document_kind, snapshot);
        debug!(findings = findings.len(), "review rules applied to existing document");
        findings
    }

    /// Generate, validate and repair a document for `request`.
    pub async fn generate(&self, request: &PromptRequest) -> GenerationReport {
        let request_id = Uuid::new_v4().to_string();
        let span = request_span(&request_id);
        self.generate_inner(request, request_id).instrument(span).await
    }

    async fn generate_inner(&self, request: &PromptRequest, request_id: String) -> GenerationReport {
        let started = Instant::now();
        METRICS.inc_generations();

        if let Err(e) = check_request(request) {
            emit_generation_finished(&request_id, e.kind(), 0, elapsed_ms(started));
            return GenerationReport::failed(request_id, e);
        }

        let snapshot = match self.store.pin().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let error = GenerationError::SnapshotUnavailable(e.to_string());
                emit_generation_finished(&request_id, error.kind(), 0, elapsed_ms(started));
                return GenerationReport::failed(request_id, error);
            }
        };
        emit_generation_started(&request_id, request.document_kind.as_str(), snapshot.version());

        let review = self.review_existing(request, &snapshot);

        let context = self.prepare(request, &snapshot);
        emit_context_packed(
            &request_id,
            context.packed.full_detail_items.len(),
            context.packed.summary_items.len(),
            context.packed.dropped.count,
            context.packed.estimated_size,
            context.packed.budget_ceiling,
        );

        let repair = RepairLoop::new(
            RepairPolicy::from_config(&self.config),
            self.assembler(request.document_kind),
            self.config.sensitive_policy(),
        )
        .with_attempt_counter(Arc::clone(&self.attempts));
        let run = repair
            .run(self.backend.as_ref(), &snapshot, &context.packed, request, &request_id)
            .await;

        let outcome = match &run.result {
            Ok(document) => {
                if document.sensitive {
                    METRICS.inc_sensitive();
                }
                "done"
            }
            Err(e) => e.kind(),
        };
        emit_generation_finished(&request_id, outcome, run.log.attempts_used, elapsed_ms(started));

        GenerationReport {
            request_id,
            context: Some(context),
            log: Some(run.log),
            review,
            result: run.result,
        }
    }
}

fn check_request(request: &PromptRequest) -> Result<(), GenerationError> {
    if request.kind.needs_existing_document()
        && request
            .existing_document
            .as_deref()
            .map_or(true, |d| d.trim().is_empty())
    {
        return Err(GenerationError::InvalidRequest(format!(
            "a {} request needs the existing document",
            request.kind
        )));
    }
    if !request.kind.needs_existing_document() && request.text.trim().is_empty() {
        return Err(GenerationError::InvalidRequest(
            "the request text is empty".to_string(),
        ));
    }
    Ok(())
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_without_document_rejected() {
        let mut request = PromptRequest::generate(DocumentKind::Automation, "check this");
        request.kind = RequestKind::Review;
        let err = check_request(&request).expect_err("missing document");
        assert_eq!(err.kind(), "invalid_request");

        let ok = request.with_existing(RequestKind::Review, "alias: x\n");
        assert!(check_request(&ok).is_ok());
    }

    #[test]
    fn test_blank_generate_request_rejected() {
        let request = PromptRequest::generate(DocumentKind::Dashboard, "   ");
        assert!(check_request(&request).is_err());
    }
}
