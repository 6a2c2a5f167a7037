//! Structured lifecycle events for generation requests.
//!
//! Every request runs inside a [`RequestSpan`]; the `emit_*` functions log
//! one `info!` event per lifecycle step with an `event` field so log
//! pipelines can filter on it. Raw backend output is never logged here.

use tracing::info;

/// RAII guard that enters a request-scoped tracing span.
///
/// ```ignore
/// let _span = RequestSpan::enter("req-7f3a");
/// // every event below carries request_id = "req-7f3a"
/// ```
pub struct RequestSpan {
    _span: tracing::span::EnteredSpan,
}

impl RequestSpan {
    pub fn enter(request_id: &str) -> Self {
        Self {
            _span: request_span(request_id).entered(),
        }
    }
}

/// The request span itself, for attaching to a future with
/// `tracing::Instrument` where an entered guard cannot be held across
/// `.await`.
pub fn request_span(request_id: &str) -> tracing::Span {
    tracing::info_span!("autogen.request", request_id = %request_id)
}

/// Emit event: a generation request started against a pinned snapshot.
pub fn emit_generation_started(request_id: &str, document_kind: &str, snapshot_version: u64) {
    info!(
        event = "generation.started",
        request_id = %request_id,
        document_kind = %document_kind,
        snapshot_version = snapshot_version,
    );
}

/// Emit event: context packed within its budget.
pub fn emit_context_packed(
    request_id: &str,
    full_detail: usize,
    summary: usize,
    dropped: usize,
    estimated_size: usize,
    budget_ceiling: usize,
) {
    info!(
        event = "context.packed",
        request_id = %request_id,
        full_detail = full_detail,
        summary = summary,
        dropped = dropped,
        estimated_size = estimated_size,
        budget_ceiling = budget_ceiling,
    );
}

/// Emit event: one generation attempt finished with the given outcome label.
pub fn emit_attempt_finished(request_id: &str, attempt: u32, outcome: &str, duration_ms: u64) {
    info!(
        event = "attempt.finished",
        request_id = %request_id,
        attempt = attempt,
        outcome = %outcome,
        duration_ms = duration_ms,
    );
}

/// Emit event: validation pass completed.
pub fn emit_validation_completed(request_id: &str, attempt: u32, blocking: usize, advisory: usize) {
    info!(
        event = "validation.completed",
        request_id = %request_id,
        attempt = attempt,
        blocking = blocking,
        advisory = advisory,
    );
}

/// Emit event: the request finished, successfully or not.
pub fn emit_generation_finished(request_id: &str, outcome: &str, attempts: u32, duration_ms: u64) {
    info!(
        event = "generation.finished",
        request_id = %request_id,
        outcome = %outcome,
        attempts = attempts,
        duration_ms = duration_ms,
    );
}

/// Emit event: backend failure (warning level). Only the error kind is logged.
pub fn emit_backend_failure(request_id: &str, attempt: u32, kind: &str) {
    tracing::warn!(
        event = "backend.failure",
        request_id = %request_id,
        attempt = attempt,
        kind = %kind,
    );
}
