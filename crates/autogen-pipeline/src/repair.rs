//! Bounded generate, parse, validate and repair loop.
//!
//! Each attempt asks the backend for a document, extracts it from the
//! reply and validates it against the pinned snapshot. A parse failure,
//! a timeout or a blocking finding sends a repair prompt carrying a short
//! description of what went wrong, up to `repair_ceiling` times.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use autogen_core::finding::summarize;
use autogen_core::metrics::METRICS;
use autogen_core::obs::{emit_attempt_finished, emit_backend_failure, emit_validation_completed};
use autogen_core::{
    parse, AutogenConfig, BackendError, GenerationBackend, GenerationError, PackedContext,
    ParseErrorReason, Prompt, PromptAssembler, PromptRequest, SensitivePolicy, ValidationFinding,
    ValidationStage,
};
use autogen_registry::{ContentDigest, RegistrySnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::gate::ValidatedDocument;
use crate::pipeline::ValidationPipeline;

/// Findings carried into a repair prompt.
const REPAIR_FINDINGS_LIMIT: usize = 8;

const TIMEOUT_HINT: &str = "The previous request timed out before a reply arrived. \
Reply with only the YAML document in a single ```yaml block and keep it concise.";

/// Loop states, recorded in order in the [`RepairLog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Generating,
    Parsing,
    Validating,
    Repairing,
    Done,
    Failed,
}

/// How one attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Accepted { advisory: usize },
    ParseFailed { reason: ParseErrorReason },
    Blocked { stage: ValidationStage, blocking: usize },
    TimedOut,
    BackendFailed { kind: String },
}

impl AttemptOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AttemptOutcome::Accepted { .. } => "accepted",
            AttemptOutcome::ParseFailed { .. } => "parse_failed",
            AttemptOutcome::Blocked { .. } => "blocked",
            AttemptOutcome::TimedOut => "timed_out",
            AttemptOutcome::BackendFailed { .. } => "backend_failed",
        }
    }
}

/// Bounded repair policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairPolicy {
    /// Repairs after the first generation.
    pub repair_ceiling: u32,
    /// Per-call limit on the backend.
    pub backend_timeout: Duration,
}

impl Default for RepairPolicy {
    fn default() -> Self {
        Self {
            repair_ceiling: 2,
            backend_timeout: Duration::from_secs(120),
        }
    }
}

impl RepairPolicy {
    pub fn from_config(config: &AutogenConfig) -> Self {
        Self {
            repair_ceiling: config.repair_ceiling,
            backend_timeout: config.backend_timeout(),
        }
    }

    /// Total backend calls allowed for one request.
    pub fn max_generations(&self) -> u32 {
        self.repair_ceiling + 1
    }
}

/// One generation attempt while it is in flight. Dropped when the attempt
/// ends; only its [`AttemptRecord`] is kept.
#[derive(Debug, Clone)]
pub struct GenerationAttempt {
    pub attempt_number: u32,
    pub prompt: Prompt,
    pub prior_error: Option<String>,
    pub raw_response: Option<String>,
}

impl GenerationAttempt {
    fn record(&self, outcome: AttemptOutcome, started: Instant) -> AttemptRecord {
        AttemptRecord {
            attempt_number: self.attempt_number,
            prompt_digest: ContentDigest::of_text(&self.prompt.text()),
            repair: self.prior_error.is_some(),
            response_chars: self.raw_response.as_ref().map_or(0, |r| r.chars().count()),
            outcome,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Audit entry for one attempt. Holds no backend text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt_number: u32,
    pub prompt_digest: ContentDigest,
    /// Whether the prompt carried a prior error.
    pub repair: bool,
    pub response_chars: usize,
    pub outcome: AttemptOutcome,
    pub duration_ms: u64,
}

/// Full loop timeline for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairLog {
    pub request_id: String,
    pub policy: RepairPolicy,
    pub snapshot_version: u64,
    pub transitions: Vec<LoopState>,
    pub attempts: Vec<AttemptRecord>,
    pub attempts_used: u32,
    pub final_state: LoopState,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RepairLog {
    fn start(request_id: &str, policy: &RepairPolicy, snapshot_version: u64) -> Self {
        let now = Utc::now();
        Self {
            request_id: request_id.to_string(),
            policy: policy.clone(),
            snapshot_version,
            transitions: Vec::new(),
            attempts: Vec::new(),
            attempts_used: 0,
            final_state: LoopState::Generating,
            started_at: now,
            finished_at: now,
        }
    }

    fn enter(&mut self, state: LoopState) {
        self.transitions.push(state);
    }

    fn finish(&mut self, state: LoopState) {
        self.enter(state);
        self.final_state = state;
        self.finished_at = Utc::now();
    }

    /// The attempt that produced the accepted document, if any.
    pub fn accepted_attempt(&self) -> Option<u32> {
        self.attempts
            .iter()
            .find(|a| matches!(a.outcome, AttemptOutcome::Accepted { .. }))
            .map(|a| a.attempt_number)
    }
}

/// Result of one loop run: the document or error, plus its timeline.
#[derive(Debug)]
pub struct RepairRun {
    pub result: Result<ValidatedDocument, GenerationError>,
    pub log: RepairLog,
}

/// What the loop remembers about the latest failure.
enum LastFailure {
    Parse(ParseErrorReason),
    Blocked(ValidationStage, Vec<ValidationFinding>),
    Timeout,
}

/// Drives attempts for one request.
pub struct RepairLoop {
    policy: RepairPolicy,
    assembler: PromptAssembler,
    sensitive: SensitivePolicy,
    attempts: Arc<AtomicU32>,
}

impl RepairLoop {
    pub fn new(policy: RepairPolicy, assembler: PromptAssembler, sensitive: SensitivePolicy) -> Self {
        Self {
            policy,
            assembler,
            sensitive,
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Share a counter of backend calls with the caller, e.g. for rate limits.
    pub fn with_attempt_counter(mut self, counter: Arc<AtomicU32>) -> Self {
        self.attempts = counter;
        self
    }

    pub fn policy(&self) -> &RepairPolicy {
        &self.policy
    }

    /// Backend calls made through this loop so far.
    pub fn attempts_made(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Run until a document is accepted or attempts run out.
    ///
    /// Every attempt validates against the same `snapshot`. Dropping the
    /// returned future cancels the in-flight backend call.
    pub async fn run(
        &self,
        backend: &dyn GenerationBackend,
        snapshot: &RegistrySnapshot,
        packed: &PackedContext,
        request: &PromptRequest,
        request_id: &str,
    ) -> RepairRun {
        let pipeline = ValidationPipeline::new(request.document_kind);
        let max = self.policy.max_generations();
        let mut log = RepairLog::start(request_id, &self.policy, snapshot.version());
        let mut prior_error: Option<String> = None;
        let mut last_failure = LastFailure::Timeout;

        for attempt_number in 1..=max {
            if attempt_number > 1 {
                log.enter(LoopState::Repairing);
                METRICS.inc_repairs();
            }
            log.enter(LoopState::Generating);
            log.attempts_used = attempt_number;
            self.attempts.fetch_add(1, Ordering::SeqCst);
            METRICS.inc_attempts();

            let mut attempt = GenerationAttempt {
                attempt_number,
                prompt: self.assembler.assemble(packed, request, prior_error.as_deref()),
                prior_error: prior_error.take(),
                raw_response: None,
            };
            let started = Instant::now();

            let reply = tokio::time::timeout(self.policy.backend_timeout, backend.complete(&attempt.prompt)).await;
            let completion = match reply {
                Ok(Ok(completion)) => completion,
                Ok(Err(BackendError::Timeout(_))) | Err(_) => {
                    METRICS.inc_backend_timeouts();
                    emit_backend_failure(request_id, attempt_number, "timeout");
                    self.finish_attempt(&mut log, &attempt, AttemptOutcome::TimedOut, started, request_id);
                    last_failure = LastFailure::Timeout;
                    prior_error = Some(TIMEOUT_HINT.to_string());
                    continue;
                }
                Ok(Err(err)) => {
                    emit_backend_failure(request_id, attempt_number, err.kind());
                    let outcome = AttemptOutcome::BackendFailed {
                        kind: err.kind().to_string(),
                    };
                    self.finish_attempt(&mut log, &attempt, outcome, started, request_id);
                    log.finish(LoopState::Failed);
                    return RepairRun {
                        result: Err(GenerationError::Backend(err)),
                        log,
                    };
                }
            };

            log.enter(LoopState::Parsing);
            let extracted = parse(&completion.content);
            attempt.raw_response = Some(completion.content);
            let extracted = match extracted {
                Ok(extracted) => extracted,
                Err(e) => {
                    debug!(attempt = attempt_number, reason = %e, "no document in reply");
                    let outcome = AttemptOutcome::ParseFailed { reason: e.reason };
                    self.finish_attempt(&mut log, &attempt, outcome, started, request_id);
                    prior_error = Some(parse_repair_message(e.reason));
                    last_failure = LastFailure::Parse(e.reason);
                    continue;
                }
            };

            log.enter(LoopState::Validating);
            let report = pipeline.validate(&extracted.text, snapshot);
            emit_validation_completed(
                request_id,
                attempt_number,
                report.blocking_count(),
                report.advisory_count(),
            );

            match ValidatedDocument::accept(report, extracted.text, &self.sensitive, attempt_number) {
                Ok(document) => {
                    let outcome = AttemptOutcome::Accepted {
                        advisory: document.findings.len(),
                    };
                    self.finish_attempt(&mut log, &attempt, outcome, started, request_id);
                    log.finish(LoopState::Done);
                    return RepairRun {
                        result: Ok(document),
                        log,
                    };
                }
                Err(report) => {
                    let stage = report.blocked_at.unwrap_or(ValidationStage::Syntax);
                    let outcome = AttemptOutcome::Blocked {
                        stage,
                        blocking: report.blocking_count(),
                    };
                    self.finish_attempt(&mut log, &attempt, outcome, started, request_id);
                    prior_error = Some(summarize(&report.findings, REPAIR_FINDINGS_LIMIT));
                    last_failure = LastFailure::Blocked(stage, report.findings);
                }
            }
        }

        log.finish(LoopState::Failed);
        warn!(
            request_id = %request_id,
            attempts = max,
            "no valid document within the repair ceiling"
        );
        RepairRun {
            result: Err(self.exhausted(max, last_failure)),
            log,
        }
    }

    fn finish_attempt(
        &self,
        log: &mut RepairLog,
        attempt: &GenerationAttempt,
        outcome: AttemptOutcome,
        started: Instant,
        request_id: &str,
    ) {
        let record = attempt.record(outcome, started);
        emit_attempt_finished(
            request_id,
            record.attempt_number,
            record.outcome.label(),
            record.duration_ms,
        );
        log.attempts.push(record);
    }

    /// Map the last failure to the surfaced error. With a zero ceiling no
    /// repair was attempted, so the failure is reported as is.
    fn exhausted(&self, attempts: u32, last: LastFailure) -> GenerationError {
        if self.policy.repair_ceiling == 0 {
            return match last {
                LastFailure::Parse(reason) => GenerationError::ParseFailure {
                    reason: reason.as_str().to_string(),
                },
                LastFailure::Blocked(stage, findings) => {
                    GenerationError::ValidationBlocked { stage, findings }
                }
                LastFailure::Timeout => GenerationError::BackendTimeout { attempts },
            };
        }

        METRICS.inc_repairs_exhausted();
        match last {
            LastFailure::Timeout => GenerationError::BackendTimeout { attempts },
            LastFailure::Parse(reason) => GenerationError::RepairExhausted {
                attempts,
                findings: Vec::new(),
                last_failure: format!("the reply contained no YAML document ({})", reason.as_str()),
            },
            LastFailure::Blocked(stage, findings) => GenerationError::RepairExhausted {
                attempts,
                last_failure: format!("the document failed {stage} validation"),
                findings,
            },
        }
    }
}

fn parse_repair_message(reason: ParseErrorReason) -> String {
    let what = match reason {
        ParseErrorReason::EmptyResponse => "The previous reply was empty.",
        ParseErrorReason::NoDocumentFound => "The previous reply did not contain a YAML document.",
    };
    format!("{what} Reply with the complete document inside a single ```yaml fenced block.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_counts_first_generation() {
        let policy = RepairPolicy::default();
        assert_eq!(policy.max_generations(), 3);
        let none = RepairPolicy {
            repair_ceiling: 0,
            ..RepairPolicy::default()
        };
        assert_eq!(none.max_generations(), 1);
    }

    #[test]
    fn test_policy_from_config() {
        let config = AutogenConfig {
            repair_ceiling: 4,
            backend_timeout_secs: 9,
            ..AutogenConfig::default()
        };
        let policy = RepairPolicy::from_config(&config);
        assert_eq!(policy.repair_ceiling, 4);
        assert_eq!(policy.backend_timeout, Duration::from_secs(9));
    }

    #[test]
    fn test_parse_repair_message_names_fence() {
        let msg = parse_repair_message(ParseErrorReason::NoDocumentFound);
        assert!(msg.contains("```yaml"));
    }
}
